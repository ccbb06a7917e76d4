//! `kiln show` — dump the parts of one record.

use kiln_cache::{Blob, Tag};
use kiln_common::Digest;

use crate::{store, GlobalArgs, ShowArgs};

/// Bytes of a part printed as hex before truncating.
const PREVIEW_BYTES: usize = 32;

/// Runs the `kiln show` command.
pub fn run(args: &ShowArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let digest: Digest = args.digest.parse()?;
    let store = store::open(global)?;
    let Some(blob) = store.get(&digest)? else {
        return Err(format!("no record for {digest}").into());
    };
    print!("{}", describe(&blob));
    Ok(if blob.is_well_formed() { 0 } else { 1 })
}

/// Renders one line per part, followed by the validation verdict.
pub fn describe(blob: &Blob) -> String {
    let mut out = String::new();
    for part in blob.parts() {
        let shown = &part.bytes[..part.bytes.len().min(PREVIEW_BYTES)];
        let ellipsis = if part.bytes.len() > PREVIEW_BYTES { ".." } else { "" };
        out.push_str(&format!(
            "{:<9} {:>8} bytes  {}{}\n",
            part.tag.to_string(),
            part.bytes.len(),
            hex::encode(shown),
            ellipsis
        ));
    }
    match blob.check() {
        Ok(()) => out.push_str(&format!("{} total bytes, well-formed\n", blob.len())),
        Err(defect) => out.push_str(&format!("malformed: {defect}\n")),
    }
    if blob.part(Tag::ARTIFACT).is_none() {
        out.push_str("note: no artifact part\n");
    }
    out
}
