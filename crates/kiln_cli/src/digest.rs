//! `kiln digest` — compute the store digest for a key.

use kiln_cache::{manifest_text, normalize_key, store_digest};
use kiln_common::{Category, Digest};

use crate::{DigestArgs, GlobalArgs};

/// Runs the `kiln digest` command.
pub fn run(args: &DigestArgs, _global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let (digest, manifest) = compute(args)?;
    if args.manifest {
        print!("{manifest}");
    }
    println!("{digest}");
    Ok(0)
}

/// Returns the digest and the manifest text it was computed over.
pub fn compute(args: &DigestArgs) -> Result<(Digest, String), Box<dyn std::error::Error>> {
    let program: Digest = args.program.parse()?;
    let category = Category::from_label(&args.category)
        .ok_or_else(|| format!("unknown category '{}'", args.category))?;
    let key = hex::decode(args.key.trim())?;
    let manifest = manifest_text(&program, category, &normalize_key(category, &key));
    Ok((store_digest(&program, category, &key), manifest))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(category: &str, key: &str) -> DigestArgs {
        DigestArgs {
            program: "ab".repeat(20),
            category: category.to_string(),
            key: key.to_string(),
            manifest: false,
        }
    }

    #[test]
    fn manifest_has_zeroed_identity() {
        let (digest, manifest) = compute(&args("vs", "0700000061")).unwrap();
        let expected_key = Digest::of(&[0, 0, 0, 0, 0x61]).to_hex();
        assert!(manifest.ends_with(&format!("vs_key:{expected_key}\n")));
        assert_eq!(digest, Digest::of(manifest.as_bytes()));
    }

    #[test]
    fn identity_field_is_ignored() {
        let (a, _) = compute(&args("fs", "0100000061")).unwrap();
        let (b, _) = compute(&args("fs", "0200000061")).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_unknown_category() {
        assert!(compute(&args("blit", "00")).is_err());
    }

    #[test]
    fn rejects_bad_hex() {
        assert!(compute(&args("cs", "zz")).is_err());
        let mut bad_program = args("cs", "00");
        bad_program.program = "1234".to_string();
        assert!(compute(&bad_program).is_err());
    }
}
