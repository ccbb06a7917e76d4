//! `kiln stats` — record count and size of the store.

use kiln_cache::{DiskStore, StoreUsage};

use crate::{store, GlobalArgs, StatsArgs};

/// Runs the `kiln stats` command.
pub fn run(args: &StatsArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let store = store::open(global)?;
    let usage = store.usage()?;
    if args.json {
        println!("{}", render_json(&store, usage));
    } else if !global.quiet {
        println!("{}", render_text(&store, usage));
    }
    Ok(0)
}

fn render_json(store: &DiskStore, usage: StoreUsage) -> serde_json::Value {
    serde_json::json!({
        "root": store.root().display().to_string(),
        "records": usage.records,
        "bytes": usage.bytes,
    })
}

fn render_text(store: &DiskStore, usage: StoreUsage) -> String {
    format!(
        "store:   {}\nrecords: {}\nbytes:   {}",
        store.root().display(),
        usage.records,
        usage.bytes
    )
}
