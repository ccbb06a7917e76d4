//! `kiln clear` — bulk invalidation of the store.

use crate::{store, GlobalArgs};

/// Runs the `kiln clear` command.
pub fn run(global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let store = store::open(global)?;
    let removed = store.clear()?;
    if !global.quiet {
        eprintln!(
            "     Removed {removed} records from {}",
            store.root().display()
        );
    }
    Ok(0)
}
