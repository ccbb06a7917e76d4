//! `kiln verify` — structural check of every record.

use kiln_cache::{DiskStore, Tag};
use kiln_common::Digest;
use tracing::{info, warn};

use crate::{store, GlobalArgs, VerifyArgs};

/// Problem found in one record.
#[derive(Debug, PartialEq, Eq)]
pub struct Finding {
    /// Digest of the record.
    pub digest: Digest,
    /// What is wrong with it.
    pub reason: String,
}

/// Result of checking every record in a store.
#[derive(Debug, Default)]
pub struct Report {
    /// Records examined.
    pub total: usize,
    /// Well-formed records missing the artifact or sidecar part. These are
    /// valid and are rebuilt on lookup, so they are never removed.
    pub partial: Vec<Digest>,
    /// Malformed records.
    pub findings: Vec<Finding>,
}

/// Checks every record and returns the malformed ones.
pub fn scan(store: &DiskStore) -> Result<Report, kiln_cache::CacheError> {
    let digests = store.digests()?;
    let mut report = Report {
        total: digests.len(),
        ..Report::default()
    };
    for digest in digests {
        let Some(blob) = store.get(&digest)? else {
            continue;
        };
        match blob.check() {
            Err(defect) => report.findings.push(Finding {
                digest,
                reason: defect.to_string(),
            }),
            Ok(()) if blob.part(Tag::ARTIFACT).is_none() || blob.part(Tag::SIDECAR).is_none() => {
                report.partial.push(digest)
            }
            Ok(()) => {}
        }
    }
    Ok(report)
}

/// Runs the `kiln verify` command.
///
/// Exits with 1 if malformed records remain in the store.
pub fn run(args: &VerifyArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let store = store::open(global)?;
    let report = scan(&store)?;

    for digest in &report.partial {
        info!("{digest}: incomplete record, will be rebuilt on lookup");
    }
    for finding in &report.findings {
        warn!("{}: {}", finding.digest, finding.reason);
        if args.remove {
            store.remove(&finding.digest)?;
        }
    }

    if !global.quiet {
        let action = if args.remove { "removed" } else { "found" };
        eprintln!(
            "  Verified {} records, {action} {} malformed, {} incomplete",
            report.total,
            report.findings.len(),
            report.partial.len()
        );
    }

    Ok(if report.findings.is_empty() || args.remove { 0 } else { 1 })
}
