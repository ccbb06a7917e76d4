//! Content-addressed persistent store of multi-part blobs.
//!
//! Each record lives at `<root>/<first two hex digits>/<remaining 38 hex
//! digits>` of its digest. Records are written to a temporary file in the
//! same directory and renamed into place, so a concurrent reader sees either
//! the old record, the new one, or nothing, never a torn write.

use std::io::Write;
use std::path::{Path, PathBuf};

use kiln_common::Digest;
use tracing::debug;

use crate::blob::{Blob, Part, Tag};
use crate::error::CacheError;

/// Number of hex digits used for the shard directory name.
const SHARD_DIGITS: usize = 2;

/// Record count and total bytes of a store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreUsage {
    /// Number of records.
    pub records: usize,
    /// Sum of record sizes in bytes.
    pub bytes: u64,
}

/// Persistent blob store keyed by [`Digest`].
#[derive(Debug, Clone)]
pub struct DiskStore {
    root: PathBuf,
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> CacheError + '_ {
    move |source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl DiskStore {
    /// Opens a store rooted at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(io_err(&root))?;
        Ok(Self { root })
    }

    /// The store's root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the file path of the record for `digest`.
    pub fn record_path(&self, digest: &Digest) -> PathBuf {
        let hex = digest.to_hex();
        let (shard, rest) = hex.split_at(SHARD_DIGITS);
        self.root.join(shard).join(rest)
    }

    /// Returns `true` if a record exists for `digest`.
    pub fn contains(&self, digest: &Digest) -> bool {
        self.record_path(digest).is_file()
    }

    /// Reads the raw record for `digest`.
    ///
    /// Returns `Ok(None)` if there is no record. The blob is not validated;
    /// call [`Blob::check`] before trusting any part.
    pub fn get(&self, digest: &Digest) -> Result<Option<Blob>, CacheError> {
        let path = self.record_path(digest);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(Blob::from_bytes(bytes))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err(&path)(e)),
        }
    }

    /// Reads one part of the record for `digest`.
    ///
    /// The whole record is validated first; a malformed record yields
    /// [`CacheError::CorruptBlob`]. A well-formed record without the wanted
    /// part yields `Ok(None)`.
    pub fn get_part(&self, digest: &Digest, tag: Tag) -> Result<Option<Vec<u8>>, CacheError> {
        let Some(blob) = self.get(digest)? else {
            return Ok(None);
        };
        blob.check().map_err(|defect| CacheError::CorruptBlob {
            digest: *digest,
            reason: defect.to_string(),
        })?;
        Ok(blob.part(tag).map(<[u8]>::to_vec))
    }

    /// Writes a record atomically, replacing any existing one.
    pub fn put(&self, digest: &Digest, parts: &[Part<'_>]) -> Result<(), CacheError> {
        let blob = Blob::encode(parts).map_err(|defect| CacheError::CorruptBlob {
            digest: *digest,
            reason: defect.to_string(),
        })?;
        let path = self.record_path(digest);
        let dir = path.parent().unwrap_or(&self.root);
        std::fs::create_dir_all(dir).map_err(io_err(dir))?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err(dir))?;
        tmp.write_all(blob.as_bytes()).map_err(io_err(tmp.path()))?;
        tmp.as_file().sync_all().map_err(io_err(&path))?;
        tmp.persist(&path).map_err(|e| CacheError::Io {
            path: path.clone(),
            source: e.error,
        })?;

        debug!("stored record {} ({} bytes)", digest, blob.len());
        Ok(())
    }

    /// Deletes the record for `digest`. Returns `false` if it did not exist.
    pub fn remove(&self, digest: &Digest) -> Result<bool, CacheError> {
        let path = self.record_path(digest);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_err(&path)(e)),
        }
    }

    /// Lists the digests of all records, sorted.
    ///
    /// Files that are not named like records (for example in-flight
    /// temporary files) are ignored.
    pub fn digests(&self) -> Result<Vec<Digest>, CacheError> {
        let mut digests = Vec::new();
        for shard in std::fs::read_dir(&self.root).map_err(io_err(&self.root))? {
            let shard = shard.map_err(io_err(&self.root))?;
            let shard_path = shard.path();
            let Some(prefix) = shard_name(&shard_path) else {
                continue;
            };
            for record in std::fs::read_dir(&shard_path).map_err(io_err(&shard_path))? {
                let record = record.map_err(io_err(&shard_path))?;
                let name = record.file_name();
                let Some(rest) = name.to_str() else {
                    continue;
                };
                if let Ok(digest) = format!("{prefix}{rest}").parse::<Digest>() {
                    digests.push(digest);
                }
            }
        }
        digests.sort();
        Ok(digests)
    }

    /// Counts records and their total size.
    pub fn usage(&self) -> Result<StoreUsage, CacheError> {
        let mut usage = StoreUsage::default();
        for digest in self.digests()? {
            let path = self.record_path(&digest);
            let meta = std::fs::metadata(&path).map_err(io_err(&path))?;
            usage.records += 1;
            usage.bytes += meta.len();
        }
        Ok(usage)
    }

    /// Deletes every record. Returns the number removed.
    pub fn clear(&self) -> Result<usize, CacheError> {
        let mut removed = 0;
        for digest in self.digests()? {
            if self.remove(&digest)? {
                removed += 1;
            }
        }
        for shard in std::fs::read_dir(&self.root).map_err(io_err(&self.root))? {
            let shard_path = shard.map_err(io_err(&self.root))?.path();
            if shard_name(&shard_path).is_some() {
                // Fails harmlessly if something else still lives there.
                let _ = std::fs::remove_dir(&shard_path);
            }
        }
        Ok(removed)
    }
}

/// Returns the directory name if `path` looks like a shard directory.
fn shard_name(path: &Path) -> Option<String> {
    if !path.is_dir() {
        return None;
    }
    let name = path.file_name()?.to_str()?;
    (name.len() == SHARD_DIGITS && name.bytes().all(|b| b.is_ascii_hexdigit()))
        .then(|| name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_store() -> (tempfile::TempDir, DiskStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::open(dir.path().join("store")).unwrap();
        (dir, store)
    }

    fn parts() -> Vec<Part<'static>> {
        vec![
            Part::new(Tag::KEY, b"normalized key"),
            Part::new(Tag::ARTIFACT, b"\x48\x31\xc0\xc3"),
            Part::new(Tag::SIDECAR, b"{\"regs\":4}"),
        ]
    }

    #[test]
    fn put_and_get_roundtrip() {
        let (_dir, store) = make_store();
        let digest = Digest::of(b"record");
        store.put(&digest, &parts()).unwrap();

        let blob = store.get(&digest).unwrap().unwrap();
        assert!(blob.is_well_formed());
        for part in parts() {
            assert_eq!(blob.part(part.tag), Some(part.bytes));
        }
    }

    #[test]
    fn get_missing_returns_none() {
        let (_dir, store) = make_store();
        assert!(store.get(&Digest::of(b"absent")).unwrap().is_none());
        assert!(!store.contains(&Digest::of(b"absent")));
    }

    #[test]
    fn record_path_layout() {
        let (_dir, store) = make_store();
        let digest = Digest::of(b"abc");
        let path = store.record_path(&digest);
        assert!(path.ends_with("a9/993e364706816aba3e25717850c26c9cd0d89d"));
    }

    #[test]
    fn get_part_reads_single_tag() {
        let (_dir, store) = make_store();
        let digest = Digest::of(b"parts");
        store
            .put(&digest, &[Part::new(Tag::SIDECAR, b"metadata only")])
            .unwrap();
        assert_eq!(
            store.get_part(&digest, Tag::SIDECAR).unwrap(),
            Some(b"metadata only".to_vec())
        );
        assert_eq!(store.get_part(&digest, Tag::ARTIFACT).unwrap(), None);
    }

    #[test]
    fn get_part_rejects_corrupt_record() {
        let (_dir, store) = make_store();
        let digest = Digest::of(b"corrupt");
        let path = store.record_path(&digest);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, [1, 0, 0, 0, 200, 0, 0, 0, 1, 2]).unwrap();
        assert!(matches!(
            store.get_part(&digest, Tag::ARTIFACT),
            Err(CacheError::CorruptBlob { .. })
        ));
    }

    #[test]
    fn put_replaces_existing_record() {
        let (_dir, store) = make_store();
        let digest = Digest::of(b"replace");
        store.put(&digest, &[Part::new(Tag::ARTIFACT, b"old")]).unwrap();
        store.put(&digest, &[Part::new(Tag::ARTIFACT, b"new")]).unwrap();
        assert_eq!(
            store.get_part(&digest, Tag::ARTIFACT).unwrap(),
            Some(b"new".to_vec())
        );
        assert_eq!(store.digests().unwrap(), vec![digest]);
    }

    #[test]
    fn put_rejects_invalid_parts() {
        let (_dir, store) = make_store();
        let digest = Digest::of(b"dup");
        let err = store
            .put(
                &digest,
                &[Part::new(Tag::KEY, b"a"), Part::new(Tag::KEY, b"b")],
            )
            .unwrap_err();
        assert!(matches!(err, CacheError::CorruptBlob { .. }));
        assert!(!store.contains(&digest));
    }

    #[test]
    fn remove_reports_presence() {
        let (_dir, store) = make_store();
        let digest = Digest::of(b"remove");
        store.put(&digest, &parts()).unwrap();
        assert!(store.remove(&digest).unwrap());
        assert!(!store.remove(&digest).unwrap());
        assert!(store.get(&digest).unwrap().is_none());
    }

    #[test]
    fn digests_ignore_foreign_files() {
        let (_dir, store) = make_store();
        let a = Digest::of(b"a");
        let b = Digest::of(b"b");
        store.put(&a, &parts()).unwrap();
        store.put(&b, &parts()).unwrap();
        std::fs::write(store.root().join("README"), "not a record").unwrap();
        std::fs::write(store.record_path(&a).with_file_name(".tmpXYZ"), "partial").unwrap();

        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(store.digests().unwrap(), expected);
    }

    #[test]
    fn usage_counts_records_and_bytes() {
        let (_dir, store) = make_store();
        store.put(&Digest::of(b"u1"), &parts()).unwrap();
        store.put(&Digest::of(b"u2"), &[Part::new(Tag::ARTIFACT, b"x")]).unwrap();
        let usage = store.usage().unwrap();
        assert_eq!(usage.records, 2);
        let first = Blob::encode(&parts()).unwrap().len() as u64;
        assert_eq!(usage.bytes, first + 13);
    }

    #[test]
    fn clear_removes_everything() {
        let (_dir, store) = make_store();
        for i in 0u8..5 {
            store.put(&Digest::of(&[i]), &parts()).unwrap();
        }
        assert_eq!(store.clear().unwrap(), 5);
        assert!(store.digests().unwrap().is_empty());
        assert_eq!(store.usage().unwrap(), StoreUsage::default());
    }
}
