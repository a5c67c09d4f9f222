use crate::{DocId, DocMeta, IndexError, Posting};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Serialize)]
struct SnapshotRef<'a> {
    version: u32,
    next_doc_id: DocId,
    terms: &'a BTreeMap<String, Vec<Posting>>,
    docs: &'a BTreeMap<DocId, DocMeta>,
}

/// Decoded snapshot contents. BTreeMaps keep the encoding deterministic.
#[derive(Debug, Deserialize)]
pub(crate) struct Snapshot {
    pub version: u32,
    pub next_doc_id: DocId,
    pub terms: BTreeMap<String, Vec<Posting>>,
    pub docs: BTreeMap<DocId, DocMeta>,
}

pub(crate) fn encode_snapshot(
    next_doc_id: DocId,
    terms: &BTreeMap<String, Vec<Posting>>,
    docs: &BTreeMap<DocId, DocMeta>,
) -> Result<Vec<u8>, IndexError> {
    let snap = SnapshotRef { version: SNAPSHOT_VERSION, next_doc_id, terms, docs };
    bincode::serialize(&snap).map_err(|e| IndexError::Encode(e.to_string()))
}

pub(crate) fn decode_snapshot(bytes: &[u8]) -> Result<Snapshot, IndexError> {
    let snap: Snapshot = bincode::deserialize(bytes).map_err(|e| IndexError::Corruption(e.to_string()))?;
    if snap.version != SNAPSHOT_VERSION {
        return Err(IndexError::Corruption(format!(
            "unsupported snapshot version {} (expected {SNAPSHOT_VERSION})",
            snap.version
        )));
    }
    Ok(snap)
}

/// A single snapshot file, rewritten atomically: bytes go to `<file>.tmp`
/// beside the target, are synced, then renamed over it.
pub struct SnapshotStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl SnapshotStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self { path: path.as_ref().to_path_buf(), write_lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path { &self.path }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_else(|| "index.bin".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Encode and write under one writer lock, so a snapshot encoded later
    /// always lands later. Returns the byte count and whatever `encode` tagged along.
    pub(crate) fn write_with<T>(&self, encode: impl FnOnce() -> Result<(Vec<u8>, T), IndexError>) -> Result<(usize, T), IndexError> {
        let _guard = self.write_lock.lock();
        let (bytes, tag) = encode()?;
        self.write_locked(&bytes)?;
        Ok((bytes.len(), tag))
    }

    fn write_locked(&self, bytes: &[u8]) -> Result<(), IndexError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let tmp = self.tmp_path();
        let written = (|| -> std::io::Result<()> {
            let mut f = File::create(&tmp)?;
            f.write_all(bytes)?;
            f.sync_all()?;
            fs::rename(&tmp, &self.path)
        })();
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    /// `Ok(None)` when no snapshot exists yet.
    pub(crate) fn read(&self) -> Result<Option<Snapshot>, IndexError> {
        let bytes = match fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(IndexError::Corruption(format!("{}: {e}", self.path.display()))),
        };
        decode_snapshot(&bytes).map(Some)
    }

    /// Rename an unreadable snapshot to `<file>.corrupt` so the next flush
    /// cannot overwrite it. Returns the new path.
    pub fn quarantine(&self) -> Result<PathBuf, IndexError> {
        let _guard = self.write_lock.lock();
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_else(|| "index.bin".into());
        name.push(".corrupt");
        let aside = self.path.with_file_name(name);
        fs::rename(&self.path, &aside)?;
        Ok(aside)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_snapshot_reads_as_none() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("index.bin"));
        assert!(store.read().unwrap().is_none());
    }

    #[test]
    fn atomic_write_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("nested/index.bin"));
        let bytes = encode_snapshot(0, &BTreeMap::new(), &BTreeMap::new()).unwrap();
        store.write_with(|| Ok((bytes, ()))).unwrap();
        assert!(store.path().exists());
        assert!(!dir.path().join("nested/index.bin.tmp").exists());
        let snap = store.read().unwrap().unwrap();
        assert_eq!(snap.next_doc_id, 0);
        assert!(snap.docs.is_empty());
    }

    #[test]
    fn garbage_is_reported_as_corruption() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index.bin");
        fs::write(&path, b"not a snapshot").unwrap();
        let store = SnapshotStore::new(&path);
        assert!(matches!(store.read(), Err(IndexError::Corruption(_))));
    }

    #[test]
    fn quarantine_moves_the_file_aside() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index.bin");
        fs::write(&path, b"not a snapshot").unwrap();
        let store = SnapshotStore::new(&path);
        let aside = store.quarantine().unwrap();
        assert_eq!(aside, dir.path().join("index.bin.corrupt"));
        assert!(!path.exists());
        assert_eq!(fs::read(aside).unwrap(), b"not a snapshot");
        assert!(store.read().unwrap().is_none());
    }
}
