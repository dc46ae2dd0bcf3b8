//! On-disk snapshot format and the file-level lock that serializes writers.
//!
//! Format is a single JSON document with three sections (`nodes`, `edges`,
//! `file_nodes`) plus whatever unrecognized top-level keys were already
//! there, preserved via `#[serde(flatten)]` so a newer writer's extra fields
//! survive a round trip through an older reader.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::model::{Edge, Node};

const STALE_LOCK_AGE: Duration = Duration::from_secs(60);
const MAX_LOCK_ATTEMPTS: u32 = 10;

#[derive(Debug, Serialize, Deserialize)]
pub struct SnapshotDocument {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub file_nodes: BTreeMap<String, Vec<String>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Write `nodes`/`edges`/`file_nodes` to `path` atomically (temp file then
/// rename), holding the sibling `.lock` file for the duration.
pub fn write_snapshot(
    path: &Path,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    file_nodes: BTreeMap<String, Vec<String>>,
) -> Result<(), EngineError> {
    let lock_path = lock_path_for(path);
    let _guard = acquire_lock(&lock_path)?;

    let doc = SnapshotDocument {
        nodes,
        edges,
        file_nodes,
        extra: serde_json::Map::new(),
    };
    let serialized = serde_json::to_vec_pretty(&doc)
        .map_err(|e| EngineError::TransientIo(std::io::Error::new(std::io::ErrorKind::Other, e)))?;

    let tmp_path = temp_path_for(path);
    {
        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(&serialized)?;
        tmp.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Read and parse the snapshot at `path`. Returns `Ok(None)` if the file
/// does not exist (an empty store is the correct response, not an error).
pub fn read_snapshot(path: &Path) -> Result<Option<SnapshotDocument>, EngineError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(EngineError::TransientIo(e)),
    };
    let doc: SnapshotDocument = serde_json::from_slice(&bytes)
        .map_err(|e| EngineError::TransientIo(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
    Ok(Some(doc))
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_owned()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn lock_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_owned()).unwrap_or_default();
    name.push(".lock");
    path.with_file_name(name)
}

/// Held while a writer owns the snapshot file; removes the lock file on
/// drop.
struct LockGuard {
    lock_path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.lock_path);
    }
}

/// Acquire the sibling lock file, retrying with exponential backoff and
/// jitter up to `MAX_LOCK_ATTEMPTS` times. A lock file older than
/// `STALE_LOCK_AGE` is treated as abandoned and broken.
fn acquire_lock(lock_path: &Path) -> Result<LockGuard, EngineError> {
    for attempt in 0..MAX_LOCK_ATTEMPTS {
        match File::options().write(true).create_new(true).open(lock_path) {
            Ok(mut file) => {
                let _ = write!(file, "{}", std::process::id());
                return Ok(LockGuard { lock_path: lock_path.to_path_buf() });
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                if lock_is_stale(lock_path) {
                    let _ = fs::remove_file(lock_path);
                    continue;
                }
                std::thread::sleep(backoff_with_jitter(attempt));
            }
            Err(e) => return Err(EngineError::TransientIo(e)),
        }
    }
    Err(EngineError::TransientIo(std::io::Error::new(
        std::io::ErrorKind::WouldBlock,
        format!("timed out acquiring snapshot lock at {}", lock_path.display()),
    )))
}

fn lock_is_stale(lock_path: &Path) -> bool {
    let Ok(metadata) = fs::metadata(lock_path) else {
        return true;
    };
    let Ok(modified) = metadata.modified() else {
        return false;
    };
    SystemTime::now()
        .duration_since(modified)
        .map(|age| age >= STALE_LOCK_AGE)
        .unwrap_or(false)
}

fn backoff_with_jitter(attempt: u32) -> Duration {
    let base_ms = 10u64.saturating_mul(1u64 << attempt.min(6));
    let jitter_ms = jitter_source() % 10;
    Duration::from_millis(base_ms + jitter_ms)
}

/// A deterministic-enough jitter source without pulling in a dependency
/// solely for a few milliseconds of spread.
fn jitter_source() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");

        let node = Node::new("module:a.py", crate::model::NodeKind::Module, "a.py", "a.py");
        let mut file_nodes = BTreeMap::new();
        file_nodes.insert("a.py".to_string(), vec!["module:a.py".to_string()]);

        write_snapshot(&path, vec![node], vec![], file_nodes.clone()).unwrap();
        let doc = read_snapshot(&path).unwrap().unwrap();
        assert_eq!(doc.nodes.len(), 1);
        assert_eq!(doc.file_nodes, file_nodes);
    }

    #[test]
    fn read_missing_file_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist.json");
        assert!(read_snapshot(&path).unwrap().is_none());
    }

    #[test]
    fn read_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        fs::write(&path, b"not json").unwrap();
        assert!(read_snapshot(&path).is_err());
    }

    #[test]
    fn lock_file_is_removed_after_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        write_snapshot(&path, vec![], vec![], BTreeMap::new()).unwrap();
        assert!(!lock_path_for(&path).exists());
    }

    #[test]
    fn stale_lock_is_broken() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        let lock_path = lock_path_for(&path);
        fs::write(&lock_path, b"99999999").unwrap();

        let old_time = SystemTime::now() - Duration::from_secs(120);
        let file = File::open(&lock_path).unwrap();
        file.set_modified(old_time).unwrap();

        write_snapshot(&path, vec![], vec![], BTreeMap::new()).unwrap();
        assert!(path.exists());
    }
}
