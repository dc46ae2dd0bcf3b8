//! Sync Coordinator: receives file events, infers renames, and drives
//! parse + diff + store update.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sha2::{Digest, Sha256};

use crate::config::Config;
use crate::error::EngineResult;
use crate::graph::GraphStore;
use crate::model::ParseResult;
use crate::parser::parser_for;
use crate::rename::{CreatedFile, DeletedFile, FileRenameDetector, FunctionRenameDetector, RenameBuffers};

/// The kind of a file-system event the watcher observed.
#[derive(Debug, Clone)]
pub enum EventKind {
    Created,
    Modified,
    Deleted,
    /// Watcher-synthesized rename, when the OS reports one atomically.
    Renamed { old: String },
}

/// Coordinates file events into Graph Store mutations (spec.md §4.4).
/// Per-path event serialization is provided by a per-path mutex so two
/// events for the same file never interleave, while distinct paths
/// proceed concurrently.
pub struct SyncCoordinator {
    store: Arc<GraphStore>,
    config: Config,
    buffers: Mutex<RenameBuffers>,
    file_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    file_detector: FileRenameDetector,
    function_detector: FunctionRenameDetector,
}

impl SyncCoordinator {
    pub fn new(store: Arc<GraphStore>, config: Config) -> Self {
        let file_detector = FileRenameDetector::new(
            config.file_similarity_threshold,
            Duration::from_secs_f64(config.rename_window_seconds),
        );
        let function_detector = FunctionRenameDetector::new(config.function_similarity_threshold);
        SyncCoordinator {
            store,
            config,
            buffers: Mutex::new(RenameBuffers::new()),
            file_locks: Mutex::new(HashMap::new()),
            file_detector,
            function_detector,
        }
    }

    fn lock_for(&self, path: &str) -> Arc<Mutex<()>> {
        let mut locks = self.file_locks.lock().unwrap();
        Arc::clone(locks.entry(path.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))))
    }

    /// Single entry point consumed by the watcher (spec.md §4.4).
    pub fn on_event(&self, kind: EventKind, path: &str) -> EngineResult<()> {
        let lock = self.lock_for(path);
        let _guard = lock.lock().unwrap();

        match kind {
            EventKind::Created => self.handle_created(path),
            EventKind::Modified => self.handle_modified(path),
            EventKind::Deleted => self.handle_deleted(path),
            EventKind::Renamed { old } => self.store.rename_file(&old, path),
        }
    }

    fn handle_created(&self, path: &str) -> EngineResult<()> {
        if !self.config.is_ingestible(Path::new(path)) {
            return Ok(());
        }

        {
            let mut buffers = self.buffers.lock().unwrap();
            buffers.push_created(CreatedFile::new(path));
        }

        let rename = {
            let buffers = self.buffers.lock().unwrap();
            self.file_detector
                .detect(&buffers)
                .into_iter()
                .find(|(_, new_path)| new_path == path)
        };

        if let Some((old_path, new_path)) = rename {
            tracing::debug!(old = %old_path, new = %new_path, "detected file rename");
            let deleted = {
                let mut buffers = self.buffers.lock().unwrap();
                let deleted = buffers.take_deleted(&old_path);
                buffers.remove_created(&new_path);
                deleted
            };
            match deleted {
                // Normal path: the delete event that preceded this create
                // already captured a node snapshot, since `remove_file` had
                // already cleared it from the Graph Store by the time the
                // rename pair could be recognized.
                Some(deleted) => self.store.restore_renamed_nodes(&old_path, &new_path, deleted.nodes)?,
                None => self.store.rename_file(&old_path, &new_path)?,
            }
            return Ok(());
        }

        let parse_result = self.parse_file(path);
        self.store.upsert_file(path, parse_result, content_hash_of(path))
    }

    fn handle_modified(&self, path: &str) -> EngineResult<()> {
        if !self.config.is_ingestible(Path::new(path)) {
            return Ok(());
        }

        let old_nodes = self.store.get_nodes_for_file(path);
        let mut new_result = self.parse_file(path);

        let renames = self.function_detector.match_functions(&old_nodes, &new_result.nodes);
        for (old_id, new_id) in &renames {
            let matched_new = new_result.nodes.iter().position(|n| &n.id == new_id).map(|i| new_result.nodes.remove(i));
            let (Some(matched_new), Some(mut renamed)) = (matched_new, self.store.get_node(old_id)) else {
                continue;
            };
            renamed.apply_rename(matched_new.name);
            renamed.span = matched_new.span;
            renamed.param_count = matched_new.param_count;
            renamed.body = matched_new.body;
            tracing::debug!(old = %old_id, new = %new_id, "matched in-place function rename");
            new_result.nodes.push(renamed);
        }

        self.store.upsert_file(path, new_result, content_hash_of(path))
    }

    fn handle_deleted(&self, path: &str) -> EngineResult<()> {
        if !self.config.is_ingestible(Path::new(path)) {
            return Ok(());
        }

        // The matching create event for a rename, if any, has not arrived
        // yet (delete always fires first), so the node snapshot must be
        // captured now, before `remove_file` drops it from the Graph Store.
        let nodes = self.store.get_nodes_for_file(path);
        let captured = fs::read(path).ok();
        {
            let mut buffers = self.buffers.lock().unwrap();
            let entry = match captured {
                Some(bytes) => DeletedFile::capture(path, &bytes, nodes),
                None => DeletedFile {
                    path: path.to_string(),
                    timestamp: std::time::Instant::now(),
                    lines: None,
                    content_hash: None,
                    nodes,
                },
            };
            buffers.push_deleted(entry);
        }

        self.store.remove_file(path)
    }

    fn parse_file(&self, path: &str) -> ParseResult {
        let Some(parser) = parser_for(Path::new(path)) else {
            return ParseResult::empty();
        };
        match fs::read(path) {
            Ok(bytes) => parser.parse(path, &bytes),
            Err(e) => {
                tracing::warn!(path, error = %e, "failed to read file for parsing");
                crate::parser::fallback_result(path)
            }
        }
    }
}

fn content_hash_of(path: &str) -> Option<String> {
    let bytes = fs::read(path).ok()?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Some(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn write(dir: &std::path::Path, name: &str, contents: &str) -> String {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path.to_str().unwrap().to_string()
    }

    #[test]
    fn created_event_parses_and_upserts() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(GraphStore::new(Config::new(dir.path())));
        let coordinator = SyncCoordinator::new(Arc::clone(&store), Config::new(dir.path()));

        let path = write(dir.path(), "a.py", "def f(): pass\n");
        coordinator.on_event(EventKind::Created, &path).unwrap();

        assert!(!store.get_nodes_for_file(&path).is_empty());
    }

    #[test]
    fn deleted_event_removes_file_when_no_rename_pairs() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(GraphStore::new(Config::new(dir.path())));
        let coordinator = SyncCoordinator::new(Arc::clone(&store), Config::new(dir.path()));

        let path = write(dir.path(), "a.py", "def f(): pass\n");
        coordinator.on_event(EventKind::Created, &path).unwrap();
        fs::remove_file(&path).unwrap();
        coordinator.on_event(EventKind::Deleted, &path).unwrap();

        assert!(store.get_nodes_for_file(&path).is_empty());
    }

    #[test]
    fn rename_file_unchanged_content_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(GraphStore::new(Config::new(dir.path())));
        let coordinator = SyncCoordinator::new(Arc::clone(&store), Config::new(dir.path()));

        let old_path = write(dir.path(), "a.py", "def f(): pass\n");
        coordinator.on_event(EventKind::Created, &old_path).unwrap();

        fs::remove_file(&old_path).unwrap();
        coordinator.on_event(EventKind::Deleted, &old_path).unwrap();

        let new_path = write(dir.path(), "b.py", "def f(): pass\n");
        coordinator.on_event(EventKind::Created, &new_path).unwrap();

        assert!(store.get_nodes_for_file(&old_path).is_empty());
        assert!(!store.get_nodes_for_file(&new_path).is_empty());
    }
}
