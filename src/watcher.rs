//! Watcher adapter: a thin `notify`-backed implementation of the consumed
//! file-watcher interface (spec.md §6), translating raw OS events into
//! `(kind, path)` calls on the [`SyncCoordinator`].
//!
//! This module performs no synchronization logic of its own — only path
//! validation and event forwarding. The engine does not assume atomic
//! rename events from the watcher; `notify`'s raw event stream reports
//! renames as a remove followed by a create, and the Sync Coordinator
//! infers the rename itself via the Rename Detector.

use std::path::Path;
use std::sync::mpsc::channel;
use std::sync::Arc;

use notify::{Event, EventKind as NotifyEventKind, RecursiveMode, Watcher as NotifyWatcherTrait};

use crate::error::{EngineError, EngineResult};
use crate::sync::{EventKind, SyncCoordinator};
use crate::validation::validate_path_within_root;

/// Watches `root` for filesystem changes and forwards ingestible ones to
/// `coordinator`. Blocks the calling thread; intended to be run on a
/// dedicated watcher thread.
pub fn watch(root: &Path, coordinator: Arc<SyncCoordinator>, shutdown: Arc<std::sync::atomic::AtomicBool>) -> EngineResult<()> {
    let (tx, rx) = channel::<notify::Result<Event>>();

    let mut watcher = notify::recommended_watcher(tx)
        .map_err(|e| EngineError::Configuration(format!("failed to start watcher: {e}")))?;
    watcher
        .watch(root, RecursiveMode::Recursive)
        .map_err(|e| EngineError::Configuration(format!("failed to watch {}: {e}", root.display())))?;

    loop {
        if shutdown.load(std::sync::atomic::Ordering::SeqCst) {
            return Ok(());
        }

        match rx.recv_timeout(std::time::Duration::from_millis(250)) {
            Ok(Ok(event)) => handle_event(root, &coordinator, event),
            Ok(Err(e)) => tracing::warn!(error = %e, "watcher reported an error"),
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => continue,
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => return Ok(()),
        }
    }
}

fn handle_event(root: &Path, coordinator: &SyncCoordinator, event: Event) {
    let kind = match event.kind {
        NotifyEventKind::Create(_) => EventKind::Created,
        NotifyEventKind::Modify(_) => EventKind::Modified,
        NotifyEventKind::Remove(_) => EventKind::Deleted,
        _ => return,
    };

    for path in event.paths {
        if !path.is_file() && !matches!(kind, EventKind::Deleted) {
            continue;
        }
        let validated = match validated_path(&path, root, matches!(kind, EventKind::Deleted)) {
            Some(p) => p,
            None => {
                tracing::debug!(path = %path.display(), "ignoring path outside watch root");
                continue;
            }
        };
        let Some(path_str) = validated.to_str() else {
            continue;
        };
        if let Err(e) = coordinator.on_event(kind.clone(), path_str) {
            tracing::warn!(path = path_str, error = %e, "sync coordinator rejected event");
        }
    }
}

/// Validate `path` lies within `root`. A deleted path no longer exists by
/// the time this runs, so `canonicalize_path` (which requires existence)
/// is applied to its parent directory instead.
fn validated_path(path: &Path, root: &Path, is_delete: bool) -> Option<std::path::PathBuf> {
    if is_delete {
        let parent = path.parent()?;
        let file_name = path.file_name()?;
        let canonical_parent = validate_path_within_root(parent, root).ok()?;
        Some(canonical_parent.join(file_name))
    } else {
        validate_path_within_root(path, root).ok()
    }
}
