//! Dynamic Ingestor: folds observed runtime function calls into the
//! static graph as call-count attributes and `calls` edges.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::error::EngineResult;
use crate::graph::GraphStore;
use crate::model::{function_id, Edge, EdgeType, Node, NodeKind};

/// One observed invocation, as produced by the (out-of-scope) instrumentation
/// layer. `function_name` uses dot separators; a nested function or method
/// call is `parent.child`.
#[derive(Debug, Clone)]
pub struct FunctionCallEvent {
    pub function_name: String,
    pub module_name: String,
    pub source_file: String,
    pub timestamp: chrono::DateTime<Utc>,
}

/// What a registered listener is told about after each event is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerEventKind {
    CallCountIncremented,
    EdgeCreated,
    EdgeUpdated,
}

pub type Listener = Arc<dyn Fn(ListenerEventKind, &str, Option<&str>) + Send + Sync>;

/// Consumes [`FunctionCallEvent`]s from a channel and applies them to a
/// [`GraphStore`] on a fixed polling interval. Shutdown is cooperative: the
/// loop checks `shutdown` once per poll boundary.
pub struct DynamicIngestor {
    store: Arc<GraphStore>,
    receiver: Receiver<FunctionCallEvent>,
    poll_interval: Duration,
    shutdown: Arc<AtomicBool>,
    listeners: Vec<Listener>,
}

impl DynamicIngestor {
    pub fn new(store: Arc<GraphStore>, poll_interval: Duration) -> (Self, Sender<FunctionCallEvent>) {
        let (sender, receiver) = std::sync::mpsc::channel();
        (
            DynamicIngestor {
                store,
                receiver,
                poll_interval,
                shutdown: Arc::new(AtomicBool::new(false)),
                listeners: Vec::new(),
            },
            sender,
        )
    }

    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn add_listener(&mut self, listener: Listener) {
        self.listeners.push(listener);
    }

    /// Run the poll loop until the shutdown flag is set. Intended to be
    /// spawned on a dedicated thread.
    pub fn run(&self) {
        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                return;
            }
            self.drain_once();
            std::thread::sleep(self.poll_interval);
        }
    }

    /// Drain every event currently queued, applying each to the store.
    /// Exposed separately from [`Self::run`] so tests can drive it without
    /// a background thread.
    pub fn drain_once(&self) {
        let mut applied = 0u32;
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if let Err(e) = self.apply(event) {
                        tracing::warn!(error = %e, "failed to apply dynamic call event");
                    } else {
                        applied += 1;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break,
            }
        }
        if applied > 0 {
            tracing::debug!(applied, "dynamic ingestor poll cycle complete");
        }
    }

    fn apply(&self, event: FunctionCallEvent) -> EngineResult<()> {
        tracing::trace!(function = %event.function_name, module = %event.module_name, "dynamic call event received");

        let mut segments = event.function_name.rsplitn(2, '.');
        let leaf_name = segments.next().unwrap_or(&event.function_name);
        let parent_segment = segments.next();

        let module_leaf = event.module_name.rsplit('.').next().unwrap_or(&event.module_name);
        let target_id = function_id(module_leaf, leaf_name);

        let incremented = self.increment_call_count(&target_id, &event.source_file);
        if incremented {
            self.notify(ListenerEventKind::CallCountIncremented, &target_id, None);
        }

        if let Some(parent_name) = parent_segment {
            let parent_id = function_id(module_leaf, parent_name);
            if parent_id != target_id {
                let kind = self.upsert_dynamic_edge(&parent_id, &target_id, &event)?;
                self.notify(kind, &parent_id, Some(&target_id));
            }
        }

        Ok(())
    }

    /// Increment `dynamic_call_count` on the target node, creating a
    /// minimal one if it does not yet exist (spec.md §4.5 step 2).
    fn increment_call_count(&self, target_id: &str, source_file: &str) -> bool {
        match self.store.get_node(target_id) {
            Some(_) => {
                self.store.bump_dynamic_call_count(target_id);
                true
            }
            None => {
                let mut node = Node::new(target_id, NodeKind::Function, leaf_of(target_id), source_file);
                node.dynamic_call_count = Some(1);
                self.store.insert_minimal_node(node);
                true
            }
        }
    }

    fn upsert_dynamic_edge(&self, parent_id: &str, target_id: &str, event: &FunctionCallEvent) -> EngineResult<ListenerEventKind> {
        if self.store.get_node(parent_id).is_none() {
            let node = Node::new(parent_id, NodeKind::Function, leaf_of(parent_id), &event.source_file);
            self.store.insert_minimal_node(node);
        }

        let existed = self.store.get_edge(parent_id, target_id, EdgeType::Calls).is_some();
        self.store.upsert_dynamic_edge(parent_id, target_id, event.timestamp);
        Ok(if existed { ListenerEventKind::EdgeUpdated } else { ListenerEventKind::EdgeCreated })
    }

    fn notify(&self, kind: ListenerEventKind, source_id: &str, target_id: Option<&str>) {
        for listener in &self.listeners {
            listener(kind, source_id, target_id);
        }
    }
}

fn leaf_of(id: &str) -> &str {
    id.rsplit('.').next().unwrap_or(id)
}

/// Edge constructor used by [`GraphStore::upsert_dynamic_edge`] to keep the
/// dynamic-specific fields in one place.
pub(crate) fn new_dynamic_edge(parent_id: &str, target_id: &str, timestamp: chrono::DateTime<Utc>) -> Edge {
    let mut edge = Edge::new(parent_id, target_id, EdgeType::Calls, "<dynamic>");
    edge.dynamic = true;
    edge.dynamic_call_count = Some(1);
    edge.first_call_time = Some(timestamp);
    edge.last_call_time = Some(timestamp);
    edge
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn dynamic_call_increments_preloaded_function_and_creates_edge() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(GraphStore::new(Config::new(dir.path())));
        store.insert_minimal_node(Node::new("function:m.outer", NodeKind::Function, "outer", "m.py"));
        store.insert_minimal_node(Node::new("function:m.inner", NodeKind::Function, "inner", "m.py"));

        let (ingestor, sender) = DynamicIngestor::new(Arc::clone(&store), Duration::from_millis(10));
        for _ in 0..3 {
            sender
                .send(FunctionCallEvent {
                    function_name: "outer.inner".to_string(),
                    module_name: "m".to_string(),
                    source_file: "m.py".to_string(),
                    timestamp: Utc::now(),
                })
                .unwrap();
        }
        ingestor.drain_once();

        let inner = store.get_node("function:m.inner").unwrap();
        assert_eq!(inner.dynamic_call_count, Some(3));

        let edge = store.get_edge("function:m.outer", "function:m.inner", EdgeType::Calls).unwrap();
        assert!(edge.dynamic);
        assert_eq!(edge.dynamic_call_count, Some(3));
    }

    #[test]
    fn dynamic_call_for_unknown_function_creates_minimal_node() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(GraphStore::new(Config::new(dir.path())));
        let (ingestor, sender) = DynamicIngestor::new(Arc::clone(&store), Duration::from_millis(10));
        sender
            .send(FunctionCallEvent {
                function_name: "lonely".to_string(),
                module_name: "m".to_string(),
                source_file: "m.py".to_string(),
                timestamp: Utc::now(),
            })
            .unwrap();
        ingestor.drain_once();

        let node = store.get_node("function:m.lonely").unwrap();
        assert_eq!(node.dynamic_call_count, Some(1));
    }

    #[test]
    fn self_call_does_not_create_an_edge() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(GraphStore::new(Config::new(dir.path())));
        let (ingestor, sender) = DynamicIngestor::new(Arc::clone(&store), Duration::from_millis(10));
        sender
            .send(FunctionCallEvent {
                function_name: "f.f".to_string(),
                module_name: "m".to_string(),
                source_file: "m.py".to_string(),
                timestamp: Utc::now(),
            })
            .unwrap();
        ingestor.drain_once();

        assert!(store.get_all_edges().is_empty());
    }
}
