//! The Graph Store: the single source of truth for nodes, edges, and
//! per-file node membership.
//!
//! All public mutations go through [`GraphStore::upsert_file`] or
//! [`GraphStore::remove_file`] and commit atomically under one
//! `std::sync::RwLock`. No method in this module acquires the lock more
//! than once per call, so the lock never needs to be reentrant in practice.

mod snapshot;

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::RwLock;

use crate::config::{Config, StorageMode};
use crate::error::EngineResult;
use crate::model::{module_id, Edge, EdgeKey, Node, ParseResult};

#[derive(Debug, Default)]
struct GraphInner {
    nodes: BTreeMap<String, Node>,
    edges: BTreeMap<EdgeKey, Edge>,
    /// filepath -> node ids produced by that file's last parse.
    file_index: BTreeMap<String, BTreeSet<String>>,
}

/// Holds the live graph and enforces the invariants described in spec.md
/// (I1-I5). Cheap to clone a handle to — wrap in an `Arc` at the call site.
pub struct GraphStore {
    inner: RwLock<GraphInner>,
    config: Config,
}

impl GraphStore {
    pub fn new(config: Config) -> Self {
        GraphStore {
            inner: RwLock::new(GraphInner::default()),
            config,
        }
    }

    /// Apply a fresh parse of `path` to the store (spec.md §4.1). `content_hash`,
    /// when given, is stored on the file's module node, overriding whatever
    /// the parse itself carried.
    pub fn upsert_file(
        &self,
        path: &str,
        parse_result: ParseResult,
        content_hash: Option<String>,
    ) -> EngineResult<()> {
        {
            let mut inner = self.inner.write().unwrap();
            let previous_ids = inner.file_index.get(path).cloned().unwrap_or_default();
            let new_ids: BTreeSet<String> = parse_result.nodes.iter().map(|n| n.id.clone()).collect();

            // Step 2: merge declared nodes.
            for new_node in &parse_result.nodes {
                match inner.nodes.get_mut(&new_node.id) {
                    Some(existing) => {
                        existing.files.insert(path.to_string());
                        existing.filepath = path.to_string();
                        existing.kind = new_node.kind;
                        existing.name = new_node.name.clone();
                        if new_node.span.is_some() {
                            existing.span = new_node.span;
                        }
                        if new_node.content_hash.is_some() {
                            existing.content_hash = new_node.content_hash.clone();
                        }
                        if !new_node.rename_history.is_empty() {
                            existing.rename_history = new_node.rename_history.clone();
                        }
                        if !new_node.secret_warnings.is_empty() {
                            existing.secret_warnings = new_node.secret_warnings.clone();
                        }
                    }
                    None => {
                        let mut node = new_node.clone();
                        node.files = BTreeSet::new();
                        node.files.insert(path.to_string());
                        inner.nodes.insert(node.id.clone(), node);
                    }
                }
            }

            if let Some(hash) = &content_hash {
                if let Some(node) = inner.nodes.get_mut(&module_id(path)) {
                    node.content_hash = Some(hash.clone());
                }
            }

            // Step 3: merge edges, materializing placeholder endpoints (I2).
            for new_edge in &parse_result.edges {
                for endpoint in [&new_edge.source, &new_edge.target] {
                    inner
                        .nodes
                        .entry(endpoint.clone())
                        .or_insert_with(|| Node::placeholder(endpoint, path));
                }
                let mut edge = new_edge.clone();
                edge.file = path.to_string();
                inner.edges.insert(edge.key(), edge);
            }

            // Steps 4-5: drop file membership for ids this parse no longer
            // produces; delete nodes whose membership became empty, along
            // with every edge incident to them.
            let mut removed_node_ids: Vec<String> = Vec::new();
            for old_id in previous_ids.difference(&new_ids) {
                if let Some(node) = inner.nodes.get_mut(old_id) {
                    node.files.remove(path);
                    if node.files.is_empty() {
                        removed_node_ids.push(old_id.clone());
                    }
                }
            }
            for id in &removed_node_ids {
                inner.nodes.remove(id);
            }
            if !removed_node_ids.is_empty() {
                let removed: HashSet<&String> = removed_node_ids.iter().collect();
                inner
                    .edges
                    .retain(|(source, target, _), _| !removed.contains(source) && !removed.contains(target));
            }

            // Step 6: drop edges this file produced previously but the new
            // parse did not re-emit.
            let new_edge_keys: HashSet<EdgeKey> = parse_result.edges.iter().map(|e| e.key()).collect();
            inner
                .edges
                .retain(|key, edge| !(edge.file == path && !new_edge_keys.contains(key)));

            // Step 7.
            inner.file_index.insert(path.to_string(), new_ids);
        }

        // Step 8, outside the writer lock.
        if self.config.storage_mode == StorageMode::Snapshot {
            if let Err(e) = self.save_snapshot() {
                tracing::warn!(error = %e, path, "snapshot save failed after upsert_file, will retry on next mutation");
            }
        }
        Ok(())
    }

    /// Drop `path` from the store entirely (spec.md §4.1 steps 4-7 with an
    /// empty new id set).
    pub fn remove_file(&self, path: &str) -> EngineResult<()> {
        self.upsert_file(path, ParseResult::empty(), None)
    }

    /// Update `name`/`rename_history`/`filepath`/membership for every node
    /// `old_path` claimed, without reparsing (spec.md §4.4 `rename_file`).
    pub fn rename_file(&self, old_path: &str, new_path: &str) -> EngineResult<()> {
        {
            let mut inner = self.inner.write().unwrap();
            let ids = inner.file_index.remove(old_path).unwrap_or_default();
            for id in &ids {
                if let Some(node) = inner.nodes.get_mut(id) {
                    node.files.remove(old_path);
                    node.files.insert(new_path.to_string());
                    node.filepath = new_path.to_string();
                    if !node.rename_history.contains(&old_path.to_string()) {
                        node.rename_history.push(old_path.to_string());
                    }
                }
            }
            for edge in inner.edges.values_mut() {
                if edge.file == old_path {
                    edge.file = new_path.to_string();
                }
            }
            inner.file_index.insert(new_path.to_string(), ids);
        }
        if self.config.storage_mode == StorageMode::Snapshot {
            if let Err(e) = self.save_snapshot() {
                tracing::warn!(error = %e, old_path, new_path, "snapshot save failed after rename_file");
            }
        }
        Ok(())
    }

    /// Restore a node snapshot captured at deletion time under `new_path`,
    /// once a rename has been confirmed (spec.md §4.4). Unlike
    /// [`GraphStore::rename_file`], this does not read `old_path`'s current
    /// `file_index` entry — the delete event that preceded the matching
    /// create has already cleared it via [`GraphStore::remove_file`], so the
    /// caller must have captured `nodes` before that removal happened.
    pub fn restore_renamed_nodes(&self, old_path: &str, new_path: &str, nodes: Vec<Node>) -> EngineResult<()> {
        {
            let mut inner = self.inner.write().unwrap();
            let mut ids = BTreeSet::new();
            for mut node in nodes {
                node.files.remove(old_path);
                node.files.insert(new_path.to_string());
                node.filepath = new_path.to_string();
                if !node.rename_history.contains(&old_path.to_string()) {
                    node.rename_history.push(old_path.to_string());
                }
                ids.insert(node.id.clone());
                inner.nodes.insert(node.id.clone(), node);
            }
            inner.file_index.insert(new_path.to_string(), ids);
        }
        if self.config.storage_mode == StorageMode::Snapshot {
            if let Err(e) = self.save_snapshot() {
                tracing::warn!(error = %e, old_path, new_path, "snapshot save failed after restore_renamed_nodes");
            }
        }
        Ok(())
    }

    pub fn get_node(&self, id: &str) -> Option<Node> {
        self.inner.read().unwrap().nodes.get(id).cloned()
    }

    /// Insert a node outright if absent, without going through
    /// `upsert_file`'s per-file membership bookkeeping. Used by the
    /// Dynamic Ingestor to materialize a minimal function node for a call
    /// event whose target no parse has declared yet (spec.md §4.5 step 2).
    pub fn insert_minimal_node(&self, node: Node) {
        let mut inner = self.inner.write().unwrap();
        inner.nodes.entry(node.id.clone()).or_insert(node);
    }

    /// Increment a node's `dynamic_call_count` (I4: monotonic non-decreasing).
    /// No-op if the node does not exist.
    pub fn bump_dynamic_call_count(&self, id: &str) {
        let mut inner = self.inner.write().unwrap();
        if let Some(node) = inner.nodes.get_mut(id) {
            node.dynamic_call_count = Some(node.dynamic_call_count.unwrap_or(0) + 1);
        }
    }

    pub fn get_edge(&self, source: &str, target: &str, edge_type: crate::model::EdgeType) -> Option<Edge> {
        self.inner
            .read()
            .unwrap()
            .edges
            .get(&(source.to_string(), target.to_string(), edge_type))
            .cloned()
    }

    /// Create or update a dynamic `calls` edge between `parent_id` and
    /// `target_id`: increments its count and bumps `last_call_time`, or
    /// creates it with `first_call_time` set (spec.md §4.5 step 3).
    pub fn upsert_dynamic_edge(&self, parent_id: &str, target_id: &str, timestamp: chrono::DateTime<chrono::Utc>) {
        let mut inner = self.inner.write().unwrap();
        let key = (parent_id.to_string(), target_id.to_string(), crate::model::EdgeType::Calls);
        match inner.edges.get_mut(&key) {
            Some(edge) => {
                edge.dynamic = true;
                edge.dynamic_call_count = Some(edge.dynamic_call_count.unwrap_or(0) + 1);
                edge.last_call_time = Some(timestamp);
            }
            None => {
                let edge = crate::dynamic::new_dynamic_edge(parent_id, target_id, timestamp);
                inner.edges.insert(key, edge);
            }
        }
    }

    pub fn get_all_nodes(&self) -> Vec<Node> {
        self.inner.read().unwrap().nodes.values().cloned().collect()
    }

    pub fn get_all_edges(&self) -> Vec<Edge> {
        self.inner.read().unwrap().edges.values().cloned().collect()
    }

    /// All edges incident (as source or target) to any id in `ids`.
    pub fn get_edges_for(&self, ids: &[String]) -> Vec<Edge> {
        let wanted: HashSet<&String> = ids.iter().collect();
        self.inner
            .read()
            .unwrap()
            .edges
            .values()
            .filter(|e| wanted.contains(&e.source) || wanted.contains(&e.target))
            .cloned()
            .collect()
    }

    pub fn get_nodes_for_file(&self, path: &str) -> Vec<Node> {
        let inner = self.inner.read().unwrap();
        inner
            .file_index
            .get(path)
            .map(|ids| ids.iter().filter_map(|id| inner.nodes.get(id).cloned()).collect())
            .unwrap_or_default()
    }

    /// Add or remove `path` from node `id`'s membership set directly,
    /// deleting the node (and its incident edges) if that empties it.
    pub fn update_node_files(&self, id: &str, path: &str, add: bool) -> EngineResult<()> {
        let mut inner = self.inner.write().unwrap();
        let mut emptied = false;
        if let Some(node) = inner.nodes.get_mut(id) {
            if add {
                node.files.insert(path.to_string());
            } else {
                node.files.remove(path);
                emptied = node.files.is_empty();
            }
        }
        if emptied {
            inner.nodes.remove(id);
            inner.edges.retain(|(source, target, _), _| source != id && target != id);
        }
        Ok(())
    }

    pub fn save_snapshot(&self) -> EngineResult<()> {
        let Some(path) = self.config.snapshot_path.clone() else {
            return Ok(());
        };
        let (nodes, edges, file_nodes) = {
            let inner = self.inner.read().unwrap();
            let nodes: Vec<Node> = inner.nodes.values().cloned().collect();
            let edges: Vec<Edge> = inner.edges.values().cloned().collect();
            let file_nodes: BTreeMap<String, Vec<String>> = inner
                .file_index
                .iter()
                .map(|(path, ids)| (path.clone(), ids.iter().cloned().collect()))
                .collect();
            (nodes, edges, file_nodes)
        };
        snapshot::write_snapshot(&path, nodes, edges, file_nodes)
    }

    pub fn load_snapshot(&self) -> EngineResult<()> {
        let Some(path) = self.config.snapshot_path.clone() else {
            return Ok(());
        };
        match snapshot::read_snapshot(&path) {
            Ok(Some(doc)) => {
                let mut inner = self.inner.write().unwrap();
                inner.nodes = doc.nodes.into_iter().map(|n| (n.id.clone(), n)).collect();
                inner.edges = doc.edges.into_iter().map(|e| (e.key(), e)).collect();
                inner.file_index = doc
                    .file_nodes
                    .into_iter()
                    .map(|(path, ids)| (path, ids.into_iter().collect()))
                    .collect();
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) => {
                tracing::error!(error = %e, "malformed snapshot, starting from an empty store");
                Ok(())
            }
        }
    }
}
