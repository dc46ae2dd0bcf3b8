//! Query Surface: read-only views over the Graph Store.
//!
//! Every operation copies its result before returning; nothing here holds
//! the store's lock past the call that produced the copy, so a caller may
//! freely do I/O (print, serialize over a socket) with the result without
//! blocking writers.

use std::sync::Arc;

use crate::graph::GraphStore;
use crate::model::{Edge, EdgeType, Node};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
    Both,
}

pub struct QuerySurface {
    store: Arc<GraphStore>,
}

impl QuerySurface {
    pub fn new(store: Arc<GraphStore>) -> Self {
        QuerySurface { store }
    }

    /// All nodes, optionally filtered by kind, capped at `limit` (0 means
    /// unlimited).
    pub fn list_nodes(&self, kind_filter: Option<crate::model::NodeKind>, limit: usize) -> Vec<Node> {
        let mut nodes = self.store.get_all_nodes();
        if let Some(kind) = kind_filter {
            nodes.retain(|n| n.kind == kind);
        }
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        apply_limit(nodes, limit)
    }

    pub fn get_node(&self, id: &str) -> Option<Node> {
        self.store.get_node(id)
    }

    /// Case-insensitive substring match against id and filepath.
    pub fn search_nodes(&self, substring: &str, limit: usize) -> Vec<Node> {
        let needle = substring.to_lowercase();
        let mut nodes: Vec<Node> = self
            .store
            .get_all_nodes()
            .into_iter()
            .filter(|n| n.id.to_lowercase().contains(&needle) || n.filepath.to_lowercase().contains(&needle))
            .collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        apply_limit(nodes, limit)
    }

    pub fn edges_for(&self, id: &str, direction: Direction) -> Vec<Edge> {
        let edges = self.store.get_edges_for(&[id.to_string()]);
        edges
            .into_iter()
            .filter(|e| match direction {
                Direction::Out => e.source == id,
                Direction::In => e.target == id,
                Direction::Both => e.source == id || e.target == id,
            })
            .collect()
    }

    pub fn nodes_for_file(&self, path: &str) -> Vec<Node> {
        self.store.get_nodes_for_file(path)
    }

    /// Nodes that call `id` directly: sources of incoming `calls` edges.
    pub fn callers_of(&self, id: &str, limit: usize) -> Vec<Node> {
        let callers: Vec<Node> = self
            .edges_for(id, Direction::In)
            .into_iter()
            .filter(|e| e.edge_type == EdgeType::Calls)
            .filter_map(|e| self.store.get_node(&e.source))
            .collect();
        apply_limit(callers, limit)
    }

    /// Nodes that `id` calls directly: targets of outgoing `calls` edges.
    pub fn callees_of(&self, id: &str, limit: usize) -> Vec<Node> {
        let callees: Vec<Node> = self
            .edges_for(id, Direction::Out)
            .into_iter()
            .filter(|e| e.edge_type == EdgeType::Calls)
            .filter_map(|e| self.store.get_node(&e.target))
            .collect();
        apply_limit(callees, limit)
    }
}

fn apply_limit<T>(mut items: Vec<T>, limit: usize) -> Vec<T> {
    if limit > 0 && items.len() > limit {
        items.truncate(limit);
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::model::{module_id, NodeKind, ParseResult};

    fn seeded_store(dir: &std::path::Path) -> Arc<GraphStore> {
        let store = Arc::new(GraphStore::new(Config::new(dir)));
        let module = Node::new(module_id("m.py"), NodeKind::Module, "m", "m.py");
        let outer = Node::new("function:m.outer", NodeKind::Function, "outer", "m.py");
        let inner = Node::new("function:m.inner", NodeKind::Function, "inner", "m.py");
        let edge = Edge::new("function:m.outer", "function:m.inner", EdgeType::Calls, "m.py");
        store
            .upsert_file(
                "m.py",
                ParseResult { nodes: vec![module, outer, inner], edges: vec![edge] },
                None,
            )
            .unwrap();
        store
    }

    #[test]
    fn search_nodes_matches_case_insensitively() {
        let dir = tempfile::tempdir().unwrap();
        let query = QuerySurface::new(seeded_store(dir.path()));
        let found = query.search_nodes("OUTER", 0);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "function:m.outer");
    }

    #[test]
    fn callees_and_callers_follow_calls_edges() {
        let dir = tempfile::tempdir().unwrap();
        let query = QuerySurface::new(seeded_store(dir.path()));

        let callees = query.callees_of("function:m.outer", 0);
        assert_eq!(callees.len(), 1);
        assert_eq!(callees[0].id, "function:m.inner");

        let callers = query.callers_of("function:m.inner", 0);
        assert_eq!(callers.len(), 1);
        assert_eq!(callers[0].id, "function:m.outer");
    }

    #[test]
    fn list_nodes_respects_limit() {
        let dir = tempfile::tempdir().unwrap();
        let query = QuerySurface::new(seeded_store(dir.path()));
        let limited = query.list_nodes(None, 1);
        assert_eq!(limited.len(), 1);
    }
}
