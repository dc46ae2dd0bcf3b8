//! Graph data model: nodes, edges, and the identifiers that tie them
//! together across files.
//!
//! Nodes and edges carry heterogeneous, mostly-optional attribute bags in
//! the system this crate reimplements. Rather than a stringly-typed map we
//! use a tagged `NodeKind`/`EdgeType` enum plus explicit `Option` fields —
//! the "dynamic typing in source -> tagged variants" translation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Kind of a graph node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Module,
    Class,
    Function,
    Import,
    Call,
    Variable,
}

impl NodeKind {
    /// The id prefix this kind is encoded with, e.g. `"function"` in
    /// `function:mod.name`.
    pub fn prefix(self) -> &'static str {
        match self {
            NodeKind::Module => "module",
            NodeKind::Class => "class",
            NodeKind::Function => "function",
            NodeKind::Import => "import",
            NodeKind::Call => "call",
            NodeKind::Variable => "variable",
        }
    }

    /// Infer a node kind from the prefix of an id (`"function:a.b"` ->
    /// `Function`). Used to materialize placeholder nodes for edge
    /// endpoints that no parse has declared yet (see [`crate::graph`]).
    pub fn from_id(id: &str) -> NodeKind {
        match id.split_once(':').map(|(prefix, _)| prefix) {
            Some("module") => NodeKind::Module,
            Some("class") => NodeKind::Class,
            Some("function") => NodeKind::Function,
            Some("import") => NodeKind::Import,
            Some("call") => NodeKind::Call,
            Some("variable") => NodeKind::Variable,
            _ => NodeKind::Variable,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Kind of a graph edge. Between the same pair of nodes, distinct edge
/// types coexist; a given `(source, target, type)` triple is unique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    Contains,
    MemberOf,
    Inherits,
    Imports,
    Calls,
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EdgeType::Contains => "contains",
            EdgeType::MemberOf => "member_of",
            EdgeType::Inherits => "inherits",
            EdgeType::Imports => "imports",
            EdgeType::Calls => "calls",
        };
        f.write_str(s)
    }
}

/// A source location span, in 0-based line/column pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpan {
    pub start_line: u32,
    pub start_col: u32,
    pub end_line: u32,
    pub end_col: u32,
}

/// The `(source, target, type)` triple that identifies an edge.
pub type EdgeKey = (String, String, EdgeType);

/// A graph node.
///
/// `id` is an opaque string encoding kind and qualified name (see
/// [`NodeKind::from_id`]); it is the node's identity across files. `files`
/// is the reference count described in spec.md `DESIGN NOTES`: a node lives
/// as long as its `files` set is non-empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub kind: NodeKind,
    pub name: String,
    /// Primary defining file: the file that most recently upserted this
    /// node, per the "last-writer-wins" merge rule.
    pub filepath: String,
    /// All files currently claiming this node. Never empty while the node
    /// exists (invariant I1).
    pub files: BTreeSet<String>,
    pub span: Option<SourceSpan>,
    /// Former names, oldest first. The current `name` is never a member
    /// (invariant I5).
    #[serde(default)]
    pub rename_history: Vec<String>,
    pub dynamic_call_count: Option<u64>,
    /// Only populated for module nodes.
    pub content_hash: Option<String>,
    #[serde(default)]
    pub secret_warnings: Vec<String>,
    /// Source text of a function/method body. Only populated for function
    /// nodes, and only kept around long enough for the function rename
    /// matcher to compare old and new bodies; not meaningful once a parse
    /// has been folded into the store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Parameter count, for the same transient matching purpose as `body`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param_count: Option<u32>,
}

impl Node {
    /// Construct a fresh node claimed by a single file.
    pub fn new(id: impl Into<String>, kind: NodeKind, name: impl Into<String>, filepath: impl Into<String>) -> Self {
        let filepath = filepath.into();
        let mut files = BTreeSet::new();
        files.insert(filepath.clone());
        Node {
            id: id.into(),
            kind,
            name: name.into(),
            filepath,
            files,
            span: None,
            rename_history: Vec::new(),
            dynamic_call_count: None,
            content_hash: None,
            secret_warnings: Vec::new(),
            body: None,
            param_count: None,
        }
    }

    /// Build a minimal placeholder node for an edge endpoint that no parse
    /// has declared as a node. Kind is inferred from the id's prefix; see
    /// spec.md `DESIGN NOTES` ("Implicit node creation from edges").
    pub fn placeholder(id: &str, filepath: impl Into<String>) -> Self {
        let kind = NodeKind::from_id(id);
        let name = id
            .split_once(':')
            .map(|(_, rest)| rest.to_string())
            .unwrap_or_else(|| id.to_string());
        Node::new(id.to_string(), kind, name, filepath)
    }

    /// Append `old_name` to the rename history and make `new_name` current.
    /// No-op (besides the rename) if `new_name == self.name`.
    pub fn apply_rename(&mut self, new_name: impl Into<String>) {
        let new_name = new_name.into();
        if new_name == self.name {
            return;
        }
        let old_name = std::mem::replace(&mut self.name, new_name);
        if !self.rename_history.contains(&old_name) {
            self.rename_history.push(old_name);
        }
    }
}

/// A graph edge. Identity is the `(source, target, type)` triple; all other
/// fields are attributes layered on top.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub edge_type: EdgeType,
    /// The file whose parse produced this edge.
    pub file: String,
    #[serde(default)]
    pub dynamic: bool,
    pub dynamic_call_count: Option<u64>,
    pub first_call_time: Option<DateTime<Utc>>,
    pub last_call_time: Option<DateTime<Utc>>,
}

impl Edge {
    pub fn new(source: impl Into<String>, target: impl Into<String>, edge_type: EdgeType, file: impl Into<String>) -> Self {
        Edge {
            source: source.into(),
            target: target.into(),
            edge_type,
            file: file.into(),
            dynamic: false,
            dynamic_call_count: None,
            first_call_time: None,
            last_call_time: None,
        }
    }

    pub fn key(&self) -> EdgeKey {
        (self.source.clone(), self.target.clone(), self.edge_type)
    }
}

/// The normalized output of a single file parse: every node and edge the
/// parse produced, using the id conventions above so cross-file
/// deduplication works automatically once the Graph Store merges them in.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParseResult {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl ParseResult {
    pub fn empty() -> Self {
        ParseResult::default()
    }

    /// A minimal result containing only the module node for `path` — what
    /// the Parser Facade returns on a grammar error so the store still
    /// records the file's existence (I3).
    pub fn module_only(module_id: impl Into<String>, filepath: impl Into<String>) -> Self {
        let filepath = filepath.into();
        let module_id = module_id.into();
        let node = Node::new(module_id, NodeKind::Module, filepath.clone(), filepath);
        ParseResult {
            nodes: vec![node],
            edges: Vec::new(),
        }
    }
}

/// Build the canonical module node id for a file path: `module:<path>`.
pub fn module_id(path: &str) -> String {
    format!("module:{}", path)
}

/// Build the canonical function/method node id: `function:<module>.<name>`.
pub fn function_id(module: &str, name: &str) -> String {
    format!("function:{}.{}", module, name)
}

/// Derive the bare module name that qualifies function/class ids: a file's
/// last path segment with its extension stripped (`src/a.py` -> `a`). This
/// is the "last-module-segment" the Dynamic Ingestor also derives from
/// `module_name` (see `module_leaf` in `dynamic.rs`) — parser-minted ids
/// must agree with it or a runtime call event can never match its
/// statically-parsed node.
pub fn module_stem(path: &str) -> &str {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    match file_name.rfind('.') {
        Some(idx) if idx > 0 => &file_name[..idx],
        _ => file_name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_kind_round_trips_through_id_prefix() {
        assert_eq!(NodeKind::from_id("function:a.b"), NodeKind::Function);
        assert_eq!(NodeKind::from_id("class:Foo"), NodeKind::Class);
        assert_eq!(NodeKind::from_id("module:src/a.py"), NodeKind::Module);
        assert_eq!(NodeKind::from_id("import:os"), NodeKind::Import);
        assert_eq!(NodeKind::from_id("garbage"), NodeKind::Variable);
    }

    #[test]
    fn apply_rename_is_append_only_and_excludes_current_name() {
        let mut node = Node::new("function:a.f", NodeKind::Function, "f", "a.py");
        node.apply_rename("g");
        assert_eq!(node.name, "g");
        assert_eq!(node.rename_history, vec!["f".to_string()]);

        node.apply_rename("h");
        assert_eq!(node.rename_history, vec!["f".to_string(), "g".to_string()]);
        assert!(!node.rename_history.contains(&node.name));
    }

    #[test]
    fn apply_rename_to_same_name_is_noop() {
        let mut node = Node::new("function:a.f", NodeKind::Function, "f", "a.py");
        node.apply_rename("f");
        assert!(node.rename_history.is_empty());
    }

    #[test]
    fn placeholder_infers_kind_and_name_from_id() {
        let node = Node::placeholder("class:Widget", "a.py");
        assert_eq!(node.kind, NodeKind::Class);
        assert_eq!(node.name, "Widget");
        assert!(node.files.contains("a.py"));
    }
}
