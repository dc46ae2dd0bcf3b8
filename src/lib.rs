//! cartograph: a live, queryable dependency graph engine for a source tree.
//!
//! Watches a directory, parses changed files, and keeps an in-memory graph
//! of modules, classes, functions, imports, and their relations in sync
//! with the filesystem — including tracking file and function renames
//! across edits so node identity survives a move. A secondary channel
//! folds observed runtime call data into the same graph.

pub mod config;
pub mod dynamic;
pub mod error;
pub mod graph;
pub mod model;
pub mod parser;
pub mod query;
pub mod rename;
pub mod sync;
pub mod validation;
pub mod version;
pub mod watcher;

pub use config::{Config, StorageMode};
pub use dynamic::{DynamicIngestor, FunctionCallEvent};
pub use error::{EngineError, EngineResult};
pub use graph::GraphStore;
pub use model::{Edge, EdgeType, Node, NodeKind, ParseResult, SourceSpan};
pub use query::{Direction, QuerySurface};
pub use sync::{EventKind, SyncCoordinator};
