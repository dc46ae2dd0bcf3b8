//! Error taxonomy for the graph synchronization engine.
//!
//! Mirrors the categories laid out for this engine: most are confined to a
//! single event and never propagate past the component that observes them.
//! Only [`EngineError::Configuration`] is fatal, and only at startup.

use std::path::PathBuf;
use thiserror::Error;

/// The engine's error taxonomy.
///
/// Every per-event variant is caught at the boundary named in its doc
/// comment; callers outside that boundary should not need to match on this
/// enum at all.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Unsupported extension or a path outside the watch root. Silently
    /// skipped by the Sync Coordinator.
    #[error("ignorable input: {0}")]
    IgnorableInput(String),

    /// Grammar error or malformed file. The Parser Facade already converts
    /// this into a minimal module-only `ParseResult`, so this variant exists
    /// for callers that want to observe *that* a parse failed without
    /// breaking the pipeline.
    #[error("parse failure for {path}: {reason}")]
    ParseFailure { path: PathBuf, reason: String },

    /// Read/write error during similarity computation or snapshot I/O.
    /// Logged by the caller; similarity falls back to 0.0 and snapshot
    /// saves are retried on the next mutation.
    #[error("transient I/O error: {0}")]
    TransientIo(#[from] std::io::Error),

    /// An internally detected violation of the Graph Store's invariants
    /// (I1-I5). The offending mutation is aborted and the store is left in
    /// its prior state.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Missing watch directory or an out-of-range threshold. Surfaced to
    /// the CLI at startup; no background task begins.
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Result alias for engine operations that can fail with [`EngineError`].
pub type EngineResult<T> = Result<T, EngineError>;
