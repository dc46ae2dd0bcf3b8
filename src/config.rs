//! Engine configuration, validated once at startup.
//!
//! Every tunable the rest of the crate reads has a default here so a user
//! invoking `cartograph watch <dir>` with no flags gets sane behavior.

use std::path::{Path, PathBuf};

use crate::error::EngineError;

/// How the Graph Store persists its state between runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    /// Nothing is written to disk; the graph lives only in memory.
    InMemory,
    /// Periodic snapshots are written to `Config::snapshot_path`.
    Snapshot,
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory the watcher and initial scan operate on.
    pub watch_dir: PathBuf,
    pub storage_mode: StorageMode,
    /// Required when `storage_mode` is [`StorageMode::Snapshot`].
    pub snapshot_path: Option<PathBuf>,
    /// File extensions (without the dot) the Parser Facade will dispatch.
    pub supported_extensions: Vec<String>,
    /// Window, in seconds, within which a delete+create pair is considered
    /// for rename detection (spec default: 2.0).
    pub rename_window_seconds: f64,
    /// Minimum similarity ratio for a file rename match (spec default: 0.7).
    pub file_similarity_threshold: f64,
    /// Minimum composite similarity for a function rename match (spec
    /// default: 0.7).
    pub function_similarity_threshold: f64,
    /// How often the Dynamic Ingestor drains its queue, in seconds (spec
    /// default: 0.5).
    pub dynamic_poll_interval_seconds: f64,
    /// Glob-style patterns; a call site is only ingested if its source
    /// file matches one of these (empty means "match everything").
    pub instrumentation_include_patterns: Vec<String>,
    /// Glob-style patterns that override `instrumentation_include_patterns`.
    pub instrumentation_exclude_patterns: Vec<String>,
}

impl Config {
    /// Build a config with the spec's defaults for everything but the
    /// watch directory.
    pub fn new(watch_dir: impl Into<PathBuf>) -> Self {
        Config {
            watch_dir: watch_dir.into(),
            storage_mode: StorageMode::InMemory,
            snapshot_path: None,
            supported_extensions: vec!["py".into(), "js".into(), "ts".into(), "tsx".into()],
            rename_window_seconds: 2.0,
            file_similarity_threshold: 0.7,
            function_similarity_threshold: 0.7,
            dynamic_poll_interval_seconds: 0.5,
            instrumentation_include_patterns: Vec::new(),
            instrumentation_exclude_patterns: Vec::new(),
        }
    }

    pub fn with_snapshot(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_mode = StorageMode::Snapshot;
        self.snapshot_path = Some(path.into());
        self
    }

    /// Check internal consistency. Called once at startup; any failure
    /// here is an [`EngineError::Configuration`] and the process exits
    /// before any background work begins.
    pub fn validate(&self) -> Result<(), EngineError> {
        if !self.watch_dir.is_dir() {
            return Err(EngineError::Configuration(format!(
                "watch directory does not exist or is not a directory: {}",
                self.watch_dir.display()
            )));
        }

        if self.storage_mode == StorageMode::Snapshot && self.snapshot_path.is_none() {
            return Err(EngineError::Configuration(
                "storage_mode is Snapshot but no snapshot_path was given".into(),
            ));
        }

        if self.supported_extensions.is_empty() {
            return Err(EngineError::Configuration(
                "supported_extensions must not be empty".into(),
            ));
        }

        check_unit_range("file_similarity_threshold", self.file_similarity_threshold)?;
        check_unit_range("function_similarity_threshold", self.function_similarity_threshold)?;

        if self.rename_window_seconds <= 0.0 {
            return Err(EngineError::Configuration(
                "rename_window_seconds must be positive".into(),
            ));
        }

        if self.dynamic_poll_interval_seconds <= 0.0 {
            return Err(EngineError::Configuration(
                "dynamic_poll_interval_seconds must be positive".into(),
            ));
        }

        Ok(())
    }

    /// True if `extension` (without the leading dot) is one the Parser
    /// Facade should dispatch.
    pub fn supports_extension(&self, extension: &str) -> bool {
        self.supported_extensions.iter().any(|ext| ext == extension)
    }

    /// True if `path`'s extension is supported and it lies within
    /// `watch_dir`.
    pub fn is_ingestible(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.supports_extension(ext))
            .unwrap_or(false)
    }
}

fn check_unit_range(name: &str, value: f64) -> Result<(), EngineError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(EngineError::Configuration(format!(
            "{} must be between 0.0 and 1.0, got {}",
            name, value
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_missing_watch_dir() {
        let config = Config::new("/nonexistent/path/does/not/exist");
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_accepts_defaults_against_a_real_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new(dir.path());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_snapshot_mode_without_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::new(dir.path());
        config.storage_mode = StorageMode::Snapshot;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::new(dir.path());
        config.file_similarity_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn supports_extension_matches_configured_list() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new(dir.path());
        assert!(config.supports_extension("py"));
        assert!(!config.supports_extension("rb"));
    }
}
