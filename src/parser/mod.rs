//! Parser Facade: dispatches a file path to the language parser that
//! understands its extension and normalizes the AST into a [`ParseResult`].
//!
//! Each concrete parser is pure and side-effect free: same bytes in, same
//! `ParseResult` out, no filesystem access beyond the bytes it is handed.

pub mod javascript;
pub mod python;
pub mod typescript;

use std::path::Path;

use crate::model::{module_id, ParseResult};

/// Separator used when building a scope's fully-qualified name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeSeparator {
    Dot,
}

impl ScopeSeparator {
    fn as_str(self) -> &'static str {
        match self {
            ScopeSeparator::Dot => ".",
        }
    }
}

/// Tracks nested module/class scopes while walking a tree-sitter CST, so a
/// symbol several levels deep gets a fully-qualified name instead of a bare
/// local one.
#[derive(Debug, Clone)]
pub struct ScopeStack {
    scopes: Vec<String>,
    separator: ScopeSeparator,
}

impl ScopeStack {
    pub fn new(separator: ScopeSeparator) -> Self {
        ScopeStack { scopes: Vec::new(), separator }
    }

    pub fn push(&mut self, scope: impl Into<String>) {
        self.scopes.push(scope.into());
    }

    pub fn pop(&mut self) -> Option<String> {
        self.scopes.pop()
    }

    pub fn current_fqn(&self) -> String {
        self.scopes.join(self.separator.as_str())
    }

    pub fn fqn_for(&self, name: &str) -> String {
        if self.scopes.is_empty() {
            name.to_string()
        } else {
            format!("{}{}{}", self.current_fqn(), self.separator.as_str(), name)
        }
    }
}

/// A language-specific parser implementing the Parser Facade's contract
/// (spec.md §4.2, §6).
pub trait LanguageParser {
    /// Parse `source` (the file at `path`, already read into memory) into a
    /// normalized [`ParseResult`]. Must never fail: a grammar error or
    /// unreadable encoding yields [`ParseResult::module_only`], not an
    /// error, so the Sync Coordinator's pipeline never stalls on a single
    /// bad file.
    fn parse(&self, path: &str, source: &[u8]) -> ParseResult;
}

/// Extensions this facade can dispatch, keyed to their [`LanguageParser`].
pub fn parser_for(path: &Path) -> Option<Box<dyn LanguageParser>> {
    let extension = path.extension()?.to_str()?;
    match extension {
        "py" => Some(Box::new(python::PythonParser::new())),
        "js" => Some(Box::new(javascript::JavaScriptParser::new())),
        "ts" | "tsx" => Some(Box::new(typescript::TypeScriptParser::new())),
        _ => None,
    }
}

/// Minimal module-only result for a file whose grammar rejected it
/// entirely, or whose bytes are not valid UTF-8 (spec.md §4.2).
pub fn fallback_result(path: &str) -> ParseResult {
    tracing::warn!(path, "parse failure, recording file as existing but empty");
    ParseResult::module_only(module_id(path), path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn parser_for_dispatches_by_extension() {
        assert!(parser_for(&PathBuf::from("a.py")).is_some());
        assert!(parser_for(&PathBuf::from("a.js")).is_some());
        assert!(parser_for(&PathBuf::from("a.ts")).is_some());
        assert!(parser_for(&PathBuf::from("a.tsx")).is_some());
        assert!(parser_for(&PathBuf::from("a.rb")).is_none());
        assert!(parser_for(&PathBuf::from("no_extension")).is_none());
    }

    #[test]
    fn scope_stack_builds_dotted_fqns() {
        let mut stack = ScopeStack::new(ScopeSeparator::Dot);
        assert_eq!(stack.fqn_for("f"), "f");
        stack.push("Widget");
        assert_eq!(stack.fqn_for("render"), "Widget.render");
        stack.pop();
        assert_eq!(stack.fqn_for("f"), "f");
    }
}
