//! TypeScript/TSX parser built on `tree-sitter-typescript`.
//!
//! The TS and TSX grammars share the JavaScript grammar's statement and
//! expression node kinds closely enough that the extraction walk is
//! reused verbatim from [`crate::parser::javascript`]; only the grammar
//! selected and the file extension differ.

use crate::model::{module_id, Node, NodeKind, ParseResult};
use crate::parser::javascript::Walker;
use crate::parser::{fallback_result, LanguageParser, ScopeSeparator, ScopeStack};

pub struct TypeScriptParser;

impl TypeScriptParser {
    pub fn new() -> Self {
        TypeScriptParser
    }
}

impl Default for TypeScriptParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageParser for TypeScriptParser {
    fn parse(&self, path: &str, source: &[u8]) -> ParseResult {
        let language = if path.ends_with(".tsx") {
            tree_sitter_typescript::language_tsx()
        } else {
            tree_sitter_typescript::language_typescript()
        };

        let mut ts_parser = tree_sitter::Parser::new();
        if ts_parser.set_language(&language).is_err() {
            return fallback_result(path);
        }
        let Some(tree) = ts_parser.parse(source, None) else {
            return fallback_result(path);
        };

        let module = module_id(path);
        let mut result = ParseResult {
            nodes: vec![Node::new(module.clone(), NodeKind::Module, path, path)],
            edges: Vec::new(),
        };

        let mut scope = ScopeStack::new(ScopeSeparator::Dot);
        let mut walker = Walker { path, source, result: &mut result };
        walker.walk(tree.root_node(), &mut scope, &module);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EdgeType;

    #[test]
    fn extracts_function_from_typescript_source() {
        let parser = TypeScriptParser::new();
        let source = b"function f(x: number): number {\n  return g(x);\n}\n";
        let result = parser.parse("src/a.ts", source);

        assert!(result.nodes.iter().any(|n| n.id == "function:a.f"));
        assert!(result.edges.iter().any(|e| e.edge_type == EdgeType::Calls));
    }

    #[test]
    fn dispatches_tsx_grammar_for_tsx_extension() {
        let parser = TypeScriptParser::new();
        let result = parser.parse("src/a.tsx", b"function f() { return null; }\n");
        assert!(result.nodes.iter().any(|n| n.id == "function:a.f"));
    }
}
