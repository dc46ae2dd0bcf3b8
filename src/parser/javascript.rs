//! JavaScript parser built on `tree-sitter-javascript`.
//!
//! Mirrors the Python parser's walk-with-scope approach; the tree-sitter
//! grammar's node kinds differ (`function_declaration`, `class_declaration`,
//! `call_expression`, `import_statement`) but the extraction shape is the
//! same.

use tree_sitter::Node as TsNode;

use crate::model::{function_id, module_id, module_stem, Edge, EdgeType, Node, NodeKind, ParseResult, SourceSpan};
use crate::parser::{fallback_result, LanguageParser, ScopeSeparator, ScopeStack};

pub struct JavaScriptParser;

impl JavaScriptParser {
    pub fn new() -> Self {
        JavaScriptParser
    }

    pub(crate) fn parse_with_language(path: &str, source: &[u8], language: tree_sitter::Language) -> ParseResult {
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

impl Default for JavaScriptParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageParser for JavaScriptParser {
    fn parse(&self, path: &str, source: &[u8]) -> ParseResult {
        JavaScriptParser::parse_with_language(path, source, tree_sitter_javascript::language())
    }
}

/// `path` is the file this walker is parsing. Minted function/class ids are
/// qualified by [`module_stem(path)`](module_stem) — the bare file name, no
/// directory or extension, per spec.md's `function:<module>.<name>`
/// convention — which is NOT the `module:{path}` node id; callers compute
/// that separately via [`module_id`] wherever an edge must target the
/// module node itself.
pub(crate) struct Walker<'a> {
    pub(crate) path: &'a str,
    pub(crate) source: &'a [u8],
    pub(crate) result: &'a mut ParseResult,
}

impl<'a> Walker<'a> {
    pub(crate) fn walk(&mut self, node: TsNode, scope: &mut ScopeStack, enclosing: &str) {
        match node.kind() {
            "class_declaration" => self.visit_class(node, scope, enclosing),
            "function_declaration" | "method_definition" => self.visit_function(node, scope, enclosing),
            "import_statement" => self.visit_import(node),
            "call_expression" => self.visit_call(node, enclosing),
            _ => {
                let mut cursor = node.walk();
                for child in node.children(&mut cursor) {
                    self.walk(child, scope, enclosing);
                }
            }
        }
    }

    fn text(&self, node: TsNode) -> &'a str {
        node.utf8_text(self.source).unwrap_or_default()
    }

    fn visit_class(&mut self, node: TsNode, scope: &mut ScopeStack, enclosing: &str) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let class_name = self.text(name_node).to_string();
        let class_id = format!("class:{}.{}", module_stem(self.path), scope.fqn_for(&class_name));

        let mut class_node = Node::new(class_id.clone(), NodeKind::Class, class_name.clone(), self.path);
        class_node.span = Some(span_of(node));
        self.result.nodes.push(class_node);
        self.result
            .edges
            .push(Edge::new(class_id.clone(), module_id(self.path), EdgeType::MemberOf, self.path));

        if let Some(heritage) = node.child_by_field_name("superclass") {
            let base_name = self.text(heritage).trim_start_matches("extends").trim();
            if !base_name.is_empty() {
                let base_id = format!("class:{}.{}", module_stem(self.path), base_name);
                self.result.edges.push(Edge::new(class_id.clone(), base_id, EdgeType::Inherits, self.path));
            }
        }

        scope.push(class_name);
        if let Some(body) = node.child_by_field_name("body") {
            let mut cursor = body.walk();
            for child in body.children(&mut cursor) {
                self.walk(child, scope, enclosing);
            }
        }
        scope.pop();
    }

    fn visit_function(&mut self, node: TsNode, scope: &mut ScopeStack, enclosing: &str) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = self.text(name_node).to_string();
        let qualified_name = scope.fqn_for(&name);
        let fn_id = function_id(module_stem(self.path), &qualified_name);

        let param_count = node
            .child_by_field_name("parameters")
            .map(|params| {
                let mut cursor = params.walk();
                params.named_children(&mut cursor).count() as u32
            })
            .unwrap_or(0);

        let mut fn_node = Node::new(fn_id.clone(), NodeKind::Function, name, self.path);
        fn_node.span = Some(span_of(node));
        fn_node.param_count = Some(param_count);
        if let Some(body) = node.child_by_field_name("body") {
            fn_node.body = Some(self.text(body).to_string());
        }
        self.result.nodes.push(fn_node);

        let parent = if scope.current_fqn().is_empty() {
            module_id(self.path)
        } else {
            format!("class:{}.{}", module_stem(self.path), scope.current_fqn())
        };
        self.result.edges.push(Edge::new(fn_id.clone(), parent, EdgeType::MemberOf, self.path));

        if let Some(body) = node.child_by_field_name("body") {
            let mut cursor = body.walk();
            for child in body.children(&mut cursor) {
                self.walk(child, scope, &fn_id);
            }
        }
        let _ = enclosing;
    }

    fn visit_import(&mut self, node: TsNode) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.kind() == "string" {
                let target = self.text(child).trim_matches(|c| c == '"' || c == '\'').to_string();
                let import_id = format!("import:{}", target);
                self.result.nodes.push(Node::new(import_id.clone(), NodeKind::Import, target, self.path));
                self.result
                    .edges
                    .push(Edge::new(module_id(self.path), import_id, EdgeType::Imports, self.path));
            }
        }
    }

    fn visit_call(&mut self, node: TsNode, enclosing: &str) {
        if let Some(function_node) = node.child_by_field_name("function") {
            if let Some(callee_name) = last_segment(self.text(function_node)) {
                let target_id = function_id(module_stem(self.path), callee_name);
                self.result.edges.push(Edge::new(enclosing.to_string(), target_id, EdgeType::Calls, self.path));
            }
        }
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.walk(child, &mut ScopeStack::new(ScopeSeparator::Dot), enclosing);
        }
    }
}

fn last_segment(qualified: &str) -> Option<&str> {
    qualified.rsplit('.').next().filter(|s| !s.is_empty())
}

fn span_of(node: TsNode) -> SourceSpan {
    let start = node.start_position();
    let end = node.end_position();
    SourceSpan {
        start_line: start.row as u32,
        start_col: start.column as u32,
        end_line: end.row as u32,
        end_col: end.column as u32,
    }
}
