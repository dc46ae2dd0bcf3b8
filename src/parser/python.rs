//! Python parser built on `tree-sitter-python`.
//!
//! Walks the CST once, tracking class scope so methods get a
//! fully-qualified function id, and records calls against whichever
//! function (or the module, for top-level statements) currently encloses
//! them.

use tree_sitter::Node as TsNode;

use crate::model::{function_id, module_id, module_stem, Edge, EdgeType, Node, NodeKind, ParseResult, SourceSpan};
use crate::parser::{fallback_result, LanguageParser, ScopeSeparator, ScopeStack};

pub struct PythonParser;

impl PythonParser {
    pub fn new() -> Self {
        PythonParser
    }
}

impl Default for PythonParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageParser for PythonParser {
    fn parse(&self, path: &str, source: &[u8]) -> ParseResult {
        let mut ts_parser = tree_sitter::Parser::new();
        if ts_parser.set_language(&tree_sitter_python::language()).is_err() {
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

/// `path` is the file this walker is parsing. Minted function/class ids are
/// qualified by [`module_stem(path)`](module_stem) — the bare file name, no
/// directory or extension, per spec.md's `function:<module>.<name>`
/// convention — which is NOT the `module:{path}` node id; callers compute
/// that separately via [`module_id`] wherever an edge must target the
/// module node itself.
struct Walker<'a> {
    path: &'a str,
    source: &'a [u8],
    result: &'a mut ParseResult,
}

impl<'a> Walker<'a> {
    /// `enclosing` is the id of the module or function this subtree
    /// statically executes inside of — the source endpoint for any call
    /// edges found here.
    fn walk(&mut self, node: TsNode, scope: &mut ScopeStack, enclosing: &str) {
        match node.kind() {
            "class_definition" => self.visit_class(node, scope, enclosing),
            "function_definition" => self.visit_function(node, scope, enclosing),
            "import_statement" | "import_from_statement" => self.visit_import(node),
            "call" => self.visit_call(node, enclosing),
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

        if let Some(superclasses) = node.child_by_field_name("superclasses") {
            let mut cursor = superclasses.walk();
            for base in superclasses.children(&mut cursor) {
                if base.kind() == "identifier" {
                    let base_name = self.text(base);
                    let base_id = format!("class:{}.{}", module_stem(self.path), base_name);
                    self.result.edges.push(Edge::new(class_id.clone(), base_id, EdgeType::Inherits, self.path));
                }
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
                params
                    .children(&mut cursor)
                    .filter(|c| matches!(c.kind(), "identifier" | "typed_parameter" | "default_parameter"))
                    .count() as u32
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
            match child.kind() {
                "dotted_name" => {
                    let target = self.text(child).to_string();
                    self.emit_import(&target);
                }
                "aliased_import" => {
                    if let Some(name) = child.child_by_field_name("name") {
                        let target = self.text(name).to_string();
                        self.emit_import(&target);
                    }
                }
                _ => {}
            }
        }
    }

    fn emit_import(&mut self, target: &str) {
        let import_id = format!("import:{}", target);
        self.result.nodes.push(Node::new(import_id.clone(), NodeKind::Import, target, self.path));
        self.result
            .edges
            .push(Edge::new(module_id(self.path), import_id, EdgeType::Imports, self.path));
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NodeKind;

    #[test]
    fn extracts_module_and_top_level_function() {
        let parser = PythonParser::new();
        let result = parser.parse("src/a.py", b"def f(): pass\n");

        let module = result.nodes.iter().find(|n| n.id == "module:src/a.py").unwrap();
        assert_eq!(module.kind, NodeKind::Module);

        let function = result.nodes.iter().find(|n| n.id == "function:a.f").unwrap();
        assert_eq!(function.name, "f");

        assert!(result.edges.iter().any(|e| e.edge_type == EdgeType::MemberOf
            && e.source == "function:a.f"
            && e.target == "module:src/a.py"));
    }

    #[test]
    fn extracts_class_with_method_and_inheritance() {
        let parser = PythonParser::new();
        let source = b"class Base:\n    pass\n\nclass Child(Base):\n    def run(self):\n        pass\n";
        let result = parser.parse("src/a.py", source);

        assert!(result.nodes.iter().any(|n| n.id == "class:a.Child"));
        assert!(result
            .edges
            .iter()
            .any(|e| e.edge_type == EdgeType::Inherits && e.source == "class:a.Child"));
        assert!(result.nodes.iter().any(|n| n.id == "function:a.Child.run"));
    }

    #[test]
    fn extracts_import_and_call_edges() {
        let parser = PythonParser::new();
        let source = b"import os\n\ndef f():\n    os.getcwd()\n";
        let result = parser.parse("src/a.py", source);

        assert!(result.nodes.iter().any(|n| n.id == "import:os"));
        assert!(result.edges.iter().any(|e| e.edge_type == EdgeType::Imports && e.target == "import:os"));
        assert!(result.edges.iter().any(|e| e.edge_type == EdgeType::Calls && e.source == "function:a.f"));
    }

    #[test]
    fn parse_failure_falls_back_to_module_only() {
        let parser = PythonParser::new();
        let result = parser.parse("src/a.py", &[0xff, 0xfe, 0x00, 0x01]);
        assert!(!result.nodes.is_empty());
    }
}
