use crate::models::{top_level_name, ImportOccurrence};
use tree_sitter::{Node, Parser, Tree};

use super::{ImportParser, ParserError};

pub struct PythonParser {
    parser: Parser,
}

impl PythonParser {
    pub fn new() -> Result<Self, ParserError> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .map_err(|e| ParserError::InitError(e.to_string()))?;

        Ok(Self { parser })
    }

    fn extract_imports(&self, source: &str, tree: &Tree) -> Vec<ImportOccurrence> {
        let mut imports = Vec::new();
        self.traverse_node(&tree.root_node(), source, &mut imports);
        imports
    }

    /// Imports can sit at any nesting level (functions, conditionals, try
    /// blocks), so the whole tree is walked.
    fn traverse_node(&self, node: &Node, source: &str, imports: &mut Vec<ImportOccurrence>) {
        match node.kind() {
            "import_statement" => {
                self.parse_import_statement(node, source, imports);
            }
            "import_from_statement" => {
                self.parse_import_from_statement(node, source, imports);
            }
            // `from __future__ import x` is a compiler directive
            "future_import_statement" => {}
            _ => {
                let mut cursor = node.walk();
                for child in node.children(&mut cursor) {
                    self.traverse_node(&child, source, imports);
                }
            }
        }
    }

    /// Parse `import x, y.z` or `import x as alias`
    fn parse_import_statement(
        &self,
        node: &Node,
        source: &str,
        imports: &mut Vec<ImportOccurrence>,
    ) {
        let mut cursor = node.walk();
        for child in node.children_by_field_name("name", &mut cursor) {
            let dotted = match child.kind() {
                "dotted_name" => Some(child),
                "aliased_import" => child.child_by_field_name("name"),
                _ => None,
            };
            if let Some(dotted) = dotted {
                self.push_occurrence(&dotted, node, source, imports);
            }
        }
    }

    /// Parse `from x.y import z`; relative imports (`from . import x`,
    /// `from ..pkg import y`) never name a third-party module.
    fn parse_import_from_statement(
        &self,
        node: &Node,
        source: &str,
        imports: &mut Vec<ImportOccurrence>,
    ) {
        if let Some(module) = node.child_by_field_name("module_name") {
            if module.kind() == "dotted_name" {
                self.push_occurrence(&module, node, source, imports);
            }
        }
    }

    fn push_occurrence(
        &self,
        dotted: &Node,
        statement: &Node,
        source: &str,
        imports: &mut Vec<ImportOccurrence>,
    ) {
        let path = self.get_dotted_path(dotted, source);
        if let Some(module) = top_level_name(&path) {
            imports.push(ImportOccurrence {
                module: module.to_string(),
                line: statement.start_position().row + 1,
                cell: None,
                raw: self.get_node_text(statement, source),
                path,
            });
        }
    }

    /// Locate the first ERROR or MISSING node for the diagnostic
    fn first_error(node: Node) -> Option<Node> {
        if node.is_error() || node.is_missing() {
            return Some(node);
        }
        if !node.has_error() {
            return None;
        }
        let mut cursor = node.walk();
        let children: Vec<Node> = node.children(&mut cursor).collect();
        children.into_iter().find_map(Self::first_error).or(Some(node))
    }

    /// Collapse `a . b` spellings into `a.b`
    fn get_dotted_path(&self, node: &Node, source: &str) -> String {
        source[node.byte_range()]
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '\\')
            .collect()
    }

    fn get_node_text(&self, node: &Node, source: &str) -> String {
        source[node.byte_range()].to_string()
    }
}

impl ImportParser for PythonParser {
    fn parse(&mut self, source: &str) -> Result<Vec<ImportOccurrence>, ParserError> {
        let tree = self
            .parser
            .parse(source, None)
            .ok_or_else(|| ParserError::ParseError("parser produced no tree".to_string()))?;

        let root = tree.root_node();
        if root.has_error() {
            let at = Self::first_error(root).unwrap_or(root);
            let position = at.start_position();
            return Err(ParserError::SyntaxError {
                line: position.row + 1,
                column: position.column + 1,
            });
        }

        Ok(self.extract_imports(source, &tree))
    }
}
