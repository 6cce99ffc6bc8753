//! Go source parser.
//!
//! Wraps tree-sitter with the Go grammar and owns the parsed source bytes
//! alongside the concrete syntax tree.

use anyhow::{Context, Result};
use tree_sitter::Parser as TSParser;

use crate::node::Node;

/// A parsed Go source buffer.
#[derive(Debug)]
pub struct GoParser {
    code: Vec<u8>,
    tree: tree_sitter::Tree,
}

impl GoParser {
    /// Parse the given Go source code.
    pub fn parse(code: Vec<u8>) -> Result<Self> {
        let mut ts_parser = TSParser::new();
        ts_parser
            .set_language(&tree_sitter_go::LANGUAGE.into())
            .context("Failed to set tree-sitter Go language")?;

        let tree = ts_parser
            .parse(&code, None)
            .context("Failed to parse Go code")?;

        Ok(Self { code, tree })
    }

    /// Get the root node of the parsed tree.
    pub fn root(&self) -> Node<'_> {
        Node::new(self.tree.root_node())
    }

    /// Get the source code as bytes.
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    /// Get a text slice for a node of this tree.
    pub fn text_of<'a>(&'a self, node: &Node<'a>) -> &'a str {
        node.text(&self.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parser_creation() {
        let code = b"package demo\n".to_vec();
        let parser = GoParser::parse(code);
        assert!(parser.is_ok());
    }

    #[test]
    fn test_parser_root_kind() {
        let code = b"package demo\n\nfunc Add(a, b int) int { return a + b }\n".to_vec();
        let parser = GoParser::parse(code).unwrap();
        assert_eq!(parser.root().kind(), "source_file");
        assert!(!parser.root().has_error());
    }
}
