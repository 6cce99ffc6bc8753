//! AST node abstraction layer.
//!
//! A thin wrapper around tree-sitter's `Node` type offering a more ergonomic
//! interface for traversing the Go concrete syntax tree.

use tree_sitter::Node as TSNode;

/// A syntax node wrapper providing convenient tree traversal methods.
#[derive(Clone, Copy, Debug)]
pub struct Node<'a>(pub(crate) TSNode<'a>);

impl<'a> Node<'a> {
    /// Create a new Node from a tree-sitter node
    pub fn new(node: TSNode<'a>) -> Self {
        Self(node)
    }

    /// Get the underlying tree-sitter node
    pub fn inner(&self) -> TSNode<'a> {
        self.0
    }

    /// Checks if this node is a syntax error or contains any syntax errors
    /// anywhere within it.
    pub fn has_error(&self) -> bool {
        self.0.has_error()
    }

    /// Whether this node is a `MISSING` node inserted by error recovery.
    pub fn is_missing(&self) -> bool {
        self.0.is_missing()
    }

    /// Get the node kind as a string
    pub fn kind(&self) -> &'static str {
        self.0.kind()
    }

    /// Whether the node is a named grammar node (as opposed to punctuation).
    pub fn is_named(&self) -> bool {
        self.0.is_named()
    }

    /// Get the UTF-8 text content of this node
    pub fn text(&self, code: &'a [u8]) -> &'a str {
        self.0.utf8_text(code).unwrap_or("")
    }

    /// Get the start byte offset
    pub fn start_byte(&self) -> usize {
        self.0.start_byte()
    }

    /// Get the end byte offset
    pub fn end_byte(&self) -> usize {
        self.0.end_byte()
    }

    /// Get the start row (0-indexed)
    pub fn start_row(&self) -> usize {
        self.0.start_position().row
    }

    /// Get the end row (0-indexed)
    pub fn end_row(&self) -> usize {
        self.0.end_position().row
    }

    /// Get the start column (0-indexed, bytes)
    pub fn start_column(&self) -> usize {
        self.0.start_position().column
    }

    /// Get the parent node
    pub fn parent(&self) -> Option<Node<'a>> {
        self.0.parent().map(Node)
    }

    /// Get a child by field name
    pub fn child_by_field_name(&self, name: &str) -> Option<Node<'a>> {
        self.0.child_by_field_name(name).map(Node)
    }

    /// Get a child by index
    pub fn child(&self, pos: usize) -> Option<Node<'a>> {
        self.0.child(pos).map(Node)
    }

    /// Get the number of children
    pub fn child_count(&self) -> usize {
        self.0.child_count()
    }

    /// Collect all children of this node.
    pub fn children(&self) -> Vec<Node<'a>> {
        let mut cursor = self.0.walk();
        self.0.children(&mut cursor).map(Node).collect()
    }

    /// Collect the named children of this node.
    pub fn named_children(&self) -> Vec<Node<'a>> {
        let mut cursor = self.0.walk();
        self.0.named_children(&mut cursor).map(Node).collect()
    }

    /// Find the first direct child with the given kind.
    pub fn first_child_of_kind(&self, kind: &str) -> Option<Node<'a>> {
        self.children().into_iter().find(|c| c.kind() == kind)
    }

    /// Run an action on every node in this subtree, pre-order.
    pub fn act_on_node(&self, action: &mut dyn FnMut(&Node<'a>)) {
        action(self);
        for child in self.children() {
            child.act_on_node(action);
        }
    }
}
