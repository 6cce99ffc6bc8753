//! Owned Go syntax trees: AST types, CST lowering, printing, and utilities.

pub mod ast;
pub mod lower;
pub mod print;
pub mod tools;

pub use ast::*;
pub use lower::{lower_file, Diagnostic};
pub use print::{render_file, ToGo};
