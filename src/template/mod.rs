//! Template front end: tokenizer, syntax tree, and parser.

pub mod lexer;
pub mod node;
pub mod parser;

pub use node::{
    BindVariableNode, Branch, BranchKind, ClauseKind, ClauseNode, EmbeddedVariableNode, IfNode,
    Node,
};
pub use parser::Parser;
