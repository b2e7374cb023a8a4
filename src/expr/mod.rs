//! Directive expression language.
//!
//! Conditions in `/*%if ...*/` and `--elseif ...` markers and the contents of
//! variable markers are written in a small expression language:
//!
//! - identifiers and dotted property paths, resolved against an
//!   [`Environment`](crate::types::Environment)
//! - literals: double-quoted strings, integers, reals, `true`, `false`, `null`
//! - unary `!`
//! - binary `==`, `!=`, `<`, `<=`, `>`, `>=`, `&&`, `||`
//! - parenthesized grouping
//!
//! Expressions are parsed once, when the template is parsed, and evaluated
//! on every build.

pub mod eval;
pub mod lexer;
pub mod parser;

use std::fmt;

use crate::types::Value;

pub use eval::Evaluator;
pub use parser::parse_expression;

/// An expression together with the source text it was parsed from.
///
/// The source is kept for diagnostics and for lossless re-serialization of
/// the template.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub source: String,
    pub expr: Expr,
}

impl Expression {
    pub fn parse(source: &str) -> crate::error::Result<Self> {
        Ok(Expression {
            source: source.to_string(),
            expr: parse_expression(source)?,
        })
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// A parsed expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    /// An identifier or dotted property path such as `order.customerName`.
    Path(String),
    Not(Box<Expr>),
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
}

impl Expr {
    /// The property path, if this expression is nothing but a path.
    pub fn as_path(&self) -> Option<&str> {
        match self {
            Expr::Path(path) => Some(path),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        };
        f.write_str(s)
    }
}
