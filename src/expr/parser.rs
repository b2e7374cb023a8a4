//! Recursive-descent parser for directive expressions.
//!
//! Precedence, lowest to highest:
//!
//!   1. `||`
//!   2. `&&`
//!   3. `==`, `!=`, `<`, `<=`, `>`, `>=` (non-associative)
//!   4. unary `!`, unary `-` on numeric literals
//!   5. primary (literals, paths, parenthesized expressions)

use crate::error::{ErrorCode, Result, TemplateError};
use crate::expr::lexer::{Lexer, Token};
use crate::expr::{BinaryOp, Expr};
use crate::types::Value;

/// Parse `source` as a complete expression.
pub fn parse_expression(source: &str) -> Result<Expr> {
    let tokens = Lexer::new(source).tokenize()?;
    let mut parser = Parser {
        source,
        tokens,
        pos: 0,
    };
    if parser.current() == &Token::Eof {
        return Err(parser.error("empty expression".into()));
    }
    let expr = parser.parse_or_expr()?;
    if parser.current() != &Token::Eof {
        return Err(parser.error(format!("unexpected trailing token {:?}", parser.current())));
    }
    Ok(expr)
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn current(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn expect(&mut self, expected: &Token) -> Result<()> {
        if self.current() == expected {
            self.advance();
            Ok(())
        } else {
            Err(self.error(format!("expected {expected:?}, got {:?}", self.current())))
        }
    }

    fn error(&self, msg: String) -> TemplateError {
        TemplateError::expression(ErrorCode::ExpressionSyntax, self.source, msg)
    }

    fn parse_or_expr(&mut self) -> Result<Expr> {
        let mut left = self.parse_and_expr()?;
        while self.current() == &Token::OrOr {
            self.advance();
            let right = self.parse_and_expr()?;
            left = Expr::Binary {
                left: Box::new(left),
                op: BinaryOp::Or,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_and_expr(&mut self) -> Result<Expr> {
        let mut left = self.parse_comparison_expr()?;
        while self.current() == &Token::AndAnd {
            self.advance();
            let right = self.parse_comparison_expr()?;
            left = Expr::Binary {
                left: Box::new(left),
                op: BinaryOp::And,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_comparison_expr(&mut self) -> Result<Expr> {
        let left = self.parse_unary_expr()?;
        let op = match self.current() {
            Token::EqEq => BinaryOp::Eq,
            Token::NotEq => BinaryOp::NotEq,
            Token::Lt => BinaryOp::Lt,
            Token::LtEq => BinaryOp::LtEq,
            Token::Gt => BinaryOp::Gt,
            Token::GtEq => BinaryOp::GtEq,
            _ => return Ok(left),
        };
        self.advance();
        let right = self.parse_unary_expr()?;
        if matches!(
            self.current(),
            Token::EqEq | Token::NotEq | Token::Lt | Token::LtEq | Token::Gt | Token::GtEq
        ) {
            return Err(self.error("comparison operators cannot be chained".into()));
        }
        Ok(Expr::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        })
    }

    fn parse_unary_expr(&mut self) -> Result<Expr> {
        match self.current() {
            Token::Bang => {
                self.advance();
                let expr = self.parse_unary_expr()?;
                Ok(Expr::Not(Box::new(expr)))
            }
            Token::Minus => {
                self.advance();
                match self.current().clone() {
                    Token::IntegerLiteral(n) => {
                        self.advance();
                        Ok(Expr::Literal(Value::Integer(-n)))
                    }
                    Token::RealLiteral(n) => {
                        self.advance();
                        Ok(Expr::Literal(Value::Real(-n)))
                    }
                    other => Err(TemplateError::expression(
                        ErrorCode::MalformedLiteral,
                        self.source,
                        format!("`-` must be followed by a number, got {other:?}"),
                    )),
                }
            }
            _ => self.parse_primary_expr(),
        }
    }

    fn parse_primary_expr(&mut self) -> Result<Expr> {
        let expr = match self.current().clone() {
            Token::IntegerLiteral(n) => Expr::Literal(Value::Integer(n)),
            Token::RealLiteral(n) => Expr::Literal(Value::Real(n)),
            Token::StringLiteral(s) => Expr::Literal(Value::Text(s)),
            Token::True => Expr::Literal(Value::Boolean(true)),
            Token::False => Expr::Literal(Value::Boolean(false)),
            Token::Null => Expr::Literal(Value::Null),
            Token::Path(path) => Expr::Path(path),
            Token::LeftParen => {
                self.advance();
                let expr = self.parse_or_expr()?;
                self.expect(&Token::RightParen)?;
                return Ok(expr);
            }
            other => {
                return Err(self.error(format!("expected an operand, got {other:?}")));
            }
        };
        self.advance();
        Ok(expr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(p: &str) -> Box<Expr> {
        Box::new(Expr::Path(p.into()))
    }

    fn lit(v: impl Into<Value>) -> Box<Expr> {
        Box::new(Expr::Literal(v.into()))
    }

    #[test]
    fn parse_simple_comparison() {
        let expr = parse_expression("name != null").unwrap();
        assert_eq!(
            expr,
            Expr::Binary {
                left: path("name"),
                op: BinaryOp::NotEq,
                right: lit(Value::Null),
            }
        );
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let expr = parse_expression("a || b && c").unwrap();
        assert_eq!(
            expr,
            Expr::Binary {
                left: path("a"),
                op: BinaryOp::Or,
                right: Box::new(Expr::Binary {
                    left: path("b"),
                    op: BinaryOp::And,
                    right: path("c"),
                }),
            }
        );
    }

    #[test]
    fn parentheses_override_precedence() {
        let expr = parse_expression("(a || b) && c").unwrap();
        let Expr::Binary { op, left, .. } = expr else {
            panic!("expected binary");
        };
        assert_eq!(op, BinaryOp::And);
        assert!(matches!(*left, Expr::Binary { op: BinaryOp::Or, .. }));
    }

    #[test]
    fn not_and_negative_numbers() {
        assert_eq!(parse_expression("!flag").unwrap(), Expr::Not(path("flag")));
        assert_eq!(
            parse_expression("x > -5").unwrap(),
            Expr::Binary {
                left: path("x"),
                op: BinaryOp::Gt,
                right: lit(-5i64),
            }
        );
    }

    #[test]
    fn bare_path() {
        let expr = parse_expression("order.customerName").unwrap();
        assert_eq!(expr.as_path(), Some("order.customerName"));
    }

    #[test]
    fn syntax_errors() {
        for input in ["", "   ", "a ==", "(a == b", "a == b == c", "a b", "&& a", "-x"] {
            assert!(parse_expression(input).is_err(), "{input:?} should fail");
        }
        let err = parse_expression("a ==").unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::ExpressionSyntax));
    }
}
