//! Expression evaluation against an [`Environment`].
//!
//! Comparison rules:
//! - `null` is equal only to `null`; ordering against `null` is an error.
//! - integers and reals compare numerically with each other.
//! - strings compare with strings, booleans with booleans.
//! - any other pairing is a type mismatch, never a silent `false`.

use std::borrow::Cow;
use std::cmp::Ordering;

use crate::error::{ErrorCode, Result, TemplateError};
use crate::expr::{BinaryOp, Expr, Expression};
use crate::types::{Environment, Value};

/// Evaluates expressions against a borrowed environment.
#[derive(Debug, Clone, Copy)]
pub struct Evaluator<'a> {
    env: &'a Environment,
}

impl<'a> Evaluator<'a> {
    pub fn new(env: &'a Environment) -> Self {
        Evaluator { env }
    }

    /// Evaluate `expression` to a value.
    pub fn evaluate<'e>(&self, expression: &'e Expression) -> Result<Cow<'e, Value>>
    where
        'a: 'e,
    {
        self.eval(&expression.expr, &expression.source)
    }

    /// Evaluate `expression` as a condition; the result must be a boolean.
    pub fn evaluate_condition(&self, expression: &Expression) -> Result<bool> {
        let value = self.evaluate(expression)?;
        value.as_bool().ok_or_else(|| {
            TemplateError::expression(
                ErrorCode::NonBooleanCondition,
                &expression.source,
                format!("condition evaluated to {} instead of boolean", value.type_name()),
            )
        })
    }

    fn eval<'e>(&self, expr: &'e Expr, source: &str) -> Result<Cow<'e, Value>>
    where
        'a: 'e,
    {
        match expr {
            Expr::Literal(value) => Ok(Cow::Borrowed(value)),
            Expr::Path(path) => self.env.lookup(path).map(Cow::Borrowed).ok_or_else(|| {
                TemplateError::expression(
                    ErrorCode::UndefinedIdentifier,
                    source,
                    format!("`{path}` is not defined"),
                )
            }),
            Expr::Not(inner) => {
                let b = self.eval_bool(inner, source, "!")?;
                Ok(Cow::Owned(Value::Boolean(!b)))
            }
            Expr::Binary { left, op: BinaryOp::And, right } => {
                let result = self.eval_bool(left, source, "&&")?
                    && self.eval_bool(right, source, "&&")?;
                Ok(Cow::Owned(Value::Boolean(result)))
            }
            Expr::Binary { left, op: BinaryOp::Or, right } => {
                let result = self.eval_bool(left, source, "||")?
                    || self.eval_bool(right, source, "||")?;
                Ok(Cow::Owned(Value::Boolean(result)))
            }
            Expr::Binary { left, op, right } => {
                let l = self.eval(left, source)?;
                let r = self.eval(right, source)?;
                let result = compare(*op, &l, &r, source)?;
                Ok(Cow::Owned(Value::Boolean(result)))
            }
        }
    }

    fn eval_bool(&self, expr: &Expr, source: &str, op: &str) -> Result<bool> {
        let value = self.eval(expr, source)?;
        value.as_bool().ok_or_else(|| {
            TemplateError::expression(
                ErrorCode::TypeMismatch,
                source,
                format!("operand of `{op}` must be boolean, got {}", value.type_name()),
            )
        })
    }
}

fn compare(op: BinaryOp, left: &Value, right: &Value, source: &str) -> Result<bool> {
    let mismatch = || {
        TemplateError::expression(
            ErrorCode::TypeMismatch,
            source,
            format!(
                "cannot apply `{op}` to {} and {}",
                left.type_name(),
                right.type_name()
            ),
        )
    };

    if left.is_null() || right.is_null() {
        return match op {
            BinaryOp::Eq => Ok(left.is_null() && right.is_null()),
            BinaryOp::NotEq => Ok(!(left.is_null() && right.is_null())),
            _ => Err(mismatch()),
        };
    }

    let ordering: Option<Ordering> = match (left, right) {
        (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
        (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
        (Value::Boolean(a), Value::Boolean(b)) => {
            return match op {
                BinaryOp::Eq => Ok(a == b),
                BinaryOp::NotEq => Ok(a != b),
                _ => Err(mismatch()),
            };
        }
        (Value::List(_), Value::List(_)) | (Value::Object(_), Value::Object(_)) => {
            return match op {
                BinaryOp::Eq => Ok(left == right),
                BinaryOp::NotEq => Ok(left != right),
                _ => Err(mismatch()),
            };
        }
        _ => match (left.as_number(), right.as_number()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => return Err(mismatch()),
        },
    };

    // NaN compares unordered: unequal to everything, never less or greater.
    let Some(ordering) = ordering else {
        return Ok(op == BinaryOp::NotEq);
    };
    Ok(match op {
        BinaryOp::Eq => ordering == Ordering::Equal,
        BinaryOp::NotEq => ordering != Ordering::Equal,
        BinaryOp::Lt => ordering == Ordering::Less,
        BinaryOp::LtEq => ordering != Ordering::Greater,
        BinaryOp::Gt => ordering == Ordering::Greater,
        BinaryOp::GtEq => ordering != Ordering::Less,
        BinaryOp::And | BinaryOp::Or => unreachable!("logical operators are evaluated by Evaluator::eval"),
    })
}
