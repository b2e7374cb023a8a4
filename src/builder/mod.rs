//! # Prepared-SQL Builder
//!
//! Walks a parsed template against an [`Environment`] and produces a
//! [`PreparedSql`]: placeholder SQL for a parameterized-statement API, a
//! formatted SQL string with literals spliced in for logging, and the bound
//! parameters in placeholder order.
//!
//! Building never mutates the tree, so one parsed template may be built from
//! any number of threads at once, each with its own environment.

use std::borrow::Cow;

use serde::Serialize;

use crate::error::{ErrorCode, Result, TemplateError};
use crate::expr::{Evaluator, Expression};
use crate::template::{BindVariableNode, ClauseKind, ClauseNode, EmbeddedVariableNode, IfNode, Node};
use crate::types::{Environment, LiteralFormatter, StandardFormatter, Value};

/// A single bound parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Parameter {
    pub value: Value,
    /// 1-based position of the matching `?` in the raw SQL.
    pub index: usize,
    /// Byte offset of the bind marker in the template source.
    pub source_offset: usize,
}

/// The result of building a template.
///
/// The number of `?` placeholders in `raw_sql` always equals
/// `parameters.len()`, and the i-th placeholder binds `parameters[i]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreparedSql {
    pub raw_sql: String,
    pub formatted_sql: String,
    pub parameters: Vec<Parameter>,
}

impl PreparedSql {
    /// The parameter values in binding order.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.parameters.iter().map(|p| &p.value)
    }
}

/// Raw and formatted SQL accumulated in lock step.
#[derive(Default)]
struct Output {
    raw: String,
    formatted: String,
    parameters: Vec<(Value, usize)>,
}

impl Output {
    fn push_str(&mut self, text: &str) {
        self.raw.push_str(text);
        self.formatted.push_str(text);
    }

    /// Remove `range` from both buffers. The range must lie before the first
    /// substitution, where the two buffers still hold the same text.
    fn cut(&mut self, range: std::ops::Range<usize>) {
        self.raw.replace_range(range.clone(), "");
        self.formatted.replace_range(range, "");
    }

    fn append(&mut self, other: Output) {
        self.raw.push_str(&other.raw);
        self.formatted.push_str(&other.formatted);
        self.parameters.extend(other.parameters);
    }
}

/// Builds [`PreparedSql`] from parsed templates.
///
/// ```
/// use twoway::{Environment, PreparedSqlBuilder};
///
/// let node = twoway::parse("select * from emp where id = /*id*/1").unwrap();
/// let env = Environment::new().with("id", 7);
/// let sql = PreparedSqlBuilder::new(&env).build(&node).unwrap();
/// assert_eq!(sql.raw_sql, "select * from emp where id = ?");
/// assert_eq!(sql.formatted_sql, "select * from emp where id = 7");
/// ```
pub struct PreparedSqlBuilder<'a> {
    env: &'a Environment,
    formatter: &'a dyn LiteralFormatter,
}

impl<'a> PreparedSqlBuilder<'a> {
    pub fn new(env: &'a Environment) -> Self {
        PreparedSqlBuilder {
            env,
            formatter: &StandardFormatter,
        }
    }

    /// Use `formatter` to render literals in the formatted SQL.
    pub fn with_formatter(mut self, formatter: &'a dyn LiteralFormatter) -> Self {
        self.formatter = formatter;
        self
    }

    /// Build `node` against the environment. Any error aborts the whole
    /// build; no partial output is returned.
    pub fn build(&self, node: &Node) -> Result<PreparedSql> {
        let mut out = Output::default();
        self.visit(node, &mut out)?;

        let parameters: Vec<Parameter> = out
            .parameters
            .into_iter()
            .enumerate()
            .map(|(i, (value, source_offset))| Parameter {
                value,
                index: i + 1,
                source_offset,
            })
            .collect();
        tracing::debug!(parameters = parameters.len(), "built prepared SQL");

        Ok(PreparedSql {
            raw_sql: out.raw.trim().to_string(),
            formatted_sql: out.formatted.trim().to_string(),
            parameters,
        })
    }

    fn visit(&self, node: &Node, out: &mut Output) -> Result<()> {
        match node {
            Node::Root(children) => self.visit_all(children, out),
            Node::Text(text) => {
                out.push_str(text);
                Ok(())
            }
            Node::BindVariable(bind) => self.visit_bind(bind, out),
            Node::EmbeddedVariable(embedded) => self.visit_embedded(embedded, out),
            Node::Clause(clause) => self.visit_clause(clause, out),
            Node::If(node) => self.visit_if(node, out),
        }
    }

    fn visit_all(&self, nodes: &[Node], out: &mut Output) -> Result<()> {
        for node in nodes {
            self.visit(node, out)?;
        }
        Ok(())
    }

    /// A bare path resolves directly in the environment, so a missing name is
    /// an environment error; other expressions go through the evaluator.
    fn resolve<'e>(&self, expression: &'e Expression) -> Result<Cow<'e, Value>>
    where
        'a: 'e,
    {
        match expression.expr.as_path() {
            Some(path) => self
                .env
                .lookup(path)
                .map(Cow::Borrowed)
                .ok_or_else(|| TemplateError::Environment {
                    name: path.to_string(),
                }),
            None => Evaluator::new(self.env).evaluate(expression),
        }
    }

    fn visit_bind(&self, bind: &BindVariableNode, out: &mut Output) -> Result<()> {
        let value = self.resolve(&bind.expression)?;
        let unbindable = |value: &Value| {
            TemplateError::expression(
                ErrorCode::UnbindableValue,
                &bind.expression.source,
                format!("cannot bind a value of type {}", value.type_name()),
            )
        };

        if let Value::Object(_) = value.as_ref() {
            return Err(unbindable(value.as_ref()));
        }
        match value.elements() {
            Some([]) => {
                out.push_str("(NULL)");
                Ok(())
            }
            Some(items) => {
                out.raw.push('(');
                out.formatted.push('(');
                for (i, item) in items.iter().enumerate() {
                    if matches!(item, Value::List(_) | Value::Object(_)) {
                        return Err(unbindable(item));
                    }
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.bind_scalar(item.clone(), bind.offset, out);
                }
                out.raw.push(')');
                out.formatted.push(')');
                Ok(())
            }
            None => {
                self.bind_scalar(value.into_owned(), bind.offset, out);
                Ok(())
            }
        }
    }

    fn bind_scalar(&self, value: Value, offset: usize, out: &mut Output) {
        out.raw.push('?');
        self.formatter.format_literal(&value, &mut out.formatted);
        out.parameters.push((value, offset));
    }

    fn visit_embedded(&self, embedded: &EmbeddedVariableNode, out: &mut Output) -> Result<()> {
        let value = self.resolve(&embedded.expression)?;
        if matches!(value.as_ref(), Value::List(_) | Value::Object(_)) {
            return Err(TemplateError::expression(
                ErrorCode::UnbindableValue,
                &embedded.expression.source,
                format!("cannot embed a value of type {}", value.type_name()),
            ));
        }
        let text = value.to_string();
        check_embeddable(&embedded.expression.source, &text)?;
        out.push_str(&text);
        Ok(())
    }

    fn visit_clause(&self, clause: &ClauseNode, out: &mut Output) -> Result<()> {
        let mut body = Output::default();
        self.visit_all(&clause.children, &mut body)?;

        // Offsets are taken from the raw body. Everything before `content` is
        // template text, which both buffers hold identically.
        let start = skip_insignificant(&body.raw, 0);
        let connector = connector_len(&body.raw[start..]);
        let content = skip_insignificant(&body.raw, start + connector.unwrap_or(0));

        // FOR UPDATE is meaningful with an empty body.
        if clause.kind != ClauseKind::ForUpdate {
            if content == body.raw.len() {
                tracing::trace!(clause = %clause.kind, "pruned empty clause");
                return Ok(());
            }
            if starts_with_clause_keyword(&body.raw[content..]) {
                tracing::trace!(clause = %clause.kind, "pruned clause followed by another clause");
                body.cut(start..content);
                out.append(body);
                return Ok(());
            }
        }

        if let Some(len) = connector {
            let after = &body.raw[start + len..];
            let gap = after.len() - after.trim_start().len();
            tracing::trace!(clause = %clause.kind, "stripped leading connector");
            body.cut(start..start + len + gap);
        }

        out.push_str(&clause.keyword);
        if !body.raw.is_empty() && !body.raw.starts_with(char::is_whitespace) {
            out.push_str(" ");
        }
        out.append(body);
        Ok(())
    }

    fn visit_if(&self, node: &IfNode, out: &mut Output) -> Result<()> {
        let evaluator = Evaluator::new(self.env);
        for branch in &node.branches {
            let taken = match &branch.condition {
                Some(condition) => evaluator.evaluate_condition(condition)?,
                None => true,
            };
            if taken {
                return self.visit_all(&branch.children, out);
            }
        }
        Ok(())
    }
}

/// Reject embedded text that could change the statement's structure.
fn check_embeddable(expression: &str, text: &str) -> Result<()> {
    let code = if text.contains('\'') {
        ErrorCode::EmbeddedSingleQuote
    } else if text.contains(';') {
        ErrorCode::EmbeddedSemicolon
    } else if text.contains("--") || text.contains("/*") {
        ErrorCode::EmbeddedComment
    } else {
        return Ok(());
    };
    tracing::warn!(expression, code = %code, "rejected embedded variable value");
    Err(TemplateError::Security {
        code,
        expression: expression.to_string(),
        value: text.to_string(),
    })
}

const CONNECTORS: [&str; 2] = ["and", "or"];

/// Index of the first byte at or after `from` that is neither whitespace nor
/// inside a `--` or `/* */` comment.
fn skip_insignificant(text: &str, mut from: usize) -> usize {
    loop {
        let rest = &text[from..];
        let trimmed = rest.trim_start();
        from += rest.len() - trimmed.len();
        if trimmed.starts_with("--") {
            from = trimmed.find('\n').map_or(text.len(), |i| from + i + 1);
        } else if trimmed.starts_with("/*") {
            from = trimmed.find("*/").map_or(text.len(), |i| from + i + 2);
        } else {
            return from;
        }
    }
}

/// Length of the `AND`/`OR` that `text` starts with, if it is a whole word.
fn connector_len(text: &str) -> Option<usize> {
    CONNECTORS.iter().find_map(|connector| {
        let head = text.get(..connector.len())?;
        if !head.eq_ignore_ascii_case(connector) {
            return None;
        }
        let after = &text[connector.len()..];
        let delimited = match after.chars().next() {
            None | Some('(') => true,
            Some(c) => c.is_whitespace() || after.starts_with("--") || after.starts_with("/*"),
        };
        delimited.then_some(connector.len())
    })
}

fn leading_word(text: &str) -> &str {
    let end = text
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(text.len());
    &text[..end]
}

/// Whether `text` opens another clause or ends the statement's clause chain,
/// meaning the clause before it has no predicate of its own.
fn starts_with_clause_keyword(text: &str) -> bool {
    let word = leading_word(text);
    let second = || leading_word(text[word.len()..].trim_start());
    match word.to_ascii_lowercase().as_str() {
        "where" | "having" | "union" | "intersect" | "except" | "minus" | "limit" => true,
        "order" | "group" => second().eq_ignore_ascii_case("by"),
        "for" => second().eq_ignore_ascii_case("update"),
        _ => false,
    }
}

// ===========================================================================
// Tests
// ===========================================================================
