//! Typed values and the evaluation environment.
//!
//! This module provides:
//! - [`Value`]: the runtime value bound to template variables. It exposes the
//!   value to bind as a statement parameter, whether it is a multi-valued
//!   collection (for `IN (...)` expansion), and nested properties for dotted
//!   path lookup.
//! - [`LiteralFormatter`]: renders a value as a SQL literal for the
//!   human-readable formatted SQL. [`StandardFormatter`] is the canonical
//!   renderer.
//! - [`Environment`]: the immutable name → value mapping a template is built
//!   against.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::Serialize;

use crate::error::{Result, TemplateError};

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// A dynamically-typed template value.
///
/// | Variant   | Bound as               | Formatted as                 |
/// |-----------|------------------------|------------------------------|
/// | `Null`    | SQL NULL               | `NULL`                       |
/// | `Boolean` | boolean                | `TRUE` / `FALSE`             |
/// | `Integer` | 64-bit integer         | decimal digits               |
/// | `Real`    | 64-bit float           | locale-free decimal          |
/// | `Text`    | string                 | `'...'` with `'` doubled     |
/// | `List`    | one parameter per item | `(a, b, ...)`                |
/// | `Object`  | not bindable           | not bindable                 |
///
/// `Object` exists so that dotted property paths such as `order.customer`
/// can be resolved against structured values.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    Text(String),
    List(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

impl Value {
    /// Returns `true` if this value is [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The elements of a multi-valued value, or `None` for scalars.
    pub fn elements(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    /// Look up a named property of a structured value.
    pub fn property(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Object(fields) => fields.get(name),
            _ => None,
        }
    }

    /// A short type name for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::Text(_) => "string",
            Value::List(_) => "list",
            Value::Object(_) => "object",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Numeric view used by comparisons; integers widen to `f64`.
    pub(crate) fn as_number(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Real(r) => Some(*r),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    /// Plain, unquoted text form: what an embedded variable splices.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Real(r) => write!(f, "{r}"),
            Value::Text(s) => f.write_str(s),
            Value::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
            Value::Object(_) => f.write_str("[object]"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i64::from(i))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(r: f64) -> Self {
        Value::Real(r)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Value::Null, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Value::Real(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Text(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(fields) => Value::Object(
                fields.into_iter().map(|(k, v)| (k, Value::from(v))).collect(),
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Literal formatting
// ---------------------------------------------------------------------------

/// Renders values as SQL literals for the formatted (log) SQL.
///
/// Implementations only affect the human-readable output; the placeholder SQL
/// and the bound parameters are independent of the formatter.
pub trait LiteralFormatter {
    /// Append the literal rendering of a scalar `value` to `out`.
    fn format_literal(&self, value: &Value, out: &mut String);
}

/// The canonical literal renderer.
///
/// `null` becomes `NULL`, numbers are written in locale-free decimal form,
/// booleans as `TRUE`/`FALSE`, and strings are single-quoted with embedded
/// single quotes doubled.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardFormatter;

impl LiteralFormatter for StandardFormatter {
    fn format_literal(&self, value: &Value, out: &mut String) {
        use std::fmt::Write;

        match value {
            Value::Null => out.push_str("NULL"),
            Value::Boolean(true) => out.push_str("TRUE"),
            Value::Boolean(false) => out.push_str("FALSE"),
            Value::Integer(i) => {
                let _ = write!(out, "{i}");
            }
            Value::Real(r) => {
                let _ = write!(out, "{r}");
            }
            Value::Text(s) => {
                out.push('\'');
                for ch in s.chars() {
                    if ch == '\'' {
                        out.push('\'');
                    }
                    out.push(ch);
                }
                out.push('\'');
            }
            Value::List(items) => {
                out.push('(');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.format_literal(item, out);
                }
                out.push(')');
            }
            Value::Object(_) => out.push_str("NULL"),
        }
    }
}

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

/// An immutable name → value mapping supplied per build.
///
/// Names may themselves be dotted (`order.customerName`), and lookups also
/// descend into [`Value::Object`] properties, so both of these resolve
/// `order.customerName`:
///
/// ```
/// use twoway::{Environment, Value};
///
/// let flat = Environment::new().with("order.customerName", "Alice");
/// assert_eq!(flat.lookup("order.customerName"), Some(&Value::from("Alice")));
///
/// let nested = Environment::from_json_str(r#"{"order": {"customerName": "Alice"}}"#).unwrap();
/// assert_eq!(nested.lookup("order.customerName"), Some(&Value::from("Alice")));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Environment {
    vars: HashMap<String, Value>,
}

impl Environment {
    pub fn new() -> Self {
        Environment::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.vars.insert(name.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Build an environment from a JSON object; each top-level key becomes a
    /// variable. Any other JSON document is an error.
    pub fn from_json(json: serde_json::Value) -> Result<Self> {
        let fields = match json {
            serde_json::Value::Object(fields) => fields,
            other => {
                return Err(TemplateError::InvalidEnvironment {
                    found: Value::from(other).type_name(),
                });
            }
        };
        let vars = fields
            .into_iter()
            .map(|(k, v)| (k, Value::from(v)))
            .collect();
        Ok(Environment { vars })
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let json: serde_json::Value = serde_json::from_str(text)?;
        Environment::from_json(json)
    }

    /// Resolve a dotted property path.
    ///
    /// The longest dotted prefix present as a variable name wins; remaining
    /// segments are resolved as properties of that value.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        if let Some(value) = self.vars.get(path) {
            return Some(value);
        }
        let mut split = path.len();
        while let Some(dot) = path[..split].rfind('.') {
            if let Some(root) = self.vars.get(&path[..dot]) {
                return path[dot + 1..]
                    .split('.')
                    .try_fold(root, |value, segment| value.property(segment));
            }
            split = dot;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn literal(value: &Value) -> String {
        let mut out = String::new();
        StandardFormatter.format_literal(value, &mut out);
        out
    }

    #[test]
    fn canonical_literals() {
        assert_eq!(literal(&Value::Null), "NULL");
        assert_eq!(literal(&Value::Integer(10000)), "10000");
        assert_eq!(literal(&Value::Integer(-2000)), "-2000");
        assert_eq!(literal(&Value::Real(1.5)), "1.5");
        assert_eq!(literal(&Value::Real(10000.0)), "10000");
        assert_eq!(literal(&Value::Boolean(true)), "TRUE");
        assert_eq!(literal(&Value::from("hoge")), "'hoge'");
        assert_eq!(literal(&Value::from("it's")), "'it''s'");
        assert_eq!(literal(&Value::from("")), "''");
    }

    #[test]
    fn list_literal_uses_element_rendering() {
        let v = Value::from(vec!["hoge", "foo"]);
        assert_eq!(literal(&v), "('hoge', 'foo')");
        assert_eq!(v.elements().map(<[Value]>::len), Some(2));
        assert!(Value::Integer(1).elements().is_none());
    }

    #[test]
    fn display_is_unquoted() {
        assert_eq!(Value::from("order by name").to_string(), "order by name");
        assert_eq!(Value::Null.to_string(), "");
        assert_eq!(Value::Integer(3).to_string(), "3");
    }

    #[test]
    fn option_converts_to_null() {
        assert_eq!(Value::from(None::<&str>), Value::Null);
        assert_eq!(Value::from(Some(5)), Value::Integer(5));
    }

    #[test]
    fn lookup_flat_dotted_name() {
        let env = Environment::new().with("order.customerName", "Alice");
        assert_eq!(env.lookup("order.customerName"), Some(&Value::from("Alice")));
        assert_eq!(env.lookup("order"), None);
    }

    #[test]
    fn lookup_nested_property() {
        let env = Environment::from_json_str(
            r#"{"order": {"customer": {"name": "Bob"}, "total": 12.5}}"#,
        )
        .unwrap();
        assert_eq!(env.lookup("order.customer.name"), Some(&Value::from("Bob")));
        assert_eq!(env.lookup("order.total"), Some(&Value::Real(12.5)));
        assert_eq!(env.lookup("order.missing"), None);
        assert_eq!(env.lookup("order.total.deeper"), None);
    }

    #[test]
    fn lookup_prefers_longest_prefix() {
        let env = Environment::new()
            .with("a", Value::Object(BTreeMap::from([("b".to_string(), Value::Integer(1))])))
            .with("a.b", 2);
        assert_eq!(env.lookup("a.b"), Some(&Value::Integer(2)));
    }

    #[test]
    fn json_conversion() {
        let env = Environment::from_json_str(r#"{"n": 1, "r": 2.5, "s": "x", "l": [1, 2], "z": null, "t": true}"#)
            .unwrap();
        assert_eq!(env.len(), 6);
        assert_eq!(env.lookup("n"), Some(&Value::Integer(1)));
        assert_eq!(env.lookup("r"), Some(&Value::Real(2.5)));
        assert_eq!(env.lookup("l"), Some(&Value::List(vec![Value::Integer(1), Value::Integer(2)])));
        assert_eq!(env.lookup("z"), Some(&Value::Null));
        assert_eq!(env.lookup("t"), Some(&Value::Boolean(true)));
    }

    #[test]
    fn invalid_json_is_an_error() {
        assert!(Environment::from_json_str("{not json").is_err());
        let err = Environment::from_json(serde_json::json!([1, 2])).unwrap_err();
        assert!(matches!(err, TemplateError::InvalidEnvironment { found: "list" }));
        let err = Environment::from_json_str("42").unwrap_err();
        assert!(matches!(err, TemplateError::InvalidEnvironment { found: "integer" }));
    }
}
