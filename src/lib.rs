//! # twoway
//!
//! A two-way SQL templating engine. Templates are plain SQL that stays
//! executable on its own, annotated with comment directives:
//!
//! - `/*name*/'dummy'` binds `name` through a `?` placeholder
//! - `/*#name*/` splices `name` into the SQL as raw text
//! - `/*%if cond*/ ... --elseif cond-- ... --else ... /*%end*/` selects a branch
//!
//! Clauses such as `WHERE` or `ORDER BY` whose body ends up empty are dropped,
//! and a dangling leading `AND`/`OR` left by a skipped branch is removed.
//!
//! ```
//! use twoway::Environment;
//!
//! let node = twoway::parse(
//!     "select * from emp where /*%if name != null*/ename = /*name*/'x'/*%end*/",
//! ).unwrap();
//!
//! let env = Environment::new().with("name", "hoge");
//! let sql = twoway::build(&node, &env).unwrap();
//! assert_eq!(sql.raw_sql, "select * from emp where ename = ?");
//! assert_eq!(sql.formatted_sql, "select * from emp where ename = 'hoge'");
//!
//! let env = Environment::new().with("name", twoway::Value::Null);
//! assert_eq!(twoway::build(&node, &env).unwrap().raw_sql, "select * from emp");
//! ```

pub mod error;
pub mod types;
pub mod expr;
pub mod template;
pub mod builder;

pub use builder::{Parameter, PreparedSql, PreparedSqlBuilder};
pub use error::{ErrorCode, Position, Result, TemplateError};
pub use expr::Expression;
pub use template::Node;
pub use types::{Environment, LiteralFormatter, StandardFormatter, Value};

use std::path::Path;

/// Parse a template into an immutable syntax tree.
pub fn parse(source: &str) -> Result<Node> {
    template::Parser::parse(source)
}

/// Read and parse a template file.
pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<Node> {
    let source = std::fs::read_to_string(path.as_ref())?;
    parse(&source)
}

/// Build a parsed template against `env` with the standard literal formatter.
pub fn build(node: &Node, env: &Environment) -> Result<PreparedSql> {
    PreparedSqlBuilder::new(env).build(node)
}
