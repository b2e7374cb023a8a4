//! Unified error handling for the template engine.
//!
//! This module defines [`TemplateError`], the single error type propagated
//! through every stage of the engine: tokenizing and parsing a template,
//! evaluating directive expressions, and building prepared SQL.
//!
//! A convenience [`Result<T>`] type alias is re-exported so that callers can
//! write `Result<T>` instead of `std::result::Result<T, TemplateError>`.

use std::fmt;
use std::io;

use thiserror::Error;

/// A location inside template source text.
///
/// `offset` is a byte offset; `line` and `column` are 1-based and count
/// characters, not bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub offset: usize,
    pub line: u32,
    pub column: u32,
}

impl Position {
    /// Compute the line/column of `offset` within `source`.
    ///
    /// Offsets past the end of the input are clamped to the end.
    pub fn locate(source: &str, offset: usize) -> Self {
        let offset = offset.min(source.len());
        let mut line = 1;
        let mut column = 1;
        for (i, ch) in source.char_indices() {
            if i >= offset {
                break;
            }
            if ch == '\n' {
                line += 1;
                column = 1;
            } else {
                column += 1;
            }
        }
        Position { offset, line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// Stable, machine-readable error codes.
///
/// The textual form of a code never changes once published, so callers may
/// match on it in logs or across process boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // -- syntax (TPL1xxx) ---------------------------------------------------
    UnterminatedBlockComment,
    UnterminatedStringLiteral,
    MissingBindLiteral,
    UnterminatedBindLiteral,
    EmptyVariableName,
    UnknownDirective,
    ElseIfWithoutIf,
    ElseWithoutIf,
    EndWithoutIf,
    UnterminatedIf,
    ElseIfAfterElse,
    ElseAfterElse,
    MissingCondition,

    // -- expression (TPL2xxx) -----------------------------------------------
    ExpressionSyntax,
    MalformedLiteral,
    UndefinedIdentifier,
    TypeMismatch,
    NonBooleanCondition,
    UnbindableValue,

    // -- security (TPL3xxx) -------------------------------------------------
    EmbeddedSingleQuote,
    EmbeddedSemicolon,
    EmbeddedComment,

    // -- environment (TPL4xxx) ----------------------------------------------
    UnboundVariable,
    InvalidEnvironment,
}

impl ErrorCode {
    /// The stable textual form of this code.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::UnterminatedBlockComment => "TPL1001",
            ErrorCode::UnterminatedStringLiteral => "TPL1002",
            ErrorCode::MissingBindLiteral => "TPL1003",
            ErrorCode::UnterminatedBindLiteral => "TPL1004",
            ErrorCode::EmptyVariableName => "TPL1005",
            ErrorCode::UnknownDirective => "TPL1006",
            ErrorCode::ElseIfWithoutIf => "TPL1101",
            ErrorCode::ElseWithoutIf => "TPL1102",
            ErrorCode::EndWithoutIf => "TPL1103",
            ErrorCode::UnterminatedIf => "TPL1104",
            ErrorCode::ElseIfAfterElse => "TPL1105",
            ErrorCode::ElseAfterElse => "TPL1106",
            ErrorCode::MissingCondition => "TPL1107",
            ErrorCode::ExpressionSyntax => "TPL2001",
            ErrorCode::MalformedLiteral => "TPL2002",
            ErrorCode::UndefinedIdentifier => "TPL2003",
            ErrorCode::TypeMismatch => "TPL2004",
            ErrorCode::NonBooleanCondition => "TPL2005",
            ErrorCode::UnbindableValue => "TPL2006",
            ErrorCode::EmbeddedSingleQuote => "TPL3001",
            ErrorCode::EmbeddedSemicolon => "TPL3002",
            ErrorCode::EmbeddedComment => "TPL3003",
            ErrorCode::UnboundVariable => "TPL4001",
            ErrorCode::InvalidEnvironment => "TPL4002",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The canonical error type for all template operations.
///
/// Variants are organised by the stage that detected the problem so callers
/// can match on the category without inspecting free-form strings. Every
/// variant except the I/O and JSON wrappers carries an [`ErrorCode`].
#[derive(Error, Debug)]
pub enum TemplateError {
    /// Malformed directive structure in the template text.
    #[error("[{code}] syntax error at {position}: {detail}")]
    Syntax {
        code: ErrorCode,
        position: Position,
        detail: String,
    },

    /// A directive expression could not be parsed or evaluated.
    ///
    /// `position` locates the marker holding the expression when the error
    /// was raised while parsing a template.
    #[error("[{code}] expression error in `{expression}`{}: {detail}", located(.position))]
    Expression {
        code: ErrorCode,
        expression: String,
        detail: String,
        position: Option<Position>,
    },

    /// An embedded-variable value would inject SQL structure.
    #[error("[{code}] embedded variable `{expression}` rejected: value {value:?} {}", security_reason(.code))]
    Security {
        code: ErrorCode,
        expression: String,
        value: String,
    },

    /// A bind or embedded variable is absent from the environment.
    #[error("[{}] variable not found in environment: {name}", ErrorCode::UnboundVariable)]
    Environment { name: String },

    /// An environment document was valid JSON but not an object.
    #[error("[{}] environment must be a JSON object, got {found}", ErrorCode::InvalidEnvironment)]
    InvalidEnvironment { found: &'static str },

    /// Reading a template or environment file failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// An environment document was not valid JSON.
    #[error("invalid environment JSON: {0}")]
    Json(#[from] serde_json::Error),
}

fn located(position: &Option<Position>) -> String {
    match position {
        Some(position) => format!(" at {position}"),
        None => String::new(),
    }
}

fn security_reason(code: &ErrorCode) -> &'static str {
    match code {
        ErrorCode::EmbeddedSingleQuote => "contains a single quote",
        ErrorCode::EmbeddedSemicolon => "contains a semicolon",
        ErrorCode::EmbeddedComment => "contains a SQL comment opener",
        _ => "is not safe to embed",
    }
}

impl TemplateError {
    pub(crate) fn syntax(code: ErrorCode, source: &str, offset: usize, detail: impl Into<String>) -> Self {
        TemplateError::Syntax {
            code,
            position: Position::locate(source, offset),
            detail: detail.into(),
        }
    }

    pub(crate) fn expression(code: ErrorCode, expression: &str, detail: impl Into<String>) -> Self {
        TemplateError::Expression {
            code,
            expression: expression.to_string(),
            detail: detail.into(),
            position: None,
        }
    }

    /// Attach the template position of the marker an expression error came
    /// from. Other errors are returned unchanged.
    pub(crate) fn at(self, source: &str, offset: usize) -> Self {
        match self {
            TemplateError::Expression { code, expression, detail, position: None } => {
                TemplateError::Expression {
                    code,
                    expression,
                    detail,
                    position: Some(Position::locate(source, offset)),
                }
            }
            other => other,
        }
    }

    /// The stable error code, if this error originated in the engine itself.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            TemplateError::Syntax { code, .. }
            | TemplateError::Expression { code, .. }
            | TemplateError::Security { code, .. } => Some(*code),
            TemplateError::Environment { .. } => Some(ErrorCode::UnboundVariable),
            TemplateError::InvalidEnvironment { .. } => Some(ErrorCode::InvalidEnvironment),
            TemplateError::Io(_) | TemplateError::Json(_) => None,
        }
    }

    /// The template position, for syntax errors and for expression errors
    /// raised while parsing a template.
    pub fn position(&self) -> Option<Position> {
        match self {
            TemplateError::Syntax { position, .. } => Some(*position),
            TemplateError::Expression { position, .. } => *position,
            _ => None,
        }
    }
}

/// A specialised [`Result`] type for template operations.
pub type Result<T> = std::result::Result<T, TemplateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locate_counts_lines_and_columns() {
        let src = "select *\nfrom aaa\nwhere x";
        assert_eq!(
            Position::locate(src, 0),
            Position { offset: 0, line: 1, column: 1 }
        );
        let pos = Position::locate(src, src.find("aaa").unwrap());
        assert_eq!((pos.line, pos.column), (2, 6));
        let pos = Position::locate(src, src.find("where").unwrap());
        assert_eq!((pos.line, pos.column), (3, 1));
    }

    #[test]
    fn locate_clamps_past_end() {
        let pos = Position::locate("abc", 99);
        assert_eq!(pos.offset, 3);
        assert_eq!((pos.line, pos.column), (1, 4));
    }

    #[test]
    fn display_messages_are_human_readable() {
        let cases: Vec<(TemplateError, &str)> = vec![
            (
                TemplateError::syntax(ErrorCode::EndWithoutIf, "a\n/*%end*/", 2, "no open block"),
                "[TPL1103] syntax error at line 2, column 1: no open block",
            ),
            (
                TemplateError::expression(ErrorCode::UndefinedIdentifier, "a == b", "`b` is not defined"),
                "[TPL2003] expression error in `a == b`: `b` is not defined",
            ),
            (
                TemplateError::Security {
                    code: ErrorCode::EmbeddedSemicolon,
                    expression: "orderBy".into(),
                    value: "a;b".into(),
                },
                "[TPL3002] embedded variable `orderBy` rejected: value \"a;b\" contains a semicolon",
            ),
            (
                TemplateError::Environment { name: "name".into() },
                "[TPL4001] variable not found in environment: name",
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.to_string(), expected);
        }
    }

    #[test]
    fn codes_are_exposed() {
        let err = TemplateError::Environment { name: "x".into() };
        assert_eq!(err.code(), Some(ErrorCode::UnboundVariable));
        assert_eq!(err.code().unwrap().as_str(), "TPL4001");

        let io_err = TemplateError::from(io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert_eq!(io_err.code(), None);
        assert!(io_err.to_string().contains("gone"));
    }

    #[test]
    fn syntax_errors_carry_position() {
        let err = TemplateError::syntax(ErrorCode::UnknownDirective, "ab\ncd", 4, "x");
        let pos = err.position().unwrap();
        assert_eq!((pos.line, pos.column), (2, 2));
        assert!(TemplateError::Environment { name: "x".into() }.position().is_none());
    }

    #[test]
    fn expression_errors_can_be_located() {
        let err = TemplateError::expression(ErrorCode::ExpressionSyntax, "a ==", "expected an operand");
        assert!(err.position().is_none());

        let err = err.at("select 1\nwhere /*%if a ==*/", 15);
        let pos = err.position().unwrap();
        assert_eq!((pos.line, pos.column), (2, 7));
        assert_eq!(
            err.to_string(),
            "[TPL2001] expression error in `a ==` at line 2, column 7: expected an operand"
        );
    }

    #[test]
    fn invalid_environment_message() {
        let err = TemplateError::InvalidEnvironment { found: "array" };
        assert_eq!(err.code(), Some(ErrorCode::InvalidEnvironment));
        assert_eq!(err.to_string(), "[TPL4002] environment must be a JSON object, got array");
    }
}
