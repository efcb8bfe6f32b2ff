//! The zman formula language.
//!
//! Formulas are parsed once into a closed [`Expression`] tree; every function, primitive, direction
//! and day-frame name is resolved while parsing, so an unknown name is a located [`SyntaxError`]
//! rather than an evaluation-time surprise.
//!
//! ```text
//! sunrise                                   visible sunrise at sea level
//! solar(16.1, before_sunrise)               sun 16.1° below the horizon, morning
//! proportional_hours(3, mga)                end of the third proportional hour, MGA day
//! @alos_hashachar + 1h 30min                another zman of the batch, plus a duration
//! max(@plag, sunset - 90min)                the later of two times
//! if (month >= 5 && month <= 8) { solar(8.5, after_sunset) } else { sunset + 40min }
//! ```
//!
//! # Example
//! ```
//! use zmanim_engine::formula::{self, Expression, Primitive};
//!
//! let expr = formula::parse("sunset - 18min").unwrap();
//! assert!(expr.references().is_empty());
//!
//! let err = formula::parse("solar(95, before_sunrise)").unwrap_err();
//! assert_eq!((err.position.line, err.position.column), (1, 7));
//! # let _ = Expression::Primitive(Primitive::Sunrise);
//! ```

mod ast;
mod lexer;
mod parser;

pub use ast::{
    BinaryOp, CalendarField, Comparison, Condition, DayFrame, Expression, ExtremumKind, Operand,
    Primitive, ValueKind,
};
pub use parser::{MAX_NESTING_DEPTH, parse};

use core::fmt;
use thiserror::Error;

/// One-based line and column in formula source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Position {
    /// Line, starting at 1.
    pub line: u32,
    /// Column in characters, starting at 1.
    pub column: u32,
}

impl Position {
    /// Creates a position.
    #[must_use]
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// What went wrong while parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyntaxErrorKind {
    /// A character that starts no token.
    UnexpectedCharacter,
    /// A token that does not fit the grammar here.
    UnexpectedToken,
    /// `/*` without `*/`.
    UnterminatedComment,
    /// `"` without a closing quote on the same line.
    UnterminatedString,
    /// A function call missing its closing parenthesis.
    UnterminatedCall,
    /// Unknown function, primitive, direction, day frame, field or season.
    UnknownIdentifier,
    /// Wrong number of arguments.
    Arity,
    /// Literal outside its documented range.
    OutOfRange,
    /// Duration with an unknown unit suffix.
    InvalidUnit,
    /// Operands or branches of incompatible types.
    TypeMismatch,
    /// Nesting or operator chains deeper than [`MAX_NESTING_DEPTH`].
    TooDeep,
}

impl SyntaxErrorKind {
    /// Argument-count and literal-range problems, reported separately from grammar errors.
    #[must_use]
    pub const fn is_arity_or_range(self) -> bool {
        matches!(self, Self::Arity | Self::OutOfRange | Self::InvalidUnit)
    }
}

/// A located parse failure, surfaced verbatim to the formula author.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{position}: {message}")]
pub struct SyntaxError {
    /// Failure category.
    pub kind: SyntaxErrorKind,
    /// Human readable description.
    pub message: String,
    /// Where the offending token starts.
    pub position: Position,
}

impl SyntaxError {
    /// Creates a syntax error.
    #[must_use]
    pub fn new(kind: SyntaxErrorKind, message: impl Into<String>, position: Position) -> Self {
        Self {
            kind,
            message: message.into(),
            position,
        }
    }
}
