//! Runtime errors for the tinypas executor.
//!
//! Every error is fatal: the run stops and reports the category together
//! with the source line of the statement being executed (`line`).

use thiserror::Error;
use tinypas_common::{DecodeError, Opcode};

/// Errors that abort program execution.
///
/// The first group are the program's own faults. The rest signal a
/// malformed code stream, which the builder never produces.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// `div`, `mod` or `/` with a zero divisor.
    #[error("division by zero at line {line}")]
    DivisionByZero { line: u32 },

    /// Subrange or enumeration store, array subscript, or `pred`/`succ`
    /// result outside the declared bounds.
    #[error("value {value} out of range {min}..{max} at line {line}")]
    ValueOutOfRange {
        value: i64,
        min: i64,
        max: i64,
        line: u32,
    },

    /// CASE selector matches no label.
    #[error("invalid case value {value} at line {line}")]
    InvalidCaseValue { value: i32, line: u32 },

    /// `ln` of a non-positive or `sqrt` of a negative number.
    #[error("invalid argument to {function} at line {line}")]
    InvalidFunctionArgument { function: &'static str, line: u32 },

    /// Value stack or call depth limit exceeded.
    #[error("stack overflow at line {line}")]
    StackOverflow { line: u32 },

    /// `read` found no number where one was required.
    #[error("invalid numeric input at line {line}")]
    InvalidInput { line: u32 },

    #[error("i/o error at line {line}: {message}")]
    Io { message: String, line: u32 },

    #[error("stack underflow at line {line}")]
    StackUnderflow { line: u32 },

    #[error("corrupt code at line {line}: {source}")]
    Decode { source: DecodeError, line: u32 },

    #[error("unexpected {opcode:?} at line {line}")]
    UnexpectedOpcode { opcode: Opcode, line: u32 },

    /// A stack item did not carry the tag the code stream called for.
    #[error("type mismatch at line {line}")]
    TypeMismatch { line: u32 },

    /// Load or store through an address that names no live storage.
    #[error("invalid address at line {line}")]
    InvalidAddress { line: u32 },
}

impl RuntimeError {
    /// Source line of the statement that failed.
    pub fn line(&self) -> u32 {
        match self {
            RuntimeError::DivisionByZero { line }
            | RuntimeError::ValueOutOfRange { line, .. }
            | RuntimeError::InvalidCaseValue { line, .. }
            | RuntimeError::InvalidFunctionArgument { line, .. }
            | RuntimeError::StackOverflow { line }
            | RuntimeError::InvalidInput { line }
            | RuntimeError::Io { line, .. }
            | RuntimeError::StackUnderflow { line }
            | RuntimeError::Decode { line, .. }
            | RuntimeError::UnexpectedOpcode { line, .. }
            | RuntimeError::TypeMismatch { line }
            | RuntimeError::InvalidAddress { line } => *line,
        }
    }
}
