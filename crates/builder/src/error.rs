//! Error types for the tinypas code builder.

use thiserror::Error;
use tinypas_common::{EmitError, SymbolError};

/// Errors produced while declaring names or lowering statements.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error(transparent)]
    Emit(#[from] EmitError),

    #[error(transparent)]
    Symbol(#[from] SymbolError),

    /// A VAR parameter or read target was passed something other than a
    /// variable reference.
    #[error("argument to '{routine}' must be a variable")]
    ArgumentNotVariable { routine: String },

    #[error("'{routine}' expects {expected} argument(s), found {found}")]
    ArgumentCount {
        routine: String,
        expected: usize,
        found: usize,
    },

    /// Field width or precision on an argument outside write/writeln.
    #[error("'{routine}' does not accept field widths")]
    FormatNotAllowed { routine: String },

    #[error("'{name}' cannot be called as a {expected}")]
    NotCallable { name: String, expected: &'static str },

    /// A node handle that does not name an entry of this program.
    #[error("no symbol with handle {handle}")]
    UnknownSymbol { handle: u32 },

    #[error("cannot assign to '{name}'")]
    NotAssignable { name: String },

    /// `for` needs a variable of an ordinal type.
    #[error("'{name}' cannot control a for loop")]
    InvalidControl { name: String },

    #[error("empty string literal")]
    EmptyString,

    #[error("case label {label} appears more than once")]
    DuplicateCaseLabel { label: i32 },

    #[error("array index type has no bounds")]
    UnboundedIndex,

    #[error("record has no field '{name}'")]
    UnknownField { name: String },

    #[error("parameter '{name}' declared after a local variable")]
    ParameterAfterLocal { name: String },

    #[error("the program routine takes no parameters")]
    ProgramParameter,

    #[error("'{name}' already has a body")]
    BodyRedefined { name: String },

    #[error("'{name}' has no body")]
    MissingBody { name: String },

    #[error("no routine is open")]
    NoOpenRoutine,

    #[error("routine '{name}' is still open")]
    UnclosedRoutine { name: String },
}
