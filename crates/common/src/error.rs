//! Errors raised while encoding, decoding and declaring intermediate code.

use thiserror::Error;

/// Errors that occur while reading a code segment.
///
/// A finalized segment produced by the emitter never triggers these; they
/// signal a corrupted or hand-built stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Byte does not name any opcode.
    #[error("unknown opcode: {0:#04x}")]
    UnknownOpcode(u8),

    /// An opcode or inline operand extends past the end of the segment.
    #[error("unexpected end of segment at offset {at}")]
    UnexpectedEnd { at: usize },

    /// A seek target lies outside the segment.
    #[error("seek to offset {target} outside segment of length {len}")]
    SeekOutOfRange { target: usize, len: usize },

    /// A node handle that does not refer to a symbol entry.
    #[error("dangling node handle #{0}")]
    DanglingNode(u32),
}

/// Errors that occur while emitting a code segment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EmitError {
    /// A location marker was emitted but never fixed up.
    #[error("location marker at offset {at} was never fixed up")]
    UnresolvedMarker { at: usize },

    /// A fixup was requested for a position that holds no pending marker.
    #[error("no pending location marker at offset {at}")]
    NotAMarker { at: usize },

    /// The segment outgrew the 32-bit location space.
    #[error("code segment exceeds {max} bytes")]
    SegmentTooLarge { max: usize },
}

/// Errors from the scoped symbol table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SymbolError {
    /// The name is already declared in the innermost scope.
    #[error("'{name}' is already declared in this scope")]
    Redeclared { name: String },

    /// Attempt to exit the predefined (outermost) scope.
    #[error("cannot exit the predefined scope")]
    ScopeUnderflow,
}
