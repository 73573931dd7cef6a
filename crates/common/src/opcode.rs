//! Opcode definitions for the intermediate code.
//!
//! The intermediate code is a crunched token stream: statements and
//! expressions are laid out in source order, and the executor re-walks them
//! with the same precedence grammar the parser used. Some opcodes are
//! followed by an inline operand (see [`Operand`]).

use crate::error::DecodeError;

/// One opcode unit of a code segment.
///
/// The `#[repr(u8)]` attribute gives each variant a stable byte value.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // Operand carriers
    /// Statement start. Followed by a u32 source line number.
    Line = 0x01,
    /// Location marker. Followed by a u32 offset into the same segment.
    Marker = 0x02,
    /// Identifier. Followed by a u32 node handle.
    Identifier = 0x03,
    /// Integer literal. Followed by an i32.
    Integer = 0x04,
    /// Real literal. Followed by an f64.
    Real = 0x05,
    /// Character literal. Followed by one byte.
    Char = 0x06,
    /// String literal. Followed by the u32 handle of its constant entry.
    String = 0x07,

    // Operators
    Plus = 0x10,
    Minus = 0x11,
    Star = 0x12,
    Slash = 0x13,
    Div = 0x14,
    Mod = 0x15,
    And = 0x16,
    Or = 0x17,
    Not = 0x18,

    // Relational operators
    Equal = 0x20,
    NotEqual = 0x21,
    Less = 0x22,
    LessEqual = 0x23,
    Greater = 0x24,
    GreaterEqual = 0x25,

    // Punctuation
    LParen = 0x30,
    RParen = 0x31,
    LBracket = 0x32,
    RBracket = 0x33,
    Comma = 0x34,
    Period = 0x35,
    Colon = 0x36,
    ColonEqual = 0x37,
    Semicolon = 0x38,

    // Statement keywords
    Begin = 0x40,
    End = 0x41,
    If = 0x42,
    Then = 0x43,
    Else = 0x44,
    While = 0x45,
    Do = 0x46,
    Repeat = 0x47,
    Until = 0x48,
    For = 0x49,
    To = 0x4A,
    Downto = 0x4B,
    Case = 0x4C,
    Of = 0x4D,

    /// Sentinel appended when a segment is finalized.
    EndOfSegment = 0xFF,
}

/// The inline operand that follows an opcode, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    None,
    /// u32 source line.
    Line,
    /// u32 offset within the segment.
    Location,
    /// u32 symbol node handle.
    Node,
    /// i32 little-endian.
    Integer,
    /// f64 little-endian.
    Real,
    /// Single byte.
    Byte,
}

impl Operand {
    /// Width of the operand in bytes.
    pub fn width(self) -> usize {
        match self {
            Operand::None => 0,
            Operand::Byte => 1,
            Operand::Line | Operand::Location | Operand::Node | Operand::Integer => 4,
            Operand::Real => 8,
        }
    }
}

/// All opcodes, in definition order. Useful for exhaustive testing.
pub const ALL_OPCODES: [Opcode; 46] = [
    Opcode::Line,
    Opcode::Marker,
    Opcode::Identifier,
    Opcode::Integer,
    Opcode::Real,
    Opcode::Char,
    Opcode::String,
    Opcode::Plus,
    Opcode::Minus,
    Opcode::Star,
    Opcode::Slash,
    Opcode::Div,
    Opcode::Mod,
    Opcode::And,
    Opcode::Or,
    Opcode::Not,
    Opcode::Equal,
    Opcode::NotEqual,
    Opcode::Less,
    Opcode::LessEqual,
    Opcode::Greater,
    Opcode::GreaterEqual,
    Opcode::LParen,
    Opcode::RParen,
    Opcode::LBracket,
    Opcode::RBracket,
    Opcode::Comma,
    Opcode::Period,
    Opcode::Colon,
    Opcode::ColonEqual,
    Opcode::Semicolon,
    Opcode::Begin,
    Opcode::End,
    Opcode::If,
    Opcode::Then,
    Opcode::Else,
    Opcode::While,
    Opcode::Do,
    Opcode::Repeat,
    Opcode::Until,
    Opcode::For,
    Opcode::To,
    Opcode::Downto,
    Opcode::Case,
    Opcode::Of,
    Opcode::EndOfSegment,
];

impl TryFrom<u8> for Opcode {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        ALL_OPCODES
            .iter()
            .copied()
            .find(|&op| op as u8 == value)
            .ok_or(DecodeError::UnknownOpcode(value))
    }
}

impl Opcode {
    /// Returns the listing mnemonic for this opcode.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Opcode::Line => "LINE",
            Opcode::Marker => "MARKER",
            Opcode::Identifier => "IDENT",
            Opcode::Integer => "INT",
            Opcode::Real => "REAL",
            Opcode::Char => "CHAR",
            Opcode::String => "STRING",
            Opcode::Plus => "+",
            Opcode::Minus => "-",
            Opcode::Star => "*",
            Opcode::Slash => "/",
            Opcode::Div => "DIV",
            Opcode::Mod => "MOD",
            Opcode::And => "AND",
            Opcode::Or => "OR",
            Opcode::Not => "NOT",
            Opcode::Equal => "=",
            Opcode::NotEqual => "<>",
            Opcode::Less => "<",
            Opcode::LessEqual => "<=",
            Opcode::Greater => ">",
            Opcode::GreaterEqual => ">=",
            Opcode::LParen => "(",
            Opcode::RParen => ")",
            Opcode::LBracket => "[",
            Opcode::RBracket => "]",
            Opcode::Comma => ",",
            Opcode::Period => ".",
            Opcode::Colon => ":",
            Opcode::ColonEqual => ":=",
            Opcode::Semicolon => ";",
            Opcode::Begin => "BEGIN",
            Opcode::End => "END",
            Opcode::If => "IF",
            Opcode::Then => "THEN",
            Opcode::Else => "ELSE",
            Opcode::While => "WHILE",
            Opcode::Do => "DO",
            Opcode::Repeat => "REPEAT",
            Opcode::Until => "UNTIL",
            Opcode::For => "FOR",
            Opcode::To => "TO",
            Opcode::Downto => "DOWNTO",
            Opcode::Case => "CASE",
            Opcode::Of => "OF",
            Opcode::EndOfSegment => "END-OF-SEGMENT",
        }
    }

    /// The inline operand that follows this opcode in the stream.
    pub fn operand(&self) -> Operand {
        match self {
            Opcode::Line => Operand::Line,
            Opcode::Marker => Operand::Location,
            Opcode::Identifier | Opcode::String => Operand::Node,
            Opcode::Integer => Operand::Integer,
            Opcode::Real => Operand::Real,
            Opcode::Char => Operand::Byte,
            _ => Operand::None,
        }
    }

    /// True for `=`, `<>`, `<`, `<=`, `>`, `>=`.
    pub fn is_relational(&self) -> bool {
        matches!(
            self,
            Opcode::Equal
                | Opcode::NotEqual
                | Opcode::Less
                | Opcode::LessEqual
                | Opcode::Greater
                | Opcode::GreaterEqual
        )
    }

    /// True for `+`, `-`, `OR`.
    pub fn is_additive(&self) -> bool {
        matches!(self, Opcode::Plus | Opcode::Minus | Opcode::Or)
    }

    /// True for `*`, `/`, `DIV`, `MOD`, `AND`.
    pub fn is_multiplicative(&self) -> bool {
        matches!(
            self,
            Opcode::Star | Opcode::Slash | Opcode::Div | Opcode::Mod | Opcode::And
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DecodeError;

    #[test]
    fn roundtrip_all_valid_opcodes() {
        for &opcode in &ALL_OPCODES {
            let byte = opcode as u8;
            let decoded = Opcode::try_from(byte).unwrap();
            assert_eq!(
                opcode, decoded,
                "roundtrip failed for {opcode:?} ({byte:#04x})"
            );
        }
    }

    #[test]
    fn opcode_bytes_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for &opcode in &ALL_OPCODES {
            assert!(seen.insert(opcode as u8), "duplicate byte for {opcode:?}");
        }
    }

    #[test]
    fn zero_is_not_an_opcode() {
        assert_eq!(Opcode::try_from(0x00), Err(DecodeError::UnknownOpcode(0)));
    }

    #[test]
    fn gaps_are_rejected() {
        for byte in [0x08u8, 0x19, 0x26, 0x39, 0x4E, 0x80, 0xFE] {
            assert_eq!(
                Opcode::try_from(byte),
                Err(DecodeError::UnknownOpcode(byte)),
                "byte {byte:#04x} should be unknown"
            );
        }
    }

    #[test]
    fn operand_widths() {
        assert_eq!(Opcode::Identifier.operand().width(), 4);
        assert_eq!(Opcode::Real.operand().width(), 8);
        assert_eq!(Opcode::Char.operand().width(), 1);
        assert_eq!(Opcode::Begin.operand().width(), 0);
    }

    #[test]
    fn operator_classes_are_disjoint() {
        for &op in &ALL_OPCODES {
            let classes = [op.is_relational(), op.is_additive(), op.is_multiplicative()];
            assert!(
                classes.iter().filter(|&&c| c).count() <= 1,
                "{op:?} belongs to more than one operator class"
            );
        }
    }

    #[test]
    fn mnemonics_are_nonempty() {
        for &opcode in &ALL_OPCODES {
            assert!(!opcode.mnemonic().is_empty(), "empty mnemonic for {opcode:?}");
        }
    }
}
