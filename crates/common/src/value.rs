//! Runtime value representation for the executor's value stack.
//!
//! A stack item is a tagged sum: the emitter's untyped stream tells the
//! executor which arm to expect, and the accessors below check the tag
//! instead of reinterpreting memory.

use crate::symbol::NodeId;

/// A location that a stack item can point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Address {
    /// No frame (static/dynamic link of the program frame).
    Nil,
    /// A slot of the value stack. Frame links and scalar variables use these.
    Stack(usize),
    /// A byte offset inside a heap block holding array or record data.
    Heap { block: usize, offset: usize },
    /// A byte offset inside a string constant owned by the symbol table.
    Literal { node: NodeId, offset: usize },
    /// A resume point in a routine's code segment.
    Code { routine: NodeId, offset: usize },
}

impl Address {
    /// Advance a data address by `delta` bytes.
    ///
    /// Only heap and literal addresses are byte-addressed; stack slots and
    /// code addresses return `None`.
    pub fn offset_by(self, delta: usize) -> Option<Address> {
        match self {
            Address::Heap { block, offset } => Some(Address::Heap {
                block,
                offset: offset + delta,
            }),
            Address::Literal { node, offset } => Some(Address::Literal {
                node,
                offset: offset + delta,
            }),
            _ => None,
        }
    }
}

/// One slot of the runtime value stack.
#[derive(Debug, Clone, Copy)]
pub enum StackItem {
    /// Integer and enumeration values.
    Integer(i32),
    /// Real values.
    Real(f64),
    /// Characters and booleans.
    Byte(u8),
    /// Pointer to data, to another frame, or into code.
    Address(Address),
}

// Reals compare by bit pattern.
impl PartialEq for StackItem {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (StackItem::Integer(a), StackItem::Integer(b)) => a == b,
            (StackItem::Real(a), StackItem::Real(b)) => a.to_bits() == b.to_bits(),
            (StackItem::Byte(a), StackItem::Byte(b)) => a == b,
            (StackItem::Address(a), StackItem::Address(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for StackItem {}

impl StackItem {
    /// Boolean as stored on the stack: 0 or 1.
    pub fn boolean(value: bool) -> Self {
        StackItem::Byte(value as u8)
    }

    pub fn as_integer(&self) -> Option<i32> {
        match self {
            StackItem::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_real(&self) -> Option<f64> {
        match self {
            StackItem::Real(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_byte(&self) -> Option<u8> {
        match self {
            StackItem::Byte(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_address(&self) -> Option<Address> {
        match self {
            StackItem::Address(a) => Some(*a),
            _ => None,
        }
    }

    /// Ordinal value of an integer, enumeration, character or boolean.
    pub fn ordinal(&self) -> Option<i32> {
        match self {
            StackItem::Integer(v) => Some(*v),
            StackItem::Byte(v) => Some(i32::from(*v)),
            _ => None,
        }
    }

    /// Numeric value, promoting integers to real.
    pub fn numeric(&self) -> Option<f64> {
        match self {
            StackItem::Real(v) => Some(*v),
            StackItem::Integer(v) => Some(f64::from(*v)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_check_the_tag() {
        let item = StackItem::Integer(7);
        assert_eq!(item.as_integer(), Some(7));
        assert_eq!(item.as_real(), None);
        assert_eq!(item.as_byte(), None);
        assert_eq!(item.as_address(), None);
    }

    #[test]
    fn ordinal_covers_bytes_and_integers() {
        assert_eq!(StackItem::Byte(b'A').ordinal(), Some(65));
        assert_eq!(StackItem::Integer(-3).ordinal(), Some(-3));
        assert_eq!(StackItem::Real(1.0).ordinal(), None);
    }

    #[test]
    fn numeric_promotes_integers() {
        assert_eq!(StackItem::Integer(2).numeric(), Some(2.0));
        assert_eq!(StackItem::Real(2.5).numeric(), Some(2.5));
        assert_eq!(StackItem::Byte(1).numeric(), None);
    }

    #[test]
    fn boolean_constructor() {
        assert_eq!(StackItem::boolean(true), StackItem::Byte(1));
        assert_eq!(StackItem::boolean(false), StackItem::Byte(0));
    }

    #[test]
    fn real_equality_is_bitwise() {
        assert_eq!(StackItem::Real(f64::NAN), StackItem::Real(f64::NAN));
        assert_ne!(StackItem::Real(0.0), StackItem::Real(-0.0));
        assert_ne!(StackItem::Integer(1), StackItem::Byte(1));
    }

    #[test]
    fn heap_addresses_advance_by_bytes() {
        let base = Address::Heap { block: 2, offset: 4 };
        assert_eq!(
            base.offset_by(8),
            Some(Address::Heap { block: 2, offset: 12 })
        );
        assert_eq!(Address::Stack(3).offset_by(1), None);
        assert_eq!(Address::Nil.offset_by(1), None);
    }
}
