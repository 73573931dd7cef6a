//! tinypas common types and intermediate-code encoding.
//!
//! This crate provides the data structures shared by the code builder and
//! the executor:
//!
//! - [`StackItem`] / [`Address`]: runtime values on the executor's stack
//! - [`Opcode`]: the token codes of the intermediate code
//! - [`TypeDescriptor`] / [`SymbolEntry`]: types and declared names
//! - [`SymbolTable`]: arena of entries and types with scoped lookup
//! - [`CodeBuffer`]: emission with back-patched location markers
//! - [`Cursor`]: opcode-driven decoding of a finalized [`CodeSegment`]
//! - [`Program`]: the compiled program handed to the executor

pub mod decoder;
pub mod encoder;
pub mod error;
pub mod opcode;
pub mod program;
pub mod segment;
pub mod symbol;
pub mod symtab;
pub mod types;
pub mod value;

// Re-export commonly used types at the crate root.
pub use decoder::Cursor;
pub use encoder::{CodeBuffer, MarkerPosition};
pub use error::{DecodeError, EmitError, SymbolError};
pub use opcode::{Opcode, Operand};
pub use program::Program;
pub use segment::CodeSegment;
pub use symbol::{
    ConstantValue, Definition, NodeId, Routine, RoutineBody, StandardRoutine, SymbolEntry,
    FRAME_HEADER_SLOTS,
};
pub use symtab::{Predefined, SymbolTable};
pub use types::{ScalarKind, ScalarRepr, TypeDescriptor, TypeForm, TypeId};
pub use value::{Address, StackItem};

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    /// A unit the emitter can append between a marker and its fixup.
    #[derive(Debug, Clone)]
    enum Unit {
        Op(Opcode),
        Integer(i32),
        Real(f64),
        Node(u32),
    }

    fn arb_unit() -> impl Strategy<Value = Unit> {
        prop_oneof![
            prop::sample::select(&opcode::ALL_OPCODES[..]).prop_map(Unit::Op),
            any::<i32>().prop_map(Unit::Integer),
            any::<f64>().prop_map(Unit::Real),
            any::<u32>().prop_map(Unit::Node),
        ]
    }

    fn emit(buffer: &mut CodeBuffer, unit: &Unit) {
        match unit {
            Unit::Op(op) => buffer.emit_opcode(*op),
            Unit::Integer(v) => buffer.emit_integer(*v),
            Unit::Real(v) => buffer.emit_real(*v),
            Unit::Node(n) => buffer.emit_node(NodeId(*n)),
        }
    }

    proptest! {
        /// However much is emitted between a marker and its fixup, the
        /// decoded target is the offset of the first unit emitted after it.
        #[test]
        fn marker_targets_next_unit(
            before in prop::collection::vec(arb_unit(), 0..20),
            between in prop::collection::vec(arb_unit(), 0..20),
        ) {
            let mut buffer = CodeBuffer::new();
            for unit in &before {
                emit(&mut buffer, unit);
            }
            let marker = buffer.emit_marker();
            for unit in &between {
                emit(&mut buffer, unit);
            }
            let expected = buffer.position();
            buffer.fixup_marker(marker).unwrap();
            buffer.emit_opcode(Opcode::End);
            let segment = buffer.finalize().unwrap();

            let mut cursor = Cursor::new(&segment);
            cursor.seek(marker.offset()).unwrap();
            let target = cursor.read_location().unwrap();
            prop_assert_eq!(target, expected);
            cursor.seek(target).unwrap();
            prop_assert_eq!(cursor.advance().unwrap(), Opcode::End);
        }
    }
}
