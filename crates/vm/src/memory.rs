//! Storage behind addresses: value stack slots, heap blocks for arrays and
//! records, and string constant bytes owned by the symbol table.
//!
//! Scalars inside a heap block are stored little-endian at the width their
//! type calls for ([`ScalarRepr`]).

use tinypas_common::{
    Address, ConstantValue, Definition, NodeId, ScalarRepr, StackItem, TypeId,
};

use crate::error::RuntimeError;
use crate::machine::Executor;

/// Byte blocks addressed by index. Released indices are reused.
#[derive(Debug, Default)]
pub(crate) struct Heap {
    blocks: Vec<Option<Vec<u8>>>,
    free: Vec<usize>,
}

impl Heap {
    /// Allocate a zeroed block.
    pub(crate) fn allocate(&mut self, size: usize) -> Address {
        let data = Some(vec![0; size]);
        let block = match self.free.pop() {
            Some(block) => {
                self.blocks[block] = data;
                block
            }
            None => {
                self.blocks.push(data);
                self.blocks.len() - 1
            }
        };
        Address::Heap { block, offset: 0 }
    }

    /// Free the block `address` starts. Returns false if it is not the start
    /// of a live block.
    pub(crate) fn release(&mut self, address: Address) -> bool {
        let Address::Heap { block, offset: 0 } = address else {
            return false;
        };
        match self.blocks.get_mut(block) {
            Some(slot @ Some(_)) => {
                *slot = None;
                self.free.push(block);
                true
            }
            _ => false,
        }
    }

    /// Number of blocks currently allocated.
    pub(crate) fn live_blocks(&self) -> usize {
        self.blocks.iter().filter(|b| b.is_some()).count()
    }

    pub(crate) fn read(&self, block: usize, offset: usize, len: usize) -> Option<&[u8]> {
        self.blocks.get(block)?.as_ref()?.get(offset..offset.checked_add(len)?)
    }

    pub(crate) fn write(&mut self, block: usize, offset: usize, bytes: &[u8]) -> Option<()> {
        let end = offset.checked_add(bytes.len())?;
        self.blocks
            .get_mut(block)?
            .as_mut()?
            .get_mut(offset..end)?
            .copy_from_slice(bytes);
        Some(())
    }
}

fn decode_scalar(bytes: &[u8], repr: ScalarRepr) -> Option<StackItem> {
    Some(match repr {
        ScalarRepr::Word => StackItem::Integer(i32::from_le_bytes(bytes.try_into().ok()?)),
        ScalarRepr::Byte => StackItem::Byte(*bytes.first()?),
        ScalarRepr::Float => StackItem::Real(f64::from_le_bytes(bytes.try_into().ok()?)),
    })
}

fn encode_scalar(item: StackItem, repr: ScalarRepr) -> Option<Vec<u8>> {
    Some(match (repr, item) {
        (ScalarRepr::Word, StackItem::Integer(v)) => v.to_le_bytes().to_vec(),
        (ScalarRepr::Byte, StackItem::Byte(v)) => vec![v],
        (ScalarRepr::Float, StackItem::Real(v)) => v.to_le_bytes().to_vec(),
        _ => return None,
    })
}

impl<'a> Executor<'a> {
    /// Zero value of a scalar type.
    pub(crate) fn zero(&self, ty: TypeId) -> StackItem {
        match self.symbols().repr(ty) {
            ScalarRepr::Word => StackItem::Integer(0),
            ScalarRepr::Byte => StackItem::Byte(0),
            ScalarRepr::Float => StackItem::Real(0.0),
        }
    }

    /// Convert a value to the stored form of `ty`. Integers widen to real;
    /// ordinals are range checked against the type's bounds and narrowed to
    /// a byte for one-byte types.
    pub(crate) fn coerce(&self, ty: TypeId, item: StackItem) -> Result<StackItem, RuntimeError> {
        let symbols = self.symbols();
        let repr = symbols.repr(ty);
        if repr == ScalarRepr::Float {
            return item.numeric().map(StackItem::Real).ok_or_else(|| self.mismatch());
        }
        let value = item.ordinal().ok_or_else(|| self.mismatch())?;
        if let Some((min, max)) = symbols.bounds(ty) {
            self.check_range(i64::from(value), min, max)?;
        }
        Ok(match repr {
            ScalarRepr::Byte => StackItem::Byte(value as u8),
            _ => StackItem::Integer(value),
        })
    }

    /// Load the scalar of type `ty` stored at `address`.
    pub(crate) fn load(&self, address: Address, ty: TypeId) -> Result<StackItem, RuntimeError> {
        let repr = self.symbols().repr(ty);
        let item = match address {
            Address::Stack(slot) => Some(self.slot(slot)?),
            Address::Heap { block, offset } => self
                .heap
                .read(block, offset, repr.size())
                .and_then(|bytes| decode_scalar(bytes, repr)),
            Address::Literal { node, offset } => self
                .literal(node)?
                .get(offset..offset + repr.size())
                .and_then(|bytes| decode_scalar(bytes, repr)),
            Address::Nil | Address::Code { .. } => None,
        };
        item.ok_or(RuntimeError::InvalidAddress { line: self.line })
    }

    /// Store a scalar already coerced to `ty`.
    pub(crate) fn store(
        &mut self,
        address: Address,
        ty: TypeId,
        item: StackItem,
    ) -> Result<(), RuntimeError> {
        let invalid = RuntimeError::InvalidAddress { line: self.line };
        match address {
            Address::Stack(slot) => self.set_slot(slot, item),
            Address::Heap { block, offset } => {
                let bytes = encode_scalar(item, self.symbols().repr(ty)).ok_or_else(|| self.mismatch())?;
                self.heap.write(block, offset, &bytes).ok_or(invalid)
            }
            _ => Err(invalid),
        }
    }

    /// Copy `len` bytes of array or record data.
    pub(crate) fn read_bytes(&self, address: Address, len: usize) -> Result<Vec<u8>, RuntimeError> {
        let bytes = match address {
            Address::Heap { block, offset } => self.heap.read(block, offset, len),
            Address::Literal { node, offset } => self.literal(node)?.get(offset..offset + len),
            _ => None,
        };
        bytes
            .map(<[u8]>::to_vec)
            .ok_or(RuntimeError::InvalidAddress { line: self.line })
    }

    pub(crate) fn copy_block(
        &mut self,
        source: Address,
        target: Address,
        len: usize,
    ) -> Result<(), RuntimeError> {
        let bytes = self.read_bytes(source, len)?;
        match target {
            Address::Heap { block, offset } => self
                .heap
                .write(block, offset, &bytes)
                .ok_or(RuntimeError::InvalidAddress { line: self.line }),
            _ => Err(RuntimeError::InvalidAddress { line: self.line }),
        }
    }

    /// Fresh heap copy of a structured value, for value parameters.
    pub(crate) fn clone_block(&mut self, source: Address, len: usize) -> Result<Address, RuntimeError> {
        let copy = self.heap.allocate(len);
        self.copy_block(source, copy, len)?;
        Ok(copy)
    }

    fn literal(&self, node: NodeId) -> Result<&'a [u8], RuntimeError> {
        match &self.entry(node)?.definition {
            Definition::Constant(ConstantValue::String(bytes)) => Ok(bytes),
            _ => Err(RuntimeError::InvalidAddress { line: self.line }),
        }
    }

    /// Push a routine's locals: zeroed scalars and fresh blocks for arrays
    /// and records.
    pub(crate) fn allocate_locals(&mut self, routine: NodeId) -> Result<(), RuntimeError> {
        for &local in &self.routine_of(routine)?.locals {
            let ty = self.type_of(self.entry(local)?)?;
            let descriptor = self.ty(ty);
            let item = if descriptor.is_structured() {
                StackItem::Address(self.heap.allocate(descriptor.size))
            } else {
                self.zero(ty)
            };
            self.push(item)?;
        }
        Ok(())
    }

    /// Free the blocks a frame owns: structured locals and value parameter
    /// copies. VAR parameters point into the caller and are left alone.
    pub(crate) fn release_frame(&mut self, routine: NodeId, base: usize) -> Result<(), RuntimeError> {
        let routine = self.routine_of(routine)?;
        for &node in routine.params.iter().chain(&routine.locals) {
            let entry = self.entry(node)?;
            if entry.is_var_param() || !self.ty(self.type_of(entry)?).is_structured() {
                continue;
            }
            let offset = entry.frame_offset().ok_or_else(|| self.mismatch())?;
            let address = self
                .slot(base + offset)?
                .as_address()
                .ok_or_else(|| self.mismatch())?;
            if !self.heap.release(address) {
                return Err(RuntimeError::InvalidAddress { line: self.line });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_are_zeroed_and_reused() {
        let mut heap = Heap::default();
        let a = heap.allocate(4);
        let b = heap.allocate(2);
        assert_eq!(heap.live_blocks(), 2);
        assert!(heap.release(a));
        assert!(!heap.release(a));
        let c = heap.allocate(3);
        assert_eq!(c, a);
        assert_ne!(c, b);
        assert_eq!(heap.read(0, 0, 3), Some(&[0u8, 0, 0][..]));
    }

    #[test]
    fn reads_and_writes_are_bounds_checked() {
        let mut heap = Heap::default();
        heap.allocate(4);
        assert_eq!(heap.write(0, 2, &[1, 2]), Some(()));
        assert_eq!(heap.write(0, 3, &[1, 2]), None);
        assert_eq!(heap.read(0, 2, 2), Some(&[1u8, 2][..]));
        assert_eq!(heap.read(0, 3, 2), None);
        assert_eq!(heap.read(1, 0, 1), None);
    }

    #[test]
    fn interior_address_cannot_be_released() {
        let mut heap = Heap::default();
        heap.allocate(8);
        assert!(!heap.release(Address::Heap { block: 0, offset: 4 }));
        assert_eq!(heap.live_blocks(), 1);
    }

    #[test]
    fn scalars_round_trip_through_bytes() {
        for (item, repr) in [
            (StackItem::Integer(-5), ScalarRepr::Word),
            (StackItem::Byte(b'z'), ScalarRepr::Byte),
            (StackItem::Real(0.125), ScalarRepr::Float),
        ] {
            let bytes = encode_scalar(item, repr).unwrap();
            assert_eq!(bytes.len(), repr.size());
            assert_eq!(decode_scalar(&bytes, repr), Some(item));
        }
        assert_eq!(encode_scalar(StackItem::Integer(1), ScalarRepr::Float), None);
    }
}
