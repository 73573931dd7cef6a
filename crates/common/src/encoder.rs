//! Intermediate code emission.
//!
//! [`CodeBuffer`] appends opcodes and inline operands for one routine body.
//! Forward jumps are emitted as location markers whose placeholder is
//! patched once the target is known. Every marker must be fixed up before
//! [`CodeBuffer::finalize`] hands out the segment.

use std::collections::BTreeSet;

use crate::error::EmitError;
use crate::opcode::Opcode;
use crate::segment::CodeSegment;
use crate::symbol::NodeId;

/// Placeholder written into an unresolved marker.
const UNRESOLVED: u32 = u32::MAX;

/// Position of a marker's placeholder, returned by [`CodeBuffer::emit_marker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MarkerPosition(usize);

impl MarkerPosition {
    pub fn offset(self) -> usize {
        self.0
    }
}

/// Growable buffer for the routine currently being compiled.
#[derive(Debug, Default)]
pub struct CodeBuffer {
    code: Vec<u8>,
    pending: BTreeSet<usize>,
}

impl CodeBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offset of the next unit to be emitted.
    pub fn position(&self) -> usize {
        self.code.len()
    }

    pub fn emit_opcode(&mut self, opcode: Opcode) {
        self.code.push(opcode as u8);
    }

    pub fn emit_integer(&mut self, value: i32) {
        self.code.extend_from_slice(&value.to_le_bytes());
    }

    pub fn emit_real(&mut self, value: f64) {
        self.code.extend_from_slice(&value.to_le_bytes());
    }

    pub fn emit_byte(&mut self, value: u8) {
        self.code.push(value);
    }

    /// Append a symbol handle so the executor can recover the entry's kind,
    /// type and offset without resolving the name again.
    pub fn emit_node(&mut self, node: NodeId) {
        self.code.extend_from_slice(&node.0.to_le_bytes());
    }

    /// Append a statement-start marker carrying the source line.
    pub fn emit_line(&mut self, line: u32) {
        self.emit_opcode(Opcode::Line);
        self.code.extend_from_slice(&line.to_le_bytes());
    }

    /// Append a location marker with an unresolved target.
    pub fn emit_marker(&mut self) -> MarkerPosition {
        self.emit_opcode(Opcode::Marker);
        let at = self.code.len();
        self.code.extend_from_slice(&UNRESOLVED.to_le_bytes());
        self.pending.insert(at);
        MarkerPosition(at)
    }

    /// Append a raw, already known location (branch tables).
    pub fn emit_location(&mut self, target: usize) -> Result<(), EmitError> {
        let target = Self::encode_offset(target)?;
        self.code.extend_from_slice(&target.to_le_bytes());
        Ok(())
    }

    /// Resolve a marker to the current position: "jump here" means "to the
    /// next unit that will be emitted".
    pub fn fixup_marker(&mut self, marker: MarkerPosition) -> Result<(), EmitError> {
        let at = marker.0;
        if !self.pending.remove(&at) {
            return Err(EmitError::NotAMarker { at });
        }
        let target = Self::encode_offset(self.code.len())?;
        self.code[at..at + 4].copy_from_slice(&target.to_le_bytes());
        Ok(())
    }

    /// Resolve a list of markers that share one target.
    pub fn fixup_all(
        &mut self,
        markers: impl IntoIterator<Item = MarkerPosition>,
    ) -> Result<(), EmitError> {
        for marker in markers {
            self.fixup_marker(marker)?;
        }
        Ok(())
    }

    /// Snapshot the buffer as an immutable segment and reset for the next
    /// routine. Fails if any marker is still unresolved.
    pub fn finalize(&mut self) -> Result<CodeSegment, EmitError> {
        if let Some(&at) = self.pending.iter().next() {
            return Err(EmitError::UnresolvedMarker { at });
        }
        self.emit_opcode(Opcode::EndOfSegment);
        Ok(CodeSegment::from_bytes(std::mem::take(&mut self.code)))
    }

    fn encode_offset(offset: usize) -> Result<u32, EmitError> {
        u32::try_from(offset)
            .ok()
            .filter(|&o| o != UNRESOLVED)
            .ok_or(EmitError::SegmentTooLarge {
                max: UNRESOLVED as usize - 1,
            })
    }
}
