//! Intermediate code decoding.
//!
//! A [`Cursor`] holds a position in one segment plus the current opcode.
//! Decoding is opcode-driven: the caller knows from the current opcode which
//! inline operand follows and reads it explicitly.

use crate::error::DecodeError;
use crate::opcode::Opcode;
use crate::segment::CodeSegment;
use crate::symbol::NodeId;

#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    segment: &'a CodeSegment,
    /// Offset of the next unread byte.
    position: usize,
    /// Offset at which `current` was read.
    token_start: usize,
    current: Opcode,
}

impl<'a> Cursor<'a> {
    /// A cursor at offset 0. Call [`advance`](Self::advance) to load the
    /// first opcode.
    pub fn new(segment: &'a CodeSegment) -> Self {
        Self {
            segment,
            position: 0,
            token_start: 0,
            current: Opcode::EndOfSegment,
        }
    }

    pub fn segment(&self) -> &'a CodeSegment {
        self.segment
    }

    pub fn current(&self) -> Opcode {
        self.current
    }

    /// Offset of the next unread byte.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Offset of the current opcode. Seeking here and advancing reloads it.
    pub fn token_start(&self) -> usize {
        self.token_start
    }

    /// Read the next opcode and make it current.
    pub fn advance(&mut self) -> Result<Opcode, DecodeError> {
        let at = self.position;
        let [byte] = self.take::<1>()?;
        self.current = Opcode::try_from(byte)?;
        self.token_start = at;
        Ok(self.current)
    }

    /// Move to an absolute offset in this segment.
    pub fn seek(&mut self, offset: usize) -> Result<(), DecodeError> {
        if offset > self.segment.len() {
            return Err(DecodeError::SeekOutOfRange {
                target: offset,
                len: self.segment.len(),
            });
        }
        self.position = offset;
        Ok(())
    }

    pub fn read_node(&mut self) -> Result<NodeId, DecodeError> {
        Ok(NodeId(u32::from_le_bytes(self.take()?)))
    }

    pub fn read_integer(&mut self) -> Result<i32, DecodeError> {
        Ok(i32::from_le_bytes(self.take()?))
    }

    pub fn read_real(&mut self) -> Result<f64, DecodeError> {
        Ok(f64::from_le_bytes(self.take()?))
    }

    pub fn read_byte(&mut self) -> Result<u8, DecodeError> {
        let [byte] = self.take::<1>()?;
        Ok(byte)
    }

    /// Read a resolved location marker.
    pub fn read_location(&mut self) -> Result<usize, DecodeError> {
        Ok(u32::from_le_bytes(self.take()?) as usize)
    }

    pub fn read_line(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.take()?))
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let end = self.position + N;
        let bytes = self
            .segment
            .bytes()
            .get(self.position..end)
            .ok_or(DecodeError::UnexpectedEnd { at: self.position })?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        self.position = end;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::CodeBuffer;

    fn sample() -> CodeSegment {
        let mut buffer = CodeBuffer::new();
        buffer.emit_line(7);
        buffer.emit_opcode(Opcode::Identifier);
        buffer.emit_node(NodeId(42));
        buffer.emit_opcode(Opcode::ColonEqual);
        buffer.emit_opcode(Opcode::Real);
        buffer.emit_real(2.5);
        buffer.finalize().unwrap()
    }

    #[test]
    fn walks_opcodes_and_operands() {
        let segment = sample();
        let mut cursor = Cursor::new(&segment);
        assert_eq!(cursor.advance().unwrap(), Opcode::Line);
        assert_eq!(cursor.read_line().unwrap(), 7);
        assert_eq!(cursor.advance().unwrap(), Opcode::Identifier);
        assert_eq!(cursor.read_node().unwrap(), NodeId(42));
        assert_eq!(cursor.advance().unwrap(), Opcode::ColonEqual);
        assert_eq!(cursor.advance().unwrap(), Opcode::Real);
        assert_eq!(cursor.read_real().unwrap(), 2.5);
        assert_eq!(cursor.advance().unwrap(), Opcode::EndOfSegment);
    }

    #[test]
    fn token_start_allows_reloading() {
        let segment = sample();
        let mut cursor = Cursor::new(&segment);
        cursor.advance().unwrap();
        cursor.read_line().unwrap();
        cursor.advance().unwrap();
        let start = cursor.token_start();
        assert_eq!(start, 5);
        cursor.read_node().unwrap();
        cursor.advance().unwrap();
        cursor.seek(start).unwrap();
        assert_eq!(cursor.advance().unwrap(), Opcode::Identifier);
    }

    #[test]
    fn reading_past_the_end_fails() {
        let segment = CodeSegment::from_bytes(vec![Opcode::Integer as u8, 1, 0]);
        let mut cursor = Cursor::new(&segment);
        cursor.advance().unwrap();
        assert_eq!(
            cursor.read_integer(),
            Err(DecodeError::UnexpectedEnd { at: 1 })
        );
    }

    #[test]
    fn seek_is_bounded() {
        let segment = sample();
        let mut cursor = Cursor::new(&segment);
        assert!(cursor.seek(segment.len()).is_ok());
        assert_eq!(
            cursor.seek(segment.len() + 1),
            Err(DecodeError::SeekOutOfRange {
                target: segment.len() + 1,
                len: segment.len()
            })
        );
    }

    #[test]
    fn unknown_byte_is_reported() {
        let segment = CodeSegment::from_bytes(vec![0x9A]);
        let mut cursor = Cursor::new(&segment);
        assert_eq!(cursor.advance(), Err(DecodeError::UnknownOpcode(0x9A)));
    }
}
