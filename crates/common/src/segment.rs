//! Finalized code segments.

/// The immutable intermediate code of one routine body.
///
/// Produced once by [`CodeBuffer::finalize`](crate::encoder::CodeBuffer::finalize)
/// and never mutated afterwards; execution only moves a
/// [`Cursor`](crate::decoder::Cursor) over it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeSegment {
    code: Box<[u8]>,
}

impl CodeSegment {
    /// Wrap raw bytes. Used by the encoder and by tests that hand-build streams.
    pub fn from_bytes(code: Vec<u8>) -> Self {
        Self {
            code: code.into_boxed_slice(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.code
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_bytes() {
        let segment = CodeSegment::from_bytes(vec![0x40, 0x41, 0xFF]);
        assert_eq!(segment.len(), 3);
        assert!(!segment.is_empty());
        assert_eq!(segment.bytes(), &[0x40, 0x41, 0xFF]);
    }

    #[test]
    fn empty_segment() {
        assert!(CodeSegment::from_bytes(Vec::new()).is_empty());
    }
}
