use std::ops::Range;

use super::{BufferError, MutableBuffer, SharedBuffer};

/// A read-only borrow over a byte region.
///
/// Constructed from either a [`SharedBuffer`] (aliases the allocation, adds
/// a refcount) or a [`MutableBuffer`] (copies, because a mutable buffer may
/// still grow out from under a would-be alias). Either way, reads through a
/// [`ConstBuffer`] see a frozen view of the bytes at construction time.
#[derive(Debug, Clone)]
pub struct ConstBuffer(SharedBuffer);

impl ConstBuffer {
    pub fn from_shared(buf: &SharedBuffer) -> Self {
        Self(buf.clone())
    }

    pub fn from_mutable(buf: &MutableBuffer) -> Self {
        Self(SharedBuffer::from_vec(buf.as_slice().to_vec()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        self.0.as_slice()
    }

    pub fn slice(&self, range: Range<usize>) -> Result<ConstBuffer, BufferError> {
        Ok(ConstBuffer(self.0.slice(range)?))
    }

    /// Access to the underlying shared representation, for code (like the
    /// framer) that wants to slice without copying but still emit a
    /// `ConstBuffer` downstream.
    pub fn as_shared(&self) -> &SharedBuffer {
        &self.0
    }
}

impl From<SharedBuffer> for ConstBuffer {
    fn from(b: SharedBuffer) -> Self {
        Self(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_mutable_is_frozen_even_if_source_grows_later() {
        let mut m = MutableBuffer::new();
        m.extend_from_slice(b"abc").unwrap();
        let c = ConstBuffer::from_mutable(&m);
        m.extend_from_slice(b"def").unwrap();
        assert_eq!(c.as_slice(), b"abc");
        assert_eq!(m.as_slice(), b"abcdef");
    }

    #[test]
    fn from_shared_aliases_rather_than_copies() {
        let s = SharedBuffer::from_vec(vec![9; 4]);
        let c = ConstBuffer::from_shared(&s);
        assert_eq!(s.ref_count(), 2);
        assert_eq!(c.as_slice(), &[9, 9, 9, 9]);
    }
}
