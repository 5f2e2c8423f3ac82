use std::ops::Range;
use std::sync::Arc;

use super::BufferError;

/// A reference-counted, immutable-after-construction byte region.
///
/// Slicing is O(1): it produces another [`SharedBuffer`] that shares the
/// underlying allocation and holds a distinct `(offset, len)` window,
/// incrementing the refcount. The allocation is released exactly once, when
/// the last alias is dropped — this falls directly out of `Arc`'s own
/// invariant, so this type adds no unsafe code of its own.
#[derive(Debug, Clone)]
pub struct SharedBuffer {
    data: Arc<Vec<u8>>,
    offset: usize,
    len: usize,
}

impl SharedBuffer {
    pub fn from_vec(data: Vec<u8>) -> Self {
        let len = data.len();
        Self { data: Arc::new(data), offset: 0, len }
    }

    pub fn empty() -> Self {
        Self { data: Arc::new(Vec::new()), offset: 0, len: 0 }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data[self.offset..self.offset + self.len]
    }

    /// Number of live aliases of the underlying allocation, including self.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.data)
    }

    /// Produces a sub-slice sharing this buffer's allocation. `range` is
    /// relative to this buffer's own window, not the underlying allocation.
    pub fn slice(&self, range: Range<usize>) -> Result<SharedBuffer, BufferError> {
        if range.end > self.len || range.start > range.end {
            return Err(BufferError::OperationNotSupported);
        }
        Ok(Self {
            data: Arc::clone(&self.data),
            offset: self.offset + range.start,
            len: range.end - range.start,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slicing_shares_the_allocation_and_bumps_refcount() {
        let base = SharedBuffer::from_vec(vec![1, 2, 3, 4, 5]);
        assert_eq!(base.ref_count(), 1);
        let mid = base.slice(1..4).unwrap();
        assert_eq!(mid.as_slice(), &[2, 3, 4]);
        assert_eq!(base.ref_count(), 2);
        drop(mid);
        assert_eq!(base.ref_count(), 1);
    }

    #[test]
    fn out_of_range_slice_is_rejected() {
        let base = SharedBuffer::from_vec(vec![1, 2, 3]);
        assert!(base.slice(0..10).is_err());
    }
}
