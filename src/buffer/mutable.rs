use super::BufferError;

/// An exclusively owned, resizable byte buffer.
///
/// Capacity grows monotonically: once reserved, it is never released on a
/// shrinking resize. A [`MutableBuffer`] constructed with
/// [`MutableBuffer::fixed`] instead reports [`BufferError::OperationNotSupported`]
/// on any growth attempt, modeling the source's scoped, non-reallocating
/// buffer pools.
#[derive(Debug, Default)]
pub struct MutableBuffer {
    data: Vec<u8>,
    fixed_capacity: bool,
}

impl MutableBuffer {
    pub fn new() -> Self {
        Self { data: Vec::new(), fixed_capacity: false }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { data: Vec::with_capacity(capacity), fixed_capacity: false }
    }

    /// A buffer whose capacity is fixed at `capacity`; growth past it fails
    /// with [`BufferError::OperationNotSupported`] instead of reallocating.
    pub fn fixed(capacity: usize) -> Self {
        Self { data: Vec::with_capacity(capacity), fixed_capacity: true }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Appends `bytes`, growing the allocation if permitted and necessary.
    pub fn extend_from_slice(&mut self, bytes: &[u8]) -> Result<(), BufferError> {
        self.reserve_additional(bytes.len())?;
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    /// Grows or shrinks the buffer to exactly `new_len`, filling any new
    /// bytes with `value`. Shrinking never releases capacity.
    pub fn resize(&mut self, new_len: usize, value: u8) -> Result<(), BufferError> {
        if new_len > self.data.len() {
            self.reserve_additional(new_len - self.data.len())?;
        }
        self.data.resize(new_len, value);
        Ok(())
    }

    fn reserve_additional(&mut self, additional: usize) -> Result<(), BufferError> {
        if self.data.len() + additional <= self.data.capacity() {
            return Ok(());
        }
        if self.fixed_capacity {
            return Err(BufferError::OperationNotSupported);
        }
        self.data.try_reserve(additional).map_err(|_| BufferError::NoBufferSpace)
    }

    /// Freezes this buffer's current contents into a [`super::SharedBuffer`],
    /// leaving this buffer empty (the source is left in the empty state, as
    /// every buffer move in this module does).
    pub fn into_shared(mut self) -> super::SharedBuffer {
        let taken = std::mem::take(&mut self.data);
        super::SharedBuffer::from_vec(taken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_buffer_rejects_growth_past_capacity() {
        let mut b = MutableBuffer::fixed(4);
        assert!(b.extend_from_slice(&[1, 2, 3, 4]).is_ok());
        assert_eq!(b.extend_from_slice(&[5]), Err(BufferError::OperationNotSupported));
    }

    #[test]
    fn growable_buffer_extends_past_initial_capacity() {
        let mut b = MutableBuffer::with_capacity(1);
        for i in 0..100u8 {
            b.extend_from_slice(&[i]).unwrap();
        }
        assert_eq!(b.len(), 100);
    }

    #[test]
    fn into_shared_empties_the_source() {
        let mut b = MutableBuffer::new();
        b.extend_from_slice(b"hello").unwrap();
        let shared = b.into_shared();
        assert_eq!(shared.as_slice(), b"hello");
        assert_eq!(b.len(), 0);
    }
}
