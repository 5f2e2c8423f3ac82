//! The positional stream contract (§4.1): sequential byte sinks/sources
//! that the codec is driven against.

use super::error::CodecError;
use super::stream_context::ByteOrderKind;

/// A sequential destination for encoded bytes.
///
/// A sink may *overflow* (exhaust its current capacity); implementations
/// are expected to request more space from their backing store rather than
/// fail, except where that backing store itself refuses (a fixed buffer, a
/// full disk), in which case [`CodecError::NoBufferSpace`] propagates.
pub trait ByteSink {
    fn put(&mut self, byte: u8) -> Result<(), CodecError>;
    fn putn(&mut self, bytes: &[u8]) -> Result<(), CodecError>;
    fn position(&self) -> u64;

    fn put_u8(&mut self, v: u8) -> Result<(), CodecError> {
        self.put(v)
    }

    fn put_num16(&mut self, v: u16, order: ByteOrderKind) -> Result<(), CodecError> {
        let bytes = match order {
            ByteOrderKind::BigEndian => v.to_be_bytes(),
            ByteOrderKind::LittleEndian => v.to_le_bytes(),
        };
        self.putn(&bytes)
    }

    fn put_num32(&mut self, v: u32, order: ByteOrderKind) -> Result<(), CodecError> {
        let bytes = match order {
            ByteOrderKind::BigEndian => v.to_be_bytes(),
            ByteOrderKind::LittleEndian => v.to_le_bytes(),
        };
        self.putn(&bytes)
    }

    fn put_num64(&mut self, v: u64, order: ByteOrderKind) -> Result<(), CodecError> {
        let bytes = match order {
            ByteOrderKind::BigEndian => v.to_be_bytes(),
            ByteOrderKind::LittleEndian => v.to_le_bytes(),
        };
        self.putn(&bytes)
    }
}

/// A sink that additionally supports seeking past its current high-water
/// mark (a *jump*): the target position is recorded, and the gap is
/// zero-filled on the next write (§4.1).
pub trait RandomAccessSink: ByteSink {
    fn size(&self) -> u64;
    fn jump(&mut self, position: u64) -> Result<(), CodecError>;
}

/// A sequential source of bytes to decode from.
///
/// Reads past the end of the source fail with
/// [`CodecError::ReadPastEndOfStream`] (§4.1).
pub trait ByteSource {
    fn get(&mut self) -> Result<u8, CodecError>;
    fn getn(&mut self, buf: &mut [u8]) -> Result<(), CodecError>;
    fn position(&self) -> u64;
    fn size(&self) -> u64;
    fn seek(&mut self, position: u64) -> Result<(), CodecError>;

    /// Looks at the next byte without consuming it. Used by the polymorphic
    /// pointer decoder to distinguish a dedup index from a value body
    /// without committing to either read. Sources that cannot look ahead
    /// (a pure pipe) return [`CodecError::OperationNotSupported`].
    fn peek(&mut self) -> Result<u8, CodecError> {
        Err(CodecError::OperationNotSupported)
    }

    fn get_num16(&mut self, order: ByteOrderKind) -> Result<u16, CodecError> {
        let mut buf = [0u8; 2];
        self.getn(&mut buf)?;
        Ok(match order {
            ByteOrderKind::BigEndian => u16::from_be_bytes(buf),
            ByteOrderKind::LittleEndian => u16::from_le_bytes(buf),
        })
    }

    fn get_num32(&mut self, order: ByteOrderKind) -> Result<u32, CodecError> {
        let mut buf = [0u8; 4];
        self.getn(&mut buf)?;
        Ok(match order {
            ByteOrderKind::BigEndian => u32::from_be_bytes(buf),
            ByteOrderKind::LittleEndian => u32::from_le_bytes(buf),
        })
    }

    fn get_num64(&mut self, order: ByteOrderKind) -> Result<u64, CodecError> {
        let mut buf = [0u8; 8];
        self.getn(&mut buf)?;
        Ok(match order {
            ByteOrderKind::BigEndian => u64::from_be_bytes(buf),
            ByteOrderKind::LittleEndian => u64::from_le_bytes(buf),
        })
    }
}

/// An in-memory, growable [`ByteSink`]/[`RandomAccessSink`] backed by a
/// `Vec<u8>`. This is the sink used to build request/reply payloads before
/// they are handed to the transport adapter.
#[derive(Debug, Default)]
pub struct VecSink {
    buf: Vec<u8>,
    write_cursor: usize,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { buf: Vec::with_capacity(capacity), write_cursor: 0 }
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }
}

impl ByteSink for VecSink {
    fn put(&mut self, byte: u8) -> Result<(), CodecError> {
        self.putn(&[byte])
    }

    fn putn(&mut self, bytes: &[u8]) -> Result<(), CodecError> {
        let end = self.write_cursor + bytes.len();
        if end > self.buf.len() {
            self.buf.resize(end, 0);
        }
        self.buf[self.write_cursor..end].copy_from_slice(bytes);
        self.write_cursor = end;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.write_cursor as u64
    }
}

impl RandomAccessSink for VecSink {
    fn size(&self) -> u64 {
        self.buf.len() as u64
    }

    fn jump(&mut self, position: u64) -> Result<(), CodecError> {
        let position = position as usize;
        if position > self.buf.len() {
            self.buf.resize(position, 0);
        }
        self.write_cursor = position;
        Ok(())
    }
}

/// A [`ByteSource`] reading sequentially out of a borrowed byte slice.
#[derive(Debug)]
pub struct SliceSource<'a> {
    data: &'a [u8],
    cursor: usize,
}

impl<'a> SliceSource<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, cursor: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.cursor
    }
}

impl<'a> ByteSource for SliceSource<'a> {
    fn get(&mut self) -> Result<u8, CodecError> {
        let mut byte = [0u8; 1];
        self.getn(&mut byte)?;
        Ok(byte[0])
    }

    fn getn(&mut self, buf: &mut [u8]) -> Result<(), CodecError> {
        if self.remaining() < buf.len() {
            return Err(CodecError::ReadPastEndOfStream);
        }
        buf.copy_from_slice(&self.data[self.cursor..self.cursor + buf.len()]);
        self.cursor += buf.len();
        Ok(())
    }

    fn position(&self) -> u64 {
        self.cursor as u64
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn peek(&mut self) -> Result<u8, CodecError> {
        self.data.get(self.cursor).copied().ok_or(CodecError::ReadPastEndOfStream)
    }

    fn seek(&mut self, position: u64) -> Result<(), CodecError> {
        if position > self.data.len() as u64 {
            return Err(CodecError::ReadPastEndOfStream);
        }
        self.cursor = position as usize;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_sink_jump_zero_fills_the_gap() {
        let mut sink = VecSink::new();
        sink.putn(b"ab").unwrap();
        sink.jump(5).unwrap();
        sink.putn(b"c").unwrap();
        assert_eq!(sink.into_inner(), vec![b'a', b'b', 0, 0, 0, b'c']);
    }

    #[test]
    fn slice_source_rejects_reads_past_end() {
        let data = [1u8, 2, 3];
        let mut src = SliceSource::new(&data);
        let mut buf = [0u8; 4];
        assert_eq!(src.getn(&mut buf), Err(CodecError::ReadPastEndOfStream));
    }
}
