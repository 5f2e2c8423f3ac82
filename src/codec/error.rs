use thiserror::Error;

/// The codec's own error taxonomy (§7 "Codec category").
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("read past end of stream")]
    ReadPastEndOfStream,
    #[error("type mismatch: expected {expected}, found typecode {found:#x}")]
    TypeError { expected: &'static str, found: u8 },
    #[error("expected {expected} members, found {actual}")]
    MemberCountError { expected: usize, actual: usize },
    #[error("pointer cannot be downcast from tag {from} to tag {to}")]
    InvalidPtrDowncast { from: u16, to: u16 },
    #[error("unknown polymorphic type tag {0}")]
    UnknownTypeTag(u16),
    #[error("dedup index {0} does not name a previously decoded pointer")]
    UnknownPtrIndex(u32),
    #[error("allocator could not provide the requested space")]
    NoBufferSpace,
    #[error("seek past end of a non-random-access stream")]
    OperationNotSupported,
}

impl From<crate::buffer::BufferError> for CodecError {
    fn from(e: crate::buffer::BufferError) -> Self {
        match e {
            crate::buffer::BufferError::NoBufferSpace => CodecError::NoBufferSpace,
            crate::buffer::BufferError::OperationNotSupported => {
                CodecError::OperationNotSupported
            }
        }
    }
}

impl crate::error::RpcError {
    /// Maps a codec-category error to its on-wire `ErrorCode`.
    pub(crate) fn codec_error_code(
        err: &CodecError,
        registry: &crate::error::CategoryRegistry,
    ) -> crate::error::ErrorCode {
        use crate::error::{CodecErrorValue, ErrorCode};
        let value = match err {
            CodecError::ReadPastEndOfStream => CodecErrorValue::ReadPastEndOfStream,
            CodecError::TypeError { .. } => CodecErrorValue::TypeError,
            CodecError::MemberCountError { .. } => CodecErrorValue::MemberCountError,
            CodecError::InvalidPtrDowncast { .. } => CodecErrorValue::InvalidPtrDowncast,
            CodecError::UnknownTypeTag(_) => CodecErrorValue::TypeError,
            CodecError::UnknownPtrIndex(_) => CodecErrorValue::TypeError,
            CodecError::NoBufferSpace => CodecErrorValue::NoBufferSpace,
            CodecError::OperationNotSupported => CodecErrorValue::OperationNotSupported,
        };
        ErrorCode::new(registry.codec_index(), value as i32)
    }
}

impl CodecError {
    pub fn to_error_code(&self, registry: &crate::error::CategoryRegistry) -> crate::error::ErrorCode {
        crate::error::RpcError::codec_error_code(self, registry)
    }
}
