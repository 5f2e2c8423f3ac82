//! The `Codec` trait: the serializer/deserializer dispatch surface (§4.1
//! "Serializer/deserializer dispatch").
//!
//! Every codec-representable type implements this single trait. Primitives
//! get a blanket implementation here; composite request/reply envelopes
//! (§6) implement it by hand in the same shape a derive macro would
//! generate — the manual pattern the Design Notes call for in place of the
//! source's SFINAE-based adapter dispatch.

use super::error::CodecError;
use super::raw;
use super::stream::{ByteSink, ByteSource};
use super::stream_context::StreamContext;
use crate::error::ErrorCode;

/// A type that knows how to serialize and deserialize itself against the
/// self-describing byte codec (§4.1).
pub trait Codec: Sized {
    fn encode(&self, sink: &mut dyn ByteSink, ctx: &StreamContext) -> Result<(), CodecError>;
    fn decode(src: &mut dyn ByteSource, ctx: &StreamContext) -> Result<Self, CodecError>;
}

macro_rules! int_codec {
    ($ty:ty, $write:path, $read:path) => {
        impl Codec for $ty {
            fn encode(&self, sink: &mut dyn ByteSink, ctx: &StreamContext) -> Result<(), CodecError> {
                $write(sink, (*self).into(), ctx)
            }

            fn decode(src: &mut dyn ByteSource, ctx: &StreamContext) -> Result<Self, CodecError> {
                $read(src, ctx)
            }
        }
    };
}

// Unsigned widths all funnel through write_uint/read_* so the smallest-fits
// rule applies uniformly (§4.1 "Numeric packing").
impl Codec for u8 {
    fn encode(&self, sink: &mut dyn ByteSink, ctx: &StreamContext) -> Result<(), CodecError> {
        raw::write_uint(sink, *self as u64, ctx)
    }
    fn decode(src: &mut dyn ByteSource, ctx: &StreamContext) -> Result<Self, CodecError> {
        raw::read_u8(src, ctx)
    }
}
int_codec!(u16, raw::write_uint, raw::read_u16);
int_codec!(u32, raw::write_uint, raw::read_u32);
int_codec!(u64, raw::write_uint, raw::read_u64);

impl Codec for i8 {
    fn encode(&self, sink: &mut dyn ByteSink, ctx: &StreamContext) -> Result<(), CodecError> {
        raw::write_int(sink, *self as i64, ctx)
    }
    fn decode(src: &mut dyn ByteSource, ctx: &StreamContext) -> Result<Self, CodecError> {
        raw::read_i8(src, ctx)
    }
}
int_codec!(i16, raw::write_int, raw::read_i16);
int_codec!(i32, raw::write_int, raw::read_i32);
int_codec!(i64, raw::write_int, raw::read_i64);

impl Codec for bool {
    fn encode(&self, sink: &mut dyn ByteSink, _ctx: &StreamContext) -> Result<(), CodecError> {
        raw::write_bool(sink, *self)
    }
    fn decode(src: &mut dyn ByteSource, _ctx: &StreamContext) -> Result<Self, CodecError> {
        raw::read_bool(src)
    }
}

impl Codec for f32 {
    fn encode(&self, sink: &mut dyn ByteSink, ctx: &StreamContext) -> Result<(), CodecError> {
        raw::write_f32(sink, *self, ctx)
    }
    fn decode(src: &mut dyn ByteSource, ctx: &StreamContext) -> Result<Self, CodecError> {
        let v = raw::read_f64(src, ctx)?;
        Ok(v as f32)
    }
}

impl Codec for f64 {
    fn encode(&self, sink: &mut dyn ByteSink, ctx: &StreamContext) -> Result<(), CodecError> {
        raw::write_f64(sink, *self, ctx)
    }
    fn decode(src: &mut dyn ByteSource, ctx: &StreamContext) -> Result<Self, CodecError> {
        raw::read_f64(src, ctx)
    }
}

impl Codec for () {
    fn encode(&self, sink: &mut dyn ByteSink, _ctx: &StreamContext) -> Result<(), CodecError> {
        raw::write_nil(sink)
    }
    fn decode(src: &mut dyn ByteSource, _ctx: &StreamContext) -> Result<Self, CodecError> {
        raw::read_nil(src)
    }
}

impl Codec for String {
    fn encode(&self, sink: &mut dyn ByteSink, ctx: &StreamContext) -> Result<(), CodecError> {
        raw::write_str(sink, self, ctx)
    }
    fn decode(src: &mut dyn ByteSource, ctx: &StreamContext) -> Result<Self, CodecError> {
        raw::read_str(src, ctx)
    }
}

/// Wrapper opting a `Vec<u8>` into the raw-binary family (§4.1 "raw binary
/// blobs") instead of the generic array-of-`Codec` encoding `Vec<T>` gets.
/// Rust's coherence rules forbid `Vec<u8>` from having both at once, so this
/// one-field newtype is the idiomatic way to pick the byte-string encoding
/// explicitly (the same role `serde_bytes::ByteBuf` plays for `serde`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bytes(pub Vec<u8>);

impl Codec for Bytes {
    fn encode(&self, sink: &mut dyn ByteSink, ctx: &StreamContext) -> Result<(), CodecError> {
        raw::write_bin(sink, &self.0, ctx)
    }
    fn decode(src: &mut dyn ByteSource, ctx: &StreamContext) -> Result<Self, CodecError> {
        Ok(Bytes(raw::read_bin(src, ctx)?))
    }
}

impl<T: Codec> Codec for Vec<T> {
    fn encode(&self, sink: &mut dyn ByteSink, ctx: &StreamContext) -> Result<(), CodecError> {
        raw::write_array_header(sink, self.len(), ctx)?;
        for item in self {
            item.encode(sink, ctx)?;
        }
        Ok(())
    }

    fn decode(src: &mut dyn ByteSource, ctx: &StreamContext) -> Result<Self, CodecError> {
        let len = raw::read_array_header(src, ctx)?;
        let mut out = Vec::with_capacity(len);
        for _ in 0..len {
            out.push(T::decode(src, ctx)?);
        }
        Ok(out)
    }
}

/// `None` encodes as `nil`; `Some(v)` encodes as `v` directly. This is the
/// plain-optional-field encoding, distinct from the `[tag, body]`
/// polymorphic pointer shape in [`crate::codec::ptr`], which is reserved
/// for values that participate in dedup and downcasting.
impl<T: Codec> Codec for Option<T> {
    fn encode(&self, sink: &mut dyn ByteSink, ctx: &StreamContext) -> Result<(), CodecError> {
        match self {
            None => raw::write_nil(sink),
            Some(v) => v.encode(sink, ctx),
        }
    }

    fn decode(src: &mut dyn ByteSource, ctx: &StreamContext) -> Result<Self, CodecError> {
        if src.peek().ok() == Some(super::typecode::NIL) {
            raw::read_nil(src)?;
            Ok(None)
        } else {
            Ok(Some(T::decode(src, ctx)?))
        }
    }
}

impl<K: Codec + Ord, V: Codec> Codec for std::collections::BTreeMap<K, V> {
    fn encode(&self, sink: &mut dyn ByteSink, ctx: &StreamContext) -> Result<(), CodecError> {
        raw::write_map_header(sink, self.len(), ctx)?;
        for (k, v) in self {
            k.encode(sink, ctx)?;
            v.encode(sink, ctx)?;
        }
        Ok(())
    }

    fn decode(src: &mut dyn ByteSource, ctx: &StreamContext) -> Result<Self, CodecError> {
        let len = raw::read_map_header(src, ctx)?;
        let mut out = std::collections::BTreeMap::new();
        for _ in 0..len {
            let k = K::decode(src, ctx)?;
            let v = V::decode(src, ctx)?;
            out.insert(k, v);
        }
        Ok(out)
    }
}

const DURATION_EXT_TYPE: u8 = 0x01;

impl Codec for std::time::Duration {
    fn encode(&self, sink: &mut dyn ByteSink, ctx: &StreamContext) -> Result<(), CodecError> {
        let mut payload = Vec::with_capacity(12);
        payload.extend_from_slice(&self.as_secs().to_be_bytes());
        payload.extend_from_slice(&self.subsec_nanos().to_be_bytes());
        raw::write_ext(sink, DURATION_EXT_TYPE, &payload, ctx)
    }

    fn decode(src: &mut dyn ByteSource, ctx: &StreamContext) -> Result<Self, CodecError> {
        let (ty, payload) = raw::read_ext(src, ctx)?;
        if ty != DURATION_EXT_TYPE || payload.len() != 12 {
            return Err(CodecError::TypeError { expected: "duration ext", found: ty });
        }
        let secs = u64::from_be_bytes(payload[0..8].try_into().unwrap());
        let nanos = u32::from_be_bytes(payload[8..12].try_into().unwrap());
        Ok(std::time::Duration::new(secs, nanos))
    }
}

/// Error codes encode as `[category_index, value]` (§4.1). The category
/// substitution rule (§4.1, §6) is applied on encode using the stream
/// context's registry, so a value can never be serialized under a category
/// index the peer has no name for.
impl Codec for ErrorCode {
    fn encode(&self, sink: &mut dyn ByteSink, ctx: &StreamContext) -> Result<(), CodecError> {
        let resolved = ctx.categories().encode_error(*self);
        raw::write_array_header(sink, 2, ctx)?;
        raw::write_uint(sink, resolved.category_index as u64, ctx)?;
        raw::write_int(sink, resolved.value as i64, ctx)
    }

    fn decode(src: &mut dyn ByteSource, ctx: &StreamContext) -> Result<Self, CodecError> {
        let len = raw::read_array_header(src, ctx)?;
        if len != 2 {
            return Err(CodecError::MemberCountError { expected: 2, actual: len });
        }
        let category_index = raw::read_u32(src, ctx)?;
        let value = raw::read_i32(src, ctx)?;
        Ok(ErrorCode::new(category_index, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::stream::{SliceSource, VecSink};

    fn roundtrip<T: Codec + PartialEq + std::fmt::Debug>(ctx: &StreamContext, v: T) {
        let mut sink = VecSink::new();
        v.encode(&mut sink, ctx).unwrap();
        let bytes = sink.into_inner();
        let mut src = SliceSource::new(&bytes);
        assert_eq!(T::decode(&mut src, ctx).unwrap(), v);
    }

    #[test]
    fn primitives_round_trip() {
        let ctx = StreamContext::default();
        roundtrip(&ctx, 0u8);
        roundtrip(&ctx, 255u8);
        roundtrip(&ctx, -1i64);
        roundtrip(&ctx, true);
        roundtrip(&ctx, 3.5f64);
        roundtrip(&ctx, "hello".to_string());
        roundtrip(&ctx, Bytes(vec![1, 2, 3]));
        roundtrip(&ctx, vec![1u32, 2, 3]);
        roundtrip(&ctx, Some(5i32));
        roundtrip(&ctx, None::<i32>);
        roundtrip(&ctx, std::time::Duration::new(7, 123));
    }

    #[test]
    fn error_code_round_trips_when_registered() {
        let ctx = StreamContext::builder().category("sun").build();
        let code = ErrorCode::new(2, 2);
        roundtrip(&ctx, code);
    }

    #[test]
    fn error_code_substitutes_invalid_err_category_when_unregistered() {
        let ctx = StreamContext::default();
        let code = ErrorCode::new(42, 7);
        let mut sink = VecSink::new();
        code.encode(&mut sink, &ctx).unwrap();
        let bytes = sink.into_inner();
        let mut src = SliceSource::new(&bytes);
        let decoded = ErrorCode::decode(&mut src, &ctx).unwrap();
        assert_eq!(decoded.category_index, ctx.categories().runtime_index());
    }
}
