//! A dynamically typed codec value, for introspection and for the
//! round-trip property tests in §8. Typed application values go through the
//! [`super::Codec`] trait directly and never allocate a [`Value`].

use super::error::CodecError;
use super::raw;
use super::stream::{ByteSink, ByteSource};
use super::stream_context::StreamContext;

/// A decoded value of unknown static type.
///
/// `Ptr` here is a structural placeholder for the `[type_tag, body]` /
/// `[type_tag, saved_index]` shape (§4.1); it does not carry a live Rust
/// pointer. The typed polymorphic pointer machinery that does is in
/// [`crate::codec::ptr`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float32(f32),
    Float64(f64),
    Str(String),
    Bin(Vec<u8>),
    Array(Vec<Value>),
    Map(Vec<(Value, Value)>),
    FixExt(u8, Vec<u8>),
    Ext(u8, Vec<u8>),
    Ptr { tag: u16, body: PtrBody },
}

#[derive(Debug, Clone, PartialEq)]
pub enum PtrBody {
    Null,
    Index(u32),
    Value(Box<Value>),
}

impl Value {
    pub fn encode(&self, sink: &mut dyn ByteSink, ctx: &StreamContext) -> Result<(), CodecError> {
        match self {
            Value::Nil => raw::write_nil(sink),
            Value::Bool(b) => raw::write_bool(sink, *b),
            Value::Int(i) => raw::write_int(sink, *i, ctx),
            Value::UInt(u) => raw::write_uint(sink, *u, ctx),
            Value::Float32(f) => raw::write_f32(sink, *f, ctx),
            Value::Float64(f) => raw::write_f64(sink, *f, ctx),
            Value::Str(s) => raw::write_str(sink, s, ctx),
            Value::Bin(b) => raw::write_bin(sink, b, ctx),
            Value::Array(items) => {
                raw::write_array_header(sink, items.len(), ctx)?;
                for item in items {
                    item.encode(sink, ctx)?;
                }
                Ok(())
            }
            Value::Map(entries) => {
                raw::write_map_header(sink, entries.len(), ctx)?;
                for (k, v) in entries {
                    k.encode(sink, ctx)?;
                    v.encode(sink, ctx)?;
                }
                Ok(())
            }
            Value::FixExt(ty, payload) => raw::write_fixext(sink, *ty, payload),
            Value::Ext(ty, payload) => raw::write_ext(sink, *ty, payload, ctx),
            Value::Ptr { tag, body } => {
                raw::write_array_header(sink, 2, ctx)?;
                raw::write_uint(sink, *tag as u64, ctx)?;
                match body {
                    PtrBody::Null => raw::write_nil(sink),
                    PtrBody::Index(idx) => raw::write_uint(sink, *idx as u64, ctx),
                    PtrBody::Value(v) => v.encode(sink, ctx),
                }
            }
        }
    }

    pub fn decode(src: &mut dyn ByteSource, ctx: &StreamContext) -> Result<Value, CodecError> {
        let b = src.peek()?;
        use super::typecode::*;
        match Typecode::from_byte(b) {
            Typecode::Nil => {
                raw::read_nil(src)?;
                Ok(Value::Nil)
            }
            Typecode::True | Typecode::False => Ok(Value::Bool(raw::read_bool(src)?)),
            Typecode::PosFixint(_)
            | Typecode::Uint8
            | Typecode::Uint16
            | Typecode::Uint32
            | Typecode::Uint64 => Ok(Value::UInt(raw::read_u64(src, ctx)?)),
            Typecode::NegFixint(_) | Typecode::Int8 | Typecode::Int16 | Typecode::Int32 | Typecode::Int64 => {
                Ok(Value::Int(raw::read_i64(src, ctx)?))
            }
            Typecode::Float32 => Ok(Value::Float32({
                let v = raw::read_f64(src, ctx)?;
                v as f32
            })),
            Typecode::Float64 => Ok(Value::Float64(raw::read_f64(src, ctx)?)),
            Typecode::FixStr(_) | Typecode::Str8 | Typecode::Str16 | Typecode::Str32 => {
                Ok(Value::Str(raw::read_str(src, ctx)?))
            }
            Typecode::Bin8 | Typecode::Bin16 | Typecode::Bin32 => Ok(Value::Bin(raw::read_bin(src, ctx)?)),
            Typecode::FixArray(_) | Typecode::Array16 | Typecode::Array32 => {
                let len = raw::read_array_header(src, ctx)?;
                let mut items = Vec::with_capacity(len);
                for _ in 0..len {
                    items.push(Value::decode(src, ctx)?);
                }
                Ok(Value::Array(items))
            }
            Typecode::FixMap(_) | Typecode::Map16 | Typecode::Map32 => {
                let len = raw::read_map_header(src, ctx)?;
                let mut entries = Vec::with_capacity(len);
                for _ in 0..len {
                    let k = Value::decode(src, ctx)?;
                    let v = Value::decode(src, ctx)?;
                    entries.push((k, v));
                }
                Ok(Value::Map(entries))
            }
            Typecode::FixExt1 | Typecode::FixExt2 | Typecode::FixExt4 | Typecode::FixExt8 | Typecode::FixExt16 => {
                let (ty, payload) = raw::read_fixext(src)?;
                Ok(Value::FixExt(ty, payload))
            }
            Typecode::Ext8 | Typecode::Ext16 | Typecode::Ext32 => {
                let (ty, payload) = raw::read_ext(src, ctx)?;
                Ok(Value::Ext(ty, payload))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::stream::{SliceSource, VecSink};

    fn roundtrip(v: Value) {
        let ctx = StreamContext::default();
        let mut sink = VecSink::new();
        v.encode(&mut sink, &ctx).unwrap();
        let bytes = sink.into_inner();
        let mut src = SliceSource::new(&bytes);
        assert_eq!(Value::decode(&mut src, &ctx).unwrap(), v);
    }

    #[test]
    fn every_variant_round_trips() {
        roundtrip(Value::Nil);
        roundtrip(Value::Bool(true));
        roundtrip(Value::UInt(12345));
        roundtrip(Value::Int(-12345));
        roundtrip(Value::Float64(3.25));
        roundtrip(Value::Str("counter".into()));
        roundtrip(Value::Bin(vec![1, 2, 3]));
        roundtrip(Value::Array(vec![Value::UInt(1), Value::Str("x".into())]));
        roundtrip(Value::Map(vec![(Value::Str("k".into()), Value::UInt(9))]));
        roundtrip(Value::FixExt(3, vec![0xaa, 0xbb]));
        roundtrip(Value::Ext(9, vec![1; 300]));
        roundtrip(Value::Ptr { tag: 4, body: PtrBody::Null });
        roundtrip(Value::Ptr { tag: 4, body: PtrBody::Index(2) });
        roundtrip(Value::Ptr {
            tag: 4,
            body: PtrBody::Value(Box::new(Value::UInt(7))),
        });
    }
}
