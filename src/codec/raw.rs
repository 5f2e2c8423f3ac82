//! Low-level typecode-level encode/decode functions (§4.1).
//!
//! These operate directly against [`ByteSink`]/[`ByteSource`] without going
//! through [`super::Value`]; the `Codec` blanket implementations for
//! primitive types are built on top of these, the same split `rmp`-style
//! msgpack crates make between "raw" encode/decode and a dynamic `Value`.

use super::error::CodecError;
use super::stream::{ByteSink, ByteSource};
use super::stream_context::StreamContext;
use super::typecode::*;

// ---- nil / bool ---------------------------------------------------------

pub fn write_nil(sink: &mut dyn ByteSink) -> Result<(), CodecError> {
    sink.put(NIL)
}

pub fn read_nil(src: &mut dyn ByteSource) -> Result<(), CodecError> {
    let b = src.get()?;
    if b == NIL {
        Ok(())
    } else {
        Err(CodecError::TypeError { expected: "nil", found: b })
    }
}

pub fn write_bool(sink: &mut dyn ByteSink, v: bool) -> Result<(), CodecError> {
    sink.put(if v { TRUE } else { FALSE })
}

pub fn read_bool(src: &mut dyn ByteSource) -> Result<bool, CodecError> {
    let b = src.get()?;
    match b {
        TRUE => Ok(true),
        FALSE => Ok(false),
        other => Err(CodecError::TypeError { expected: "bool", found: other }),
    }
}

// ---- integers -------------------------------------------------------------

/// Writes `v` using the smallest unsigned typecode whose range contains it.
pub fn write_uint(sink: &mut dyn ByteSink, v: u64, ctx: &StreamContext) -> Result<(), CodecError> {
    let order = ctx.byte_order();
    if v <= 0x7f {
        sink.put(v as u8)
    } else if v <= u8::MAX as u64 {
        sink.put(UINT8)?;
        sink.put(v as u8)
    } else if v <= u16::MAX as u64 {
        sink.put(UINT16)?;
        sink.put_num16(v as u16, order)
    } else if v <= u32::MAX as u64 {
        sink.put(UINT32)?;
        sink.put_num32(v as u32, order)
    } else {
        sink.put(UINT64)?;
        sink.put_num64(v, order)
    }
}

/// Writes `v` using the smallest typecode (signed or unsigned fixint/intN)
/// whose range contains it.
pub fn write_int(sink: &mut dyn ByteSink, v: i64, ctx: &StreamContext) -> Result<(), CodecError> {
    if v >= 0 {
        return write_uint(sink, v as u64, ctx);
    }
    let order = ctx.byte_order();
    if v >= -32 {
        sink.put(v as i8 as u8)
    } else if v >= i8::MIN as i64 {
        sink.put(INT8)?;
        sink.put(v as i8 as u8)
    } else if v >= i16::MIN as i64 {
        sink.put(INT16)?;
        sink.put_num16(v as i16 as u16, order)
    } else if v >= i32::MIN as i64 {
        sink.put(INT32)?;
        sink.put_num32(v as i32 as u32, order)
    } else {
        sink.put(INT64)?;
        sink.put_num64(v as u64, order)
    }
}

/// Reads whatever numeric typecode is present and widens it to `i128`,
/// which can hold the full range of both `i64` and `u64`. Category-specific
/// readers (`read_u8`, `read_i32`, ...) range-check the result themselves,
/// implementing the "any typecode representable in T is accepted" rule.
fn read_any_int(src: &mut dyn ByteSource, ctx: &StreamContext) -> Result<i128, CodecError> {
    let order = ctx.byte_order();
    let b = src.get()?;
    match Typecode::from_byte(b) {
        Typecode::PosFixint(v) => Ok(v as i128),
        Typecode::NegFixint(v) => Ok(v as i128),
        Typecode::Uint8 => {
            let mut buf = [0u8; 1];
            src.getn(&mut buf)?;
            Ok(buf[0] as i128)
        }
        Typecode::Uint16 => Ok(src.get_num16(order)? as i128),
        Typecode::Uint32 => Ok(src.get_num32(order)? as i128),
        Typecode::Uint64 => Ok(src.get_num64(order)? as i128),
        Typecode::Int8 => {
            let mut buf = [0u8; 1];
            src.getn(&mut buf)?;
            Ok(buf[0] as i8 as i128)
        }
        Typecode::Int16 => Ok(src.get_num16(order)? as i16 as i128),
        Typecode::Int32 => Ok(src.get_num32(order)? as i32 as i128),
        Typecode::Int64 => Ok(src.get_num64(order)? as i64 as i128),
        _ => Err(CodecError::TypeError { expected: "integer", found: b }),
    }
}

macro_rules! int_reader {
    ($name:ident, $ty:ty, $label:literal) => {
        pub fn $name(src: &mut dyn ByteSource, ctx: &StreamContext) -> Result<$ty, CodecError> {
            let v = read_any_int(src, ctx)?;
            <$ty>::try_from(v).map_err(|_| CodecError::TypeError { expected: $label, found: 0 })
        }
    };
}

int_reader!(read_u8, u8, "u8");
int_reader!(read_u16, u16, "u16");
int_reader!(read_u32, u32, "u32");
int_reader!(read_u64, u64, "u64");
int_reader!(read_i8, i8, "i8");
int_reader!(read_i16, i16, "i16");
int_reader!(read_i32, i32, "i32");
int_reader!(read_i64, i64, "i64");

// ---- floats ---------------------------------------------------------------

pub fn write_f32(sink: &mut dyn ByteSink, v: f32, ctx: &StreamContext) -> Result<(), CodecError> {
    sink.put(FLOAT32)?;
    sink.put_num32(v.to_bits(), ctx.byte_order())
}

pub fn write_f64(sink: &mut dyn ByteSink, v: f64, ctx: &StreamContext) -> Result<(), CodecError> {
    sink.put(FLOAT64)?;
    sink.put_num64(v.to_bits(), ctx.byte_order())
}

pub fn read_f32(src: &mut dyn ByteSource, ctx: &StreamContext) -> Result<f32, CodecError> {
    let b = src.get()?;
    if b != FLOAT32 {
        return Err(CodecError::TypeError { expected: "f32", found: b });
    }
    Ok(f32::from_bits(src.get_num32(ctx.byte_order())?))
}

/// Reads an `f64`. Per the smallest-fits widening rule, a `Float32` value
/// is promoted; a `Float64` value is read directly.
pub fn read_f64(src: &mut dyn ByteSource, ctx: &StreamContext) -> Result<f64, CodecError> {
    let order = ctx.byte_order();
    let b = src.get()?;
    match b {
        FLOAT32 => Ok(f32::from_bits(src.get_num32(order)?) as f64),
        FLOAT64 => Ok(f64::from_bits(src.get_num64(order)?)),
        other => Err(CodecError::TypeError { expected: "f64", found: other }),
    }
}

// ---- strings / binary ------------------------------------------------------

pub fn write_str(sink: &mut dyn ByteSink, s: &str, ctx: &StreamContext) -> Result<(), CodecError> {
    let order = ctx.byte_order();
    let bytes = s.as_bytes();
    let len = bytes.len();
    if len <= 31 {
        sink.put(0xa0 | len as u8)?;
    } else if len <= u8::MAX as usize {
        sink.put(STR8)?;
        sink.put(len as u8)?;
    } else if len <= u16::MAX as usize {
        sink.put(STR16)?;
        sink.put_num16(len as u16, order)?;
    } else {
        sink.put(STR32)?;
        sink.put_num32(len as u32, order)?;
    }
    sink.putn(bytes)
}

pub fn read_str(src: &mut dyn ByteSource, ctx: &StreamContext) -> Result<String, CodecError> {
    let order = ctx.byte_order();
    let b = src.get()?;
    let len = match Typecode::from_byte(b) {
        Typecode::FixStr(n) => n as usize,
        Typecode::Str8 => {
            let mut buf = [0u8; 1];
            src.getn(&mut buf)?;
            buf[0] as usize
        }
        Typecode::Str16 => src.get_num16(order)? as usize,
        Typecode::Str32 => src.get_num32(order)? as usize,
        _ => return Err(CodecError::TypeError { expected: "str", found: b }),
    };
    let mut bytes = vec![0u8; len];
    src.getn(&mut bytes)?;
    String::from_utf8(bytes).map_err(|_| CodecError::TypeError { expected: "utf8 str", found: b })
}

pub fn write_bin(sink: &mut dyn ByteSink, bytes: &[u8], ctx: &StreamContext) -> Result<(), CodecError> {
    let order = ctx.byte_order();
    let len = bytes.len();
    if len <= u8::MAX as usize {
        sink.put(BIN8)?;
        sink.put(len as u8)?;
    } else if len <= u16::MAX as usize {
        sink.put(BIN16)?;
        sink.put_num16(len as u16, order)?;
    } else {
        sink.put(BIN32)?;
        sink.put_num32(len as u32, order)?;
    }
    sink.putn(bytes)
}

pub fn read_bin(src: &mut dyn ByteSource, ctx: &StreamContext) -> Result<Vec<u8>, CodecError> {
    let order = ctx.byte_order();
    let b = src.get()?;
    let len = match b {
        BIN8 => {
            let mut buf = [0u8; 1];
            src.getn(&mut buf)?;
            buf[0] as usize
        }
        BIN16 => src.get_num16(order)? as usize,
        BIN32 => src.get_num32(order)? as usize,
        other => return Err(CodecError::TypeError { expected: "bin", found: other }),
    };
    let mut bytes = vec![0u8; len];
    src.getn(&mut bytes)?;
    Ok(bytes)
}

// ---- arrays / maps ----------------------------------------------------------

pub fn write_array_header(sink: &mut dyn ByteSink, len: usize, ctx: &StreamContext) -> Result<(), CodecError> {
    if len <= 15 {
        sink.put(0x90 | len as u8)
    } else if len <= u16::MAX as usize {
        sink.put(ARRAY16)?;
        sink.put_num16(len as u16, ctx.byte_order())
    } else {
        sink.put(ARRAY32)?;
        sink.put_num32(len as u32, ctx.byte_order())
    }
}

pub fn read_array_header(src: &mut dyn ByteSource, ctx: &StreamContext) -> Result<usize, CodecError> {
    let order = ctx.byte_order();
    let b = src.get()?;
    match Typecode::from_byte(b) {
        Typecode::FixArray(n) => Ok(n as usize),
        Typecode::Array16 => Ok(src.get_num16(order)? as usize),
        Typecode::Array32 => Ok(src.get_num32(order)? as usize),
        _ => Err(CodecError::TypeError { expected: "array", found: b }),
    }
}

pub fn write_map_header(sink: &mut dyn ByteSink, len: usize, ctx: &StreamContext) -> Result<(), CodecError> {
    if len <= 15 {
        sink.put(0x80 | len as u8)
    } else if len <= u16::MAX as usize {
        sink.put(MAP16)?;
        sink.put_num16(len as u16, ctx.byte_order())
    } else {
        sink.put(MAP32)?;
        sink.put_num32(len as u32, ctx.byte_order())
    }
}

pub fn read_map_header(src: &mut dyn ByteSource, ctx: &StreamContext) -> Result<usize, CodecError> {
    let order = ctx.byte_order();
    let b = src.get()?;
    match Typecode::from_byte(b) {
        Typecode::FixMap(n) => Ok(n as usize),
        Typecode::Map16 => Ok(src.get_num16(order)? as usize),
        Typecode::Map32 => Ok(src.get_num32(order)? as usize),
        _ => Err(CodecError::TypeError { expected: "map", found: b }),
    }
}

// ---- extensions -------------------------------------------------------------

/// Writes the fixed-extension family: a payload of exactly 1/2/4/8/16 bytes
/// tagged with a user-provided extension type byte.
pub fn write_fixext(sink: &mut dyn ByteSink, ext_type: u8, payload: &[u8]) -> Result<(), CodecError> {
    let code = match payload.len() {
        1 => FIXEXT1,
        2 => FIXEXT2,
        4 => FIXEXT4,
        8 => FIXEXT8,
        16 => FIXEXT16,
        _ => return Err(CodecError::TypeError { expected: "fixext length in {1,2,4,8,16}", found: 0 }),
    };
    sink.put(code)?;
    sink.put(ext_type)?;
    sink.putn(payload)
}

pub fn read_fixext(src: &mut dyn ByteSource) -> Result<(u8, Vec<u8>), CodecError> {
    let b = src.get()?;
    let len = match b {
        FIXEXT1 => 1,
        FIXEXT2 => 2,
        FIXEXT4 => 4,
        FIXEXT8 => 8,
        FIXEXT16 => 16,
        other => return Err(CodecError::TypeError { expected: "fixext", found: other }),
    };
    let ext_type = src.get()?;
    let mut payload = vec![0u8; len];
    src.getn(&mut payload)?;
    Ok((ext_type, payload))
}

/// Writes the variable-extension family: length prefix + type byte + payload.
pub fn write_ext(sink: &mut dyn ByteSink, ext_type: u8, payload: &[u8], ctx: &StreamContext) -> Result<(), CodecError> {
    let order = ctx.byte_order();
    let len = payload.len();
    if len <= u8::MAX as usize {
        sink.put(EXT8)?;
        sink.put(len as u8)?;
    } else if len <= u16::MAX as usize {
        sink.put(EXT16)?;
        sink.put_num16(len as u16, order)?;
    } else {
        sink.put(EXT32)?;
        sink.put_num32(len as u32, order)?;
    }
    sink.put(ext_type)?;
    sink.putn(payload)
}

pub fn read_ext(src: &mut dyn ByteSource, ctx: &StreamContext) -> Result<(u8, Vec<u8>), CodecError> {
    let order = ctx.byte_order();
    let b = src.get()?;
    let len = match b {
        EXT8 => {
            let mut buf = [0u8; 1];
            src.getn(&mut buf)?;
            buf[0] as usize
        }
        EXT16 => src.get_num16(order)? as usize,
        EXT32 => src.get_num32(order)? as usize,
        other => return Err(CodecError::TypeError { expected: "ext", found: other }),
    };
    let ext_type = src.get()?;
    let mut payload = vec![0u8; len];
    src.getn(&mut payload)?;
    Ok((ext_type, payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::stream::{SliceSource, VecSink};
    use crate::codec::stream_context::ByteOrderKind;

    fn roundtrip_uint(v: u64) {
        let ctx = StreamContext::default();
        let mut sink = VecSink::new();
        write_uint(&mut sink, v, &ctx).unwrap();
        let bytes = sink.into_inner();
        let mut src = SliceSource::new(&bytes);
        assert_eq!(read_u64(&mut src, &ctx).unwrap(), v);
    }

    #[test]
    fn uint_smallest_fits_round_trips() {
        for v in [0u64, 1, 127, 128, 255, 256, 65535, 65536, u32::MAX as u64, u32::MAX as u64 + 1, u64::MAX] {
            roundtrip_uint(v);
        }
    }

    #[test]
    fn negative_ints_round_trip() {
        let ctx = StreamContext::default();
        for v in [-1i64, -32, -33, i8::MIN as i64, i8::MIN as i64 - 1, i16::MIN as i64, i32::MIN as i64, i64::MIN] {
            let mut sink = VecSink::new();
            write_int(&mut sink, v, &ctx).unwrap();
            let bytes = sink.into_inner();
            let mut src = SliceSource::new(&bytes);
            assert_eq!(read_i64(&mut src, &ctx).unwrap(), v);
        }
    }

    #[test]
    fn wrong_category_is_a_type_error() {
        let ctx = StreamContext::default();
        let mut sink = VecSink::new();
        write_str(&mut sink, "hi", &ctx).unwrap();
        let bytes = sink.into_inner();
        let mut src = SliceSource::new(&bytes);
        assert!(matches!(read_u64(&mut src, &ctx), Err(CodecError::TypeError { .. })));
    }

    #[test]
    fn string_round_trips() {
        let ctx = StreamContext::default();
        let mut sink = VecSink::new();
        write_str(&mut sink, "hello, armi", &ctx).unwrap();
        let bytes = sink.into_inner();
        let mut src = SliceSource::new(&bytes);
        assert_eq!(read_str(&mut src, &ctx).unwrap(), "hello, armi");
    }

    #[test]
    fn float32_promotes_to_f64_on_read() {
        let ctx = StreamContext::default();
        let mut sink = VecSink::new();
        write_f32(&mut sink, 1.5, &ctx).unwrap();
        let bytes = sink.into_inner();
        let mut src = SliceSource::new(&bytes);
        assert_eq!(read_f64(&mut src, &ctx).unwrap(), 1.5);
    }

    #[test]
    fn fixext_round_trips() {
        let mut sink = VecSink::new();
        write_fixext(&mut sink, 7, &[1, 2, 3, 4]).unwrap();
        let bytes = sink.into_inner();
        let mut src = SliceSource::new(&bytes);
        assert_eq!(read_fixext(&mut src).unwrap(), (7, vec![1, 2, 3, 4]));
    }

    #[test]
    fn little_endian_context_actually_changes_the_wire_bytes() {
        let be = StreamContext::default();
        let le = StreamContext::builder().byte_order(ByteOrderKind::LittleEndian).build();

        let mut be_sink = VecSink::new();
        write_uint(&mut be_sink, 0x1234, &be).unwrap();
        let mut le_sink = VecSink::new();
        write_uint(&mut le_sink, 0x1234, &le).unwrap();
        assert_ne!(be_sink.into_inner(), le_sink.into_inner());

        let mut sink = VecSink::new();
        write_uint(&mut sink, 0x1234, &le).unwrap();
        let bytes = sink.into_inner();
        let mut src = SliceSource::new(&bytes);
        assert_eq!(read_u64(&mut src, &le).unwrap(), 0x1234);
    }
}
