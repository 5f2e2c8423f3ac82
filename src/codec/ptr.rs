//! Polymorphic pointer encoding (§4.1 "Polymorphic pointers", §8's
//! pointer-deduplication scenario).
//!
//! A pointer is encoded as `[type_tag, body]`. When deduplication is
//! enabled on the [`StreamContext`], the first time a given object is
//! encoded on a stream its body is written in full and the object is
//! assigned the next dedup index; every subsequent encode of the *same*
//! object (by identity, not value) writes `[type_tag, saved_index]` instead.
//! A null pointer is `[INVALID_TAG, nil]`.
//!
//! Disambiguating an index from a body on decode relies on the convention
//! that every registered body encodes as an array or map — never a bare
//! integer — so peeking the typecode that follows the tag is enough to
//! tell which shape follows.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use super::error::CodecError;
use super::raw;
use super::stream::{ByteSink, ByteSource};
use super::stream_context::{StreamContext, TypeTag, INVALID_TAG};
use super::typecode::Typecode;

/// A concrete type that can appear behind a polymorphic pointer.
pub trait Polymorphic: Any + Send + Sync {
    fn type_tag(&self) -> TypeTag;
    fn encode_body(&self, sink: &mut dyn ByteSink, ctx: &StreamContext) -> Result<(), CodecError>;
}

fn is_integer_typecode(b: u8) -> bool {
    matches!(
        Typecode::from_byte(b),
        Typecode::PosFixint(_)
            | Typecode::NegFixint(_)
            | Typecode::Uint8
            | Typecode::Uint16
            | Typecode::Uint32
            | Typecode::Uint64
            | Typecode::Int8
            | Typecode::Int16
            | Typecode::Int32
            | Typecode::Int64
    )
}

/// Per-encode-pass dedup table, keyed by the encoded object's allocation
/// address. One session spans exactly one logical message; it is not meant
/// to be reused across messages (the source never keeps objects alive that
/// long, so indices would outlive their referents).
#[derive(Debug, Default)]
pub struct PtrEncodeSession {
    seen: HashMap<usize, u32>,
    next_index: u32,
}

impl PtrEncodeSession {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Per-decode-pass table mirroring [`PtrEncodeSession`]: index `i` holds the
/// `i`-th distinct object decoded on this message, in encounter order.
#[derive(Debug, Default)]
pub struct PtrDecodeSession {
    seen: Vec<Arc<dyn Any + Send + Sync>>,
}

impl PtrDecodeSession {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Encodes `value` as a polymorphic pointer, consulting and updating
/// `session` for dedup when [`StreamContext::dedup_enabled`] is set.
pub fn encode_ptr(
    sink: &mut dyn ByteSink,
    ctx: &StreamContext,
    session: &mut PtrEncodeSession,
    value: Option<&Arc<dyn Polymorphic>>,
) -> Result<(), CodecError> {
    let value = match value {
        None => {
            raw::write_array_header(sink, 2, ctx)?;
            raw::write_uint(sink, INVALID_TAG as u64, ctx)?;
            return raw::write_nil(sink);
        }
        Some(v) => v,
    };

    let tag = value.type_tag();
    raw::write_array_header(sink, 2, ctx)?;
    raw::write_uint(sink, tag as u64, ctx)?;

    if !ctx.dedup_enabled() {
        return value.encode_body(sink, ctx);
    }

    // Widening a fat Arc pointer to a thin `*const ()` keeps only the data
    // address, which is what identifies the allocation regardless of the
    // trait object's vtable.
    let addr = Arc::as_ptr(value) as *const () as usize;
    if let Some(&idx) = session.seen.get(&addr) {
        raw::write_uint(sink, idx as u64, ctx)
    } else {
        let idx = session.next_index;
        session.next_index += 1;
        session.seen.insert(addr, idx);
        value.encode_body(sink, ctx)
    }
}

/// Decodes a polymorphic pointer expected to resolve to `target_tag`,
/// returning `None` for a null pointer and resolving dedup indices against
/// `session` otherwise. The returned handle is downcast with
/// [`std::any::Any`] by the caller, which is expected to already know the
/// concrete type `target_tag` names.
///
/// The decoded tag must be downcast-legal to `target_tag` per
/// [`super::stream_context::TypeRegistry::can_downcast`] — a tag equal to
/// `target_tag` is always legal; anything else must have been declared
/// downcastable when the registry was built.
pub fn decode_ptr(
    src: &mut dyn ByteSource,
    ctx: &StreamContext,
    session: &mut PtrDecodeSession,
    target_tag: TypeTag,
) -> Result<Option<Arc<dyn Any + Send + Sync>>, CodecError> {
    let len = raw::read_array_header(src, ctx)?;
    if len != 2 {
        return Err(CodecError::MemberCountError { expected: 2, actual: len });
    }

    let tag = raw::read_u16(src, ctx)?;
    if tag == INVALID_TAG {
        raw::read_nil(src)?;
        return Ok(None);
    }
    if !ctx.types().is_known(tag) {
        return Err(CodecError::UnknownTypeTag(tag));
    }
    if !ctx.types().can_downcast(tag, target_tag) {
        return Err(CodecError::InvalidPtrDowncast { from: tag, to: target_tag });
    }

    let next_byte = src.peek()?;
    if ctx.dedup_enabled() && is_integer_typecode(next_byte) {
        let idx = raw::read_u32(src, ctx)? as usize;
        session
            .seen
            .get(idx)
            .cloned()
            .map(Some)
            .ok_or(CodecError::UnknownPtrIndex(idx as u32))
    } else {
        let decode_fn = ctx
            .types()
            .decoder(tag)
            .ok_or(CodecError::UnknownTypeTag(tag))?;
        let value = decode_fn(src, ctx)?;
        if ctx.dedup_enabled() {
            session.seen.push(value.clone());
        }
        Ok(Some(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::stream::{SliceSource, VecSink};
    use crate::codec::stream_context::TypeRegistry;

    const COUNTER_TAG: TypeTag = 7;

    #[derive(Debug, PartialEq)]
    struct CounterSnapshot {
        value: i64,
    }

    impl Polymorphic for CounterSnapshot {
        fn type_tag(&self) -> TypeTag {
            COUNTER_TAG
        }

        fn encode_body(&self, sink: &mut dyn ByteSink, ctx: &StreamContext) -> Result<(), CodecError> {
            use crate::codec::Codec;
            self.value.encode(sink, ctx)
        }
    }

    fn decode_counter(src: &mut dyn ByteSource, ctx: &StreamContext) -> Result<Arc<dyn Any + Send + Sync>, CodecError> {
        use crate::codec::Codec;
        let value = i64::decode(src, ctx)?;
        Ok(Arc::new(CounterSnapshot { value }) as Arc<dyn Any + Send + Sync>)
    }

    fn ctx_with_counter(dedup: bool) -> StreamContext {
        let mut types = TypeRegistry::new();
        types.register(COUNTER_TAG, "CounterSnapshot");
        types.register_decoder(COUNTER_TAG, decode_counter);
        StreamContext::builder().dedup(dedup).types(types).build()
    }

    #[test]
    fn null_pointer_round_trips() {
        let ctx = ctx_with_counter(true);
        let mut sink = VecSink::new();
        let mut enc = PtrEncodeSession::new();
        encode_ptr(&mut sink, &ctx, &mut enc, None).unwrap();
        let bytes = sink.into_inner();
        let mut src = SliceSource::new(&bytes);
        let mut dec = PtrDecodeSession::new();
        assert!(decode_ptr(&mut src, &ctx, &mut dec, COUNTER_TAG).unwrap().is_none());
    }

    #[test]
    fn repeated_pointer_dedups_to_an_index() {
        let ctx = ctx_with_counter(true);
        let obj: Arc<dyn Polymorphic> = Arc::new(CounterSnapshot { value: 42 });
        let mut sink = VecSink::new();
        let mut enc = PtrEncodeSession::new();
        encode_ptr(&mut sink, &ctx, &mut enc, Some(&obj)).unwrap();
        encode_ptr(&mut sink, &ctx, &mut enc, Some(&obj)).unwrap();
        let bytes = sink.into_inner();

        let mut src = SliceSource::new(&bytes);
        let mut dec = PtrDecodeSession::new();
        let first = decode_ptr(&mut src, &ctx, &mut dec, COUNTER_TAG).unwrap().unwrap();
        let second = decode_ptr(&mut src, &ctx, &mut dec, COUNTER_TAG).unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(
            first.downcast_ref::<CounterSnapshot>().unwrap(),
            &CounterSnapshot { value: 42 }
        );
    }

    #[test]
    fn distinct_objects_each_encode_their_own_body() {
        let ctx = ctx_with_counter(true);
        let a: Arc<dyn Polymorphic> = Arc::new(CounterSnapshot { value: 1 });
        let b: Arc<dyn Polymorphic> = Arc::new(CounterSnapshot { value: 2 });
        let mut sink = VecSink::new();
        let mut enc = PtrEncodeSession::new();
        encode_ptr(&mut sink, &ctx, &mut enc, Some(&a)).unwrap();
        encode_ptr(&mut sink, &ctx, &mut enc, Some(&b)).unwrap();
        let bytes = sink.into_inner();

        let mut src = SliceSource::new(&bytes);
        let mut dec = PtrDecodeSession::new();
        let first = decode_ptr(&mut src, &ctx, &mut dec, COUNTER_TAG).unwrap().unwrap();
        let second = decode_ptr(&mut src, &ctx, &mut dec, COUNTER_TAG).unwrap().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(second.downcast_ref::<CounterSnapshot>().unwrap().value, 2);
    }

    #[test]
    fn unknown_type_tag_is_rejected() {
        let ctx = ctx_with_counter(true);
        let mut sink = VecSink::new();
        raw::write_array_header(&mut sink, 2, &ctx).unwrap();
        raw::write_uint(&mut sink, 999, &ctx).unwrap();
        raw::write_nil(&mut sink).unwrap();
        let bytes = sink.into_inner();
        let mut src = SliceSource::new(&bytes);
        let mut dec = PtrDecodeSession::new();
        assert!(matches!(
            decode_ptr(&mut src, &ctx, &mut dec, COUNTER_TAG),
            Err(CodecError::UnknownTypeTag(999))
        ));
    }

    #[test]
    fn downcast_to_an_illegal_target_tag_is_rejected() {
        let ctx = ctx_with_counter(true);
        let obj: Arc<dyn Polymorphic> = Arc::new(CounterSnapshot { value: 1 });
        let mut sink = VecSink::new();
        let mut enc = PtrEncodeSession::new();
        encode_ptr(&mut sink, &ctx, &mut enc, Some(&obj)).unwrap();
        let bytes = sink.into_inner();

        const OTHER_TAG: TypeTag = 99;
        let mut src = SliceSource::new(&bytes);
        let mut dec = PtrDecodeSession::new();
        assert!(matches!(
            decode_ptr(&mut src, &ctx, &mut dec, OTHER_TAG),
            Err(CodecError::InvalidPtrDowncast { from: COUNTER_TAG, to: OTHER_TAG })
        ));
    }
}
