//! The self-describing binary codec (§4.1).
//!
//! A msgpack-compatible wire format: [`raw`] holds the typecode-level
//! encode/decode primitives, [`codec_trait::Codec`] is the per-type
//! serialization contract built on top of them, [`Value`] is the dynamic
//! representation used for introspection, and [`ptr`] layers polymorphic
//! pointer dedup over all of it. [`StreamContext`] is the configuration
//! bundle ([`ByteOrderKind`], the category registry, the type registry)
//! threaded through every encode/decode call.

mod codec_trait;
mod error;
pub mod ptr;
pub mod raw;
mod stream;
mod stream_context;
pub mod typecode;
mod value;

pub use codec_trait::{Bytes, Codec};
pub use error::CodecError;
pub use ptr::{decode_ptr, encode_ptr, Polymorphic, PtrDecodeSession, PtrEncodeSession};
pub use stream::{ByteSink, ByteSource, RandomAccessSink, SliceSource, VecSink};
pub use stream_context::{
    ByteOrderKind, DecodeFn, StreamContext, StreamContextBuilder, TypeRegistry, TypeTag,
    INVALID_TAG,
};
pub use typecode::Typecode;
pub use value::{PtrBody, Value};
