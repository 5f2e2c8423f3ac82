//! Stream context: the immutable, shared configuration bundle threaded
//! through every encode/decode pass (§3 "Stream context", §6).

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::CategoryRegistry;

use super::error::CodecError;
use super::stream::ByteSource;

/// Decodes a polymorphic pointer body for one registered type tag, producing
/// a type-erased handle the caller downcasts with [`TypeRegistry::can_downcast`]
/// already having been consulted.
pub type DecodeFn = fn(&mut dyn ByteSource, &StreamContext) -> Result<Arc<dyn Any + Send + Sync>, CodecError>;

/// Byte order applied to multibyte numeric fields. Fixed for the lifetime
/// of a [`StreamContext`]; big-endian is the default per §4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrderKind {
    BigEndian,
    LittleEndian,
}

impl Default for ByteOrderKind {
    fn default() -> Self {
        ByteOrderKind::BigEndian
    }
}

/// A small integer identifying a concrete type known to a [`StreamContext`]
/// (§3 "Polymorphic type registry").
pub type TypeTag = u16;

/// Reserved tag encoding a null polymorphic pointer.
pub const INVALID_TAG: TypeTag = TypeTag::MAX;

/// The fixed set of concrete types known to a stream context, each assigned
/// a type tag, plus the precomputed downcast-legality matrix.
///
/// Populating this table is normally the job of generated interface code;
/// here it is exposed as an explicit builder so a hand-written server/client
/// pair can declare it directly.
#[derive(Clone)]
pub struct TypeRegistry {
    names: HashMap<TypeTag, &'static str>,
    /// `downcast[(source_tag, target_tag)]` — may a pointer decoded as
    /// `source_tag` be handed up as `target_tag`?
    downcast: HashMap<(TypeTag, TypeTag), bool>,
    decoders: HashMap<TypeTag, DecodeFn>,
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("names", &self.names)
            .field("downcast", &self.downcast)
            .field("decoders", &self.decoders.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self { names: HashMap::new(), downcast: HashMap::new(), decoders: HashMap::new() }
    }
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a concrete type under `tag`, legal to downcast to itself.
    pub fn register(&mut self, tag: TypeTag, name: &'static str) -> &mut Self {
        self.names.insert(tag, name);
        self.downcast.insert((tag, tag), true);
        self
    }

    /// Registers the decode function invoked when a pointer body tagged
    /// `tag` is encountered (§3 "Polymorphic type registry").
    pub fn register_decoder(&mut self, tag: TypeTag, decode: DecodeFn) -> &mut Self {
        self.decoders.insert(tag, decode);
        self
    }

    pub fn decoder(&self, tag: TypeTag) -> Option<DecodeFn> {
        self.decoders.get(&tag).copied()
    }

    /// Declares that a pointer decoded as `source_tag` may be handed up as
    /// `target_tag` (e.g. a concrete type registered against a base type).
    pub fn allow_downcast(&mut self, source_tag: TypeTag, target_tag: TypeTag) -> &mut Self {
        self.downcast.insert((source_tag, target_tag), true);
        self
    }

    pub fn is_known(&self, tag: TypeTag) -> bool {
        tag == INVALID_TAG || self.names.contains_key(&tag)
    }

    pub fn name(&self, tag: TypeTag) -> Option<&'static str> {
        self.names.get(&tag).copied()
    }

    pub fn can_downcast(&self, source_tag: TypeTag, target_tag: TypeTag) -> bool {
        source_tag == target_tag || self.downcast.get(&(source_tag, target_tag)).copied().unwrap_or(false)
    }
}

/// Immutable, shareable configuration for one codec stream (§3, §6).
///
/// Carries the category registry, the pointer-deduplication toggle, the
/// byte-order selection, and the polymorphic type registry. Cheap to clone
/// (an `Arc` handle internally), matching the teacher's `Arc<...>`-heavy
/// `rpc::Context` for per-connection shared state.
#[derive(Debug, Clone)]
pub struct StreamContext(Arc<Inner>);

#[derive(Debug)]
struct Inner {
    byte_order: ByteOrderKind,
    dedup_enabled: bool,
    categories: CategoryRegistry,
    types: TypeRegistry,
}

impl StreamContext {
    pub fn builder() -> StreamContextBuilder {
        StreamContextBuilder::default()
    }

    pub fn byte_order(&self) -> ByteOrderKind {
        self.0.byte_order
    }

    pub fn dedup_enabled(&self) -> bool {
        self.0.dedup_enabled
    }

    pub fn categories(&self) -> &CategoryRegistry {
        &self.0.categories
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.0.types
    }
}

impl Default for StreamContext {
    fn default() -> Self {
        StreamContext::builder().build()
    }
}

/// Builder for [`StreamContext`], matching the teacher's `NFSTcpListener`
/// builder-method construction style rather than a config file.
#[derive(Debug, Default)]
pub struct StreamContextBuilder {
    byte_order: ByteOrderKind,
    dedup_enabled: bool,
    user_categories: Vec<String>,
    types: TypeRegistry,
}

impl StreamContextBuilder {
    pub fn byte_order(mut self, order: ByteOrderKind) -> Self {
        self.byte_order = order;
        self
    }

    pub fn dedup(mut self, enabled: bool) -> Self {
        self.dedup_enabled = enabled;
        self
    }

    pub fn category<S: Into<String>>(mut self, name: S) -> Self {
        self.user_categories.push(name.into());
        self
    }

    pub fn types(mut self, types: TypeRegistry) -> Self {
        self.types = types;
        self
    }

    pub fn build(self) -> StreamContext {
        StreamContext(Arc::new(Inner {
            byte_order: self.byte_order,
            dedup_enabled: self.dedup_enabled,
            categories: CategoryRegistry::new(self.user_categories),
            types: self.types,
        }))
    }
}
