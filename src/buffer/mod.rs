//! Buffer primitives (§3 "Buffer types", §4.2).
//!
//! Three flavors are provided, matching the invariants in §4.2 exactly:
//!
//! - [`MutableBuffer`]: exclusively owned, resizable, writable. Capacity
//!   only ever grows.
//! - [`SharedBuffer`]: reference-counted, immutable after construction,
//!   O(1) slicing that retains the underlying allocation.
//! - [`ConstBuffer`]: a read-only borrow, either aliasing a [`SharedBuffer`]
//!   (refcount bump) or copied from a [`MutableBuffer`] (a [`MutableBuffer`]
//!   may still grow after the borrow is taken, so it cannot be aliased).
//!
//! None of the three exposes a way to construct a value that violates
//! `data + size <= allocation_end`; every entry point that could overflow
//! returns [`BufferError`] instead of panicking, the one exception being
//! indexing past `len()`, which panics exactly as slice indexing does
//! elsewhere in the standard library.

mod const_buf;
mod mutable;
mod shared;

pub use const_buf::ConstBuffer;
pub use mutable::MutableBuffer;
pub use shared::SharedBuffer;

use thiserror::Error;

/// Failure modes for buffer allocation and resizing (§4.2).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BufferError {
    #[error("allocator failed to provide the requested space")]
    NoBufferSpace,
    #[error("this buffer's allocation policy does not allow reallocation")]
    OperationNotSupported,
}
