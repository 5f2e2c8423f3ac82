//! armi-rpc — a transport-agnostic asynchronous RPC runtime.
//!
//! This crate provides a self-describing binary wire codec, a set of
//! buffer primitives tuned for zero-copy-where-possible message handling,
//! a composable layered byte-stream pipeline, and an RPC engine built on
//! top of all three: request/reply correlation, per-call timeout
//! scheduling, cancellation cascades, and five shapes of server-side
//! method dispatch.
//!
//! ## Main components
//!
//! - [`codec`]: the MessagePack-compatible self-describing byte format —
//!   typecodes, smallest-fits integer packing, strings/binary/arrays/maps,
//!   extension types, polymorphic pointers with stream-scoped dedup, and
//!   wire-encoded error codes.
//!
//! - [`buffer`]: the three buffer flavors messages are built and sliced
//!   from — `MutableBuffer` (exclusive, resizable), `SharedBuffer`
//!   (refcounted, O(1) slicing), and `ConstBuffer` (a frozen view over
//!   either).
//!
//! - [`pipeline`]: the layered duplex stream stack — an anchor bound to
//!   the raw transport, a length-delimited framer, a pass-through TLS
//!   slot, and the driver surface the RPC layer above it drives.
//!
//! - [`rpc`]: the engine itself — `client`/`server` contexts, the
//!   request/reply envelope codec, the transport adapter that binds a
//!   context to live connections, and the hand-written typed proxy/stub
//!   primitives a code generator would otherwise target.
//!
//! - [`error`]: the categorized error model shared by every layer —
//!   `ErrorCode`'s wire representation, the `RpcError` taxonomy, and the
//!   per-context `CategoryRegistry` that resolves codes for transmission.
//!
//! ## Usage
//!
//! Build a [`pipeline::PipelineAssembly`] over any `AsyncRead + AsyncWrite`
//! transport, hand it to a [`rpc::ClientTransport`] (via `connect`) or
//! [`rpc::ServerTransport`] (via `accept`), and drive the resulting
//! context's `run` loop on the task that owns it — see
//! [`rpc::proxy::counter`] for a fully worked client/server example.

pub mod buffer;
pub mod codec;
pub mod error;
pub mod pipeline;
pub mod rpc;

pub use error::{CategoryRegistry, ErrorCode, RpcError};
