//! The RPC engine: request/reply correlation, method dispatch, and the
//! transport adapter that drives both over a pipeline connection (§4.4,
//! §4.5, §4.6, §4.7).
//!
//! [`client`] and [`server`] hold the two halves of one context's
//! bookkeeping; [`wire`] is the envelope codec that multiplexes both
//! directions over one duplex stream; [`transport`] binds a context to one
//! or more live connections; [`proxy`] is the hand-written typed surface a
//! code generator would otherwise emit.

pub mod client;
pub mod proxy;
pub mod server;
pub mod transport;
pub mod wire;

pub use client::{ChannelId, ClientContext, ReplyReceiver, RequestId, TransientOverrides};
pub use proxy::{Counter, CounterProxy};
pub use server::{
    fail_only, one_way, promise, reply, reply_proxy, FailReplyProxy, MethodId, OutgoingReply,
    ReplyProxy, ServerContext, StubTable,
};
pub use transport::{ChannelIdAllocator, ClientHandle, ClientTransport, ServerTransport};
pub use wire::Envelope;
