//! Hand-written primitives a code generator would target (§4.7).
//!
//! Code generation from interface declarations is out of scope (§1), so
//! this module provides what a generator would emit by hand: dense
//! `MethodOrdinal`/`InterfaceIndex` newtypes, a `call_method!` helper that
//! packs `[request_id, method_id, args]` the way the teacher's
//! `XDRStruct!`/`XDREnumSerde!` macros pack a fixed-shape record
//! (`protocol/xdr/mod.rs`), and one fully worked interface — `Counter` —
//! used by the increment/decrement scenario (§8).

use crate::codec::Value;
use crate::error::{ErrorCode, RpcError};

use super::client::{ChannelId, TransientOverrides};
use super::server::{fail_only, reply, FailReplyProxy, StubTable};
use super::transport::ClientHandle;

/// A dense, zero-based method ordinal within one interface.
pub type MethodOrdinal = u32;

/// A dense index identifying one interface, fixed at construction (stable
/// for the lifetime of a process — it is never renumbered once assigned).
pub type InterfaceIndex = u32;

/// Packs `[request_id, method_id, args]` the way a generated proxy method
/// would and issues the call through a [`ClientHandle`]. `request_id`
/// allocation itself lives in [`super::client::ClientContext`]; this macro
/// is the boilerplate a generator would otherwise emit around that call —
/// converting typed arguments into [`Value`]s and the raw [`Value`] reply
/// back into the method's declared return type.
#[macro_export]
macro_rules! call_method {
    ($handle:expr, $channel_id:expr, $method_id:expr, [$($arg:expr),* $(,)?]) => {
        $handle.call($channel_id, $method_id, vec![$(::std::convert::From::from($arg)),*], None)
    };
}

/// The `Counter` interface: `increment(by) -> u64`, `decrement(by) -> u64`,
/// `value() -> u64`, and a `reset()` fire-and-forget method. One fully
/// worked proxy/stub pair supporting the §8 increment/decrement scenario.
pub mod counter {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};

    pub const METHOD_INCREMENT: MethodOrdinal = 0;
    pub const METHOD_DECREMENT: MethodOrdinal = 1;
    pub const METHOD_VALUE: MethodOrdinal = 2;
    pub const METHOD_RESET: MethodOrdinal = 3;

    /// The server-side target object: one instance per registered channel.
    pub struct Counter {
        value: AtomicI64,
    }

    impl Counter {
        pub fn new(initial: i64) -> Self {
            Self { value: AtomicI64::new(initial) }
        }

        pub fn load(&self) -> i64 {
            self.value.load(Ordering::SeqCst)
        }
    }

    impl Default for Counter {
        fn default() -> Self {
            Self::new(0)
        }
    }

    /// Registers the four `Counter` stubs into `stubs`, the shape each one
    /// uses mirroring what a generator would pick per method signature
    /// (§4.5's five shapes): `increment`/`decrement`/`value` are
    /// synchronous value-returning calls (`reply`), `reset` reports failure
    /// only (`fail_only`).
    pub fn register_stubs(stubs: &mut StubTable) {
        stubs.register(
            METHOD_INCREMENT,
            1,
            reply::<Counter, _>(|target, args| {
                let by = decode_i64(&args[0])?;
                let updated = target.value.fetch_add(by, Ordering::SeqCst) + by;
                Ok(Value::Int(updated))
            }),
        );
        stubs.register(
            METHOD_DECREMENT,
            1,
            reply::<Counter, _>(|target, args| {
                let by = decode_i64(&args[0])?;
                let updated = target.value.fetch_sub(by, Ordering::SeqCst) - by;
                Ok(Value::Int(updated))
            }),
        );
        stubs.register(
            METHOD_VALUE,
            0,
            reply::<Counter, _>(|target, _args| Ok(Value::Int(target.value.load(Ordering::SeqCst)))),
        );
        stubs.register(
            METHOD_RESET,
            0,
            fail_only::<Counter, _>(|target, _args, _proxy: FailReplyProxy| {
                target.value.store(0, Ordering::SeqCst);
            }),
        );
    }

    fn decode_i64(value: &Value) -> Result<i64, RpcError> {
        match value {
            Value::Int(i) => Ok(*i),
            Value::UInt(u) => Ok(*u as i64),
            _ => Err(RpcError::ExceptionThrownByMethodStub("expected an integer argument".into())),
        }
    }

    /// Decodes a reply value on the proxy side, where a malformed reply is
    /// reported the same way a remote failure would be rather than panicking.
    fn reply_as_i64(value: &Value) -> Result<i64, ErrorCode> {
        decode_i64(value).map_err(|_| ErrorCode::new(crate::error::CATEGORY_OS, -1))
    }

    /// The client-side proxy: a thin typed wrapper over a [`ClientHandle`]
    /// bound to one channel.
    pub struct CounterProxy {
        handle: ClientHandle,
        channel_id: ChannelId,
    }

    impl CounterProxy {
        pub fn new(handle: ClientHandle, channel_id: ChannelId) -> Self {
            Self { handle, channel_id }
        }

        pub async fn increment(&self, by: i64) -> Result<i64, ErrorCode> {
            let reply = self.handle.call(self.channel_id, METHOD_INCREMENT, vec![Value::Int(by)], None).await?;
            reply_as_i64(&reply)
        }

        pub async fn decrement(&self, by: i64) -> Result<i64, ErrorCode> {
            let reply = self.handle.call(self.channel_id, METHOD_DECREMENT, vec![Value::Int(by)], None).await?;
            reply_as_i64(&reply)
        }

        pub async fn value(&self) -> Result<i64, ErrorCode> {
            let reply = self.handle.call(self.channel_id, METHOD_VALUE, vec![], None).await?;
            reply_as_i64(&reply)
        }

        pub async fn reset(&self) -> Result<(), ErrorCode> {
            self.handle.call(self.channel_id, METHOD_RESET, vec![], None).await.map(|_| ())
        }

        /// Issues one call against a different channel or with a different
        /// timeout than this proxy's default, per §9's transient-override
        /// resolution: valid for exactly the call it decorates.
        pub async fn increment_with(&self, by: i64, overrides: TransientOverrides) -> Result<i64, ErrorCode> {
            let reply = self
                .handle
                .call(self.channel_id, METHOD_INCREMENT, vec![Value::Int(by)], Some(overrides))
                .await?;
            reply_as_i64(&reply)
        }
    }
}

pub use counter::{Counter, CounterProxy};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CategoryRegistry;
    use crate::rpc::transport::{ClientTransport, ServerTransport};
    use std::any::Any;
    use std::sync::Arc;
    use tokio::io::duplex;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn counter_proxy_round_trips_increment_and_decrement() {
        let (client_io, server_io) = duplex(4096);

        let mut stubs = StubTable::new();
        counter::register_stubs(&mut stubs);
        let stubs = Arc::new(stubs);

        let mut server = ServerTransport::new(CategoryRegistry::default(), stubs);
        server.accept(server_io, Arc::new(Counter::new(0)) as Arc<dyn Any + Send + Sync>);
        tokio::spawn(async move { server.run().await });

        let mut client = ClientTransport::new(CategoryRegistry::default());
        let channel_id = client.connect(client_io);
        let proxy = CounterProxy::new(client.handle(), channel_id);
        tokio::spawn(async move { client.run().await });

        let v = timeout(Duration::from_secs(1), proxy.increment(5)).await.unwrap().unwrap();
        assert_eq!(v, 5);
        let v = timeout(Duration::from_secs(1), proxy.increment(5)).await.unwrap().unwrap();
        assert_eq!(v, 10);
        let v = timeout(Duration::from_secs(1), proxy.decrement(3)).await.unwrap().unwrap();
        assert_eq!(v, 7);
        let v = timeout(Duration::from_secs(1), proxy.value()).await.unwrap().unwrap();
        assert_eq!(v, 7);
        timeout(Duration::from_secs(1), proxy.reset()).await.unwrap().unwrap();
        let v = timeout(Duration::from_secs(1), proxy.value()).await.unwrap().unwrap();
        assert_eq!(v, 0);
    }
}
