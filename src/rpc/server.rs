//! The server side of a context: target lookup, stub dispatch, and reply
//! delivery (§4.5).
//!
//! Five method shapes cover how a handler hands its result back, mirroring
//! the range the original `logicmill` stub generator supported without
//! requiring this crate to generate code (§1, §4.7): a fire-and-forget
//! shape, a synchronous value-or-error shape, a shape where the handler
//! takes the [`ReplyProxy`] itself (for handlers that finish on their own
//! schedule), a `Future`-returning shape (the natural Rust translation of
//! the promise-returning shape, per the Design Notes), and a fail-only
//! shape for void procedures that can still report an error.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use tokio::sync::mpsc;
use tracing::warn;

use super::client::{ChannelId, RequestId};
use crate::codec::Value;
use crate::error::{CategoryRegistry, ErrorCode, RpcError};

pub type MethodId = u32;

/// One reply bound for the transport's outgoing queue. `channel_id` is
/// carried alongside `request_id` because request ids are only unique
/// within a channel's connection lifetime from the transport's point of
/// view — it's what lets the transport route the encoded reply back to the
/// right connection's write queue.
#[derive(Debug)]
pub struct OutgoingReply {
    pub channel_id: ChannelId,
    pub request_id: RequestId,
    pub result: Result<Value, ErrorCode>,
}

/// A handle a stub uses to deliver exactly one reply. The first call to
/// `reply` or `fail` wins; every later call is a silent no-op, which is what
/// lets a handler be handed this proxy and trusted not to double-reply even
/// if it races itself (§4.5 "first-invocation-wins").
#[derive(Clone)]
pub struct ReplyProxy {
    channel_id: ChannelId,
    request_id: RequestId,
    out: mpsc::UnboundedSender<OutgoingReply>,
    categories: Arc<CategoryRegistry>,
    replied: Arc<AtomicBool>,
}

impl ReplyProxy {
    fn new(
        channel_id: ChannelId,
        request_id: RequestId,
        out: mpsc::UnboundedSender<OutgoingReply>,
        categories: Arc<CategoryRegistry>,
    ) -> Self {
        Self { channel_id, request_id, out, categories, replied: Arc::new(AtomicBool::new(false)) }
    }

    pub fn reply(&self, value: Value) {
        if self.replied.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.out.send(OutgoingReply {
            channel_id: self.channel_id,
            request_id: self.request_id,
            result: Ok(value),
        });
    }

    pub fn fail(&self, err: RpcError) {
        if self.replied.swap(true, Ordering::SeqCst) {
            return;
        }
        let code = err.to_error_code(&self.categories);
        let _ = self.out.send(OutgoingReply {
            channel_id: self.channel_id,
            request_id: self.request_id,
            result: Err(code),
        });
    }

    fn already_replied(&self) -> bool {
        self.replied.load(Ordering::SeqCst)
    }
}

/// A [`ReplyProxy`] restricted to reporting failure, for the fail-only shape.
pub struct FailReplyProxy(ReplyProxy);

impl FailReplyProxy {
    pub fn fail(&self, err: RpcError) {
        self.0.fail(err)
    }
}

type StubFn =
    Arc<dyn Fn(Arc<dyn Any + Send + Sync>, Vec<Value>, ReplyProxy) -> BoxFuture<'static, ()> + Send + Sync>;

fn downcast_or_fail<T: Send + Sync + 'static>(
    target: Arc<dyn Any + Send + Sync>,
    proxy: &ReplyProxy,
) -> Option<Arc<T>> {
    match target.downcast::<T>() {
        Ok(t) => Some(t),
        Err(_) => {
            warn!("stub target does not match the registered type for this method");
            proxy.fail(RpcError::UncaughtServerException);
            None
        }
    }
}

/// Fire-and-forget: the handler runs, nothing is ever sent back.
pub fn one_way<T, F>(f: F) -> StubFn
where
    T: Send + Sync + 'static,
    F: Fn(Arc<T>, Vec<Value>) + Send + Sync + 'static,
{
    Arc::new(move |target, args, proxy| {
        let f = f.clone_ref();
        Box::pin(async move {
            if let Some(t) = downcast_or_fail::<T>(target, &proxy) {
                f(t, args);
            }
        })
    })
}

/// Synchronous value-or-error: the handler returns its result directly.
pub fn reply<T, F>(f: F) -> StubFn
where
    T: Send + Sync + 'static,
    F: Fn(Arc<T>, Vec<Value>) -> Result<Value, RpcError> + Send + Sync + 'static,
{
    Arc::new(move |target, args, proxy| {
        let f = f.clone_ref();
        Box::pin(async move {
            if let Some(t) = downcast_or_fail::<T>(target, &proxy) {
                match f(t, args) {
                    Ok(v) => proxy.reply(v),
                    Err(e) => proxy.fail(e),
                }
            }
        })
    })
}

/// The handler receives the [`ReplyProxy`] directly and replies on its own
/// schedule (including after this call returns).
pub fn reply_proxy<T, F>(f: F) -> StubFn
where
    T: Send + Sync + 'static,
    F: Fn(Arc<T>, Vec<Value>, ReplyProxy) + Send + Sync + 'static,
{
    Arc::new(move |target, args, proxy| {
        let f = f.clone_ref();
        Box::pin(async move {
            if let Some(t) = downcast_or_fail::<T>(target, &proxy) {
                f(t, args, proxy);
            }
        })
    })
}

/// The promise-returning shape, translated to a native `Future`.
pub fn promise<T, F, Fut>(f: F) -> StubFn
where
    T: Send + Sync + 'static,
    F: Fn(Arc<T>, Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, RpcError>> + Send + 'static,
{
    Arc::new(move |target, args, proxy| {
        let f = f.clone_ref();
        Box::pin(async move {
            if let Some(t) = downcast_or_fail::<T>(target, &proxy) {
                match f(t, args).await {
                    Ok(v) => proxy.reply(v),
                    Err(e) => proxy.fail(e),
                }
            }
        })
    })
}

/// Fail-only: the handler can report failure explicitly; returning without
/// doing so is an implicit success reply of `nil`.
pub fn fail_only<T, F>(f: F) -> StubFn
where
    T: Send + Sync + 'static,
    F: Fn(Arc<T>, Vec<Value>, FailReplyProxy) + Send + Sync + 'static,
{
    Arc::new(move |target, args, proxy| {
        let f = f.clone_ref();
        Box::pin(async move {
            if let Some(t) = downcast_or_fail::<T>(target, &proxy) {
                let fail_proxy = FailReplyProxy(proxy.clone());
                f(t, args, fail_proxy);
                if !proxy.already_replied() {
                    proxy.reply(Value::Nil);
                }
            }
        })
    })
}

/// Small helper trait letting the shape constructors above clone a
/// `Fn`-bound closure into the returned `'static` future without requiring
/// callers to wrap every handler in an `Arc` themselves.
trait ClonableFn: Clone {
    fn clone_ref(&self) -> Self {
        self.clone()
    }
}
impl<T: Clone> ClonableFn for T {}

/// `method_id -> dispatcher`, shared across every channel speaking one
/// interface. Each entry also carries its declared arity, checked against
/// the incoming request's argument array before the stub ever runs (§4.5
/// step 2, `InvalidArgumentCount`).
#[derive(Default, Clone)]
pub struct StubTable {
    stubs: HashMap<MethodId, (usize, StubFn)>,
}

impl StubTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, method_id: MethodId, arity: usize, stub: StubFn) -> &mut Self {
        self.stubs.insert(method_id, (arity, stub));
        self
    }

    pub fn get(&self, method_id: MethodId) -> Option<(usize, StubFn)> {
        self.stubs.get(&method_id).cloned()
    }
}

/// Server-side per-connection state: which target object answers for each
/// channel, and where replies get queued for the transport to send.
pub struct ServerContext {
    targets: HashMap<ChannelId, Arc<dyn Any + Send + Sync>>,
    categories: Arc<CategoryRegistry>,
    out: mpsc::UnboundedSender<OutgoingReply>,
    _not_sync: PhantomData<*const ()>,
}

impl ServerContext {
    pub fn new(categories: CategoryRegistry, out: mpsc::UnboundedSender<OutgoingReply>) -> Self {
        Self {
            targets: HashMap::new(),
            categories: Arc::new(categories),
            out,
            _not_sync: PhantomData,
        }
    }

    pub fn register_target(&mut self, channel_id: ChannelId, target: Arc<dyn Any + Send + Sync>) {
        self.targets.insert(channel_id, target);
    }

    pub fn remove_target(&mut self, channel_id: ChannelId) -> Option<Arc<dyn Any + Send + Sync>> {
        self.targets.remove(&channel_id)
    }

    pub fn on_request(&self, channel_id: ChannelId) -> Option<Arc<dyn Any + Send + Sync>> {
        self.targets.get(&channel_id).cloned()
    }

    /// Dispatches one decoded request: arity is validated here against the
    /// stub's declared shape, target lookup and method lookup failures are
    /// folded into a reply rather than propagated, matching §4.5's "every
    /// failure mode reaches the caller as a reply, never a panic".
    pub async fn dispatch(
        &self,
        stubs: &StubTable,
        channel_id: ChannelId,
        request_id: RequestId,
        method_id: MethodId,
        args: Vec<Value>,
    ) {
        let proxy = ReplyProxy::new(channel_id, request_id, self.out.clone(), self.categories.clone());

        let target = match self.on_request(channel_id) {
            Some(t) => t,
            None => {
                proxy.fail(RpcError::NoImplementationInstanceRegistered(channel_id));
                return;
            }
        };

        let (arity, stub) = match stubs.get(method_id) {
            Some(s) => s,
            None => {
                proxy.fail(RpcError::NoImplementationInstanceRegistered(channel_id));
                return;
            }
        };

        if args.len() != arity {
            proxy.fail(RpcError::InvalidArgumentCount { expected: arity, actual: args.len() });
            return;
        }

        // A handler body that panics must still produce a reply (§4.5):
        // the caller is awaiting this request id and would otherwise hang
        // forever. `catch_unwind` turns the panic into an error reply
        // instead of letting it propagate into the task driving `dispatch`.
        let failure_proxy = proxy.clone();
        let outcome = std::panic::AssertUnwindSafe((stub)(target, args, proxy)).catch_unwind().await;
        if outcome.is_err() {
            warn!("server method stub panicked");
            failure_proxy.fail(RpcError::UncaughtServerException);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter;

    #[tokio::test]
    async fn reply_shape_sends_the_handler_result() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut ctx = ServerContext::new(CategoryRegistry::default(), tx);
        ctx.register_target(1, Arc::new(Counter) as Arc<dyn Any + Send + Sync>);

        let mut stubs = StubTable::new();
        stubs.register(0, 1, reply::<Counter, _>(|_t, args| Ok(args[0].clone())));

        ctx.dispatch(&stubs, 1, 42, 0, vec![Value::UInt(9)]).await;
        let out = rx.recv().await.unwrap();
        assert_eq!(out.request_id, 42);
        assert_eq!(out.result.unwrap(), Value::UInt(9));
    }

    #[tokio::test]
    async fn missing_target_fails_with_no_target_provided() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ctx = ServerContext::new(CategoryRegistry::default(), tx);
        let stubs = StubTable::new();

        ctx.dispatch(&stubs, 1, 1, 0, vec![]).await;
        let out = rx.recv().await.unwrap();
        assert!(out.result.is_err());
    }

    #[tokio::test]
    async fn fail_only_shape_auto_replies_nil_on_success() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut ctx = ServerContext::new(CategoryRegistry::default(), tx);
        ctx.register_target(1, Arc::new(Counter) as Arc<dyn Any + Send + Sync>);

        let mut stubs = StubTable::new();
        stubs.register(0, 0, fail_only::<Counter, _>(|_t, _args, _proxy| {}));

        ctx.dispatch(&stubs, 1, 1, 0, vec![]).await;
        let out = rx.recv().await.unwrap();
        assert_eq!(out.result.unwrap(), Value::Nil);
    }

    #[tokio::test]
    async fn panicking_stub_replies_with_uncaught_server_exception() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut ctx = ServerContext::new(CategoryRegistry::default(), tx);
        ctx.register_target(1, Arc::new(Counter) as Arc<dyn Any + Send + Sync>);

        let mut stubs = StubTable::new();
        stubs.register(0, 0, reply::<Counter, _>(|_t, _args| panic!("boom")));

        ctx.dispatch(&stubs, 1, 1, 0, vec![]).await;
        let out = rx.recv().await.unwrap();
        assert!(matches!(out.result, Err(_)));
    }

    #[tokio::test]
    async fn wrong_arity_fails_with_invalid_argument_count() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut ctx = ServerContext::new(CategoryRegistry::default(), tx);
        ctx.register_target(1, Arc::new(Counter) as Arc<dyn Any + Send + Sync>);

        let mut stubs = StubTable::new();
        stubs.register(0, 2, reply::<Counter, _>(|_t, args| Ok(args[0].clone())));

        ctx.dispatch(&stubs, 1, 1, 0, vec![Value::UInt(1)]).await;
        let out = rx.recv().await.unwrap();
        assert!(matches!(out.result, Err(_)));
    }
}
