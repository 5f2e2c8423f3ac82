//! The transport adapter: binds a [`ClientContext`]/[`ServerContext`] to one
//! or more pipeline connections (§4.6).
//!
//! Both contexts are `!Send`/`!Sync` by design (§4.4, §4.5), so the actor
//! that owns one must run to completion on the task that created it —
//! exactly the teacher's single-threaded `current_thread` runtime
//! assumption (§1's "assumed reactor" external collaborator). [`run`] is
//! meant to be driven by `tokio::task::spawn_local` under a `LocalSet`, or
//! awaited directly from a task that never needs to move the transport.
//! Per-connection I/O itself (the [`DriverLayer`] half) has no such
//! restriction and is happily moved onto ordinary `tokio::spawn`ed tasks;
//! only the request/reply bookkeeping is pinned to one task, generalizing
//! the teacher's per-connection `Arc<rpc::Context>` in `tcp.rs` from one
//! fixed NFS dispatcher to a pluggable client or server context shared
//! across many channels.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Context as _;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::{mpsc, oneshot};
use tracing::{trace, warn};

use crate::codec::Value;
use crate::error::{CategoryRegistry, ErrorCode, RpcError};
use crate::pipeline::PipelineAssembly;

use super::client::{ChannelId, ClientContext, RequestId, TransientOverrides};
use super::server::{MethodId, OutgoingReply, ServerContext, StubTable};
use super::wire::{self, Envelope};

/// Allocates channel ids: monotonic, never reused, 0 reserved as invalid
/// (§4.6). Shared (via `Arc`) between a transport and anything that needs
/// to mint ids independently of which task currently owns the transport.
#[derive(Default)]
pub struct ChannelIdAllocator(AtomicU64);

impl ChannelIdAllocator {
    pub fn new() -> Self {
        Self(AtomicU64::new(1))
    }

    pub fn next(&self) -> ChannelId {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

/// One command for a connection's dedicated write-side queue.
enum WriteCommand {
    Frame(Vec<u8>),
}

/// Caps a connection's write-queue depth (in frames) to something that
/// still bounds memory when `high_water_mark` (a byte figure meant for
/// [`AnchorLayer`]'s own gate) is handed in directly.
///
/// [`AnchorLayer`]: crate::pipeline::AnchorLayer
fn write_queue_depth(high_water_mark: usize) -> usize {
    high_water_mark.clamp(16, 4096)
}

/// Spawns the task that owns one connection's [`DriverLayer`]: drains its
/// write queue and forwards decoded frames to `on_event`, until the
/// connection closes or errors. This is the per-channel `WriteQueue` of
/// §4.6 plus the read pump, fused into one task since they share the one
/// `DriverLayer` handle.
///
/// The write queue is bounded by `high_water_mark`, counted in queued
/// frames rather than bytes (the byte-level gate is [`AnchorLayer`]'s own
/// high-water mark, one layer down) — a sender that outruns the drain
/// blocks on [`mpsc::Sender::send`] instead of growing the queue without
/// limit.
///
/// [`AnchorLayer`]: crate::pipeline::AnchorLayer
fn spawn_connection<S, F>(
    stream: S,
    high_water_mark: usize,
    mut on_event: F,
) -> mpsc::Sender<Vec<u8>>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    F: FnMut(Envelope) + Send + 'static,
{
    let (write_tx, mut write_rx) = mpsc::channel::<Vec<u8>>(write_queue_depth(high_water_mark));
    let mut driver = PipelineAssembly::with_high_water_mark(stream, high_water_mark).into_driver();
    driver.start_read().expect("read pump is not started yet");

    tokio::spawn(async move {
        loop {
            tokio::select! {
                frame = driver.next_frame() => {
                    match frame {
                        Some(frame) => match wire::decode_envelope(&frame.payload) {
                            Ok(envelope) => on_event(envelope),
                            Err(e) => warn!(error = %e, "dropping unparsable frame"),
                        },
                        None => {
                            trace!("connection closed");
                            return;
                        }
                    }
                }
                cmd = write_rx.recv() => {
                    match cmd {
                        Some(payload) => {
                            if let Err(e) = driver.write(&payload, 0).await {
                                warn!(error = %e, "write failed, tearing connection down");
                                return;
                            }
                        }
                        None => return,
                    }
                }
            }
        }
    });

    write_tx
}

// ---------------------------------------------------------------------
// Client side
// ---------------------------------------------------------------------

struct CallRequest {
    channel_id: ChannelId,
    method_id: MethodId,
    args: Vec<Value>,
    overrides: Option<TransientOverrides>,
    respond_to: oneshot::Sender<Result<Value, ErrorCode>>,
}

/// A cheaply-cloneable, `Send`/`Sync` handle proxies use to issue calls
/// against a [`ClientTransport`] without touching the `!Send` context
/// directly — every call is handed off over a channel to the task running
/// [`ClientTransport::run`].
#[derive(Clone)]
pub struct ClientHandle {
    calls: mpsc::UnboundedSender<CallRequest>,
}

impl ClientHandle {
    /// Issues one call on `channel_id` and awaits its reply. `overrides`
    /// mirrors [`ClientContext::set_transient`] (§9): supply it to pin this
    /// one call to a different channel or timeout than the default.
    pub async fn call(
        &self,
        channel_id: ChannelId,
        method_id: MethodId,
        args: Vec<Value>,
        overrides: Option<TransientOverrides>,
    ) -> Result<Value, ErrorCode> {
        let (respond_to, rx) = oneshot::channel();
        if self
            .calls
            .send(CallRequest { channel_id, method_id, args, overrides, respond_to })
            .is_err()
        {
            return Err(ErrorCode::new(0, crate::error::RuntimeErrorValue::ClientClosed as i32));
        }
        rx.await.unwrap_or(Err(ErrorCode::new(0, crate::error::RuntimeErrorValue::ClientClosed as i32)))
    }
}

/// Client-side transport: owns one [`ClientContext`] and the write queues
/// of however many connections have been [`connect`](Self::connect)ed to
/// it, routing outgoing requests and incoming replies between them.
pub struct ClientTransport {
    ctx: ClientContext,
    channels: HashMap<ChannelId, mpsc::Sender<Vec<u8>>>,
    ids: Arc<ChannelIdAllocator>,
    events_tx: mpsc::UnboundedSender<Envelope>,
    events_rx: mpsc::UnboundedReceiver<Envelope>,
    calls_tx: mpsc::UnboundedSender<CallRequest>,
    calls_rx: mpsc::UnboundedReceiver<CallRequest>,
    high_water_mark: usize,
}

impl ClientTransport {
    pub fn new(categories: CategoryRegistry) -> Self {
        Self::with_channel_ids(categories, Arc::new(ChannelIdAllocator::new()))
    }

    pub fn with_channel_ids(categories: CategoryRegistry, ids: Arc<ChannelIdAllocator>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (calls_tx, calls_rx) = mpsc::unbounded_channel();
        Self {
            ctx: ClientContext::new(categories),
            channels: HashMap::new(),
            ids,
            events_tx,
            events_rx,
            calls_tx,
            calls_rx,
            high_water_mark: crate::pipeline::DEFAULT_HIGH_WATER_MARK,
        }
    }

    /// A handle proxies can clone freely to issue calls from any task.
    pub fn handle(&self) -> ClientHandle {
        ClientHandle { calls: self.calls_tx.clone() }
    }

    /// Opens one connection and allocates it a fresh channel id (§4.6
    /// `connect`).
    pub fn connect<S>(&mut self, stream: S) -> ChannelId
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let channel_id = self.ids.next();
        let events_tx = self.events_tx.clone();
        let write_tx = spawn_connection(stream, self.high_water_mark, move |envelope| {
            let _ = events_tx.send(envelope);
        });
        self.channels.insert(channel_id, write_tx);
        channel_id
    }

    /// Opens a TCP connection and connects it, the fallible counterpart to
    /// [`Self::connect`] for the common case of a real socket (teacher
    /// precedent: `NFSTcpListener::bind`'s own fallible setup path).
    pub async fn connect_tcp<A: ToSocketAddrs>(&mut self, addr: A) -> anyhow::Result<ChannelId> {
        let stream = TcpStream::connect(addr).await.context("connecting RPC client transport")?;
        Ok(self.connect(stream))
    }

    /// Runs the request/reply loop until every connection has closed and
    /// every [`ClientHandle`] has been dropped. Must be driven to
    /// completion on the task that owns this transport (see module docs).
    pub async fn run(&mut self) {
        loop {
            tokio::select! {
                Some(call) = self.calls_rx.recv() => {
                    self.handle_call(call).await;
                }
                Some(envelope) = self.events_rx.recv() => {
                    self.handle_envelope(envelope);
                }
                Some(request_id) = self.ctx.next_timeout() => {
                    self.ctx.resolve_timeout(request_id);
                }
                else => {
                    self.ctx.cancel_all_requests();
                    return;
                }
            }
        }
    }

    async fn handle_call(&mut self, call: CallRequest) {
        if let Some(overrides) = call.overrides {
            self.ctx.set_transient(overrides);
        }
        let (request_id, channel_id, receiver) = match self.ctx.send_request(call.channel_id, None) {
            Ok(v) => v,
            Err(e) => {
                let _ = call.respond_to.send(Err(e.to_error_code(self.ctx.categories())));
                return;
            }
        };

        let Some(writer) = self.channels.get(&channel_id) else {
            self.ctx.cancel_request(request_id, RpcError::InvalidChannelId(channel_id));
            let _ = call.respond_to.send(Err(RpcError::InvalidChannelId(channel_id).to_error_code(self.ctx.categories())));
            return;
        };

        let payload = wire::encode_request(channel_id, request_id, call.method_id, call.args);
        if writer.send(payload).await.is_err() {
            self.channels.remove(&channel_id);
            self.ctx.cancel_channel_requests(channel_id);
            let _ = call.respond_to.send(Err(RpcError::ChannelClosed(channel_id).to_error_code(self.ctx.categories())));
            return;
        }

        tokio::spawn(async move {
            let result = receiver.await.unwrap_or(Err(ErrorCode::new(
                0,
                crate::error::RuntimeErrorValue::ClientClosed as i32,
            )));
            let _ = call.respond_to.send(result);
        });
    }

    fn handle_envelope(&mut self, envelope: Envelope) {
        match envelope {
            Envelope::Reply { request_id, result, .. } => self.ctx.handle_reply(request_id, result),
            Envelope::Request { channel_id, .. } => {
                // Non-goal: server-initiated calls on a client connection (§1).
                warn!(channel_id, "ignoring an inbound request on a client transport");
            }
        }
    }

    /// Closes `channel_id` locally, cancelling its outstanding requests
    /// with [`RpcError::ChannelClosed`] (§4.6 channel closure cascade).
    pub fn close_channel(&mut self, channel_id: ChannelId) {
        self.channels.remove(&channel_id);
        self.ctx.cancel_channel_requests(channel_id);
    }
}

// ---------------------------------------------------------------------
// Server side
// ---------------------------------------------------------------------

use std::any::Any;

enum ServerEvent {
    Request { channel_id: ChannelId, request_id: RequestId, method_id: MethodId, args: Vec<Value> },
    Closed(ChannelId),
}

/// Server-side transport: owns one [`ServerContext`] and the write queues
/// of however many connections have been [`accept`](Self::accept)ed,
/// dispatching decoded requests and routing their replies back out.
pub struct ServerTransport {
    ctx: ServerContext,
    stubs: Arc<StubTable>,
    channels: HashMap<ChannelId, mpsc::Sender<Vec<u8>>>,
    ids: Arc<ChannelIdAllocator>,
    events_tx: mpsc::UnboundedSender<ServerEvent>,
    events_rx: mpsc::UnboundedReceiver<ServerEvent>,
    out_rx: mpsc::UnboundedReceiver<OutgoingReply>,
    high_water_mark: usize,
}

impl ServerTransport {
    pub fn new(categories: CategoryRegistry, stubs: Arc<StubTable>) -> Self {
        Self::with_channel_ids(categories, stubs, Arc::new(ChannelIdAllocator::new()))
    }

    pub fn with_channel_ids(
        categories: CategoryRegistry,
        stubs: Arc<StubTable>,
        ids: Arc<ChannelIdAllocator>,
    ) -> Self {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            ctx: ServerContext::new(categories, out_tx),
            stubs,
            channels: HashMap::new(),
            ids,
            events_tx,
            events_rx,
            out_rx,
            high_water_mark: crate::pipeline::DEFAULT_HIGH_WATER_MARK,
        }
    }

    /// Accepts one connection, registers `target` as the object answering
    /// its calls, and allocates it a fresh channel id (§4.6 `bind`/`accept`).
    pub fn accept<S>(&mut self, stream: S, target: Arc<dyn Any + Send + Sync>) -> ChannelId
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let channel_id = self.ids.next();
        let events_tx = self.events_tx.clone();
        let closed_tx = self.events_tx.clone();
        let write_tx = spawn_connection_with_close(
            stream,
            self.high_water_mark,
            channel_id,
            move |channel_id, envelope| {
                if let Envelope::Request { request_id, method_id, args, .. } = envelope {
                    let _ = events_tx.send(ServerEvent::Request { channel_id, request_id, method_id, args });
                }
            },
            move |channel_id| {
                let _ = closed_tx.send(ServerEvent::Closed(channel_id));
            },
        );
        self.channels.insert(channel_id, write_tx);
        self.ctx.register_target(channel_id, target);
        channel_id
    }

    /// Binds a listening socket, the fallible setup step `accept_tcp` below
    /// expects (teacher precedent: `NFSTcpListener::bind`).
    pub async fn bind_tcp<A: ToSocketAddrs>(addr: A) -> anyhow::Result<TcpListener> {
        TcpListener::bind(addr).await.context("binding RPC server transport")
    }

    /// Accepts one TCP connection off `listener`, the fallible counterpart
    /// to [`Self::accept`].
    pub async fn accept_tcp(
        &mut self,
        listener: &TcpListener,
        target: Arc<dyn Any + Send + Sync>,
    ) -> anyhow::Result<ChannelId> {
        let (stream, peer) = listener.accept().await.context("accepting RPC server connection")?;
        trace!(%peer, "accepted RPC connection");
        Ok(self.accept(stream, target))
    }

    /// Runs the dispatch loop until every connection has closed.
    pub async fn run(&mut self) {
        loop {
            tokio::select! {
                Some(event) = self.events_rx.recv() => {
                    match event {
                        ServerEvent::Request { channel_id, request_id, method_id, args } => {
                            self.ctx.dispatch(&self.stubs, channel_id, request_id, method_id, args).await;
                        }
                        ServerEvent::Closed(channel_id) => {
                            self.channels.remove(&channel_id);
                            self.ctx.remove_target(channel_id);
                        }
                    }
                }
                Some(reply) = self.out_rx.recv() => {
                    self.send_reply(reply);
                }
                else => return,
            }
        }
    }

    /// Dispatched from the synchronous event-select loop, so a full queue
    /// (the connection's write side is backed up past its high-water mark)
    /// is handled with `try_send` rather than blocking the whole server on
    /// one slow peer; the reply is dropped and logged, mirroring the
    /// already-closed case below.
    fn send_reply(&mut self, reply: OutgoingReply) {
        let Some(writer) = self.channels.get(&reply.channel_id) else {
            trace!(channel_id = reply.channel_id, "reply for a channel that already closed, dropping");
            return;
        };
        let payload = wire::encode_reply(reply.channel_id, reply.request_id, reply.result);
        match writer.try_send(payload) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(channel_id = reply.channel_id, "write queue over its high-water mark, dropping reply");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.channels.remove(&reply.channel_id);
                self.ctx.remove_target(reply.channel_id);
            }
        }
    }
}

/// Like [`spawn_connection`] but also reports end-of-stream, so the server
/// can run its target-removal/channel-closure cascade (§4.6).
fn spawn_connection_with_close<S, F, C>(
    stream: S,
    high_water_mark: usize,
    channel_id: ChannelId,
    mut on_event: F,
    mut on_close: C,
) -> mpsc::Sender<Vec<u8>>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    F: FnMut(ChannelId, Envelope) + Send + 'static,
    C: FnMut(ChannelId) + Send + 'static,
{
    let (write_tx, mut write_rx) = mpsc::channel::<Vec<u8>>(write_queue_depth(high_water_mark));
    let mut driver = PipelineAssembly::with_high_water_mark(stream, high_water_mark).into_driver();
    driver.start_read().expect("read pump is not started yet");

    tokio::spawn(async move {
        loop {
            tokio::select! {
                frame = driver.next_frame() => {
                    match frame {
                        Some(frame) => match wire::decode_envelope(&frame.payload) {
                            Ok(envelope) => on_event(channel_id, envelope),
                            Err(e) => warn!(error = %e, channel_id, "dropping unparsable frame"),
                        },
                        None => {
                            on_close(channel_id);
                            return;
                        }
                    }
                }
                cmd = write_rx.recv() => {
                    match cmd {
                        Some(payload) => {
                            if let Err(e) = driver.write(&payload, 0).await {
                                warn!(error = %e, channel_id, "write failed, tearing connection down");
                                on_close(channel_id);
                                return;
                            }
                        }
                        None => return,
                    }
                }
            }
        }
    });

    write_tx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::server::reply;
    use std::time::Duration;
    use tokio::io::duplex;

    struct Counter;

    #[tokio::test]
    async fn round_trips_one_call_over_an_in_memory_duplex() {
        let (client_io, server_io) = duplex(4096);

        let mut stubs = StubTable::new();
        stubs.register(0, 1, reply::<Counter, _>(|_t, args| Ok(args[0].clone())));
        let stubs = Arc::new(stubs);

        let mut server = ServerTransport::new(CategoryRegistry::default(), stubs);
        server.accept(server_io, Arc::new(Counter) as Arc<dyn Any + Send + Sync>);
        tokio::spawn(async move {
            server.run().await;
        });

        let mut client = ClientTransport::new(CategoryRegistry::default());
        let channel_id = client.connect(client_io);
        let handle = client.handle();
        tokio::spawn(async move {
            client.run().await;
        });

        let result = tokio::time::timeout(
            Duration::from_secs(1),
            handle.call(channel_id, 0, vec![Value::UInt(41)], None),
        )
        .await
        .expect("call did not time out");
        assert_eq!(result.unwrap(), Value::UInt(41));
    }

    #[tokio::test]
    async fn channel_id_allocator_never_repeats() {
        let ids = ChannelIdAllocator::new();
        let a = ids.next();
        let b = ids.next();
        assert_ne!(a, b);
        assert_eq!(a, 1);
    }
}
