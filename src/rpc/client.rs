//! The client side of a context: request id allocation, the reply-handler
//! table, cancellation, and timeout scheduling (§4.4, §5).
//!
//! [`ClientContext`] is deliberately `!Send`/`!Sync` (via the `PhantomData<*const ()>`
//! marker) — the spec requires single-threaded, re-entrancy-free dispatch,
//! and a context that can't cross a thread boundary is the cheapest way to
//! make that a compile-time fact rather than a convention someone can
//! violate. One task owns a context for its whole lifetime, exactly the way
//! the teacher's `rpc::Context` is cloned into one `tokio::spawn`ed task per
//! connection rather than shared behind a lock.

use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::trace;

use crate::codec::Value;
use crate::error::{CategoryRegistry, ErrorCode, RpcError};

pub type RequestId = u64;
pub type ChannelId = u64;

/// The receiving half a caller awaits for its reply.
pub type ReplyReceiver = oneshot::Receiver<Result<Value, ErrorCode>>;

struct ReplyEntry {
    channel_id: ChannelId,
    sender: oneshot::Sender<Result<Value, ErrorCode>>,
}

/// Per-call overrides, valid only between a proxy method's argument-packing
/// step and its call to [`ClientContext::send_request`] (§9 Open Questions).
/// `send_request` takes ownership of whatever was set and clears it, so
/// overrides never leak into an unrelated call.
#[derive(Debug, Clone, Default)]
pub struct TransientOverrides {
    pub channel_id: Option<ChannelId>,
    pub timeout: Option<Duration>,
}

/// Client-side request/reply bookkeeping for one connection.
pub struct ClientContext {
    next_request_id: RequestId,
    reply_table: HashMap<RequestId, ReplyEntry>,
    channel_index: HashMap<ChannelId, HashSet<RequestId>>,
    transient: Option<TransientOverrides>,
    categories: CategoryRegistry,
    timeout_tx: mpsc::UnboundedSender<RequestId>,
    timeout_rx: mpsc::UnboundedReceiver<RequestId>,
    closed: bool,
    _not_sync: PhantomData<*const ()>,
}

impl ClientContext {
    pub fn new(categories: CategoryRegistry) -> Self {
        let (timeout_tx, timeout_rx) = mpsc::unbounded_channel();
        Self {
            next_request_id: 1,
            reply_table: HashMap::new(),
            channel_index: HashMap::new(),
            transient: None,
            categories,
            timeout_tx,
            timeout_rx,
            closed: false,
            _not_sync: PhantomData,
        }
    }

    pub fn categories(&self) -> &CategoryRegistry {
        &self.categories
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Stages per-call overrides for the very next [`Self::send_request`].
    pub fn set_transient(&mut self, overrides: TransientOverrides) {
        self.transient = Some(overrides);
    }

    fn take_transient(&mut self) -> Option<TransientOverrides> {
        self.transient.take()
    }

    /// Allocates the next request id, registers its reply handler, and
    /// schedules its timeout if one applies. Returns the request id, the
    /// resolved channel id (after folding in any transient override), and
    /// the receiver the caller awaits. `default_timeout` is used only if no
    /// transient override supplied one.
    pub fn send_request(
        &mut self,
        default_channel_id: ChannelId,
        default_timeout: Option<Duration>,
    ) -> Result<(RequestId, ChannelId, ReplyReceiver), RpcError> {
        if self.closed {
            return Err(RpcError::ContextClosed);
        }
        let overrides = self.take_transient();
        let channel_id = overrides.as_ref().and_then(|o| o.channel_id).unwrap_or(default_channel_id);
        let timeout = overrides.and_then(|o| o.timeout).or(default_timeout);

        let request_id = self.next_request_id;
        self.next_request_id += 1;

        let (sender, receiver) = oneshot::channel();
        self.reply_table.insert(request_id, ReplyEntry { channel_id, sender });
        self.channel_index.entry(channel_id).or_default().insert(request_id);

        if let Some(duration) = timeout {
            let timeout_tx = self.timeout_tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(duration).await;
                let _ = timeout_tx.send(request_id);
            });
        }

        Ok((request_id, channel_id, receiver))
    }

    /// Resolves a decoded reply against the table. A reply for a request
    /// that is no longer tracked (already timed out, its channel already
    /// closed) is silently dropped — it raced a cancellation and the caller
    /// has already been notified of that outcome.
    pub fn handle_reply(&mut self, request_id: RequestId, result: Result<Value, ErrorCode>) {
        if let Some(entry) = self.reply_table.remove(&request_id) {
            if let Some(set) = self.channel_index.get_mut(&entry.channel_id) {
                set.remove(&request_id);
            }
            let _ = entry.sender.send(result);
        } else {
            trace!(request_id, "reply for an untracked request, dropping");
        }
    }

    /// Waits for the next scheduled timeout to fire. Intended to be raced
    /// via `tokio::select!` alongside the transport's read loop in the task
    /// that owns this context.
    pub async fn next_timeout(&mut self) -> Option<RequestId> {
        self.timeout_rx.recv().await
    }

    /// Resolves a fired timeout, if the request is still outstanding.
    pub fn resolve_timeout(&mut self, request_id: RequestId) {
        if self.reply_table.contains_key(&request_id) {
            self.cancel_request(request_id, RpcError::TimedOut);
        }
    }

    pub fn cancel_request(&mut self, request_id: RequestId, reason: RpcError) {
        if let Some(entry) = self.reply_table.remove(&request_id) {
            if let Some(set) = self.channel_index.get_mut(&entry.channel_id) {
                set.remove(&request_id);
            }
            let code = reason.to_error_code(&self.categories);
            let _ = entry.sender.send(Err(code));
        }
    }

    /// Cancels every outstanding request on `channel_id` with
    /// [`RpcError::ChannelClosed`] (§4.6 "channel closure cascade").
    pub fn cancel_channel_requests(&mut self, channel_id: ChannelId) {
        if let Some(ids) = self.channel_index.remove(&channel_id) {
            for request_id in ids {
                if let Some(entry) = self.reply_table.remove(&request_id) {
                    let code = RpcError::ChannelClosed(channel_id).to_error_code(&self.categories);
                    let _ = entry.sender.send(Err(code));
                }
            }
        }
    }

    /// Cancels every outstanding request with [`RpcError::ContextClosed`]
    /// and marks the context closed, rejecting any further `send_request`.
    pub fn cancel_all_requests(&mut self) {
        self.closed = true;
        let code = RpcError::ContextClosed.to_error_code(&self.categories);
        for (_, entry) in self.reply_table.drain() {
            let _ = entry.sender.send(Err(code));
        }
        self.channel_index.clear();
    }

    pub fn outstanding_on(&self, channel_id: ChannelId) -> usize {
        self.channel_index.get(&channel_id).map(HashSet::len).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reply_resolves_the_matching_receiver() {
        let mut ctx = ClientContext::new(CategoryRegistry::default());
        let (request_id, channel_id, rx) = ctx.send_request(1, None).unwrap();
        assert_eq!(channel_id, 1);
        ctx.handle_reply(request_id, Ok(Value::UInt(7)));
        assert_eq!(rx.await.unwrap().unwrap(), Value::UInt(7));
    }

    #[tokio::test]
    async fn first_request_id_is_one() {
        let mut ctx = ClientContext::new(CategoryRegistry::default());
        let (request_id, _, _) = ctx.send_request(1, None).unwrap();
        assert_eq!(request_id, 1);
    }

    #[tokio::test]
    async fn transient_channel_override_wins_for_one_call() {
        let mut ctx = ClientContext::new(CategoryRegistry::default());
        ctx.set_transient(TransientOverrides { channel_id: Some(9), timeout: None });
        let (_, channel_id, _) = ctx.send_request(1, None).unwrap();
        assert_eq!(channel_id, 9);

        // Overrides are one-shot: the next call falls back to the default.
        let (_, channel_id, _) = ctx.send_request(1, None).unwrap();
        assert_eq!(channel_id, 1);
    }

    #[tokio::test]
    async fn channel_close_cancels_only_that_channels_requests() {
        let mut ctx = ClientContext::new(CategoryRegistry::default());
        let (_, _, rx_a) = ctx.send_request(1, None).unwrap();
        let (_, _, rx_b) = ctx.send_request(2, None).unwrap();
        ctx.cancel_channel_requests(1);
        assert!(rx_a.await.unwrap().is_err());
        assert_eq!(ctx.outstanding_on(2), 1);
        drop(rx_b);
    }

    #[tokio::test]
    async fn context_close_rejects_further_requests() {
        let mut ctx = ClientContext::new(CategoryRegistry::default());
        ctx.cancel_all_requests();
        assert!(matches!(ctx.send_request(1, None), Err(RpcError::ContextClosed)));
    }

    #[tokio::test]
    async fn reply_for_untracked_request_is_a_no_op() {
        let mut ctx = ClientContext::new(CategoryRegistry::default());
        ctx.handle_reply(999, Ok(Value::Nil));
    }
}
