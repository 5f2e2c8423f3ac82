//! The anchor layer: the bottom of the pipeline, bound directly to a byte
//! transport (§4.3). Generalizes the teacher's `NFSTcpListener`/
//! `process_socket` split-socket pattern (a spawned read loop feeding an
//! `mpsc` channel, a direct `write_all` for the send side) from one fixed
//! TCP socket to any `AsyncRead + AsyncWrite` transport.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{trace, warn};

use super::surface::{ByteUpEvent, Control, UpEvent};
use crate::error::{ErrorCode, RpcError, CATEGORY_OS};

/// Bytes allowed in flight on the write side (queued for the transport but
/// not yet flushed) before the anchor signals `Control::Stop` upward (§5
/// "Back-pressure"). The read side has its own, independent pause
/// mechanism (explicit `control(Stop)`/`control(Start)` from the driver's
/// `stop_read`/`start_read`) — back-pressure never auto-pauses reads, since
/// nothing downstream of the anchor on the read path ever falls behind at
/// this layer.
pub const DEFAULT_HIGH_WATER_MARK: usize = 16 * 1024 * 1024;

const READ_CHUNK: usize = 64 * 1024;

/// Binds a duplex byte transport to the pipeline. Reads are pumped into
/// `up` by a background task; writes go straight through to the transport,
/// tracking queued bytes against `high_water_mark` and raising
/// `UpEvent::Control` on the same `up` channel when the mark is crossed in
/// either direction.
pub struct AnchorLayer {
    write_half: Box<dyn AsyncWrite + Unpin + Send>,
    force_stopped: Arc<AtomicBool>,
    resume: Arc<Notify>,
    read_task: JoinHandle<()>,
    up: mpsc::Sender<ByteUpEvent>,
    pending_write_bytes: usize,
    high_water_mark: usize,
    write_gated: bool,
}

impl AnchorLayer {
    pub fn new<S>(stream: S, up: mpsc::Sender<ByteUpEvent>) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        Self::with_high_water_mark(stream, up, DEFAULT_HIGH_WATER_MARK)
    }

    pub fn with_high_water_mark<S>(
        stream: S,
        up: mpsc::Sender<ByteUpEvent>,
        high_water_mark: usize,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let force_stopped = Arc::new(AtomicBool::new(false));
        let resume = Arc::new(Notify::new());

        let read_task = tokio::spawn(read_loop(read_half, up.clone(), force_stopped.clone(), resume.clone()));

        Self {
            write_half: Box::new(write_half),
            force_stopped,
            resume,
            read_task,
            up,
            pending_write_bytes: 0,
            high_water_mark,
            write_gated: false,
        }
    }

    /// Writes `data` directly to the transport, gating on the write-side
    /// high-water mark (§5): crossing it raises `Control::Stop` before the
    /// write starts, and falling back under it raises `Control::Start` once
    /// the write completes.
    pub async fn write(&mut self, data: &[u8]) -> Result<(), RpcError> {
        self.pending_write_bytes += data.len();
        if !self.write_gated && self.pending_write_bytes >= self.high_water_mark {
            self.write_gated = true;
            let _ = self.up.send(UpEvent::Control(Control::Stop)).await;
        }

        let result = self.write_half.write_all(data).await.map_err(|_| RpcError::ChannelClosed(0));

        self.pending_write_bytes -= data.len();
        if self.write_gated && self.pending_write_bytes < self.high_water_mark {
            self.write_gated = false;
            let _ = self.up.send(UpEvent::Control(Control::Start)).await;
        }

        result
    }

    /// Propagates an explicit start/stop of the read pump from the driver
    /// layer's `start_read`/`stop_read` (§5). Independent of the write-side
    /// high-water gate above.
    pub fn control(&self, ctl: Control) {
        match ctl {
            Control::Stop => self.force_stopped.store(true, Ordering::SeqCst),
            Control::Start => {
                self.force_stopped.store(false, Ordering::SeqCst);
                self.resume.notify_one();
            }
        }
    }

    pub fn high_water_mark(&self) -> usize {
        self.high_water_mark
    }
}

impl Drop for AnchorLayer {
    fn drop(&mut self) {
        self.read_task.abort();
    }
}

async fn read_loop<R>(mut read_half: R, up: mpsc::Sender<ByteUpEvent>, force_stopped: Arc<AtomicBool>, resume: Arc<Notify>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        if force_stopped.load(Ordering::SeqCst) {
            trace!("anchor read loop paused");
            resume.notified().await;
            continue;
        }

        match read_half.read(&mut buf).await {
            Ok(0) => {
                let _ = up.send(UpEvent::Closed).await;
                return;
            }
            Ok(n) => {
                if up.send(UpEvent::Data(buf[..n].to_vec())).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                warn!("anchor read error: {}", e);
                let code = ErrorCode::new(CATEGORY_OS, e.raw_os_error().unwrap_or(-1));
                let _ = up.send(UpEvent::Error(code)).await;
                return;
            }
        }
    }
}
