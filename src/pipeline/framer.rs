//! The framer layer: reassembles a byte stream into length-delimited frames
//! and re-serializes outgoing frames the same way (§4.3).
//!
//! This generalizes the teacher's record-marking code in
//! `protocol/rpc/wire.rs` (`read_fragment`/`write_fragment`, RFC 5531's
//! top-bit-flag length header) from NFS's one-bit continuation flag to the
//! fixed 8-byte `(size: u32, flags: u32)` header this runtime uses, letting
//! `flags` carry arbitrary per-message metadata instead of just "more
//! fragments follow".

use byteorder::{BigEndian, ByteOrder};

use super::anchor::AnchorLayer;
use super::surface::{ByteUpEvent, Control, Frame, FrameUpEvent, UpEvent};
use crate::error::{ErrorCode, RpcError, CATEGORY_OS};

const HEADER_LEN: usize = 8;

/// Maximum payload size accepted from the wire, guarding against a
/// corrupt or hostile length field driving an unbounded allocation.
pub const MAX_FRAME_LEN: u32 = 256 * 1024 * 1024;

pub struct FramerLayer {
    anchor: AnchorLayer,
    up_rx: tokio::sync::mpsc::Receiver<ByteUpEvent>,
    assembling: Vec<u8>,
}

impl FramerLayer {
    pub fn new(anchor: AnchorLayer, up_rx: tokio::sync::mpsc::Receiver<ByteUpEvent>) -> Self {
        Self { anchor, up_rx, assembling: Vec::new() }
    }

    /// Writes one frame: an 8-byte `(size, flags)` header followed by the
    /// payload.
    pub async fn write(&mut self, payload: &[u8], flags: u32) -> Result<(), RpcError> {
        let mut header = [0u8; HEADER_LEN];
        BigEndian::write_u32(&mut header[0..4], payload.len() as u32);
        BigEndian::write_u32(&mut header[4..8], flags);
        self.anchor.write(&header).await?;
        self.anchor.write(payload).await
    }

    pub fn control(&self, ctl: Control) {
        self.anchor.control(ctl);
    }

    /// Pulls the next complete frame, pumping as many raw byte events as
    /// needed out of the anchor layer below.
    pub async fn next_frame(&mut self) -> FrameUpEvent {
        loop {
            match self.try_take_frame() {
                Ok(Some(frame)) => return UpEvent::Data(frame),
                Ok(None) => {}
                Err(code) => return UpEvent::Error(code),
            }

            match self.up_rx.recv().await {
                Some(UpEvent::Data(chunk)) => {
                    self.assembling.extend_from_slice(&chunk);
                }
                Some(UpEvent::Control(ctl)) => return UpEvent::Control(ctl),
                Some(UpEvent::Error(code)) => return UpEvent::Error(code),
                Some(UpEvent::Closed) | None => return UpEvent::Closed,
            }
        }
    }

    /// `Err` here means the declared frame length exceeds [`MAX_FRAME_LEN`]
    /// — the stream is treated as corrupt and the caller tears the
    /// connection down rather than risk an unbounded allocation.
    fn try_take_frame(&mut self) -> Result<Option<Frame>, ErrorCode> {
        if self.assembling.len() < HEADER_LEN {
            return Ok(None);
        }
        let size = BigEndian::read_u32(&self.assembling[0..4]);
        if size > MAX_FRAME_LEN {
            return Err(ErrorCode::new(CATEGORY_OS, -1));
        }
        let flags = BigEndian::read_u32(&self.assembling[4..8]);
        let total = HEADER_LEN + size as usize;
        if self.assembling.len() < total {
            return Ok(None);
        }
        let payload = self.assembling[HEADER_LEN..total].to_vec();
        self.assembling.drain(0..total);
        Ok(Some(Frame { flags, payload }))
    }
}
