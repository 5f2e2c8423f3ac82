//! The TLS layer: a pass-through placeholder (§4.3, §1 — the concrete
//! handshake and certificate validation are out of scope for this crate).
//!
//! A real implementation would sit between [`super::framer::FramerLayer`]
//! and [`super::driver::DriverLayer`], encrypting frames on the way down
//! and decrypting on the way up. This stub exists so [`super::assembly`]
//! has a fixed slot for it and call sites don't need to special-case its
//! absence; it forwards every frame unchanged.

use super::framer::FramerLayer;
use super::surface::{Control, FrameUpEvent};
use crate::error::RpcError;

pub struct TlsLayer {
    inner: FramerLayer,
}

impl TlsLayer {
    pub fn passthrough(inner: FramerLayer) -> Self {
        Self { inner }
    }

    pub async fn write(&mut self, payload: &[u8], flags: u32) -> Result<(), RpcError> {
        self.inner.write(payload, flags).await
    }

    pub fn control(&self, ctl: Control) {
        self.inner.control(ctl);
    }

    pub async fn next_frame(&mut self) -> FrameUpEvent {
        self.inner.next_frame().await
    }
}
