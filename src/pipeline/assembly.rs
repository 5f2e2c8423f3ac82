//! Bottom-up pipeline construction (§4.3 "`PipelineAssembly`").
//!
//! Wires an anchor over a concrete transport, a framer above it, a
//! pass-through TLS slot, and a driver on top, in that fixed order. The
//! result owns every layer outright; there is no shared/aliased state
//! between layers, matching the "non-copyable post-assembly" invariant.

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;

use super::anchor::{AnchorLayer, DEFAULT_HIGH_WATER_MARK};
use super::driver::DriverLayer;
use super::framer::FramerLayer;
use super::tls::TlsLayer;

/// Channel depth between the anchor's read loop and the framer. This is a
/// count of in-flight chunk messages, not a byte budget — the byte-level
/// back-pressure gate lives in the anchor's high-water mark.
const UP_CHANNEL_DEPTH: usize = 256;

pub struct PipelineAssembly {
    pub driver: DriverLayer,
}

impl PipelineAssembly {
    pub fn build<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        Self::with_high_water_mark(stream, DEFAULT_HIGH_WATER_MARK)
    }

    pub fn with_high_water_mark<S>(stream: S, high_water_mark: usize) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (up_tx, up_rx) = mpsc::channel(UP_CHANNEL_DEPTH);
        let anchor = AnchorLayer::with_high_water_mark(stream, up_tx, high_water_mark);
        let framer = FramerLayer::new(anchor, up_rx);
        let tls = TlsLayer::passthrough(framer);
        let driver = DriverLayer::new(tls);
        Self { driver }
    }

    pub fn into_driver(self) -> DriverLayer {
        self.driver
    }
}
