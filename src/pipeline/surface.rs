//! The event vocabulary layers in the pipeline pass between each other
//! (§4.3 "Layered stream pipeline").
//!
//! Each layer is a small async task pair: a `write`/`control` entry point
//! called by the layer above, and an event stream the layer produces for
//! whatever sits above it. This mirrors the teacher's
//! `SocketMessageHandler` split (a synchronous `read()`/`write_fragment()`
//! entry point plus an `mpsc` channel carrying assembled messages upward)
//! generalized from one fixed NFS dispatch loop to a composable stack.

use crate::error::ErrorCode;

/// Flow-control signal a layer sends downward to ask its neighbor to pause
/// or resume producing upward events (§5 "Back-pressure").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Start,
    Stop,
}

/// An event a layer delivers to whatever sits above it.
#[derive(Debug)]
pub enum UpEvent<T> {
    Data(T),
    Error(ErrorCode),
    /// A back-pressure signal raised by a lower layer's own write side
    /// (§5), carried up the same event path as `Data` so the driver layer
    /// can track writability without a second channel.
    Control(Control),
    /// The layer's downstream source reached end-of-stream; no more events
    /// will follow.
    Closed,
}

/// Byte-level up-events, produced by [`super::anchor::AnchorLayer`] and
/// consumed by [`super::framer::FramerLayer`].
pub type ByteUpEvent = UpEvent<Vec<u8>>;

/// One reassembled message: the 4-byte flags field carried in the frame
/// header alongside the payload (§4.3 "fixed `(size, flags)` header").
#[derive(Debug, Clone)]
pub struct Frame {
    pub flags: u32,
    pub payload: Vec<u8>,
}

/// Frame-level up-events, produced by [`super::framer::FramerLayer`] and
/// consumed by [`super::driver::DriverLayer`].
pub type FrameUpEvent = UpEvent<Frame>;
