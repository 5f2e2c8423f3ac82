//! The driver layer: the pipeline's app-facing surface (§4.3).
//!
//! Exposes the read-pump controls and the write entry point the RPC
//! transport layer drives, plus callback registration for write-readiness
//! and terminal errors.

use super::surface::{Control, Frame, UpEvent};
use super::tls::TlsLayer;
use crate::error::{ErrorCode, RpcError};

type ErrorCallback = Box<dyn FnMut(ErrorCode) + Send>;
type WritableCallback = Box<dyn FnMut() + Send>;

pub struct DriverLayer {
    tls: TlsLayer,
    on_error: Option<ErrorCallback>,
    on_writable: Option<WritableCallback>,
    on_not_writable: Option<WritableCallback>,
    writable: bool,
    reading: bool,
}

impl DriverLayer {
    pub fn new(tls: TlsLayer) -> Self {
        Self {
            tls,
            on_error: None,
            on_writable: None,
            on_not_writable: None,
            writable: true,
            reading: false,
        }
    }

    /// Starts the read pump (§5). Fails with `already_reading` if it is
    /// already running — matching `stop_read` first is required to restart
    /// it.
    pub fn start_read(&mut self) -> Result<(), RpcError> {
        if self.reading {
            return Err(RpcError::AlreadyReading);
        }
        self.reading = true;
        self.tls.control(Control::Start);
        Ok(())
    }

    /// Pauses the read pump without tearing the connection down.
    pub fn stop_read(&mut self) {
        self.reading = false;
        self.tls.control(Control::Stop);
    }

    /// Resumes a read pump previously paused with [`Self::stop_read`].
    /// Fails with `cannot_resume_read` if no pump was ever started.
    pub fn resume_read(&mut self) -> Result<(), RpcError> {
        if self.reading {
            return Err(RpcError::CannotResumeRead);
        }
        self.reading = true;
        self.tls.control(Control::Start);
        Ok(())
    }

    pub fn on_error<F: FnMut(ErrorCode) + Send + 'static>(&mut self, f: F) {
        self.on_error = Some(Box::new(f));
    }

    pub fn on_writable<F: FnMut() + Send + 'static>(&mut self, f: F) {
        self.on_writable = Some(Box::new(f));
    }

    pub fn on_not_writable<F: FnMut() + Send + 'static>(&mut self, f: F) {
        self.on_not_writable = Some(Box::new(f));
    }

    /// Writes one frame. Writability reflects the downstream back-pressure
    /// signal (§4.3, §5): a write attempted while not writable fails
    /// immediately with `not_writable` and never reaches the transport.
    pub async fn write(&mut self, payload: &[u8], flags: u32) -> Result<(), RpcError> {
        if !self.writable {
            return Err(RpcError::NotWritable);
        }
        let result = self.tls.write(payload, flags).await;
        if result.is_err() && self.writable {
            self.writable = false;
            if let Some(cb) = self.on_not_writable.as_mut() {
                cb();
            }
        }
        result
    }

    /// Waits for and returns the next complete frame, or `None` once the
    /// pipeline has reached a terminal state (closed, or an error that was
    /// already handed to the `on_error` callback). `Control` events update
    /// writability and fire `on_writable`/`on_not_writable` without being
    /// surfaced as a frame.
    pub async fn next_frame(&mut self) -> Option<Frame> {
        loop {
            match self.tls.next_frame().await {
                UpEvent::Data(frame) => return Some(frame),
                UpEvent::Control(Control::Stop) => {
                    if self.writable {
                        self.writable = false;
                        if let Some(cb) = self.on_not_writable.as_mut() {
                            cb();
                        }
                    }
                }
                UpEvent::Control(Control::Start) => {
                    if !self.writable {
                        self.writable = true;
                        if let Some(cb) = self.on_writable.as_mut() {
                            cb();
                        }
                    }
                }
                UpEvent::Error(code) => {
                    if let Some(cb) = self.on_error.as_mut() {
                        cb(code);
                    }
                    return None;
                }
                UpEvent::Closed => return None,
            }
        }
    }
}
