//! The layered duplex stream pipeline (§4.3).
//!
//! Four fixed layers, bottom to top: [`anchor`] (bound to the raw
//! transport), [`framer`] (length-delimited frame reassembly), [`tls`] (a
//! pass-through placeholder), [`driver`] (the app-facing surface).
//! [`assembly`] wires all four together over a concrete transport.

pub mod anchor;
pub mod assembly;
pub mod driver;
pub mod framer;
pub mod surface;
pub mod tls;

pub use anchor::{AnchorLayer, DEFAULT_HIGH_WATER_MARK};
pub use assembly::PipelineAssembly;
pub use driver::DriverLayer;
pub use framer::{FramerLayer, MAX_FRAME_LEN};
pub use surface::{Control, Frame, UpEvent};
pub use tls::TlsLayer;
