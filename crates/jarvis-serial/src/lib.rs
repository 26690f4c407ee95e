//! jarvis-serial — newline-framed transport between an emulated guest's
//! serial line and the backend router. Unix only (PTY based).

pub mod bridge;
pub mod error;
pub mod frame;
pub mod pty;
pub mod transport;

pub use bridge::{BridgeLoop, BridgeSettings, BridgeStats};
pub use error::{Result, TransportError};
pub use frame::{Frame, FrameBuffer, FrameState};
pub use pty::PtyEndpoint;
pub use transport::FrameTransport;
