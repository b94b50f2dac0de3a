//! Wire protocol layer: the RFC 6455 frame codec and the HTTP upgrade
//! handshake.

pub mod frame;
pub mod handshake;

pub use frame::{Frame, FrameError, OpCode, read_frame, write_frame};
pub use handshake::{HandshakeError, accept};
