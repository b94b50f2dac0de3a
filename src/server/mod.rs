//! WebSocket chat server implementation.

pub mod registry;
mod runner;
mod session;
mod signal;

pub use registry::{ConnectionId, Registry, SYSTEM_IDENTITY};
pub use runner::{ChatServer, ServerError, run_server};
