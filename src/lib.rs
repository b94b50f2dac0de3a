//! WebSocket chat server library.
//!
//! Implements the server side of an RFC 6455 subset by hand — frame
//! parsing/serialization and the upgrade handshake — plus a broadcast
//! registry that fans every incoming text message out to all connected
//! peers.

pub mod config;
pub mod logger;
pub mod protocol;
pub mod server;

// Re-export entry points
pub use config::Config;
pub use server::{ChatServer, run_server};
