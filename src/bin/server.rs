//! WebSocket chat server binary.
//!
//! Accepts raw WebSocket connections; the first message from a client sets
//! its username, every later message is broadcast to all connected clients.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin irori-server
//! ```

use clap::Parser;
use irori::Config;
use irori::logger::setup_logger;

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger("irori=debug");

    let config = Config::parse();

    // Run the server
    if let Err(e) = irori::run_server(config).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
