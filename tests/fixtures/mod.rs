//! Shared test fixtures.

use std::net::SocketAddr;

use irori::{ChatServer, Config};
use tokio::task::JoinHandle;

/// A running chat server on an ephemeral port.
pub struct TestServer {
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub async fn start() -> Self {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 0,
        };
        let server = ChatServer::bind(&config).await.expect("failed to bind");
        let addr = server.local_addr().expect("failed to read local addr");
        let handle = tokio::spawn(async move {
            let _ = server.run().await;
        });
        Self { addr, handle }
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
