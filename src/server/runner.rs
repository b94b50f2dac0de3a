//! Listener and accept loop.
//!
//! Binds the TCP listener and spawns one task per accepted connection:
//! handshake on the raw stream, split it, register the write half, run the
//! session loop on the read half. The registry is constructed here and
//! injected into every session task — no global state.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::io::BufReader;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};

use crate::config::Config;
use crate::protocol::handshake;
use crate::server::registry::Registry;
use crate::server::session;
use crate::server::signal::shutdown_signal;

/// Process-fatal server errors. Everything connection-scoped is handled
/// (and logged) inside the connection's own task instead.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind { addr: String, source: io::Error },

    #[error("listener i/o failed: {0}")]
    Io(#[from] io::Error),
}

/// A bound chat server, ready to accept connections.
///
/// Separate from [`run_server`] so tests can bind port 0 and read back the
/// ephemeral address before starting the accept loop.
pub struct ChatServer {
    listener: TcpListener,
    registry: Arc<Registry<OwnedWriteHalf>>,
}

impl ChatServer {
    /// Bind the listener. Bind failure is the one fault that is fatal to
    /// the whole process.
    pub async fn bind(config: &Config) -> Result<Self, ServerError> {
        let addr = config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        Ok(Self {
            listener,
            registry: Arc::new(Registry::new()),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until a shutdown signal arrives. In-flight
    /// sessions are not awaited; process exit closes them.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!("Server started on {}", self.local_addr()?);

        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer_addr)) => {
                            tracing::debug!("Accepted TCP connection from {}", peer_addr);
                            let registry = self.registry.clone();
                            tokio::spawn(handle_connection(stream, registry));
                        }
                        Err(e) => {
                            // Per-accept failures (e.g. fd exhaustion) do
                            // not stop the listener.
                            tracing::warn!("Failed to accept connection: {}", e);
                        }
                    }
                }
                _ = &mut shutdown => {
                    tracing::info!("Shutdown signal received, stopping listener");
                    return Ok(());
                }
            }
        }
    }
}

/// Bind and run with the given configuration.
pub async fn run_server(config: Config) -> Result<(), ServerError> {
    ChatServer::bind(&config).await?.run().await
}

async fn handle_connection(mut stream: TcpStream, registry: Arc<Registry<OwnedWriteHalf>>) {
    if let Err(e) = handshake::accept(&mut stream).await {
        tracing::warn!("WebSocket handshake failed: {}", e);
        return;
    }

    let (reader, writer) = stream.into_split();
    let id = registry.register(writer).await;
    tracing::info!("WebSocket connection established as {}", id);

    session::run(registry, id, BufReader::new(reader)).await;
}
