//! Connection registry and broadcast fan-out.
//!
//! One process-wide [`Registry`] holds the write half of every live
//! connection. A single async mutex guards the map: broadcasts iterate and
//! write under the lock, so membership changes can never interleave with an
//! in-flight fan-out and a connection mid-teardown can never be a broadcast
//! target.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::protocol::frame::{OpCode, write_frame};

/// Sender name used for synthetic join/leave notices. Nothing stops a user
/// from picking the same name; their messages are then indistinguishable
/// from notices.
pub const SYSTEM_IDENTITY: &[u8] = b"Server";

/// Opaque handle for one registered connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Registry entry: the connection's write half plus its identity, once the
/// session loop has assigned one. Identity here is for log attribution;
/// the session loop owns the authoritative copy.
struct Peer<W> {
    identity: Option<String>,
    writer: W,
}

impl<W> Peer<W> {
    fn display_name(&self) -> &str {
        self.identity.as_deref().unwrap_or("<anonymous>")
    }
}

/// Thread-safe set of live connections with broadcast-to-all.
///
/// Generic over the write half so sessions over TCP streams and tests over
/// in-memory pipes share the same code path.
pub struct Registry<W> {
    peers: Mutex<HashMap<ConnectionId, Peer<W>>>,
    next_id: AtomicU64,
}

impl<W> Default for Registry<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W> Registry<W> {
    pub fn new() -> Self {
        Self {
            peers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Number of currently registered connections.
    pub async fn connection_count(&self) -> usize {
        self.peers.lock().await.len()
    }

    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.peers.lock().await.contains_key(&id)
    }
}

impl<W> Registry<W>
where
    W: AsyncWrite + Unpin,
{
    /// Add a connection's write half and hand out its id.
    pub async fn register(&self, writer: W) -> ConnectionId {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.peers.lock().await.insert(
            id,
            Peer {
                identity: None,
                writer,
            },
        );
        id
    }

    /// Remove a connection and shut its stream down. Idempotent: removing
    /// an id that is absent (already self-healed away) is a no-op.
    pub async fn deregister(&self, id: ConnectionId) {
        let peer = self.peers.lock().await.remove(&id);
        if let Some(mut peer) = peer {
            let _ = peer.writer.shutdown().await;
        }
    }

    /// Record the identity the session loop assigned from the first text
    /// message. Used only to attribute log lines for this peer.
    pub async fn assign_identity(&self, id: ConnectionId, identity: &[u8]) {
        if let Some(peer) = self.peers.lock().await.get_mut(&id) {
            peer.identity = Some(String::from_utf8_lossy(identity).into_owned());
        }
    }

    /// Write a frame to one specific connection (the pong path).
    pub async fn send_to(
        &self,
        id: ConnectionId,
        opcode: OpCode,
        payload: &[u8],
    ) -> io::Result<()> {
        let mut peers = self.peers.lock().await;
        let peer = peers
            .get_mut(&id)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "connection not registered"))?;
        write_frame(&mut peer.writer, opcode, payload).await
    }

    /// Send `"[from]: message"` as a text frame to every registered
    /// connection, the sender included.
    ///
    /// The lock is held for the whole fan-out. A peer whose write fails is
    /// shut down and removed on the spot; the failure is not surfaced to
    /// the broadcaster. Message and sender bytes are passed through
    /// unchanged — UTF-8 is assumed, never validated.
    pub async fn broadcast(&self, message: &[u8], from: &[u8]) {
        let mut line = Vec::with_capacity(from.len() + message.len() + 4);
        line.push(b'[');
        line.extend_from_slice(from);
        line.extend_from_slice(b"]: ");
        line.extend_from_slice(message);

        let mut peers = self.peers.lock().await;
        let mut failed = Vec::new();
        for (id, peer) in peers.iter_mut() {
            if let Err(e) = write_frame(&mut peer.writer, OpCode::Text, &line).await {
                tracing::warn!(
                    "Dropping {} ({}) after failed broadcast write: {}",
                    id,
                    peer.display_name(),
                    e
                );
                failed.push(*id);
            }
        }
        for id in failed {
            if let Some(mut peer) = peers.remove(&id) {
                let _ = peer.writer.shutdown().await;
            }
        }
    }
}
