//! Per-connection session loop.
//!
//! Decodes frames off the connection's read half and dispatches on opcode.
//! Two states: anonymous until the first text frame arrives (its payload
//! becomes the identity), named from then on. Every loop exit — decode
//! failure, EOF or a close frame — funnels into a single deregistration.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::protocol::frame::{OpCode, read_frame};
use crate::server::registry::{ConnectionId, Registry, SYSTEM_IDENTITY};

/// Run the session loop until the connection goes away, then deregister.
///
/// Deregistration runs exactly once no matter how the loop exits; it also
/// shuts the connection's write half down.
pub async fn run<R, W>(registry: Arc<Registry<W>>, id: ConnectionId, mut reader: R)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let identity = read_loop(&registry, id, &mut reader).await;
    registry.deregister(id).await;
    tracing::info!(
        "Connection closed for {} ({})",
        id,
        identity
            .as_deref()
            .map(String::from_utf8_lossy)
            .unwrap_or_else(|| "<anonymous>".into())
    );
}

/// Dispatch frames until the connection is done; returns the identity the
/// peer ended up with, for the closing log line.
async fn read_loop<R, W>(
    registry: &Registry<W>,
    id: ConnectionId,
    reader: &mut R,
) -> Option<Vec<u8>>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut identity: Option<Vec<u8>> = None;

    loop {
        let frame = match read_frame(reader).await {
            Ok(frame) => frame,
            Err(e) => {
                // Covers EOF, short reads and malformed frames alike:
                // terminal for this connection, invisible to the others.
                tracing::debug!("Error reading frame on {}: {}", id, e);
                return identity;
            }
        };

        match frame.opcode {
            OpCode::Text => match &identity {
                None => {
                    // First message names the connection.
                    let name = frame.payload;
                    registry.assign_identity(id, &name).await;
                    tracing::info!(
                        "Username set for {}: {}",
                        id,
                        String::from_utf8_lossy(&name)
                    );
                    let notice = [&name[..], b" joined the chat"].concat();
                    registry.broadcast(&notice, SYSTEM_IDENTITY).await;
                    identity = Some(name);
                }
                Some(name) => {
                    tracing::debug!(
                        "[{}]: {}",
                        String::from_utf8_lossy(name),
                        String::from_utf8_lossy(&frame.payload)
                    );
                    registry.broadcast(&frame.payload, name).await;
                }
            },
            OpCode::Ping => {
                // Best-effort keepalive courtesy: a failed pong is logged
                // but does not end the session.
                tracing::debug!("Received ping on {}", id);
                if let Err(e) = registry.send_to(id, OpCode::Pong, &frame.payload).await {
                    tracing::warn!("Error writing pong frame on {}: {}", id, e);
                }
            }
            OpCode::Close => {
                let name = identity.as_deref().unwrap_or(b"");
                let notice = [name, b" left the chat"].concat();
                registry.broadcast(&notice, SYSTEM_IDENTITY).await;
                return identity;
            }
            other => {
                tracing::debug!("Unhandled frame type {:#x} on {}", other.bits(), id);
            }
        }
    }
}
