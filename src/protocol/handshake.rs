//! HTTP upgrade handshake.
//!
//! Reads the client's `Upgrade: websocket` request off the raw stream,
//! answers `101 Switching Protocols` with the derived `Sec-WebSocket-Accept`
//! key, and leaves the stream positioned at the first WebSocket frame.
//! This is glue around the codec: once [`accept`] returns `Ok`, the caller
//! owns an upgraded duplex byte stream.

use std::io;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha1::{Digest, Sha1};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Fixed GUID appended to the client key before hashing, per RFC 6455 §1.3.
const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Upper bound on the request head. A client that never terminates its
/// headers must not make us allocate without limit.
const MAX_REQUEST_BYTES: usize = 8 * 1024;

/// Handshake failures. All are terminal for the connection.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("stream i/o failed: {0}")]
    Io(#[from] io::Error),

    #[error("request is not a WebSocket upgrade")]
    NotAnUpgrade,

    #[error("missing Sec-WebSocket-Key header")]
    MissingKey,

    #[error("malformed upgrade request")]
    MalformedRequest,

    #[error("upgrade request exceeds {MAX_REQUEST_BYTES} bytes")]
    RequestTooLarge,
}

/// Compute the `Sec-WebSocket-Accept` value for a client key:
/// base64 of the SHA-1 digest of the key concatenated with the RFC GUID.
pub fn accept_key(key: &str) -> String {
    let mut sha1 = Sha1::new();
    sha1.update(key.as_bytes());
    sha1.update(WS_GUID.as_bytes());
    STANDARD.encode(sha1.finalize())
}

/// Perform the server side of the upgrade handshake on a raw stream.
///
/// On success the `101` response has been written and the next bytes read
/// from the stream are frame data. On a readable-but-invalid request a
/// `400 Bad Request` is written before the error is returned; the caller
/// drops the connection either way.
pub async fn accept<S>(stream: &mut S) -> Result<(), HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let head = read_request_head(stream).await?;

    match validate(&head) {
        Ok(key) => {
            let response = format!(
                "HTTP/1.1 101 Switching Protocols\r\n\
                 Upgrade: websocket\r\n\
                 Connection: Upgrade\r\n\
                 Sec-WebSocket-Accept: {}\r\n\r\n",
                accept_key(key)
            );
            stream.write_all(response.as_bytes()).await?;
            stream.flush().await?;
            Ok(())
        }
        Err(err) => {
            let _ = stream
                .write_all(b"HTTP/1.1 400 Bad Request\r\n\r\n")
                .await;
            Err(err)
        }
    }
}

/// Read byte-by-byte until the blank line that ends the header block.
///
/// One byte at a time so no frame data beyond the head is consumed; the
/// head is tiny and read once per connection.
async fn read_request_head<S>(stream: &mut S) -> Result<String, HandshakeError>
where
    S: AsyncRead + Unpin,
{
    let mut head = Vec::with_capacity(512);
    while !head.ends_with(b"\r\n\r\n") {
        if head.len() >= MAX_REQUEST_BYTES {
            return Err(HandshakeError::RequestTooLarge);
        }
        head.push(stream.read_u8().await?);
    }
    String::from_utf8(head).map_err(|_| HandshakeError::MalformedRequest)
}

/// Check the upgrade headers and return the client's `Sec-WebSocket-Key`.
fn validate(head: &str) -> Result<&str, HandshakeError> {
    let mut lines = head.split("\r\n");
    let request_line = lines.next().ok_or(HandshakeError::MalformedRequest)?;
    if !request_line.starts_with("GET ") {
        return Err(HandshakeError::NotAnUpgrade);
    }

    let mut upgrade_ok = false;
    let mut connection_ok = false;
    let mut key = None;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match name.trim().to_ascii_lowercase().as_str() {
            "upgrade" => upgrade_ok = value.eq_ignore_ascii_case("websocket"),
            // Some clients send "keep-alive, Upgrade".
            "connection" => {
                connection_ok = value
                    .split(',')
                    .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));
            }
            "sec-websocket-key" => key = Some(value),
            _ => {}
        }
    }

    if !upgrade_ok || !connection_ok {
        return Err(HandshakeError::NotAnUpgrade);
    }
    key.filter(|k| !k.is_empty()).ok_or(HandshakeError::MissingKey)
}
