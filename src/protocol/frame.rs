//! WebSocket frame codec.
//!
//! Parses and serializes the binary frame format of RFC 6455: a 4-bit
//! opcode, a variable-length payload length (7-bit, 16-bit or 64-bit
//! big-endian), an optional 4-byte masking key on client frames, and the
//! payload itself.
//!
//! Deliberate simplifications, kept identical on both sides of the codec:
//! FIN and RSV bits are ignored on decode (fragmented messages are not
//! reassembled and will surface as separate frames), and no upper bound is
//! placed on the payload length — callers feeding the decoder untrusted
//! input must add their own cap.

use std::io;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Frame purpose tag, the low 4 bits of the first header byte.
///
/// The six assigned RFC 6455 opcodes are named; the remaining nibbles are
/// carried through as [`OpCode::Reserved`] so that decoding never fails on
/// an unknown opcode and the dispatcher can log and skip it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpCode {
    /// Continuation of a fragmented message.
    Continuation,
    /// UTF-8 text.
    Text,
    /// Opaque bytes.
    Binary,
    /// Connection close.
    Close,
    /// Reachability probe.
    Ping,
    /// Answer to a ping.
    Pong,
    /// An opcode nibble with no assigned meaning.
    Reserved(u8),
}

impl OpCode {
    /// Interpret the low 4 bits of a header byte.
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x0F {
            0x0 => OpCode::Continuation,
            0x1 => OpCode::Text,
            0x2 => OpCode::Binary,
            0x8 => OpCode::Close,
            0x9 => OpCode::Ping,
            0xA => OpCode::Pong,
            other => OpCode::Reserved(other),
        }
    }

    /// The opcode nibble as it appears on the wire.
    pub fn bits(self) -> u8 {
        match self {
            OpCode::Continuation => 0x0,
            OpCode::Text => 0x1,
            OpCode::Binary => 0x2,
            OpCode::Close => 0x8,
            OpCode::Ping => 0x9,
            OpCode::Pong => 0xA,
            OpCode::Reserved(bits) => bits & 0x0F,
        }
    }
}

/// One decoded WebSocket frame: opcode plus unmasked payload.
///
/// Transient — constructed per read and consumed immediately.
#[derive(Debug, PartialEq, Eq)]
pub struct Frame {
    pub opcode: OpCode,
    pub payload: Vec<u8>,
}

/// Frame decode/encode failures.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Underlying stream error, including short reads (a short read here
    /// means connection trouble, not a transient framing issue — it is
    /// never retried).
    #[error("stream i/o failed: {0}")]
    Io(#[from] io::Error),

    /// 64-bit payload length that does not fit in addressable memory.
    #[error("frame payload length {0} does not fit in usize")]
    PayloadLength(u64),
}

/// Read one frame off the stream and unmask its payload.
///
/// Blocks until a full frame is available. Any short read is an error;
/// the connection should be torn down by the caller.
pub async fn read_frame<R>(reader: &mut R) -> Result<Frame, FrameError>
where
    R: AsyncRead + Unpin,
{
    // FIN and RSV bits are ignored, only the opcode nibble matters.
    let first = reader.read_u8().await?;
    let opcode = OpCode::from_bits(first & 0x0F);

    let second = reader.read_u8().await?;
    let masked = second & 0x80 != 0;
    let length = match second & 0x7F {
        126 => u64::from(reader.read_u16().await?),
        127 => reader.read_u64().await?,
        base => u64::from(base),
    };
    let length = usize::try_from(length).map_err(|_| FrameError::PayloadLength(length))?;

    let mut key = [0u8; 4];
    if masked {
        reader.read_exact(&mut key).await?;
    }

    let mut payload = vec![0u8; length];
    reader.read_exact(&mut payload).await?;

    if masked {
        for (i, byte) in payload.iter_mut().enumerate() {
            *byte ^= key[i & 3];
        }
    }

    Ok(Frame { opcode, payload })
}

/// Write one frame to the stream.
///
/// FIN is always set (no fragmentation on the write side) and the payload
/// is never masked: only client-to-server frames carry a mask, and this is
/// the server side. Write failures are returned, not retried.
pub async fn write_frame<W>(writer: &mut W, opcode: OpCode, payload: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = Vec::with_capacity(payload.len() + 10);
    buf.push(0x80 | opcode.bits());

    let length = payload.len();
    if length <= 125 {
        buf.push(length as u8);
    } else if length <= 65535 {
        buf.push(126);
        buf.extend_from_slice(&(length as u16).to_be_bytes());
    } else {
        buf.push(127);
        buf.extend_from_slice(&(length as u64).to_be_bytes());
    }

    buf.extend_from_slice(payload);

    writer.write_all(&buf).await?;
    writer.flush().await
}
