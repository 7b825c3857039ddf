//! Reading and writing bridge frames on a byte stream.
//!
//! ## Wire format
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  16 bytes: header (Type:u32 | Size:u32 | ID:u64, LE)    │
//! ├─────────────────────────────────────────────────────────┤
//! │  Size-16 bytes: UTF-8 JSON payload                      │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! EOF on the header boundary is a clean shutdown and reads as `Ok(None)`;
//! EOF anywhere inside a frame is a framing error. Errors are never retried
//! here; the dispatch engine terminates the session on the first one.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::hresult::{BridgeError, ErrorKind};
use crate::protocol::{MessageHeader, MESSAGE_HEADER_SIZE};

/// Hard limit on frame size to prevent memory exhaustion from a corrupt or
/// hostile length field.
pub const MAX_FRAME_HARD_LIMIT: u32 = 16 * 1024 * 1024;

/// Encode a header into its 16-byte little-endian wire form.
pub fn encode_header(header: &MessageHeader) -> [u8; MESSAGE_HEADER_SIZE] {
    let mut buf = [0u8; MESSAGE_HEADER_SIZE];
    buf[0..4].copy_from_slice(&header.message_type.to_le_bytes());
    buf[4..8].copy_from_slice(&header.size.to_le_bytes());
    buf[8..16].copy_from_slice(&header.id.to_le_bytes());
    buf
}

/// Decode a header from its 16-byte little-endian wire form.
pub fn decode_header(buf: &[u8; MESSAGE_HEADER_SIZE]) -> MessageHeader {
    MessageHeader {
        message_type: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
        size: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
        id: u64::from_le_bytes(buf[8..16].try_into().unwrap()),
    }
}

/// Read one frame.
///
/// Returns `Ok(None)` on clean EOF at a frame boundary.
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<Option<(MessageHeader, Vec<u8>)>, BridgeError> {
    let mut header_buf = [0u8; MESSAGE_HEADER_SIZE];
    let mut filled = 0;
    while filled < MESSAGE_HEADER_SIZE {
        let n = reader
            .read(&mut header_buf[filled..])
            .await
            .map_err(|source| {
                BridgeError::new(ErrorKind::Framing {
                    context: "reading message header",
                    source,
                })
            })?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(BridgeError::new(ErrorKind::Framing {
                context: "reading message header",
                source: std::io::ErrorKind::UnexpectedEof.into(),
            }));
        }
        filled += n;
    }

    let header = decode_header(&header_buf);
    if header.size < MESSAGE_HEADER_SIZE as u32 {
        return Err(BridgeError::new(ErrorKind::Framing {
            context: "reading message header",
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("frame size {} is smaller than the header", header.size),
            ),
        }));
    }
    if header.size > MAX_FRAME_HARD_LIMIT {
        return Err(BridgeError::new(ErrorKind::FrameTooLarge {
            size: header.size,
            max: MAX_FRAME_HARD_LIMIT,
        }));
    }

    let mut payload = vec![0u8; header.size as usize - MESSAGE_HEADER_SIZE];
    reader.read_exact(&mut payload).await.map_err(|source| {
        BridgeError::new(ErrorKind::Framing {
            context: "reading message payload",
            source,
        })
    })?;

    Ok(Some((header, payload)))
}

/// Write one frame. `header.size` is overwritten with the real frame length
/// before anything hits the stream, and the frame is flushed as a unit.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    header: &mut MessageHeader,
    payload: &[u8],
) -> Result<(), BridgeError> {
    header.size = (MESSAGE_HEADER_SIZE + payload.len()) as u32;
    if header.size > MAX_FRAME_HARD_LIMIT {
        return Err(BridgeError::new(ErrorKind::FrameTooLarge {
            size: header.size,
            max: MAX_FRAME_HARD_LIMIT,
        }));
    }

    writer
        .write_all(&encode_header(header))
        .await
        .map_err(|source| {
            BridgeError::new(ErrorKind::Framing {
                context: "writing message header",
                source,
            })
        })?;
    writer.write_all(payload).await.map_err(|source| {
        BridgeError::new(ErrorKind::Framing {
            context: "writing message payload",
            source,
        })
    })?;
    writer.flush().await.map_err(|source| {
        BridgeError::new(ErrorKind::Framing {
            context: "flushing message",
            source,
        })
    })?;

    Ok(())
}
