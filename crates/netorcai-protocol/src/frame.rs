//! Length-prefixed JSON framing.
//!
//! Every message on the wire is a 4-byte little-endian unsigned length `L`
//! followed by `L` bytes of UTF-8 JSON. `L` must be in `1..=16 MiB`; a
//! reader observing anything else fails the connection.

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{ProtocolError, ServerMessage};

/// Maximum payload size of a single frame.
pub const MAX_MESSAGE_BYTES: u32 = 16 * 1024 * 1024;

/// Reads one frame and decodes its payload as JSON.
///
/// # Errors
///
/// [`ProtocolError::Io`] on read failure or EOF mid-frame,
/// [`ProtocolError::InvalidLength`] for a zero or oversized prefix, and
/// [`ProtocolError::Decode`] when the payload is not valid JSON.
pub async fn read_frame<R>(reader: &mut R) -> Result<Value, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_le_bytes(len_buf);
    if len == 0 || len > MAX_MESSAGE_BYTES {
        return Err(ProtocolError::InvalidLength(len));
    }

    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;

    serde_json::from_slice(&payload).map_err(ProtocolError::Decode)
}

/// Writes one frame: length prefix and payload in a single write.
///
/// The prefix and payload are buffered together so the frame hits the
/// socket atomically with respect to other `write_frame` calls on the
/// same (exclusively owned) writer.
pub async fn write_frame<W>(
    writer: &mut W,
    payload: &[u8],
) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    if payload.is_empty() || payload.len() > MAX_MESSAGE_BYTES as usize {
        return Err(ProtocolError::InvalidLength(payload.len() as u32));
    }

    let mut buf = Vec::with_capacity(4 + payload.len());
    buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buf.extend_from_slice(payload);

    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

/// Serializes a server message and writes it as one frame.
pub async fn write_message<W>(
    writer: &mut W,
    msg: &ServerMessage,
) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let payload = serde_json::to_vec(msg).map_err(ProtocolError::Encode)?;
    write_frame(writer, &payload).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frame_round_trip() {
        let (mut a, mut b) = tokio::io::duplex(1024);

        let payload = br#"{"message_type":"LOGIN_ACK"}"#;
        write_frame(&mut a, payload).await.unwrap();

        let value = read_frame(&mut b).await.unwrap();
        assert_eq!(value["message_type"], "LOGIN_ACK");
    }

    #[tokio::test]
    async fn test_read_frame_rejects_zero_length() {
        let (mut a, mut b) = tokio::io::duplex(64);
        tokio::io::AsyncWriteExt::write_all(&mut a, &0u32.to_le_bytes())
            .await
            .unwrap();

        let err = read_frame(&mut b).await.unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidLength(0)));
    }

    #[tokio::test]
    async fn test_read_frame_rejects_oversized_length() {
        let (mut a, mut b) = tokio::io::duplex(64);
        let len = MAX_MESSAGE_BYTES + 1;
        tokio::io::AsyncWriteExt::write_all(&mut a, &len.to_le_bytes())
            .await
            .unwrap();

        let err = read_frame(&mut b).await.unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidLength(_)));
    }

    #[tokio::test]
    async fn test_read_frame_rejects_invalid_json() {
        let (mut a, mut b) = tokio::io::duplex(64);
        write_frame(&mut a, b"not json at all").await.unwrap();

        let err = read_frame(&mut b).await.unwrap_err();
        assert!(matches!(err, ProtocolError::Decode(_)));
    }

    #[tokio::test]
    async fn test_read_frame_fails_on_truncated_payload() {
        let (mut a, mut b) = tokio::io::duplex(64);
        tokio::io::AsyncWriteExt::write_all(&mut a, &100u32.to_le_bytes())
            .await
            .unwrap();
        tokio::io::AsyncWriteExt::write_all(&mut a, b"short")
            .await
            .unwrap();
        drop(a); // EOF before the 100 promised bytes

        let err = read_frame(&mut b).await.unwrap_err();
        assert!(matches!(err, ProtocolError::Io(_)));
    }

    #[tokio::test]
    async fn test_write_frame_rejects_empty_payload() {
        let (mut a, _b) = tokio::io::duplex(64);
        let err = write_frame(&mut a, b"").await.unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidLength(0)));
    }
}
