//! Error type for the wire protocol layer.

/// Errors that can occur while framing, encoding or validating messages.
///
/// Anything a remote peer can trigger (bad length prefix, malformed JSON,
/// schema violations) lands here; the server layer converts these into
/// KICKs with the error's display text as the kick reason.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Socket read/write failed (includes EOF in the middle of a frame).
    #[error("i/o failed: {0}")]
    Io(#[from] std::io::Error),

    /// The length prefix is zero or exceeds the 16 MiB frame limit.
    #[error("invalid message length: {0} bytes")]
    InvalidLength(u32),

    /// Serializing an outbound message failed.
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// The payload is not valid UTF-8 JSON.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The message decoded but violates the schema: wrong `message_type`,
    /// missing or type-incorrect field, or an out-of-range value.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
