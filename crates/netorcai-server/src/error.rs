//! Error type for the engine layer.
//!
//! Client-facing failures all end up as a KICK whose reason is the
//! error's display text, so the `#[error]` strings below are part of the
//! observable protocol.

use netorcai_protocol::ProtocolError;

/// Errors raised by the engine on behalf of a single client.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A transport or protocol failure on an established connection.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The first message after accept was missing, unreadable or not a
    /// valid LOGIN.
    #[error("Invalid first message: {0}")]
    InvalidFirstMessage(#[source] ProtocolError),

    /// Admission was denied by the login rules (wrong phase, cap
    /// reached, duplicate game logic, LOGIN_ACK send failure).
    #[error("LOGIN denied: {0}")]
    LoginDenied(String),

    /// The game logic did not answer DO_INIT in time.
    #[error("Did not receive DO_INIT_ACK after 3 seconds.")]
    DoInitAckTimeout,

    /// The engine is shutting down and tears the connection down.
    #[error("netorcai abort")]
    Terminated,
}
