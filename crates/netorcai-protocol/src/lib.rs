//! # netorcai-protocol
//!
//! The netorcai wire protocol: length-prefixed JSON framing plus the
//! message types exchanged between the orchestrator and its clients
//! (players, visualizations and the game logic).
//!
//! Framing is a 4-byte little-endian length followed by a UTF-8 JSON
//! payload; every message is an object with a mandatory `message_type`
//! field. See [`frame`] for the framing functions and [`messages`] for
//! the types and their validation rules.

mod error;
mod frame;
mod messages;

pub use error::ProtocolError;
pub use frame::{read_frame, write_frame, write_message, MAX_MESSAGE_BYTES};
pub use messages::{
    parse_do_init_ack, parse_do_turn_ack, parse_login, parse_turn_ack,
    DoInitAckMessage, DoTurnAckMessage, LoginMessage, PlayerAction,
    PlayerInfo, Role, ServerMessage, TurnAckMessage,
};
