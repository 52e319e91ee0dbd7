//! Message types of the netorcai wire protocol.
//!
//! Outbound (server → client) messages are a single internally tagged enum
//! so the `message_type` field is emitted exactly as the protocol mandates.
//! Inbound (client → server) messages are validated at parse time: the
//! `message_type` tag must match what the caller's state expects, fields
//! must have the right JSON types (integers must be integers — fractional
//! numbers are rejected), and value constraints are enforced here so the
//! rest of the engine only ever sees well-formed messages.
//!
//! Game states and player actions are opaque [`Value`]s: the orchestrator
//! forwards them verbatim and never inspects them.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Roles and shared records
// ---------------------------------------------------------------------------

/// The role a client declares in its LOGIN message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Role {
    #[serde(rename = "player")]
    Player,
    #[serde(rename = "visualization")]
    Visualization,
    #[serde(rename = "game logic")]
    GameLogic,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Player => write!(f, "player"),
            Role::Visualization => write!(f, "visualization"),
            Role::GameLogic => write!(f, "game logic"),
        }
    }
}

/// Public description of a player, sent to visualizations in
/// GAME_STARTS and TURN.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerInfo {
    pub player_id: i64,
    pub nickname: String,
    pub remote_address: String,
    pub is_connected: bool,
}

/// One player's actions for a turn, forwarded to the game logic inside
/// DO_TURN's `player_actions` array.
#[derive(Debug, Clone, Serialize)]
pub struct PlayerAction {
    pub player_id: i64,
    pub turn_number: i64,
    pub actions: Value,
}

// ---------------------------------------------------------------------------
// Outbound messages
// ---------------------------------------------------------------------------

/// Every message the orchestrator sends.
///
/// `#[serde(tag = "message_type")]` plus SCREAMING_SNAKE_CASE renaming
/// produces the wire format directly: `ServerMessage::LoginAck` becomes
/// `{"message_type":"LOGIN_ACK"}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "message_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    LoginAck,
    Kick {
        kick_reason: String,
    },
    GameStarts {
        player_id: i64,
        players_info: Vec<PlayerInfo>,
        nb_players: u32,
        nb_turns_max: u32,
        delay_first_turn: f64,
        delay_turns: f64,
        initial_game_state: Value,
    },
    Turn {
        turn_number: u32,
        game_state: Value,
        players_info: Vec<PlayerInfo>,
    },
    GameEnds {
        winner_player_id: i64,
        game_state: Value,
    },
    DoInit {
        nb_players: u32,
        nb_turns_max: u32,
    },
    DoTurn {
        player_actions: Vec<PlayerAction>,
    },
}

// ---------------------------------------------------------------------------
// Inbound messages
// ---------------------------------------------------------------------------

/// A client's LOGIN handshake.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginMessage {
    pub nickname: String,
    pub role: Role,
}

/// A player's acknowledgement of a TURN, carrying its actions.
#[derive(Debug, Clone, Deserialize)]
pub struct TurnAckMessage {
    pub turn_number: i64,
    pub actions: Value,
}

/// The game logic's answer to DO_INIT.
#[derive(Debug, Clone, Deserialize)]
pub struct DoInitAckMessage {
    pub initial_game_state: Value,
}

/// The game logic's answer to DO_TURN.
#[derive(Debug, Clone, Deserialize)]
pub struct DoTurnAckMessage {
    pub winner_player_id: i64,
    pub game_state: Value,
}

/// Nicknames are 1–10 characters from `[a-zA-Z0-9_-]`.
fn nickname_is_valid(nickname: &str) -> bool {
    (1..=10).contains(&nickname.len())
        && nickname
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn message_type(value: &Value) -> Result<&str, ProtocolError> {
    value
        .get("message_type")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            ProtocolError::InvalidMessage(
                "field 'message_type' is missing or not a string".into(),
            )
        })
}

fn expect_message_type(
    value: &Value,
    expected: &str,
) -> Result<(), ProtocolError> {
    let got = message_type(value)?;
    if got != expected {
        return Err(ProtocolError::InvalidMessage(format!(
            "expected message_type '{expected}', got '{got}'"
        )));
    }
    Ok(())
}

fn from_value<T: serde::de::DeserializeOwned>(
    value: &Value,
) -> Result<T, ProtocolError> {
    serde_json::from_value(value.clone())
        .map_err(|e| ProtocolError::InvalidMessage(e.to_string()))
}

/// Parses and validates a LOGIN message.
pub fn parse_login(value: &Value) -> Result<LoginMessage, ProtocolError> {
    expect_message_type(value, "LOGIN")?;
    let msg: LoginMessage = from_value(value)?;
    if !nickname_is_valid(&msg.nickname) {
        return Err(ProtocolError::InvalidMessage(format!(
            "invalid nickname '{}': expected 1-10 characters in [a-zA-Z0-9_-]",
            msg.nickname
        )));
    }
    Ok(msg)
}

/// Parses and validates a TURN_ACK message.
pub fn parse_turn_ack(value: &Value) -> Result<TurnAckMessage, ProtocolError> {
    expect_message_type(value, "TURN_ACK")?;
    let msg: TurnAckMessage = from_value(value)?;
    if msg.turn_number < 0 {
        return Err(ProtocolError::InvalidMessage(format!(
            "field 'turn_number' must be non-negative, got {}",
            msg.turn_number
        )));
    }
    if !msg.actions.is_array() {
        return Err(ProtocolError::InvalidMessage(
            "field 'actions' must be an array".into(),
        ));
    }
    Ok(msg)
}

/// Parses and validates a DO_INIT_ACK message.
pub fn parse_do_init_ack(
    value: &Value,
) -> Result<DoInitAckMessage, ProtocolError> {
    expect_message_type(value, "DO_INIT_ACK")?;
    let msg: DoInitAckMessage = from_value(value)?;
    if !msg.initial_game_state.is_object() {
        return Err(ProtocolError::InvalidMessage(
            "field 'initial_game_state' must be an object".into(),
        ));
    }
    Ok(msg)
}

/// Parses and validates a DO_TURN_ACK message.
///
/// `winner_player_id` must be in `-1..nb_players`; `-1` means no winner.
pub fn parse_do_turn_ack(
    value: &Value,
    nb_players: u32,
) -> Result<DoTurnAckMessage, ProtocolError> {
    expect_message_type(value, "DO_TURN_ACK")?;
    let msg: DoTurnAckMessage = from_value(value)?;
    if msg.winner_player_id < -1 || msg.winner_player_id >= nb_players as i64 {
        return Err(ProtocolError::InvalidMessage(format!(
            "field 'winner_player_id' must be in [-1, {}), got {}",
            nb_players, msg.winner_player_id
        )));
    }
    if !msg.game_state.is_object() {
        return Err(ProtocolError::InvalidMessage(
            "field 'game_state' must be an object".into(),
        ));
    }
    Ok(msg)
}

// =========================================================================
// Tests
// =========================================================================
