//! Login dispatcher: first-message handshake and role admission.
//!
//! Each accepted connection gets its own task running [`handle_client`].
//! The flow is:
//!   1. Read exactly one message within a second of accept
//!   2. Parse it as LOGIN (nickname + role)
//!   3. Apply the role's admission rules under the global lock,
//!      sending LOGIN_ACK inside the critical section
//!   4. Hand over to the Player/Visu handler or the turn coordinator

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use netorcai_protocol::{
    parse_login, LoginMessage, ProtocolError, Role, ServerMessage,
};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};

use crate::client::{Client, GameLogicClient, IncomingRx, PlayerOrVisuClient};
use crate::coordinator::handle_game_logic;
use crate::player::handle_player_or_visu;
use crate::state::{ClientState, GamePhase, SharedState};
use crate::EngineError;

/// A client that has not sent its LOGIN within this window is kicked.
const LOGIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Handles one connection from accept to close.
pub(crate) async fn handle_client(
    stream: TcpStream,
    remote_addr: SocketAddr,
    state: SharedState,
    onexit: mpsc::UnboundedSender<i32>,
    can_terminate: watch::Receiver<bool>,
) {
    tracing::debug!(remote_address = %remote_addr, "New connection");

    let (client, mut incoming) = Client::accept(stream, remote_addr);

    let login = match read_login(&mut incoming).await {
        Ok(login) => login,
        Err(err) => {
            tracing::debug!(
                remote_address = %remote_addr,
                error = %err,
                "Cannot read client first message"
            );
            client.kick(&err.to_string()).await;
            return;
        }
    };
    client.set_nickname(&login.nickname);

    match login.role {
        Role::Player => {
            login_player_or_visu(
                client,
                incoming,
                true,
                state,
                can_terminate,
            )
            .await;
        }
        Role::Visualization => {
            login_player_or_visu(
                client,
                incoming,
                false,
                state,
                can_terminate,
            )
            .await;
        }
        Role::GameLogic => {
            login_game_logic(client, incoming, state, onexit, can_terminate)
                .await;
        }
    }
}

/// Waits for the first message and parses it as LOGIN.
async fn read_login(
    incoming: &mut IncomingRx,
) -> Result<LoginMessage, EngineError> {
    let value = match tokio::time::timeout(LOGIN_TIMEOUT, incoming.recv())
        .await
    {
        Ok(Some(Ok(value))) => value,
        Ok(Some(Err(err))) => {
            return Err(EngineError::InvalidFirstMessage(err))
        }
        Ok(None) => {
            return Err(EngineError::InvalidFirstMessage(
                ProtocolError::InvalidMessage(
                    "connection closed before LOGIN".into(),
                ),
            ))
        }
        Err(_) => {
            return Err(EngineError::InvalidFirstMessage(
                ProtocolError::InvalidMessage(
                    "no LOGIN received within 1 second".into(),
                ),
            ))
        }
    };

    parse_login(&value).map_err(EngineError::InvalidFirstMessage)
}

/// Admission + registration of a player or visualization, then its
/// handler loop.
async fn login_player_or_visu(
    client: Arc<Client>,
    incoming: IncomingRx,
    is_player: bool,
    state: SharedState,
    can_terminate: watch::Receiver<bool>,
) {
    let mut guard = state.lock().await;

    let denial = if is_player {
        if guard.phase != GamePhase::NotRunning {
            Some("Game has been started")
        } else if guard.players.len() >= guard.config.nb_players_max as usize
        {
            Some("Maximum number of players reached")
        } else {
            None
        }
    } else if guard.phase == GamePhase::Finished {
        Some("Game is finished")
    } else if guard.visus.len() >= guard.config.nb_visus_max as usize {
        Some("Maximum number of visus reached")
    } else {
        None
    };

    if let Some(reason) = denial {
        drop(guard);
        let err = EngineError::LoginDenied(reason.to_string());
        client.kick(&err.to_string()).await;
        return;
    }

    // LOGIN_ACK is sent inside the critical section so the admission
    // decision and the acknowledgement are atomic with respect to other
    // logins and the game start.
    if client.send(&ServerMessage::LoginAck).await.is_err() {
        drop(guard);
        let err = EngineError::LoginDenied("Could not send LOGIN_ACK".into());
        client.kick(&err.to_string()).await;
        return;
    }
    client.set_state(ClientState::Logged);

    let (pv, events) = PlayerOrVisuClient::new(client.clone(), is_player);
    if is_player {
        guard.players.push(pv.clone());
        tracing::info!(
            nickname = %client.nickname(),
            remote_address = %client.remote_addr(),
            player_count = guard.players.len(),
            "New player accepted"
        );
    } else {
        guard.visus.push(pv.clone());
        tracing::info!(
            nickname = %client.nickname(),
            remote_address = %client.remote_addr(),
            visu_count = guard.visus.len(),
            "New visualization accepted"
        );
    }
    drop(guard);

    handle_player_or_visu(pv, events, incoming, state, can_terminate).await;
}

/// Admission + registration of the game logic, then the turn coordinator.
async fn login_game_logic(
    client: Arc<Client>,
    incoming: IncomingRx,
    state: SharedState,
    onexit: mpsc::UnboundedSender<i32>,
    can_terminate: watch::Receiver<bool>,
) {
    let mut guard = state.lock().await;

    let denial = if guard.phase != GamePhase::NotRunning {
        Some("Game has been started")
    } else if !guard.game_logic.is_empty() {
        Some("A game logic is already logged in")
    } else {
        None
    };

    if let Some(reason) = denial {
        drop(guard);
        let err = EngineError::LoginDenied(reason.to_string());
        client.kick(&err.to_string()).await;
        return;
    }

    if client.send(&ServerMessage::LoginAck).await.is_err() {
        drop(guard);
        let err = EngineError::LoginDenied("Could not send LOGIN_ACK".into());
        client.kick(&err.to_string()).await;
        return;
    }
    client.set_state(ClientState::Logged);

    let (gl, channels) = GameLogicClient::new(client.clone());
    guard.game_logic.push(gl.clone());
    tracing::info!(
        nickname = %client.nickname(),
        remote_address = %client.remote_addr(),
        "Game logic accepted"
    );
    drop(guard);

    handle_game_logic(gl, channels, incoming, state, onexit, can_terminate)
        .await;
}
