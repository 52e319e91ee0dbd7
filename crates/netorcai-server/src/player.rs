//! Player and visualization handler.
//!
//! After LOGIN_ACK the handler owns the connection until termination. It
//! is a passive forwarder: turn-coordinator events go out to the socket,
//! player TURN_ACKs come back in and are forwarded to the coordinator.

use std::sync::Arc;

use netorcai_protocol::{parse_turn_ack, PlayerAction, ServerMessage, TurnAckMessage};
use tokio::sync::{mpsc, watch};

use crate::client::{IncomingRx, PlayerOrVisuClient};
use crate::state::{ClientState, SharedState};
use crate::EngineError;

/// Runs the state machine of one player or visualization.
pub(crate) async fn handle_player_or_visu(
    pv: Arc<PlayerOrVisuClient>,
    mut events: mpsc::UnboundedReceiver<ServerMessage>,
    mut incoming: IncomingRx,
    state: SharedState,
    mut can_terminate: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = can_terminate.changed() => {
                if *can_terminate.borrow() { return; }
            },

            event = events.recv() => {
                let Some(msg) = event else {
                    // Coordinator side dropped: the engine is going away.
                    return;
                };
                match msg {
                    ServerMessage::GameStarts { .. } => {
                        if pv.client.send(&msg).await.is_err() {
                            disconnect(&pv, &state).await;
                            pv.client.kick("Cannot send GAME_STARTS").await;
                            return;
                        }
                        pv.client.set_state(ClientState::Ready);
                    }
                    ServerMessage::Turn { .. } => {
                        if pv.client.send(&msg).await.is_err() {
                            disconnect(&pv, &state).await;
                            pv.client.kick("Cannot send TURN").await;
                            return;
                        }
                        pv.client.set_state(ClientState::Thinking);
                    }
                    ServerMessage::GameEnds { .. } => {
                        let _ = pv.client.send(&msg).await;
                        pv.client.kick("Game is finished").await;
                        return;
                    }
                    other => {
                        tracing::error!(
                            ?other,
                            "Unexpected event for a player/visu handler"
                        );
                    }
                }
            }

            msg = incoming.recv() => match msg {
                Some(Ok(value)) => {
                    if !pv.is_player {
                        disconnect(&pv, &state).await;
                        pv.client
                            .kick("Received a message from a visualization")
                            .await;
                        return;
                    }
                    match parse_turn_ack(&value) {
                        Ok(ack) => {
                            if pv.client.state() == ClientState::Logged {
                                tracing::debug!(
                                    nickname = %pv.client.nickname(),
                                    "Ignoring TURN_ACK: game not started"
                                );
                            } else {
                                forward_turn_ack(&pv, &state, ack).await;
                                pv.client.set_state(ClientState::Ready);
                            }
                        }
                        Err(err) => {
                            disconnect(&pv, &state).await;
                            pv.client
                                .kick(&format!("Invalid TURN_ACK message. {err}"))
                                .await;
                            return;
                        }
                    }
                }
                Some(Err(err)) => {
                    tracing::info!(
                        nickname = %pv.client.nickname(),
                        remote_address = %pv.client.remote_addr(),
                        error = %err,
                        "Client disconnected"
                    );
                    disconnect(&pv, &state).await;
                    let reason = EngineError::from(err);
                    pv.client.kick(&reason.to_string()).await;
                    return;
                }
                None => {
                    disconnect(&pv, &state).await;
                    return;
                }
            },
        }
    }
}

/// Forwards a player's actions to the turn coordinator, if a game logic
/// is connected.
async fn forward_turn_ack(
    pv: &Arc<PlayerOrVisuClient>,
    state: &SharedState,
    ack: TurnAckMessage,
) {
    let sender = {
        let guard = state.lock().await;
        guard.game_logic.first().map(|gl| gl.player_action.clone())
    };
    let Some(tx) = sender else {
        tracing::debug!(
            nickname = %pv.client.nickname(),
            "Dropping TURN_ACK: no game logic connected"
        );
        return;
    };
    let _ = tx.send(PlayerAction {
        player_id: pv.player_id(),
        turn_number: ack.turn_number,
        actions: ack.actions,
    });
}

/// Deregisters the client and tells the coordinator a player is gone so
/// fast-mode completion checks see the updated player count.
async fn disconnect(pv: &Arc<PlayerOrVisuClient>, state: &SharedState) {
    let notify = {
        let mut guard = state.lock().await;
        guard.deregister(pv);
        if pv.is_player {
            guard
                .game_logic
                .first()
                .map(|gl| gl.player_disconnected.clone())
        } else {
            None
        }
    };
    if let Some(tx) = notify {
        let _ = tx.send(pv.player_id());
    }
}
