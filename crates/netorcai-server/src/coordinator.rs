//! Turn coordinator: the game logic's handler.
//!
//! Runs on the game logic's connection task and drives the whole game:
//! waits for the external start order, assigns randomized player
//! identifiers, performs the DO_INIT / DO_INIT_ACK handshake, fans
//! GAME_STARTS out, then loops DO_TURN / DO_TURN_ACK until the turn
//! limit, fanning TURN and finally GAME_ENDS out to players and visus.
//!
//! The coordinator is the sole writer of game-phase transitions and the
//! only producer of GAME_STARTS / TURN / GAME_ENDS events. Because it is
//! central, it never returns before shutdown is coordinated: every exit
//! path goes through the drain loop, which consumes whatever other
//! handlers still send until `can_terminate` is observed.

use std::sync::Arc;
use std::time::Duration;

use netorcai_protocol::{
    parse_do_init_ack, parse_do_turn_ack, DoInitAckMessage, PlayerAction,
    PlayerInfo, ProtocolError, ServerMessage,
};
use rand::seq::SliceRandom;
use serde_json::Value;
use tokio::sync::{mpsc, watch};

use crate::client::{GameLogicChannels, GameLogicClient, IncomingRx};
use crate::state::{GamePhase, SharedState};
use crate::EngineError;

/// How long the game logic gets to answer DO_INIT.
const DO_INIT_ACK_TIMEOUT: Duration = Duration::from_secs(3);

enum StartOutcome {
    Start,
    Terminate,
    Abort(String),
}

enum InitAckOutcome {
    Ack(Box<DoInitAckMessage>),
    Terminate,
    Abort(String),
}

enum TurnLoopEvent {
    Terminate,
    SendDoTurn,
    Action(PlayerAction),
    Disconnected(i64),
    Message(Option<Result<Value, ProtocolError>>),
}

/// Drives one game for an accepted game logic client.
pub(crate) async fn handle_game_logic(
    gl: Arc<GameLogicClient>,
    mut channels: GameLogicChannels,
    mut incoming: IncomingRx,
    state: SharedState,
    onexit: mpsc::UnboundedSender<i32>,
    mut can_terminate: watch::Receiver<bool>,
) {
    // -- Await the start order --------------------------------------------
    let outcome = tokio::select! {
        _ = can_terminate.wait_for(|t| *t) => StartOutcome::Terminate,
        _ = channels.start.recv() => StartOutcome::Start,
        msg = incoming.recv() => StartOutcome::Abort(match msg {
            Some(Ok(_)) => {
                "Received a game logic message but the game has not started"
                    .to_string()
            }
            Some(Err(err)) => format!("Game logic error. {err}"),
            None => "Game logic error. Connection closed".to_string(),
        }),
    };
    match outcome {
        StartOutcome::Terminate => return,
        StartOutcome::Abort(reason) => {
            state.lock().await.game_logic.clear();
            gl.client.kick(&reason).await;
            let _ = onexit.send(1);
            drain(&mut channels, &mut incoming, &mut can_terminate).await;
            return;
        }
        StartOutcome::Start => tracing::info!("Starting game"),
    }

    // -- Assign player identifiers and send DO_INIT -----------------------
    let (initial_nb_players, mut players_info, config, do_init_result) = {
        let mut guard = state.lock().await;

        let mut ids: Vec<i64> = (0..guard.players.len() as i64).collect();
        ids.shuffle(&mut rand::rng());
        for (player, id) in guard.players.iter().zip(&ids) {
            player.set_player_id(*id);
        }

        let mut infos: Vec<PlayerInfo> = guard
            .players
            .iter()
            .map(|p| PlayerInfo {
                player_id: p.player_id(),
                nickname: p.client.nickname(),
                remote_address: p.client.remote_addr().to_string(),
                is_connected: true,
            })
            .collect();
        infos.sort_by_key(|info| info.player_id);

        guard.phase = GamePhase::Running;

        let nb_players = guard.players.len() as u32;
        let config = guard.config.clone();
        let result = gl
            .client
            .send(&ServerMessage::DoInit {
                nb_players,
                nb_turns_max: config.nb_turns_max,
            })
            .await;
        (nb_players, infos, config, result)
    };

    if let Err(err) = do_init_result {
        abort_game(&gl, &state, &onexit, &format!("Cannot send DO_INIT. {err}"))
            .await;
        drain(&mut channels, &mut incoming, &mut can_terminate).await;
        return;
    }

    // -- Wait for DO_INIT_ACK (3 seconds) ---------------------------------
    let outcome = tokio::select! {
        _ = can_terminate.wait_for(|t| *t) => InitAckOutcome::Terminate,
        msg = incoming.recv() => match msg {
            Some(Ok(value)) => match parse_do_init_ack(&value) {
                Ok(ack) => InitAckOutcome::Ack(Box::new(ack)),
                Err(err) => InitAckOutcome::Abort(format!(
                    "Invalid DO_INIT_ACK message. {err}"
                )),
            },
            Some(Err(err)) => InitAckOutcome::Abort(format!(
                "Cannot read DO_INIT_ACK. {err}"
            )),
            None => InitAckOutcome::Abort(
                "Cannot read DO_INIT_ACK. Connection closed".to_string(),
            ),
        },
        _ = tokio::time::sleep(DO_INIT_ACK_TIMEOUT) => {
            InitAckOutcome::Abort(EngineError::DoInitAckTimeout.to_string())
        }
    };
    let init_ack = match outcome {
        InitAckOutcome::Terminate => return,
        InitAckOutcome::Abort(reason) => {
            abort_game(&gl, &state, &onexit, &reason).await;
            drain(&mut channels, &mut incoming, &mut can_terminate).await;
            return;
        }
        InitAckOutcome::Ack(ack) => ack,
    };

    // -- Fan GAME_STARTS out ----------------------------------------------
    {
        let guard = state.lock().await;
        for player in &guard.players {
            let _ = player.events.send(ServerMessage::GameStarts {
                player_id: player.player_id(),
                players_info: Vec::new(),
                nb_players: initial_nb_players,
                nb_turns_max: config.nb_turns_max,
                delay_first_turn: config.ms_before_first_turn,
                delay_turns: config.ms_between_turns,
                initial_game_state: init_ack.initial_game_state.clone(),
            });
        }
        for visu in &guard.visus {
            let _ = visu.events.send(ServerMessage::GameStarts {
                player_id: -1,
                players_info: players_info.clone(),
                nb_players: initial_nb_players,
                nb_turns_max: config.nb_turns_max,
                delay_first_turn: config.ms_before_first_turn,
                delay_turns: config.ms_between_turns,
                initial_game_state: init_ack.initial_game_state.clone(),
            });
        }
    }

    if !config.fast {
        tracing::debug!(
            duration_ms = config.ms_before_first_turn,
            "Sleeping before first turn"
        );
        tokio::time::sleep(Duration::from_secs_f64(
            config.ms_before_first_turn / 1000.0,
        ))
        .await;
    }

    // -- Turn loop ---------------------------------------------------------
    let mut turn_number: u32 = 0;
    let mut player_actions: Vec<PlayerAction> = Vec::new();
    // Single-slot trigger: a queued signal already means "a DO_TURN is
    // due", so try_send failures are intentional no-ops.
    let (do_turn_tx, mut do_turn_rx) = mpsc::channel::<()>(1);

    send_do_turn(&gl, &player_actions).await;

    loop {
        let event = tokio::select! {
            _ = can_terminate.wait_for(|t| *t) => TurnLoopEvent::Terminate,
            Some(()) = do_turn_rx.recv() => TurnLoopEvent::SendDoTurn,
            Some(action) = channels.player_action.recv() => {
                TurnLoopEvent::Action(action)
            }
            Some(player_id) = channels.player_disconnected.recv() => {
                TurnLoopEvent::Disconnected(player_id)
            }
            msg = incoming.recv() => TurnLoopEvent::Message(msg),
        };

        match event {
            TurnLoopEvent::Terminate => return,

            TurnLoopEvent::SendDoTurn => {
                send_do_turn(&gl, &player_actions).await;
                player_actions.clear();
            }

            TurnLoopEvent::Action(action) => {
                merge_action(&mut player_actions, action);
                if config.fast
                    && all_players_acked(&state, &player_actions).await
                {
                    let _ = do_turn_tx.try_send(());
                }
            }

            TurnLoopEvent::Disconnected(player_id) => {
                if let Some(info) = players_info
                    .iter_mut()
                    .find(|info| info.player_id == player_id)
                {
                    info.is_connected = false;
                }
                if config.fast
                    && all_players_acked(&state, &player_actions).await
                {
                    let _ = do_turn_tx.try_send(());
                }
            }

            TurnLoopEvent::Message(msg) => {
                let value = match msg {
                    Some(Ok(value)) => value,
                    Some(Err(err)) => {
                        abort_game(
                            &gl,
                            &state,
                            &onexit,
                            &format!("Cannot read DO_TURN_ACK. {err}"),
                        )
                        .await;
                        drain(&mut channels, &mut incoming, &mut can_terminate)
                            .await;
                        return;
                    }
                    None => {
                        abort_game(
                            &gl,
                            &state,
                            &onexit,
                            "Cannot read DO_TURN_ACK. Connection closed",
                        )
                        .await;
                        drain(&mut channels, &mut incoming, &mut can_terminate)
                            .await;
                        return;
                    }
                };

                let ack = match parse_do_turn_ack(&value, initial_nb_players) {
                    Ok(ack) => ack,
                    Err(err) => {
                        abort_game(
                            &gl,
                            &state,
                            &onexit,
                            &format!("Invalid DO_TURN_ACK message. {err}"),
                        )
                        .await;
                        drain(&mut channels, &mut incoming, &mut can_terminate)
                            .await;
                        return;
                    }
                };

                turn_number += 1;
                if turn_number < config.nb_turns_max {
                    {
                        let guard = state.lock().await;
                        for player in &guard.players {
                            let _ = player.events.send(ServerMessage::Turn {
                                turn_number: turn_number - 1,
                                game_state: ack.game_state.clone(),
                                players_info: Vec::new(),
                            });
                        }
                        for visu in &guard.visus {
                            let _ = visu.events.send(ServerMessage::Turn {
                                turn_number: turn_number - 1,
                                game_state: ack.game_state.clone(),
                                players_info: players_info.clone(),
                            });
                        }
                        // No player to wait for: keep the game ticking.
                        if config.fast && player_actions.is_empty() {
                            let _ = do_turn_tx.try_send(());
                        }
                    }

                    if !config.fast {
                        let tx = do_turn_tx.clone();
                        let delay_ms = config.ms_between_turns;
                        tokio::spawn(async move {
                            tracing::debug!(
                                duration_ms = delay_ms,
                                "Sleeping before next turn"
                            );
                            tokio::time::sleep(Duration::from_secs_f64(
                                delay_ms / 1000.0,
                            ))
                            .await;
                            let _ = tx.send(()).await;
                        });
                    }
                } else {
                    log_game_finished(&players_info, ack.winner_player_id);

                    {
                        let mut guard = state.lock().await;
                        guard.phase = GamePhase::Finished;
                        for player in &guard.players {
                            let _ =
                                player.events.send(ServerMessage::GameEnds {
                                    winner_player_id: ack.winner_player_id,
                                    game_state: ack.game_state.clone(),
                                });
                        }
                        for visu in &guard.visus {
                            let _ =
                                visu.events.send(ServerMessage::GameEnds {
                                    winner_player_id: ack.winner_player_id,
                                    game_state: ack.game_state.clone(),
                                });
                        }
                    }

                    gl.client.kick("Game is finished").await;
                    let _ = onexit.send(0);
                    drain(&mut channels, &mut incoming, &mut can_terminate)
                        .await;
                    return;
                }
            }
        }
    }
}

/// Fatal game logic error: the game (if any) is over, the game logic is
/// kicked, and the process is asked to exit with code 1.
async fn abort_game(
    gl: &Arc<GameLogicClient>,
    state: &SharedState,
    onexit: &mpsc::UnboundedSender<i32>,
    reason: &str,
) {
    state.lock().await.phase = GamePhase::Finished;
    gl.client.kick(reason).await;
    let _ = onexit.send(1);
}

/// Consumes leftover input until shutdown is coordinated.
///
/// Player handlers and the reader task may still hold senders to the
/// coordinator; returning before `can_terminate` would strand them.
async fn drain(
    channels: &mut GameLogicChannels,
    incoming: &mut IncomingRx,
    can_terminate: &mut watch::Receiver<bool>,
) {
    loop {
        let keep_going = tokio::select! {
            _ = can_terminate.wait_for(|t| *t) => false,
            Some(_) = channels.player_action.recv() => true,
            Some(_) = channels.player_disconnected.recv() => true,
            Some(_) = incoming.recv() => true,
            else => false,
        };
        if !keep_going {
            return;
        }
    }
}

/// Sends DO_TURN with the actions collected since the previous one.
async fn send_do_turn(gl: &Arc<GameLogicClient>, player_actions: &[PlayerAction]) {
    tracing::debug!(
        nickname = %gl.client.nickname(),
        remote_address = %gl.client.remote_addr(),
        nb_actions = player_actions.len(),
        "Sending DO_TURN to game logic"
    );
    let msg = ServerMessage::DoTurn {
        player_actions: player_actions.to_vec(),
    };
    if let Err(err) = gl.client.send(&msg).await {
        // The read side will fail right after and handle the fallout.
        tracing::debug!(error = %err, "Could not send DO_TURN");
    }
}

/// Merges a newly arrived action into the per-turn collection.
///
/// One entry per player: a resubmission replaces the stale entry and
/// moves it to the back, so the latest action wins while the order among
/// distinct players stays chronological.
fn merge_action(actions: &mut Vec<PlayerAction>, action: PlayerAction) {
    if let Some(index) = actions
        .iter()
        .position(|a| a.player_id == action.player_id)
    {
        let last = actions.len() - 1;
        actions.swap(index, last);
        actions[last] = action;
    } else {
        actions.push(action);
    }
}

/// Fast-mode completion condition: one collected action per connected
/// player. Checked under the global lock.
async fn all_players_acked(
    state: &SharedState,
    player_actions: &[PlayerAction],
) -> bool {
    let guard = state.lock().await;
    player_actions.len() == guard.players.len()
}

fn log_game_finished(players_info: &[PlayerInfo], winner_player_id: i64) {
    match players_info
        .iter()
        .find(|info| info.player_id == winner_player_id)
    {
        Some(winner) => tracing::info!(
            winner_player_id,
            winner_nickname = %winner.nickname,
            winner_remote_address = %winner.remote_address,
            "Game is finished"
        ),
        None => tracing::info!("Game is finished (no winner)"),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn action(player_id: i64, payload: i64) -> PlayerAction {
        PlayerAction {
            player_id,
            turn_number: 0,
            actions: json!([payload]),
        }
    }

    #[test]
    fn test_merge_action_appends_distinct_players() {
        let mut actions = Vec::new();
        merge_action(&mut actions, action(0, 10));
        merge_action(&mut actions, action(1, 11));
        merge_action(&mut actions, action(2, 12));

        let ids: Vec<i64> = actions.iter().map(|a| a.player_id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_merge_action_latest_wins_for_resubmission() {
        let mut actions = Vec::new();
        merge_action(&mut actions, action(0, 10));
        merge_action(&mut actions, action(1, 11));
        merge_action(&mut actions, action(0, 99));

        assert_eq!(actions.len(), 2);
        let p0 = actions.iter().find(|a| a.player_id == 0).unwrap();
        assert_eq!(p0.actions, json!([99]));
        // The resubmitting player moves to the back.
        assert_eq!(actions.last().unwrap().player_id, 0);
    }

    #[test]
    fn test_merge_action_resubmission_keeps_one_entry_per_player() {
        let mut actions = Vec::new();
        for payload in 0..5 {
            merge_action(&mut actions, action(7, payload));
        }
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].actions, json!([4]));
    }
}
