//! Global engine state and configuration.
//!
//! One `GlobalState` instance exists per process, shared by every
//! connection handler behind a single mutex. The login rules depend on an
//! atomic view of `(phase, |players|, |visus|, |game_logic|)`, so the
//! registries are deliberately NOT sharded into finer-grained locks.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::client::{GameLogicClient, PlayerOrVisuClient};

/// Immutable engine configuration, validated by the CLI layer.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP port to listen on. `0` binds an ephemeral port (tests).
    pub port: u16,
    /// Maximum number of players accepted (`0..=1024`).
    pub nb_players_max: u32,
    /// Maximum number of special players (`0..=1024`). Validated and
    /// carried, but has no effect on the engine.
    pub nb_special_players_max: u32,
    /// Maximum number of visualizations accepted (`0..=1024`).
    pub nb_visus_max: u32,
    /// Number of turns to play (`1..=65535`).
    pub nb_turns_max: u32,
    /// Delay before the first turn, in milliseconds (`50..=10000`).
    pub ms_before_first_turn: f64,
    /// Delay between two turns, in milliseconds (`50..=10000`).
    pub ms_between_turns: f64,
    /// Fast mode: skip the delays and advance a turn as soon as all
    /// players have sent their TURN_ACK.
    pub fast: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 4242,
            nb_players_max: 4,
            nb_special_players_max: 0,
            nb_visus_max: 1,
            nb_turns_max: 100,
            ms_before_first_turn: 1000.0,
            ms_between_turns: 1000.0,
            fast: false,
        }
    }
}

/// The lifecycle phase of the (single) game.
///
/// Transitions are one-way: `NotRunning → Running → Finished`. `Running`
/// is entered by the turn coordinator when the game starts; `Finished`
/// on the final DO_TURN_ACK or on a fatal game logic error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GamePhase {
    NotRunning,
    Running,
    Finished,
}

/// The state of a single connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Accepted, LOGIN not yet processed.
    Unlogged,
    /// LOGIN_ACK sent, game not started.
    Logged,
    /// In game, waiting for the next event.
    Ready,
    /// In game, a TURN was forwarded and no TURN_ACK came back yet.
    Thinking,
    /// Terminal.
    Kicked,
}

/// The registry shared by every connection, guarded by one mutex.
pub struct GlobalState {
    pub phase: GamePhase,
    /// At most one game logic is ever registered.
    pub game_logic: Vec<Arc<GameLogicClient>>,
    pub players: Vec<Arc<PlayerOrVisuClient>>,
    pub visus: Vec<Arc<PlayerOrVisuClient>>,
    pub config: ServerConfig,
}

/// Handle to the engine-wide state.
pub type SharedState = Arc<Mutex<GlobalState>>;

impl GlobalState {
    pub fn new(config: ServerConfig) -> SharedState {
        Arc::new(Mutex::new(Self {
            phase: GamePhase::NotRunning,
            game_logic: Vec::new(),
            players: Vec::new(),
            visus: Vec::new(),
            config,
        }))
    }

    /// Removes a player or visualization from its registry.
    ///
    /// Must be called when a client disconnects mid-game so the fast-mode
    /// completion condition (`|actions| == |players|`) stays reachable.
    pub fn deregister(&mut self, target: &Arc<PlayerOrVisuClient>) {
        if target.is_player {
            self.players.retain(|p| !Arc::ptr_eq(p, target));
        } else {
            self.visus.retain(|v| !Arc::ptr_eq(v, target));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::client::Client;

    /// Builds a real accepted client over a loopback socket pair. The
    /// peer half is returned so the connection stays open for the test.
    async fn accepted_client() -> (Arc<Client>, tokio::net::TcpStream) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        let peer = tokio::net::TcpStream::connect(addr).await.unwrap();
        let (stream, remote_addr) = listener.accept().await.unwrap();
        let (client, _incoming) = Client::accept(stream, remote_addr);
        (client, peer)
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 4242);
        assert_eq!(config.nb_players_max, 4);
        assert_eq!(config.nb_visus_max, 1);
        assert_eq!(config.nb_turns_max, 100);
        assert_eq!(config.ms_before_first_turn, 1000.0);
        assert_eq!(config.ms_between_turns, 1000.0);
        assert!(!config.fast);
    }

    #[test]
    fn test_new_state_is_not_running_and_empty() {
        let state = GlobalState::new(ServerConfig::default());
        let guard = state.try_lock().unwrap();
        assert_eq!(guard.phase, GamePhase::NotRunning);
        assert!(guard.game_logic.is_empty());
        assert!(guard.players.is_empty());
        assert!(guard.visus.is_empty());
    }

    #[tokio::test]
    async fn test_deregister_removes_only_the_target_player() {
        let state = GlobalState::new(ServerConfig::default());
        let (c1, _peer1) = accepted_client().await;
        let (c2, _peer2) = accepted_client().await;
        let (pv1, _rx1) = PlayerOrVisuClient::new(c1, true);
        let (pv2, _rx2) = PlayerOrVisuClient::new(c2, true);

        let mut guard = state.lock().await;
        guard.players.push(pv1.clone());
        guard.players.push(pv2.clone());

        guard.deregister(&pv1);
        assert_eq!(guard.players.len(), 1);
        assert!(Arc::ptr_eq(&guard.players[0], &pv2));

        // Deregistering an already removed client is a no-op.
        guard.deregister(&pv1);
        assert_eq!(guard.players.len(), 1);
    }

    #[tokio::test]
    async fn test_deregister_visu_leaves_players_alone() {
        let state = GlobalState::new(ServerConfig::default());
        let (c1, _peer1) = accepted_client().await;
        let (c2, _peer2) = accepted_client().await;
        let (player, _rx1) = PlayerOrVisuClient::new(c1, true);
        let (visu, _rx2) = PlayerOrVisuClient::new(c2, false);

        let mut guard = state.lock().await;
        guard.players.push(player.clone());
        guard.visus.push(visu.clone());

        guard.deregister(&visu);
        assert!(guard.visus.is_empty());
        assert_eq!(guard.players.len(), 1);
    }
}
