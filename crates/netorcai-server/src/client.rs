//! Per-connection client objects.
//!
//! Each accepted socket is split in two: a reader task frames incoming
//! messages into an unbounded queue, and the owning handler task performs
//! all writes. The [`Client`] itself is shared (`Arc`) so the cleanup path
//! can kick and close connections it does not own.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex as StdMutex;
use std::sync::Arc;
use std::time::Duration;

use netorcai_protocol::{
    read_frame, write_message, PlayerAction, ProtocolError, ServerMessage,
};
use serde_json::Value;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};

use crate::state::ClientState;

/// Receiving end of a client's incoming-message queue. A terminal `Err`
/// item is enqueued when the reader hits a framing or socket error.
pub(crate) type IncomingRx =
    mpsc::UnboundedReceiver<Result<Value, ProtocolError>>;

/// How long a kicked client gets to read its KICK before the socket may
/// be closed.
const KICK_GRACE: Duration = Duration::from_millis(500);

/// One TCP connection: write path, nickname and connection state.
pub struct Client {
    remote_addr: SocketAddr,
    nickname: StdMutex<String>,
    state: StdMutex<ClientState>,
    writer: Mutex<OwnedWriteHalf>,
}

impl Client {
    /// Takes ownership of an accepted stream, spawns its reader task and
    /// returns the shared client plus the incoming-message queue.
    pub(crate) fn accept(
        stream: TcpStream,
        remote_addr: SocketAddr,
    ) -> (Arc<Self>, IncomingRx) {
        let (read_half, write_half) = stream.into_split();
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(read_client_messages(read_half, tx));

        let client = Arc::new(Self {
            remote_addr,
            nickname: StdMutex::new(String::from("unknown")),
            state: StdMutex::new(ClientState::Unlogged),
            writer: Mutex::new(write_half),
        });
        (client, rx)
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn nickname(&self) -> String {
        self.nickname.lock().unwrap().clone()
    }

    pub(crate) fn set_nickname(&self, nickname: &str) {
        *self.nickname.lock().unwrap() = nickname.to_string();
    }

    pub fn state(&self) -> ClientState {
        *self.state.lock().unwrap()
    }

    pub(crate) fn set_state(&self, state: ClientState) {
        *self.state.lock().unwrap() = state;
    }

    /// Serializes and writes one message. Only the owning handler and the
    /// kick path call this; the writer mutex keeps frames whole.
    pub(crate) async fn send(
        &self,
        msg: &ServerMessage,
    ) -> Result<(), ProtocolError> {
        let mut writer = self.writer.lock().await;
        write_message(&mut *writer, msg).await
    }

    /// Kicks the client: terminal state, best-effort KICK message, then a
    /// grace delay so the peer can read it before the socket goes away.
    ///
    /// Idempotent — the first caller wins, later calls return at once.
    pub(crate) async fn kick(&self, reason: &str) {
        {
            let mut state = self.state.lock().unwrap();
            if *state == ClientState::Kicked {
                return;
            }
            *state = ClientState::Kicked;
        }

        tracing::warn!(
            nickname = %self.nickname(),
            remote_address = %self.remote_addr,
            reason,
            "Kicking client"
        );

        let msg = ServerMessage::Kick {
            kick_reason: reason.to_string(),
        };
        let _ = self.send(&msg).await;
        tokio::time::sleep(KICK_GRACE).await;
    }

    /// Shuts the write half down. Used by cleanup only.
    pub(crate) async fn close(&self) {
        use tokio::io::AsyncWriteExt;
        let _ = self.writer.lock().await.shutdown().await;
    }
}

/// Reader task: frames messages from the socket into the queue until the
/// first error, which is forwarded as a terminal item.
async fn read_client_messages(
    mut reader: OwnedReadHalf,
    tx: mpsc::UnboundedSender<Result<Value, ProtocolError>>,
) {
    loop {
        match read_frame(&mut reader).await {
            Ok(value) => {
                if tx.send(Ok(value)).is_err() {
                    return;
                }
            }
            Err(err) => {
                let _ = tx.send(Err(err));
                return;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Role-specific clients
// ---------------------------------------------------------------------------

/// A player or visualization connection.
///
/// The turn coordinator talks to the handler through `events`, a FIFO
/// queue carrying ready-to-send GAME_STARTS / TURN / GAME_ENDS messages.
/// Sends never block, so the coordinator can fan out while holding the
/// global lock.
pub struct PlayerOrVisuClient {
    pub client: Arc<Client>,
    pub is_player: bool,
    /// Assigned by the coordinator at game start; `-1` before that and
    /// for visualizations forever.
    player_id: AtomicI64,
    pub(crate) events: mpsc::UnboundedSender<ServerMessage>,
}

impl PlayerOrVisuClient {
    pub(crate) fn new(
        client: Arc<Client>,
        is_player: bool,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<ServerMessage>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let pv = Arc::new(Self {
            client,
            is_player,
            player_id: AtomicI64::new(-1),
            events,
        });
        (pv, events_rx)
    }

    pub fn player_id(&self) -> i64 {
        self.player_id.load(Ordering::Relaxed)
    }

    pub(crate) fn set_player_id(&self, id: i64) {
        self.player_id.store(id, Ordering::Relaxed);
    }
}

/// The (single) game logic connection.
///
/// Holds the sending ends of the coordinator's input channels; the
/// receiving ends live in [`GameLogicChannels`], owned by the coordinator
/// task. Keeping the senders here means they stay open for the whole
/// drain phase.
pub struct GameLogicClient {
    pub client: Arc<Client>,
    /// Fed by player handlers when a TURN_ACK arrives.
    pub(crate) player_action: mpsc::UnboundedSender<PlayerAction>,
    /// Fed with the player's id when a player drops mid-game.
    pub(crate) player_disconnected: mpsc::UnboundedSender<i64>,
    /// Fed by the external control collaborator to begin the game.
    pub(crate) start: mpsc::UnboundedSender<()>,
}

/// Receiving ends of the coordinator's input channels.
pub(crate) struct GameLogicChannels {
    pub player_action: mpsc::UnboundedReceiver<PlayerAction>,
    pub player_disconnected: mpsc::UnboundedReceiver<i64>,
    pub start: mpsc::UnboundedReceiver<()>,
}

impl GameLogicClient {
    pub(crate) fn new(client: Arc<Client>) -> (Arc<Self>, GameLogicChannels) {
        let (player_action, player_action_rx) = mpsc::unbounded_channel();
        let (player_disconnected, player_disconnected_rx) =
            mpsc::unbounded_channel();
        let (start, start_rx) = mpsc::unbounded_channel();

        let gl = Arc::new(Self {
            client,
            player_action,
            player_disconnected,
            start,
        });
        let channels = GameLogicChannels {
            player_action: player_action_rx,
            player_disconnected: player_disconnected_rx,
            start: start_rx,
        };
        (gl, channels)
    }
}
