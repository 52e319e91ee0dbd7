//! Engine entry point: TCP listener, accept loop, control surface and
//! cleanup.
//!
//! ```rust,ignore
//! let engine = Engine::bind(ServerConfig::default()).await?;
//! let control = engine.control();
//! let exit_code = engine.run().await;
//! ```
//!
//! `Control` is the external control collaborator's surface: `start_game`
//! begins the game if a game logic is registered, `quit`/`abort` stop the
//! process cleanly (exit 0) or not (exit 1).

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::future::join_all;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};

use crate::client::Client;
use crate::handler::handle_client;
use crate::state::{GlobalState, ServerConfig, SharedState};
use crate::EngineError;

/// A bound, not-yet-running orchestrator.
pub struct Engine {
    listener: TcpListener,
    state: SharedState,
    can_terminate: watch::Sender<bool>,
    onexit_tx: mpsc::UnboundedSender<i32>,
    onexit_rx: mpsc::UnboundedReceiver<i32>,
    quit_tx: mpsc::UnboundedSender<i32>,
    quit_rx: mpsc::UnboundedReceiver<i32>,
}

impl Engine {
    /// Binds the listening socket and builds the shared state.
    pub async fn bind(config: ServerConfig) -> std::io::Result<Self> {
        let listener =
            TcpListener::bind(("0.0.0.0", config.port)).await?;
        let (can_terminate, _) = watch::channel(false);
        let (onexit_tx, onexit_rx) = mpsc::unbounded_channel();
        let (quit_tx, quit_rx) = mpsc::unbounded_channel();

        Ok(Self {
            listener,
            state: GlobalState::new(config),
            can_terminate,
            onexit_tx,
            onexit_rx,
            quit_tx,
            quit_rx,
        })
    }

    /// The address the engine is listening on.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// A cloneable handle for the external control collaborator.
    pub fn control(&self) -> Control {
        Control {
            state: self.state.clone(),
            quit_tx: self.quit_tx.clone(),
        }
    }

    /// Runs the accept loop until the game completes or a quit/abort
    /// order arrives, then cleans up. Returns the process exit code.
    pub async fn run(mut self) -> i32 {
        match self.local_addr() {
            Ok(addr) => {
                tracing::info!(address = %addr, "Listening incoming connections")
            }
            Err(_) => tracing::info!("Listening incoming connections"),
        }

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, remote_addr)) => {
                        tokio::spawn(handle_client(
                            stream,
                            remote_addr,
                            self.state.clone(),
                            self.onexit_tx.clone(),
                            self.can_terminate.subscribe(),
                        ));
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "Accept failed");
                    }
                },
                Some(code) = self.onexit_rx.recv() => {
                    cleanup(&self.state, &self.can_terminate).await;
                    return code;
                }
                Some(code) = self.quit_rx.recv() => {
                    cleanup(&self.state, &self.can_terminate).await;
                    return code;
                }
            }
        }
    }
}

/// External control surface: start and quit orders.
#[derive(Clone)]
pub struct Control {
    state: SharedState,
    quit_tx: mpsc::UnboundedSender<i32>,
}

impl Control {
    /// Begins the game if a game logic is registered; no-op otherwise.
    pub async fn start_game(&self) -> bool {
        let guard = self.state.lock().await;
        match guard.game_logic.first() {
            Some(gl) => {
                let _ = gl.start.send(());
                true
            }
            None => {
                tracing::warn!(
                    "Cannot start the game: no game logic connected"
                );
                false
            }
        }
    }

    /// Stops the orchestrator cleanly (exit code 0).
    pub fn quit(&self) {
        let _ = self.quit_tx.send(0);
    }

    /// Stops the orchestrator after a failure (exit code 1).
    pub fn abort(&self) {
        let _ = self.quit_tx.send(1);
    }
}

/// Kicks every registered client in parallel, closes their sockets, then
/// releases the handlers parked on `can_terminate`.
async fn cleanup(state: &SharedState, can_terminate: &watch::Sender<bool>) {
    let guard = state.lock().await;
    tracing::warn!("Closing listening socket");

    let mut clients: Vec<Arc<Client>> = guard
        .players
        .iter()
        .chain(&guard.visus)
        .map(|pv| pv.client.clone())
        .collect();
    clients.extend(guard.game_logic.iter().map(|gl| gl.client.clone()));

    if !clients.is_empty() {
        tracing::warn!(count = clients.len(), "Sending KICK messages to clients");
        let reason = EngineError::Terminated.to_string();
        join_all(clients.iter().map(|c| c.kick(&reason))).await;

        tracing::warn!("Closing client sockets");
        for client in &clients {
            client.close().await;
        }
    }
    drop(guard);

    let _ = can_terminate.send(true);
}
