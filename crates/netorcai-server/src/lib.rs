//! # netorcai-server
//!
//! Connection lifecycle and turn-sequencing engine of netorcai, a
//! game-agnostic turn-based game orchestrator.
//!
//! One process accepts TCP connections from three kinds of clients — one
//! game logic, players and visualizations — and mediates their JSON
//! message exchange: it sequences turns, collects player actions,
//! forwards them to the game logic and distributes the resulting game
//! states. Game states themselves are opaque blobs; the engine never
//! interprets them.
//!
//! The crate exposes a small lifecycle surface: [`Engine::bind`] builds
//! the orchestrator, [`Engine::control`] hands out the external control
//! collaborator's handle, and [`Engine::run`] drives everything until
//! the game completes or a quit order arrives.

mod client;
mod coordinator;
mod error;
mod handler;
mod player;
mod server;
mod state;

pub use client::{Client, GameLogicClient, PlayerOrVisuClient};
pub use error::EngineError;
pub use server::{Control, Engine};
pub use state::{
    ClientState, GamePhase, GlobalState, ServerConfig, SharedState,
};
