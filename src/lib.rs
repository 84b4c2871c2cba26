//! # Tournament Arena
//!
//! A real-time arena where autonomous agents are paired up, interact with each other,
//! and every interaction is streamed to live viewers over websockets.
//!
//! It provides:
//! - A phase clock cycling each run through LOBBY, ACTIVE and RESULTS
//! - An interaction scheduler pairing agents during ACTIVE and feeding an
//!   [`InteractionGenerator`](crate::interaction_generator::InteractionGenerator)
//! - A versioned, mutation-serialized [`StateStore`](crate::state_store::StateStore)
//! - A broadcast hub sending each viewer an INIT snapshot, then incremental UPDATEs
//!
//! Viewers are isolated from each other: a slow or dead connection only falls behind
//! (and is later resynchronised with a fresh INIT), it never delays the others.
//!
//! # Documentation Overview
//!
//! - For wiring and lifecycle (start, serve, restart, shutdown), see the [`server`] module.
//! - For tuning phase lengths, concurrency and viewer backlog, see
//!   [`Configuration`](crate::configuration::Configuration).
//! - For the wire format seen by viewers, see [`broadcast::protocol`].
//! - To plug in your own dialogue source, implement
//!   [`InteractionGenerator`](crate::interaction_generator::InteractionGenerator).
//!
//! # Usage Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tournament_arena::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let roster = RosterFile::new("agents.json");
//!     let config = Configuration::new().with_address("127.0.0.1", 8080);
//!     let arena = Arena::new(&roster, Arc::new(TemplateGenerator::new()), config)?;
//!
//!     arena.start()?;
//!     arena.serve().await?;
//!     arena.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! A viewer connecting to `/ws` then receives:
//!
//! ```json
//! {"type":"INIT","version":4,"payload":{"agents":[...],"gameState":{"phase":"ACTIVE","timeLeft":297,"activeInteractions":[]}}}
//! {"type":"UPDATE","version":5,"payload":{"agents":[...],"gameState":{"phase":"ACTIVE","timeLeft":296,"activeInteractions":[]}}}
//! ```
pub use anyhow;

pub mod agent;
pub mod agent_collector;
pub mod broadcast;
pub mod configuration;
pub mod error;
pub mod game_state;
pub mod interaction_generator;
mod logger;
pub mod phase_clock;
pub mod routes;
pub mod server;
pub mod state_store;
pub mod tournament_scheduler;
pub mod tournament_strategy;

pub use logger::init_logger;

/// Commonly used types and traits for quick access.
///
/// Import this prelude to get started easily:
/// ```rust
/// use tournament_arena::prelude::*;
/// ```
pub mod prelude {
    pub use crate::agent::{Agent, AgentId, AgentStatus};
    pub use crate::agent_collector::{AgentDirectory, RosterFile, StaticDirectory};
    pub use crate::broadcast::protocol::{Frame, FrameKind, ViewerMirror};
    pub use crate::configuration::Configuration;
    pub use crate::game_state::{Interaction, InteractionType, Message, Phase};
    pub use crate::interaction_generator::{InteractionGenerator, TemplateGenerator};
    pub use crate::server::Arena;
}
