//! Data model shared by the state store, the scheduler and the wire protocol.
//!
//! Field names follow the viewer protocol: `camelCase` keys, upper-case phase and
//! interaction type tags.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::agent::{Agent, AgentId};

/// Game phases, in cycle order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Lobby,
    Active,
    Results,
}

impl Phase {
    /// The phase entered when this one runs out, `None` for the terminal phase.
    pub fn next(self) -> Option<Phase> {
        match self {
            Phase::Lobby => Some(Phase::Active),
            Phase::Active => Some(Phase::Results),
            Phase::Results => None,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Lobby => "LOBBY",
            Phase::Active => "ACTIVE",
            Phase::Results => "RESULTS",
        };
        f.write_str(name)
    }
}

/// Kind of exchange between two agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InteractionType {
    Chat,
    Trade,
    Alliance,
    Challenge,
}

impl InteractionType {
    pub const ALL: [InteractionType; 4] = [
        InteractionType::Chat,
        InteractionType::Trade,
        InteractionType::Alliance,
        InteractionType::Challenge,
    ];
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub sender_id: AgentId,
    pub text: String,
}

impl Message {
    pub fn new(sender_id: impl Into<AgentId>, text: impl Into<String>) -> Message {
        Message {
            sender_id: sender_id.into(),
            text: text.into(),
        }
    }
}

/// A completed exchange between two agents. Immutable once admitted to the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interaction {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: InteractionType,
    pub agent1_id: AgentId,
    pub agent2_id: AgentId,
    /// Unix milliseconds.
    pub timestamp: u64,
    pub messages: Vec<Message>,
}

impl Interaction {
    /// Build an interaction with a fresh id and the current time.
    pub fn new(
        kind: InteractionType,
        agent1_id: AgentId,
        agent2_id: AgentId,
        messages: Vec<Message>,
    ) -> Interaction {
        Interaction {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            agent1_id,
            agent2_id,
            timestamp: unix_millis(),
            messages,
        }
    }

    pub fn involves(&self, agent: &AgentId) -> bool {
        self.agent1_id == *agent || self.agent2_id == *agent
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub phase: Phase,
    pub time_left: u64,
    pub active_interactions: Vec<Interaction>,
}

/// A complete, point-in-time copy of the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub version: u64,
    pub agents: Vec<Agent>,
    pub game_state: GameState,
}

pub(crate) fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
