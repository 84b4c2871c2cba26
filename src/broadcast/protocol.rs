//! Viewer wire protocol.
//!
//! Every frame is a JSON text message:
//!
//! ```json
//! { "type": "INIT" | "UPDATE", "version": 12,
//!   "payload": { "agents": [...], "gameState": { "phase": "ACTIVE", "timeLeft": 41,
//!                                                "activeInteractions": [...] } } }
//! ```
//!
//! INIT carries the whole state. UPDATE carries the current agents, phase and
//! countdown, plus the interactions the viewer has not received yet (or the whole log
//! when the arena runs with full-log updates). Versions only increase on a given
//! connection.

use serde::{Deserialize, Serialize};

use crate::agent::Agent;
use crate::error::MirrorError;
use crate::game_state::{GameState, Snapshot};
use crate::state_store::Delta;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FrameKind {
    Init,
    Update,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payload {
    pub agents: Vec<Agent>,
    pub game_state: GameState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    #[serde(rename = "type")]
    pub kind: FrameKind,
    pub version: u64,
    pub payload: Payload,
}

impl Frame {
    pub fn init(snapshot: Snapshot) -> Frame {
        Frame {
            kind: FrameKind::Init,
            version: snapshot.version,
            payload: Payload {
                agents: snapshot.agents,
                game_state: snapshot.game_state,
            },
        }
    }

    pub fn update(delta: &Delta) -> Frame {
        Frame {
            kind: FrameKind::Update,
            version: delta.version,
            payload: Payload {
                agents: delta.agents.clone(),
                game_state: delta.game_state(),
            },
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Local state rebuilt from the frames of one connection.
///
/// INIT replaces everything. UPDATE replaces agents, phase and countdown, and merges
/// interactions by id: unknown ids are appended, known ones may only grow their
/// message list.
#[derive(Debug, Clone, Default)]
pub struct ViewerMirror {
    version: Option<u64>,
    agents: Vec<Agent>,
    game_state: Option<GameState>,
}

impl ViewerMirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, frame: Frame) -> Result<(), MirrorError> {
        match frame.kind {
            FrameKind::Init => {
                self.version = Some(frame.version);
                self.agents = frame.payload.agents;
                self.game_state = Some(frame.payload.game_state);
                Ok(())
            }
            FrameKind::Update => {
                let (Some(current), Some(state)) = (self.version, self.game_state.as_mut()) else {
                    return Err(MirrorError::NotInitialized);
                };
                if frame.version <= current {
                    return Err(MirrorError::OutOfOrder {
                        current,
                        received: frame.version,
                    });
                }
                let incoming = frame.payload.game_state;
                for interaction in &incoming.active_interactions {
                    let known = state
                        .active_interactions
                        .iter()
                        .find(|i| i.id == interaction.id);
                    if let Some(known) = known {
                        if !interaction.messages.starts_with(&known.messages) {
                            return Err(MirrorError::NonMonotonic(interaction.id.clone()));
                        }
                    }
                }
                for interaction in incoming.active_interactions {
                    match state
                        .active_interactions
                        .iter_mut()
                        .find(|i| i.id == interaction.id)
                    {
                        Some(known) => *known = interaction,
                        None => state.active_interactions.push(interaction),
                    }
                }
                state.phase = incoming.phase;
                state.time_left = incoming.time_left;
                self.agents = frame.payload.agents;
                self.version = Some(frame.version);
                Ok(())
            }
        }
    }

    /// Version of the last applied frame.
    pub fn version(&self) -> Option<u64> {
        self.version
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn game_state(&self) -> Option<&GameState> {
        self.game_state.as_ref()
    }

    /// True when the mirror holds exactly `snapshot`.
    pub fn matches(&self, snapshot: &Snapshot) -> bool {
        self.version == Some(snapshot.version)
            && self.agents == snapshot.agents
            && self.game_state.as_ref() == Some(&snapshot.game_state)
    }
}
