//! Typed errors for the arena's runtime paths.

use std::time::Duration;

use crate::agent::AgentId;

/// A mutation or query the state store refused. The store is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("version {requested} is older than the retained history (oldest diffable: {oldest})")]
    VersionTooOld { requested: u64, oldest: u64 },

    #[error("version {requested} is ahead of the store (current: {current})")]
    VersionUnknown { requested: u64, current: u64 },

    #[error("unknown agent '{0}'")]
    UnknownAgent(AgentId),

    #[error("agent '{0}' cannot interact with itself")]
    SelfInteraction(AgentId),

    #[error("message sender '{sender}' is not part of interaction '{interaction}'")]
    ForeignSender { interaction: String, sender: AgentId },

    #[error("interaction '{0}' is already in the log")]
    DuplicateInteraction(String),

    #[error("interactions can only be added during the ACTIVE phase")]
    PhaseClosed,

    #[error("run {run} is over (current run: {current})")]
    RunEnded { run: u64, current: u64 },

    #[error("time left must strictly decrease within a phase ({current} -> {requested})")]
    ClockNotDecreasing { current: u64, requested: u64 },
}

/// Why a pairing attempt was abandoned.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("generator did not answer within {0:?}")]
    Timeout(Duration),

    #[error("generator failed: {0:#}")]
    Failed(anyhow::Error),

    #[error("generator returned no messages")]
    Empty,

    #[error("generator panicked")]
    Panicked,
}

/// A frame a viewer cannot reconcile with its local mirror.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MirrorError {
    #[error("received an UPDATE before any INIT")]
    NotInitialized,

    #[error("frame version {received} does not follow {current}")]
    OutOfOrder { current: u64, received: u64 },

    #[error("interaction '{0}' lost or reordered messages")]
    NonMonotonic(String),
}
