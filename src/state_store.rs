//! The single authoritative copy of a tournament run.
//!
//! Every change goes through [`StateStore::apply_mutation`], which validates the
//! [`Mutation`] and applies it under the write lock, then bumps the version by exactly
//! one. Readers get either a full [`Snapshot`] or a [`Delta`] relative to a version
//! they already hold.
//!
//! The store keeps, for a bounded window of recent versions, the length of the
//! interaction log at that version. Because the log is append-only within a run, the
//! interactions added after version `v` are the tail of the log past that length. A
//! [`Mutation::Reset`] starts a new run and acts as a history barrier: deltas from
//! before it are no longer available and callers must fall back to a snapshot.
//!
//! Each reset also bumps the run number. Work started during one run can be appended
//! with [`StateStore::apply_mutation_in_run`], which refuses it once a new run began.

use std::collections::{HashSet, VecDeque};
use std::sync::RwLock;

use tokio::sync::watch;
use tracing::{error, trace};

use crate::agent::{Agent, AgentId, AgentStatus};
use crate::error::StoreError;
use crate::game_state::{GameState, Interaction, Phase, Snapshot};

/// A change to the tournament state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Append a completed interaction to the log. Only accepted during ACTIVE.
    AddInteraction(Interaction),
    /// Countdown update within the current phase.
    AdvanceClock { time_left: u64 },
    /// Enter `phase` with a fresh countdown.
    TransitionPhase { phase: Phase, time_left: u64 },
    SetAgentStatus {
        agent_id: AgentId,
        status: AgentStatus,
    },
    /// Start a new run: back to LOBBY, empty log, every agent active.
    Reset { time_left: u64 },
}

/// What changed between two versions, plus the current agents, phase and countdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delta {
    pub from: u64,
    pub version: u64,
    pub agents: Vec<Agent>,
    pub phase: Phase,
    pub time_left: u64,
    /// Interactions appended after `from`, or the whole log for full-log deltas.
    pub interactions: Vec<Interaction>,
}

impl Delta {
    pub fn is_empty(&self) -> bool {
        self.from == self.version
    }

    pub fn game_state(&self) -> GameState {
        GameState {
            phase: self.phase,
            time_left: self.time_left,
            active_interactions: self.interactions.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeltaScope {
    NewInteractions,
    FullLog,
}

#[derive(Debug)]
struct Inner {
    version: u64,
    run: u64,
    agents: Vec<Agent>,
    phase: Phase,
    time_left: u64,
    interactions: Vec<Interaction>,
    interaction_ids: HashSet<String>,
    /// Oldest version a delta can be computed from.
    floor: u64,
    /// `log_lengths[i]` is the interaction count at version `floor + i`.
    log_lengths: VecDeque<usize>,
    history_capacity: usize,
}

impl Inner {
    fn validate(&self, mutation: &Mutation) -> Result<(), StoreError> {
        match mutation {
            Mutation::AddInteraction(interaction) => {
                if self.phase != Phase::Active {
                    return Err(StoreError::PhaseClosed);
                }
                if interaction.agent1_id == interaction.agent2_id {
                    return Err(StoreError::SelfInteraction(interaction.agent1_id.clone()));
                }
                for id in [&interaction.agent1_id, &interaction.agent2_id] {
                    if !self.has_agent(id) {
                        return Err(StoreError::UnknownAgent(id.clone()));
                    }
                }
                if let Some(message) = interaction
                    .messages
                    .iter()
                    .find(|m| !interaction.involves(&m.sender_id))
                {
                    return Err(StoreError::ForeignSender {
                        interaction: interaction.id.clone(),
                        sender: message.sender_id.clone(),
                    });
                }
                if self.interaction_ids.contains(&interaction.id) {
                    return Err(StoreError::DuplicateInteraction(interaction.id.clone()));
                }
            }
            Mutation::AdvanceClock { time_left } => {
                if *time_left >= self.time_left {
                    return Err(StoreError::ClockNotDecreasing {
                        current: self.time_left,
                        requested: *time_left,
                    });
                }
            }
            Mutation::SetAgentStatus { agent_id, .. } => {
                if !self.has_agent(agent_id) {
                    return Err(StoreError::UnknownAgent(agent_id.clone()));
                }
            }
            Mutation::TransitionPhase { .. } | Mutation::Reset { .. } => {}
        }
        Ok(())
    }

    fn apply(&mut self, mutation: Mutation) {
        let mut barrier = false;
        match mutation {
            Mutation::AddInteraction(interaction) => {
                self.interaction_ids.insert(interaction.id.clone());
                self.interactions.push(interaction);
            }
            Mutation::AdvanceClock { time_left } => self.time_left = time_left,
            Mutation::TransitionPhase { phase, time_left } => {
                self.phase = phase;
                self.time_left = time_left;
            }
            Mutation::SetAgentStatus { agent_id, status } => {
                if let Some(agent) = self.agents.iter_mut().find(|a| a.id == agent_id) {
                    agent.status = status;
                }
            }
            Mutation::Reset { time_left } => {
                self.phase = Phase::Lobby;
                self.time_left = time_left;
                self.interactions.clear();
                self.interaction_ids.clear();
                for agent in &mut self.agents {
                    agent.status = AgentStatus::Active;
                }
                barrier = true;
            }
        }

        self.version += 1;
        if barrier {
            self.run += 1;
            self.floor = self.version;
            self.log_lengths.clear();
        }
        self.log_lengths.push_back(self.interactions.len());
        while self.log_lengths.len() > self.history_capacity + 1 {
            self.log_lengths.pop_front();
            self.floor += 1;
        }
    }

    fn has_agent(&self, id: &AgentId) -> bool {
        self.agents.iter().any(|a| a.id == *id)
    }

    fn game_state(&self) -> GameState {
        GameState {
            phase: self.phase,
            time_left: self.time_left,
            active_interactions: self.interactions.clone(),
        }
    }

    fn delta_since(&self, version: u64, scope: DeltaScope) -> Result<Delta, StoreError> {
        if version > self.version {
            return Err(StoreError::VersionUnknown {
                requested: version,
                current: self.version,
            });
        }
        if version < self.floor {
            return Err(StoreError::VersionTooOld {
                requested: version,
                oldest: self.floor,
            });
        }
        let interactions = match scope {
            DeltaScope::FullLog => self.interactions.clone(),
            DeltaScope::NewInteractions => {
                let seen = self.log_lengths[(version - self.floor) as usize];
                self.interactions[seen..].to_vec()
            }
        };
        Ok(Delta {
            from: version,
            version: self.version,
            agents: self.agents.clone(),
            phase: self.phase,
            time_left: self.time_left,
            interactions,
        })
    }
}

/// Mutation-serialized, versioned tournament state.
///
/// Cheap to share behind an `Arc`. Readers never observe a partially applied
/// mutation, and versions are strictly increasing without gaps.
#[derive(Debug)]
pub struct StateStore {
    inner: RwLock<Inner>,
    versions: watch::Sender<u64>,
}

impl StateStore {
    /// Create the store for a new run, in LOBBY with `time_left` seconds to go.
    ///
    /// `history_capacity` is how many past versions stay diffable.
    pub fn new(agents: Vec<Agent>, time_left: u64, history_capacity: usize) -> StateStore {
        let (versions, _) = watch::channel(0);
        StateStore {
            inner: RwLock::new(Inner {
                version: 0,
                run: 0,
                agents,
                phase: Phase::Lobby,
                time_left,
                interactions: vec![],
                interaction_ids: HashSet::new(),
                floor: 0,
                log_lengths: VecDeque::from([0]),
                history_capacity: history_capacity.max(1),
            }),
            versions,
        }
    }

    /// Validate and apply `mutation` under exclusive access.
    ///
    /// Returns the new version. A rejected mutation leaves the store untouched.
    pub fn apply_mutation(&self, mutation: Mutation) -> Result<u64, StoreError> {
        self.apply(None, mutation)
    }

    /// Like [`StateStore::apply_mutation`], but only while `run` is still the current run.
    pub fn apply_mutation_in_run(&self, run: u64, mutation: Mutation) -> Result<u64, StoreError> {
        self.apply(Some(run), mutation)
    }

    fn apply(&self, run: Option<u64>, mutation: Mutation) -> Result<u64, StoreError> {
        let mut inner = self.inner.write().expect("state store lock poisoned");
        let checked = match run {
            Some(run) if run != inner.run => Err(StoreError::RunEnded {
                run,
                current: inner.run,
            }),
            _ => inner.validate(&mutation),
        };
        if let Err(e) = checked {
            if !matches!(e, StoreError::PhaseClosed | StoreError::RunEnded { .. }) {
                error!(error = %e, "mutation rejected");
            }
            return Err(e);
        }
        trace!(?mutation, version = inner.version + 1, "applying mutation");
        inner.apply(mutation);
        let version = inner.version;
        self.versions.send_replace(version);
        Ok(version)
    }

    /// Full, consistent copy of the current state.
    pub fn snapshot(&self) -> Snapshot {
        let inner = self.inner.read().expect("state store lock poisoned");
        Snapshot {
            version: inner.version,
            agents: inner.agents.clone(),
            game_state: inner.game_state(),
        }
    }

    /// Changes since `version`: the interactions appended after it and the current
    /// agents, phase and countdown.
    ///
    /// Fails with [`StoreError::VersionTooOld`] when the history no longer reaches back
    /// that far (or a reset happened since), in which case a snapshot is needed.
    pub fn changes_since(&self, version: u64) -> Result<Delta, StoreError> {
        self.delta_since(version, DeltaScope::NewInteractions)
    }

    pub(crate) fn delta_since(&self, version: u64, scope: DeltaScope) -> Result<Delta, StoreError> {
        let inner = self.inner.read().expect("state store lock poisoned");
        inner.delta_since(version, scope)
    }

    /// Current run number, bumped by every [`Mutation::Reset`].
    pub fn run(&self) -> u64 {
        self.inner.read().expect("state store lock poisoned").run
    }

    pub fn version(&self) -> u64 {
        self.inner.read().expect("state store lock poisoned").version
    }

    /// Current phase and countdown.
    pub fn phase(&self) -> (Phase, u64) {
        let inner = self.inner.read().expect("state store lock poisoned");
        (inner.phase, inner.time_left)
    }

    pub fn agents(&self) -> Vec<Agent> {
        self.inner
            .read()
            .expect("state store lock poisoned")
            .agents
            .clone()
    }

    pub fn interaction_count(&self) -> usize {
        self.inner
            .read()
            .expect("state store lock poisoned")
            .interactions
            .len()
    }

    /// Receiver notified with the latest version after every applied mutation.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.versions.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::game_state::{InteractionType, Message};

    fn roster() -> Vec<Agent> {
        vec![
            Agent::new("a", "Alpha", "ALP"),
            Agent::new("b", "Beta", "BET"),
            Agent::new("c", "Gamma", "GAM"),
        ]
    }

    fn active_store(history: usize) -> StateStore {
        let store = StateStore::new(roster(), 10, history);
        store
            .apply_mutation(Mutation::TransitionPhase {
                phase: Phase::Active,
                time_left: 60,
            })
            .unwrap();
        store
    }

    fn chat(a: &str, b: &str) -> Interaction {
        Interaction::new(
            InteractionType::Chat,
            a.into(),
            b.into(),
            vec![Message::new(a, "Hello"), Message::new(b, "Hi")],
        )
    }

    #[test]
    fn test_versions_are_gap_free() {
        let store = active_store(16);
        assert_eq!(store.version(), 1);
        assert_eq!(store.apply_mutation(Mutation::AddInteraction(chat("a", "b"))), Ok(2));
        assert_eq!(
            store.apply_mutation(Mutation::AdvanceClock { time_left: 59 }),
            Ok(3)
        );
        assert_eq!(
            store.apply_mutation(Mutation::SetAgentStatus {
                agent_id: "c".into(),
                status: AgentStatus::Eliminated
            }),
            Ok(4)
        );
        assert_eq!(*store.subscribe().borrow(), 4);
    }

    #[test]
    fn test_invalid_interactions_are_rejected() {
        let store = active_store(16);
        let before = store.snapshot();

        let result = store.apply_mutation(Mutation::AddInteraction(chat("a", "a")));
        assert_eq!(result, Err(StoreError::SelfInteraction("a".into())));

        let result = store.apply_mutation(Mutation::AddInteraction(chat("a", "z")));
        assert_eq!(result, Err(StoreError::UnknownAgent("z".into())));

        let mut foreign = chat("a", "b");
        foreign.messages.push(Message::new("c", "butting in"));
        assert!(matches!(
            store.apply_mutation(Mutation::AddInteraction(foreign)),
            Err(StoreError::ForeignSender { .. })
        ));

        let interaction = chat("a", "b");
        store
            .apply_mutation(Mutation::AddInteraction(interaction.clone()))
            .unwrap();
        assert_eq!(
            store.apply_mutation(Mutation::AddInteraction(interaction.clone())),
            Err(StoreError::DuplicateInteraction(interaction.id))
        );

        assert_eq!(store.version(), before.version + 1);
        assert_eq!(store.interaction_count(), 1);
    }

    #[test]
    fn test_interactions_only_during_active() {
        let store = StateStore::new(roster(), 10, 16);
        assert_eq!(
            store.apply_mutation(Mutation::AddInteraction(chat("a", "b"))),
            Err(StoreError::PhaseClosed)
        );
        assert_eq!(store.version(), 0);
    }

    #[test]
    fn test_clock_must_decrease() {
        let store = StateStore::new(roster(), 10, 16);
        assert_eq!(
            store.apply_mutation(Mutation::AdvanceClock { time_left: 10 }),
            Err(StoreError::ClockNotDecreasing {
                current: 10,
                requested: 10
            })
        );
        assert!(store
            .apply_mutation(Mutation::AdvanceClock { time_left: 9 })
            .is_ok());
    }

    #[test]
    fn test_changes_since_returns_only_new_interactions() {
        let store = active_store(16);
        let first = chat("a", "b");
        store
            .apply_mutation(Mutation::AddInteraction(first.clone()))
            .unwrap();
        let seen = store.version();
        store
            .apply_mutation(Mutation::AdvanceClock { time_left: 50 })
            .unwrap();
        let second = chat("b", "c");
        store
            .apply_mutation(Mutation::AddInteraction(second.clone()))
            .unwrap();

        let delta = store.changes_since(seen).unwrap();
        assert_eq!(delta.from, seen);
        assert_eq!(delta.version, seen + 2);
        assert_eq!(delta.interactions, vec![second.clone()]);
        assert_eq!(delta.time_left, 50);

        let delta = store.changes_since(0).unwrap();
        assert_eq!(delta.interactions, vec![first, second]);

        let delta = store.changes_since(store.version()).unwrap();
        assert!(delta.is_empty());
        assert!(delta.interactions.is_empty());

        assert!(matches!(
            store.changes_since(store.version() + 1),
            Err(StoreError::VersionUnknown { .. })
        ));
    }

    #[test]
    fn test_history_is_bounded() {
        let store = active_store(2);
        for time_left in (55..60).rev() {
            store
                .apply_mutation(Mutation::AdvanceClock { time_left })
                .unwrap();
        }
        let version = store.version();
        assert!(store.changes_since(version - 2).is_ok());
        assert_eq!(
            store.changes_since(version - 3),
            Err(StoreError::VersionTooOld {
                requested: version - 3,
                oldest: version - 2
            })
        );
    }

    #[test]
    fn test_reset_is_a_history_barrier() {
        let store = active_store(64);
        store
            .apply_mutation(Mutation::AddInteraction(chat("a", "b")))
            .unwrap();
        store
            .apply_mutation(Mutation::SetAgentStatus {
                agent_id: "b".into(),
                status: AgentStatus::Eliminated,
            })
            .unwrap();
        let before_reset = store.version();

        store
            .apply_mutation(Mutation::Reset { time_left: 10 })
            .unwrap();

        assert!(matches!(
            store.changes_since(before_reset),
            Err(StoreError::VersionTooOld { .. })
        ));
        let snapshot = store.snapshot();
        assert_eq!(snapshot.game_state.phase, Phase::Lobby);
        assert_eq!(snapshot.game_state.time_left, 10);
        assert!(snapshot.game_state.active_interactions.is_empty());
        assert!(snapshot.agents.iter().all(Agent::is_active));
        assert!(store.changes_since(snapshot.version).unwrap().is_empty());
    }

    #[test]
    fn test_reset_ends_the_run() {
        let store = active_store(16);
        let run = store.run();
        store
            .apply_mutation(Mutation::Reset { time_left: 10 })
            .unwrap();
        assert_eq!(store.run(), run + 1);
        store
            .apply_mutation(Mutation::TransitionPhase {
                phase: Phase::Active,
                time_left: 60,
            })
            .unwrap();

        let version = store.version();
        assert_eq!(
            store.apply_mutation_in_run(run, Mutation::AddInteraction(chat("a", "b"))),
            Err(StoreError::RunEnded {
                run,
                current: run + 1
            })
        );
        assert_eq!(store.version(), version);
        assert!(store
            .apply_mutation_in_run(run + 1, Mutation::AddInteraction(chat("a", "b")))
            .is_ok());
    }

    #[test]
    fn test_concurrent_appends_are_not_lost() {
        let agents = (0..100)
            .map(|i| Agent::new(format!("agent-{i}"), format!("Agent {i}"), format!("A{i}")))
            .collect::<Vec<_>>();
        let store = Arc::new(StateStore::new(agents, 10, 256));
        store
            .apply_mutation(Mutation::TransitionPhase {
                phase: Phase::Active,
                time_left: 60,
            })
            .unwrap();

        let handles = (0..50)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    let interaction = chat(
                        &format!("agent-{}", 2 * i),
                        &format!("agent-{}", 2 * i + 1),
                    );
                    let id = interaction.id.clone();
                    let version = store
                        .apply_mutation(Mutation::AddInteraction(interaction))
                        .unwrap();
                    (version, id)
                })
            })
            .collect::<Vec<_>>();
        let mut completed = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .collect::<Vec<_>>();
        completed.sort();

        let log = store.snapshot().game_state.active_interactions;
        assert_eq!(log.len(), 50);
        let log_ids = log.iter().map(|i| i.id.clone()).collect::<Vec<_>>();
        let completion_order = completed.into_iter().map(|(_, id)| id).collect::<Vec<_>>();
        assert_eq!(log_ids, completion_order);
    }
}
