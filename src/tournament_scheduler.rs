use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use crate::agent::{Agent, AgentId};
use crate::configuration::Configuration;
use crate::error::{GenerationError, StoreError};
use crate::game_state::{Interaction, InteractionType, Message, Phase};
use crate::interaction_generator::InteractionGenerator;
use crate::state_store::{Mutation, StateStore};
use crate::tournament_strategy::PairingStrategy;

/// A pairing handed to the generator, tagged with the run it was made in.
#[derive(Debug, Clone)]
pub struct PendingInteraction {
    pub agent1: Agent,
    pub agent2: Agent,
    pub kind: InteractionType,
    pub run: u64,
}

#[derive(Debug)]
pub struct GenerationOutcome {
    pub pending: PendingInteraction,
    pub result: Result<Vec<Message>, GenerationError>,
}

/// Runs agent pairings through the generator and appends finished interactions.
///
/// The store is only touched to read eligibility and to append a finished
/// interaction; generation itself runs in its own task, so a slow generator never
/// holds up the clock or the viewers.
///
/// A reset starts a new run: generations still in flight are cancelled, their agents
/// released, and any outcome from the old run that slips through is dropped.
pub struct InteractionScheduler<S: PairingStrategy> {
    store: Arc<StateStore>,
    generator: Arc<dyn InteractionGenerator>,
    strategy: S,
    engaged: HashSet<AgentId>,
    in_flight: usize,
    max_in_flight: usize,
    generator_timeout: Duration,
    cadence: Duration,
    next_kind: usize,
    run: u64,
    tasks: JoinSet<GenerationOutcome>,
}

impl<S: PairingStrategy> InteractionScheduler<S> {
    pub fn new(
        store: Arc<StateStore>,
        generator: Arc<dyn InteractionGenerator>,
        strategy: S,
        config: &Configuration,
    ) -> Self {
        let run = store.run();
        InteractionScheduler {
            store,
            generator,
            strategy,
            engaged: HashSet::new(),
            in_flight: 0,
            max_in_flight: config.max_concurrent_interactions,
            generator_timeout: config.generator_timeout,
            cadence: config.scheduler_cadence,
            next_kind: 0,
            run,
            tasks: JoinSet::new(),
        }
    }

    /// Select the pairings to start now.
    ///
    /// Empty outside ACTIVE, when every slot is in use, or when fewer than two agents
    /// are eligible. Selected agents are engaged until their outcome comes back.
    pub fn advance(&mut self) -> Vec<PendingInteraction> {
        self.follow_run();
        let (phase, _) = self.store.phase();
        if phase != Phase::Active {
            return vec![];
        }
        let capacity = self.max_in_flight.saturating_sub(self.in_flight);
        if capacity == 0 {
            trace!(in_flight = self.in_flight, "all generation slots busy");
            return vec![];
        }

        let eligible = self
            .store
            .agents()
            .into_iter()
            .filter(|a| a.is_active() && !self.engaged.contains(&a.id))
            .collect::<Vec<_>>();
        if eligible.len() < 2 {
            trace!(eligible = eligible.len(), "not enough eligible agents, idling");
            return vec![];
        }

        let pairs = self.strategy.select_pairs(&eligible, capacity);
        let mut pending = Vec::with_capacity(pairs.len());
        for (agent1, agent2) in pairs {
            self.engaged.insert(agent1.id.clone());
            self.engaged.insert(agent2.id.clone());
            let kind = InteractionType::ALL[self.next_kind % InteractionType::ALL.len()];
            self.next_kind += 1;
            pending.push(PendingInteraction {
                agent1,
                agent2,
                kind,
                run: self.run,
            });
        }
        self.in_flight += pending.len();
        pending
    }

    /// Catch up with the store's run, dropping everything tied to an older one.
    fn follow_run(&mut self) {
        let run = self.store.run();
        if run == self.run {
            return;
        }
        debug!(
            run,
            cancelled = self.tasks.len(),
            "new run, forgetting past pairings"
        );
        self.run = run;
        self.tasks.abort_all();
        self.engaged.clear();
        self.in_flight = 0;
        self.strategy.reset();
        self.next_kind = 0;
    }

    /// Start generating `pending` in the background.
    pub fn launch(&mut self, pending: PendingInteraction) {
        debug!(
            agent1 = %pending.agent1.id,
            agent2 = %pending.agent2.id,
            kind = ?pending.kind,
            "generating interaction"
        );
        let generator = self.generator.clone();
        let timeout = self.generator_timeout;
        self.tasks.spawn(async move {
            let generation = generator.generate(&pending.agent1, &pending.agent2, pending.kind);
            let result = match AssertUnwindSafe(tokio::time::timeout(timeout, generation))
                .catch_unwind()
                .await
            {
                Ok(Ok(Ok(messages))) if messages.is_empty() => Err(GenerationError::Empty),
                Ok(Ok(Ok(messages))) => Ok(messages),
                Ok(Ok(Err(e))) => Err(GenerationError::Failed(e)),
                Ok(Err(_elapsed)) => Err(GenerationError::Timeout(timeout)),
                Err(_panic) => Err(GenerationError::Panicked),
            };
            GenerationOutcome { pending, result }
        });
    }

    /// Release the agents of a finished generation and append its interaction.
    ///
    /// Returns the store version of the appended interaction, `None` if the pairing
    /// was abandoned or discarded.
    pub fn on_result(&mut self, outcome: GenerationOutcome) -> Option<u64> {
        let GenerationOutcome { pending, result } = outcome;
        self.follow_run();
        if pending.run != self.run {
            debug!(
                agent1 = %pending.agent1.id,
                agent2 = %pending.agent2.id,
                run = pending.run,
                "run ended during generation, discarded"
            );
            return None;
        }
        self.engaged.remove(&pending.agent1.id);
        self.engaged.remove(&pending.agent2.id);
        self.in_flight = self.in_flight.saturating_sub(1);

        let messages = match result {
            Ok(messages) => messages,
            Err(e) => {
                warn!(
                    agent1 = %pending.agent1.id,
                    agent2 = %pending.agent2.id,
                    error = %e,
                    "pairing abandoned"
                );
                return None;
            }
        };

        let interaction = Interaction::new(
            pending.kind,
            pending.agent1.id.clone(),
            pending.agent2.id.clone(),
            messages,
        );
        let id = interaction.id.clone();
        match self
            .store
            .apply_mutation_in_run(pending.run, Mutation::AddInteraction(interaction))
        {
            Ok(version) => {
                info!(
                    interaction = id,
                    agent1 = %pending.agent1.id,
                    agent2 = %pending.agent2.id,
                    version,
                    "interaction added"
                );
                Some(version)
            }
            Err(StoreError::PhaseClosed) => {
                debug!(interaction = id, "phase ended during generation, discarded");
                None
            }
            Err(StoreError::RunEnded { .. }) => {
                debug!(interaction = id, "run ended during generation, discarded");
                None
            }
            // already logged by the store
            Err(_) => None,
        }
    }

    /// Agents currently engaged in a generation.
    pub fn engaged(&self) -> &HashSet<AgentId> {
        &self.engaged
    }

    /// Schedule on every cadence tick until `shutdown` flips.
    ///
    /// In-flight generations are cancelled on shutdown and their results dropped.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.cadence);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    for pending in self.advance() {
                        self.launch(pending);
                    }
                }
                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    match joined {
                        Ok(outcome) => {
                            self.on_result(outcome);
                        }
                        Err(e) if e.is_cancelled() => trace!("generation cancelled"),
                        Err(e) => warn!(error = %e, "generation task failed"),
                    }
                }
                _ = shutdown.changed() => break,
            }
        }

        if !self.tasks.is_empty() {
            debug!(in_flight = self.tasks.len(), "cancelling in-flight generations");
        }
        self.tasks.shutdown().await;
        debug!("interaction scheduler stopped");
    }
}
