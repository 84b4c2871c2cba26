//! Pairing strategies used by the scheduler to pick who interacts next.
//!
//! The scheduler hands a strategy the agents that are currently eligible (active and
//! not engaged in an interaction being generated) and how many pairings it can start.
//! The strategy answers with disjoint pairs.
//!
//! # Provided Strategies
//! - [`LeastRecentPairing`]: favours agents and pairs that have waited the longest, so
//!   the same two agents are not paired back to back while others are available.

use std::collections::HashMap;

use tracing::trace;

use crate::agent::{Agent, AgentId};

/// Decides which eligible agents interact next.
pub trait PairingStrategy: Send {
    /// Pick at most `max_pairs` disjoint pairs among `eligible`.
    ///
    /// Every agent in `eligible` is active and free. Returned pairings are considered
    /// scheduled.
    fn select_pairs(&mut self, eligible: &[Agent], max_pairs: usize) -> Vec<(Agent, Agent)>;

    /// Forget past pairings (new run).
    fn reset(&mut self);
}

/// Least-recently-interacted-first pairing.
///
/// Agents are considered in order of how long ago they were last scheduled. Each one
/// is paired with the available partner it has been paired with least recently,
/// ties going to the partner that has waited longest overall.
#[derive(Debug, Default)]
pub struct LeastRecentPairing {
    round: u64,
    last_agent: HashMap<AgentId, u64>,
    last_pair: HashMap<(AgentId, AgentId), u64>,
}

impl LeastRecentPairing {
    pub fn new() -> Self {
        Self::default()
    }

    fn agent_recency(&self, agent: &Agent) -> u64 {
        self.last_agent.get(&agent.id).copied().unwrap_or(0)
    }

    fn pair_recency(&self, a: &Agent, b: &Agent) -> u64 {
        self.last_pair.get(&pair_key(a, b)).copied().unwrap_or(0)
    }

    fn record(&mut self, a: &Agent, b: &Agent) {
        self.round += 1;
        self.last_agent.insert(a.id.clone(), self.round);
        self.last_agent.insert(b.id.clone(), self.round);
        self.last_pair.insert(pair_key(a, b), self.round);
    }
}

fn pair_key(a: &Agent, b: &Agent) -> (AgentId, AgentId) {
    if a.id < b.id {
        (a.id.clone(), b.id.clone())
    } else {
        (b.id.clone(), a.id.clone())
    }
}

impl PairingStrategy for LeastRecentPairing {
    fn select_pairs(&mut self, eligible: &[Agent], max_pairs: usize) -> Vec<(Agent, Agent)> {
        let mut pool = eligible.to_vec();
        pool.sort_by(|a, b| {
            self.agent_recency(a)
                .cmp(&self.agent_recency(b))
                .then_with(|| a.id.cmp(&b.id))
        });

        let mut pairings = vec![];
        while pairings.len() < max_pairs && pool.len() >= 2 {
            let a = pool.remove(0);
            // `pool` is already ordered by agent recency, so `min_by_key` keeps the
            // longest-waiting partner among equally stale pairs
            let Some((j, _)) = pool
                .iter()
                .enumerate()
                .min_by_key(|(_, b)| self.pair_recency(&a, b))
            else {
                break;
            };
            let b = pool.remove(j);
            trace!(agent1 = %a.id, agent2 = %b.id, "pairing selected");
            self.record(&a, &b);
            pairings.push((a, b));
        }
        pairings
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}
