//! Loading the tournament roster from the agent directory.
//!
//! The directory itself lives outside the arena (agent creation, storage). The arena
//! only reads the roster once, at startup, through an [`AgentDirectory`].

use std::collections::HashSet;

use anyhow::bail;
use tracing::{info, instrument, warn};

use crate::agent::Agent;

mod roster_file;

pub use roster_file::RosterFile;

/// Read access to the participating agents.
pub trait AgentDirectory {
    /// The roster for a new run.
    fn roster(&self) -> anyhow::Result<Vec<Agent>>;
}

/// A roster known up front.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory(Vec<Agent>);

impl StaticDirectory {
    pub fn new(agents: Vec<Agent>) -> Self {
        StaticDirectory(agents)
    }
}

impl AgentDirectory for StaticDirectory {
    fn roster(&self) -> anyhow::Result<Vec<Agent>> {
        Ok(self.0.clone())
    }
}

const MAX_SYMBOL_LEN: usize = 8;

/// Fetch the roster from `directory` and check it can run a tournament.
///
/// Fails on blank or duplicate ids. A roster with fewer than two active agents is
/// accepted (the scheduler simply idles) but logged.
#[instrument(skip_all)]
pub fn collect_agents(directory: &dyn AgentDirectory) -> anyhow::Result<Vec<Agent>> {
    let agents = directory.roster()?;

    let mut ids = HashSet::with_capacity(agents.len());
    for agent in &agents {
        if agent.id.as_str().trim().is_empty() {
            bail!("agent '{}' has a blank id", agent.name);
        }
        if !ids.insert(&agent.id) {
            bail!("duplicate agent id '{}'", agent.id);
        }
        if agent.symbol.chars().count() > MAX_SYMBOL_LEN {
            warn!(agent = %agent, symbol = %agent.symbol, "symbol longer than {MAX_SYMBOL_LEN} characters");
        }
    }

    let active = agents.iter().filter(|a| a.is_active()).count();
    if active < 2 {
        warn!(active, "fewer than two active agents, no interaction will be scheduled");
    }
    info!(total = agents.len(), active, "roster collected");

    Ok(agents)
}
