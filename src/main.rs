use std::env;
use std::sync::Arc;

use tournament_arena::prelude::*;
use tournament_arena::{anyhow, init_logger};

const ROSTER_VAR: &str = "ARENA_ROSTER";

fn demo_roster() -> StaticDirectory {
    StaticDirectory::new(vec![
        Agent::new("agent-1", "Nova", "NOVA"),
        Agent::new("agent-2", "Quill", "QUIL"),
        Agent::new("agent-3", "Brick", "BRCK"),
        Agent::new("agent-4", "Moth", "MOTH"),
        Agent::new("agent-5", "Ember", "EMBR"),
        Agent::new("agent-6", "Tide", "TIDE"),
    ])
}

/// Usage: `tournament-arena [roster.json]` (or `ARENA_ROSTER=roster.json`).
///
/// Without a roster, six demo agents are used. Everything else comes from the
/// `ARENA_*` environment variables.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Configuration::from_env();
    if !config.logs_to_file() {
        init_logger(false)?;
    }

    let roster_path = env::args().nth(1).or_else(|| env::var(ROSTER_VAR).ok());
    let generator = Arc::new(TemplateGenerator::new());
    let arena = match roster_path {
        Some(path) => Arena::new(&RosterFile::new(path), generator, config)?,
        None => Arena::new(&demo_roster(), generator, config)?,
    };

    arena.start()?;
    let served = arena.serve().await;
    arena.shutdown().await;
    served
}
