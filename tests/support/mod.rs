#![allow(dead_code)]

use std::time::Duration;

use async_trait::async_trait;
use tournament_arena::broadcast::Viewer;
use tournament_arena::prelude::*;

/// Always answers with "Hello" from `agent1` then "Hi" from `agent2`.
pub struct HelloHiGenerator {
    pub latency: Duration,
}

#[async_trait]
impl InteractionGenerator for HelloHiGenerator {
    async fn generate(
        &self,
        agent1: &Agent,
        agent2: &Agent,
        _kind: InteractionType,
    ) -> anyhow::Result<Vec<Message>> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        Ok(vec![
            Message::new(agent1.id.clone(), "Hello"),
            Message::new(agent2.id.clone(), "Hi"),
        ])
    }
}

pub fn roster(count: usize) -> StaticDirectory {
    StaticDirectory::new(
        (1..=count)
            .map(|i| Agent::new(format!("agent-{i}"), format!("Agent {i}"), format!("A{i}")))
            .collect(),
    )
}

/// One second lobby, a long active phase, fast scheduling.
pub fn fast_config() -> Configuration {
    Configuration::new()
        .with_phase_durations(
            Duration::from_secs(1),
            Duration::from_secs(600),
            Duration::from_secs(5),
        )
        .with_scheduler_cadence(Duration::from_millis(500))
        .with_generator_timeout(Duration::from_secs(5))
}

/// Every frame already queued for `viewer`.
pub fn drain(viewer: &mut Viewer) -> Vec<Frame> {
    let mut frames = vec![];
    while let Some(Some(frame)) = viewer.try_next_frame() {
        frames.push(frame);
    }
    frames
}

pub fn init_test_logs() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}
