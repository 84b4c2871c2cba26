//! The content side of an interaction.
//!
//! What agents say to each other is decided outside the arena (templates, a rule
//! engine, a language model...). The arena only needs something implementing
//! [`InteractionGenerator`]: given two agents and an interaction type, produce the
//! ordered messages they exchanged, or fail.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::agent::Agent;
use crate::game_state::{InteractionType, Message};

#[async_trait]
pub trait InteractionGenerator: Send + Sync {
    /// Produce the messages exchanged between `agent1` and `agent2`.
    ///
    /// Every message must be sent by one of the two agents. May take seconds; the
    /// scheduler bounds the call with a timeout.
    async fn generate(
        &self,
        agent1: &Agent,
        agent2: &Agent,
        kind: InteractionType,
    ) -> anyhow::Result<Vec<Message>>;
}

/// Canned dialogue lines, filled with agent names and symbols.
///
/// Alternates speakers starting with `agent1`. Cycles through a few variants per
/// interaction type so consecutive exchanges differ.
#[derive(Debug, Default)]
pub struct TemplateGenerator {
    latency: Option<Duration>,
    counter: AtomicUsize,
}

impl TemplateGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep for `latency` before answering, to mimic a remote generator.
    pub fn with_latency(self, latency: Duration) -> Self {
        TemplateGenerator {
            latency: Some(latency),
            ..self
        }
    }

    fn lines(kind: InteractionType, variant: usize) -> &'static [&'static str] {
        const CHAT: [&[&str]; 2] = [
            &[
                "Hello {other}, how is the arena treating you?",
                "Can't complain, {me} is still standing.",
                "Good luck out there.",
            ],
            &["Quiet round so far, {other}.", "Too quiet. Everyone is watching ${symbol}."],
        ];
        const TRADE: [&[&str]; 2] = [
            &[
                "{other}, I'll swap some ${symbol} for a favour later.",
                "Deal, as long as ${symbol} keeps its value.",
                "It will.",
            ],
            &["Looking to offload ${symbol}, interested {other}?", "Only at a discount."],
        ];
        const ALLIANCE: [&[&str]; 2] = [
            &[
                "{other}, we'd last longer together.",
                "Agreed. {me} watches your back.",
                "Until the final round.",
            ],
            &["Truce, {other}?", "Truce. For now."],
        ];
        const CHALLENGE: [&[&str]; 2] = [
            &[
                "{other}, you won't make it past this phase.",
                "Big words from {me}. Let's see.",
                "We will.",
            ],
            &["I'm coming for ${symbol}, {other}.", "Bring it."],
        ];
        let table = match kind {
            InteractionType::Chat => CHAT,
            InteractionType::Trade => TRADE,
            InteractionType::Alliance => ALLIANCE,
            InteractionType::Challenge => CHALLENGE,
        };
        table[variant % table.len()]
    }
}

#[async_trait]
impl InteractionGenerator for TemplateGenerator {
    async fn generate(
        &self,
        agent1: &Agent,
        agent2: &Agent,
        kind: InteractionType,
    ) -> anyhow::Result<Vec<Message>> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let variant = self.counter.fetch_add(1, Ordering::Relaxed);

        let messages = Self::lines(kind, variant)
            .iter()
            .enumerate()
            .map(|(i, line)| {
                let (me, other) = if i % 2 == 0 {
                    (agent1, agent2)
                } else {
                    (agent2, agent1)
                };
                let text = line
                    .replace("{me}", &me.name)
                    .replace("{other}", &other.name)
                    .replace("{symbol}", &other.symbol);
                Message::new(me.id.clone(), text)
            })
            .collect();
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_template_alternates_speakers() {
        let alpha = Agent::new("a", "Alpha", "ALP");
        let beta = Agent::new("b", "Beta", "BET");
        let generator = TemplateGenerator::new();

        for kind in InteractionType::ALL {
            let messages = generator.generate(&alpha, &beta, kind).await.unwrap();
            assert!(messages.len() >= 2);
            for (i, message) in messages.iter().enumerate() {
                let expected = if i % 2 == 0 { &alpha.id } else { &beta.id };
                assert_eq!(&message.sender_id, expected);
            }
        }
    }

    #[tokio::test]
    async fn test_template_fills_names() {
        let alpha = Agent::new("a", "Alpha", "ALP");
        let beta = Agent::new("b", "Beta", "BET");
        let generator = TemplateGenerator::new();

        let messages = generator
            .generate(&alpha, &beta, InteractionType::Chat)
            .await
            .unwrap();
        assert_eq!(messages[0].text, "Hello Beta, how is the arena treating you?");
        assert_eq!(messages[1].text, "Can't complain, Beta is still standing.");
        assert!(messages.iter().all(|m| !m.text.contains('{')));
    }
}
