use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque agent identifier, as handed out by the agent directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> AgentId {
        AgentId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AgentId {
    fn from(value: &str) -> Self {
        AgentId::new(value)
    }
}

impl From<String> for AgentId {
    fn from(value: String) -> Self {
        AgentId(value)
    }
}

/// Status of an agent during a run. Only [`AgentStatus::Active`] agents get paired.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    #[default]
    Active,
    Eliminated,
    Inactive,
}

/// A tournament participant, as seen by viewers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    pub symbol: String,
    #[serde(default)]
    pub status: AgentStatus,
}

impl Agent {
    pub fn new(id: impl Into<AgentId>, name: impl Into<String>, symbol: impl Into<String>) -> Agent {
        Agent {
            id: id.into(),
            name: name.into(),
            symbol: symbol.into(),
            status: AgentStatus::Active,
        }
    }

    pub fn with_status(self, status: AgentStatus) -> Agent {
        Agent { status, ..self }
    }

    pub fn is_active(&self) -> bool {
        self.status == AgentStatus::Active
    }
}

impl fmt::Display for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_wire_shape() {
        let agent = Agent::new("a-1", "Alpha", "ALP");
        let json = serde_json::to_value(&agent).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"id": "a-1", "name": "Alpha", "symbol": "ALP", "status": "active"})
        );
    }

    #[test]
    fn test_status_defaults_to_active() {
        let agent: Agent =
            serde_json::from_str(r#"{"id":"b","name":"Beta","symbol":"BET"}"#).unwrap();
        assert!(agent.is_active());

        let agent = agent.with_status(AgentStatus::Eliminated);
        assert!(!agent.is_active());
        assert_eq!(
            serde_json::to_string(&agent.status).unwrap(),
            r#""eliminated""#
        );
    }
}
