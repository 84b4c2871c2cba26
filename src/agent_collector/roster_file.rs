use std::path::{Path, PathBuf};

use anyhow::{bail, Context};

use super::AgentDirectory;
use crate::agent::Agent;

/// A roster stored as a JSON array of `{id, name, symbol, status?}` objects.
///
/// ```json
/// [
///   { "id": "a1", "name": "Alpha", "symbol": "ALP" },
///   { "id": "b2", "name": "Beta", "symbol": "BET", "status": "eliminated" }
/// ]
/// ```
#[derive(Debug, Clone)]
pub struct RosterFile {
    path: PathBuf,
}

impl RosterFile {
    pub fn new(path: impl AsRef<Path>) -> Self {
        RosterFile {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl AgentDirectory for RosterFile {
    fn roster(&self) -> anyhow::Result<Vec<Agent>> {
        if !self.path.is_file() {
            bail!("'{}' is not a file", self.path.display());
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("could not read roster '{}'", self.path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("invalid roster '{}'", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentStatus;

    #[test]
    fn test_read_roster_file() {
        let path = std::env::temp_dir().join(format!("roster_{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"[
                {"id": "a1", "name": "Alpha", "symbol": "ALP"},
                {"id": "b2", "name": "Beta", "symbol": "BET", "status": "eliminated"}
            ]"#,
        )
        .unwrap();

        let agents = RosterFile::new(&path).roster().unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(agents.len(), 2);
        assert_eq!(agents[0].status, AgentStatus::Active);
        assert_eq!(agents[1].status, AgentStatus::Eliminated);
    }

    #[test]
    fn test_missing_roster_file() {
        let err = RosterFile::new("/definitely/not/here.json")
            .roster()
            .unwrap_err();
        assert!(err.to_string().contains("is not a file"));
    }
}
