//! File-based state store: one JSON document per agent.
//!
//! Storage location: `<dir>/<agent_id>.json`, default `~/.ponder/state/`.
//! Saves write a temporary file next to the target and rename it over the
//! old document, so a reader never sees a half-written state.

use async_trait::async_trait;
use ponder_core::error::StateError;
use ponder_core::state::{AgentState, StateStore};
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

pub struct FileStateStore {
    dir: PathBuf,
}

impl FileStateStore {
    /// Create a store rooted at `dir` (created on first save).
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Default directory: `~/.ponder/state`
    pub fn default_dir() -> PathBuf {
        let home = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(".ponder").join("state")
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the document for one agent id.
    ///
    /// Characters outside `[A-Za-z0-9_-]` are replaced so an id can never
    /// escape the store directory.
    pub fn path_for(&self, agent_id: &str) -> PathBuf {
        let safe: String = agent_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn load(&self, agent_id: &str) -> Result<Option<AgentState>, StateError> {
        let path = self.path_for(agent_id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StateError::Storage(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )));
            }
        };

        let state = serde_json::from_str(&content).map_err(|e| {
            StateError::Serialization(format!("{}: {e}", path.display()))
        })?;
        Ok(Some(state))
    }

    async fn save(&self, agent_id: &str, state: &AgentState) -> Result<(), StateError> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            StateError::Storage(format!("Failed to create state directory: {e}"))
        })?;

        let content = serde_json::to_string_pretty(state)
            .map_err(|e| StateError::Serialization(e.to_string()))?;

        let path = self.path_for(agent_id);
        let tmp = self.dir.join(format!(".{}.tmp", Uuid::new_v4()));
        tokio::fs::write(&tmp, content)
            .await
            .map_err(|e| StateError::Storage(format!("Failed to write state file: {e}")))?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(StateError::Storage(format!(
                "Failed to replace {}: {e}",
                path.display()
            )));
        }

        debug!(agent_id, turns = state.turns.len(), path = %path.display(), "State saved");
        Ok(())
    }
}
