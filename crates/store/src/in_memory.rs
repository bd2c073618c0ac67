//! In-memory state store: useful for testing and ephemeral agents.

use async_trait::async_trait;
use ponder_core::error::StateError;
use ponder_core::state::{AgentState, StateStore};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Keeps one `AgentState` per agent id in a map.
/// Cloning shares the underlying map.
#[derive(Clone, Default)]
pub struct InMemoryStateStore {
    states: Arc<RwLock<HashMap<String, AgentState>>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of agents with stored state.
    pub async fn len(&self) -> usize {
        self.states.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.states.read().await.is_empty()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn load(&self, agent_id: &str) -> Result<Option<AgentState>, StateError> {
        Ok(self.states.read().await.get(agent_id).cloned())
    }

    async fn save(&self, agent_id: &str, state: &AgentState) -> Result<(), StateError> {
        self.states
            .write()
            .await
            .insert(agent_id.to_string(), state.clone());
        Ok(())
    }
}
