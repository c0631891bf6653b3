use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::OwnedMutexGuard;

use foreman_types::{AgentHandle, AgentStatus};

use crate::sync::KeyedLocks;

/// Singleton map of live agent handles. Writers are the gateway
/// (spawn/kill/pause/resume) and the lifecycle/completion subscribers;
/// gateway operations additionally hold the per-agent op lock across their
/// plugin calls.
#[derive(Default)]
pub struct AgentRegistry {
    agents: Mutex<HashMap<String, AgentHandle>>,
    op_locks: KeyedLocks,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialise a multi-step gateway operation against one agent
    pub async fn op_lock(&self, agent_id: &str) -> OwnedMutexGuard<()> {
        self.op_locks.lock(agent_id).await
    }

    pub fn insert(&self, handle: AgentHandle) {
        self.agents.lock().unwrap().insert(handle.id.clone(), handle);
    }

    /// Create the record if this is the first sighting of the agent
    pub fn ensure(&self, agent_id: &str) -> AgentHandle {
        let mut agents = self.agents.lock().unwrap();
        agents
            .entry(agent_id.to_string())
            .or_insert_with(|| AgentHandle::new(agent_id, "unknown", agent_id))
            .clone()
    }

    pub fn get(&self, agent_id: &str) -> Option<AgentHandle> {
        self.agents.lock().unwrap().get(agent_id).cloned()
    }

    /// Returns false for unknown agents
    pub fn set_status(&self, agent_id: &str, status: AgentStatus) -> bool {
        let mut agents = self.agents.lock().unwrap();
        match agents.get_mut(agent_id) {
            Some(handle) => {
                handle.status = status;
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, agent_id: &str) -> Option<AgentHandle> {
        self.agents.lock().unwrap().remove(agent_id)
    }

    pub fn list(&self) -> Vec<AgentHandle> {
        let mut handles: Vec<AgentHandle> =
            self.agents.lock().unwrap().values().cloned().collect();
        handles.sort_by(|a, b| a.id.cmp(&b.id));
        handles
    }

    pub fn list_with_status(&self, status: AgentStatus) -> Vec<AgentHandle> {
        self.list()
            .into_iter()
            .filter(|h| h.status == status)
            .collect()
    }
}
