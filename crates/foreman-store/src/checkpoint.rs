use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use foreman_types::CheckpointState;

pub const DEFAULT_MAX_PER_AGENT: usize = 3;

/// A stored checkpoint plus the decision that triggered it, if any
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub state: CheckpointState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision_id: Option<String>,
}

/// Per-agent bounded ring of session snapshots, newest first. Checkpoints
/// are plugin-opaque and cheap to drop; only the most recent few matter.
#[derive(Debug, Default)]
pub struct CheckpointStore {
    rings: HashMap<String, VecDeque<CheckpointRecord>>,
}

impl CheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// `state.serialized_by` is authoritative; callers re-tag before
    /// storing when the capture reason differs from the storage reason.
    pub fn store_checkpoint(
        &mut self,
        state: CheckpointState,
        decision_id: Option<String>,
        max_per_agent: usize,
    ) {
        let ring = self.rings.entry(state.agent_id.clone()).or_default();
        ring.push_front(CheckpointRecord { state, decision_id });
        while ring.len() > max_per_agent.max(1) {
            ring.pop_back();
        }
    }

    /// Newest-first list for an agent
    pub fn checkpoints(&self, agent_id: &str) -> Vec<&CheckpointRecord> {
        self.rings
            .get(agent_id)
            .map(|ring| ring.iter().collect())
            .unwrap_or_default()
    }

    pub fn latest_checkpoint(&self, agent_id: &str) -> Option<&CheckpointRecord> {
        self.rings.get(agent_id).and_then(|ring| ring.front())
    }

    pub fn checkpoint_count(&self, agent_id: &str) -> usize {
        self.rings.get(agent_id).map(|ring| ring.len()).unwrap_or(0)
    }

    pub fn delete_checkpoints(&mut self, agent_id: &str) -> usize {
        self.rings
            .remove(agent_id)
            .map(|ring| ring.len())
            .unwrap_or(0)
    }
}
