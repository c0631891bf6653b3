use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Why a checkpoint was taken. Authoritative on the stored record; callers
/// may re-tag before storing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointReason {
    Pause,
    KillGrace,
    CrashRecovery,
    DecisionCheckpoint,
    IdleCompletion,
}

/// Opaque, plugin-specific serialisation of an agent session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointState {
    pub agent_id: String,
    pub serialized_by: CheckpointReason,
    /// Plugin-owned blob; the core never looks inside
    pub payload: Value,
    pub captured_at: DateTime<Utc>,
}

impl CheckpointState {
    pub fn new(agent_id: impl Into<String>, reason: CheckpointReason, payload: Value) -> Self {
        Self {
            agent_id: agent_id.into(),
            serialized_by: reason,
            payload,
            captured_at: Utc::now(),
        }
    }

    /// Re-tag before storing, e.g. a pause snapshot reused as idle_completion
    pub fn retagged(mut self, reason: CheckpointReason) -> Self {
        self.serialized_by = reason;
        self
    }
}
