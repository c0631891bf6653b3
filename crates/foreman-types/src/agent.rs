use serde::{Deserialize, Serialize};

/// Server-side view of an agent session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Running,
    Paused,
    WaitingOnHuman,
    Idle,
    Completed,
    Error,
}

/// Registry entry for a live agent. Owned by the registry; everything else
/// holds the id, never the handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentHandle {
    pub id: String,
    pub plugin_name: String,
    pub status: AgentStatus,
    pub session_id: String,
}

impl AgentHandle {
    pub fn new(
        id: impl Into<String>,
        plugin_name: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            plugin_name: plugin_name.into(),
            status: AgentStatus::Running,
            session_id: session_id.into(),
        }
    }
}
