use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use foreman_types::{AgentHandle, CheckpointState, Resolution};

use crate::error::Result;

/// What an agent runtime implementation can do. The coordinator consults
/// this before pause/resume/brief-update calls.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PluginCapabilities {
    pub supports_pause: bool,
    pub supports_resume: bool,
    pub supports_kill: bool,
    pub supports_hot_brief_update: bool,
}

/// Initial instructions for a spawned agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentBrief {
    /// Requested agent id; the plugin may mint its own when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    pub title: String,
    pub instructions: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workstream: Option<String>,
    #[serde(default)]
    pub metadata: Value,
}

#[derive(Debug, Clone, Copy)]
pub struct KillOptions {
    pub grace: bool,
    pub grace_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct KillResult {
    pub clean_shutdown: bool,
    pub artifacts_extracted: usize,
}

/// Mid-session context pushed into a running agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextInjection {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Incremental brief update for plugins that support it
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BriefChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// Agent runtime seam. The control plane routes and gates events; plugins
/// own the actual LLM sessions.
#[async_trait]
pub trait AgentPlugin: Send + Sync {
    fn name(&self) -> &str;

    fn version(&self) -> &str;

    fn capabilities(&self) -> PluginCapabilities;

    async fn spawn(&self, brief: AgentBrief) -> Result<AgentHandle>;

    async fn kill(&self, handle: &AgentHandle, options: KillOptions) -> Result<KillResult>;

    async fn pause(&self, handle: &AgentHandle) -> Result<CheckpointState>;

    async fn resume(&self, state: &CheckpointState) -> Result<AgentHandle>;

    async fn resolve_decision(
        &self,
        handle: &AgentHandle,
        decision_id: &str,
        resolution: &Resolution,
    ) -> Result<()>;

    async fn inject_context(&self, handle: &AgentHandle, injection: ContextInjection)
        -> Result<()>;

    async fn update_brief(&self, handle: &AgentHandle, changes: BriefChanges) -> Result<()>;

    /// Best-effort snapshot request; callers log failures and continue
    async fn request_checkpoint(
        &self,
        handle: &AgentHandle,
        decision_id: Option<&str>,
    ) -> Result<CheckpointState>;
}
