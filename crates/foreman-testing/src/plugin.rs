//! `NullPlugin`: an agent runtime double.
//!
//! Spawns handles without any real session behind them, answers every call
//! successfully (unless configured to fail checkpoints) and records calls
//! for assertions.

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use foreman_runtime::{
    AgentBrief, AgentPlugin, BriefChanges, ContextInjection, Error, KillOptions, KillResult,
    PluginCapabilities, Result,
};
use foreman_types::{AgentHandle, CheckpointReason, CheckpointState, Resolution};

/// Record of every call the coordinator made
#[derive(Debug, Default, Clone)]
pub struct PluginLog {
    pub spawned: Vec<String>,
    pub killed: Vec<String>,
    pub paused: Vec<String>,
    pub resumed: Vec<String>,
    pub checkpoints: Vec<(String, Option<String>)>,
    pub resolutions: Vec<String>,
}

pub struct NullPlugin {
    name: String,
    fail_checkpoints: bool,
    log: Mutex<PluginLog>,
}

impl NullPlugin {
    pub fn new() -> Self {
        Self::named("null")
    }

    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fail_checkpoints: false,
            log: Mutex::new(PluginLog::default()),
        }
    }

    /// Make every checkpoint request fail, for best-effort-path tests
    pub fn failing_checkpoints(mut self) -> Self {
        self.fail_checkpoints = true;
        self
    }

    pub fn log(&self) -> PluginLog {
        self.log.lock().unwrap().clone()
    }
}

impl Default for NullPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentPlugin for NullPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        "0.0.0"
    }

    fn capabilities(&self) -> PluginCapabilities {
        PluginCapabilities {
            supports_pause: true,
            supports_resume: true,
            supports_kill: true,
            supports_hot_brief_update: true,
        }
    }

    async fn spawn(&self, brief: AgentBrief) -> Result<AgentHandle> {
        let agent_id = brief
            .agent_id
            .unwrap_or_else(|| format!("agent-{}", Uuid::new_v4()));
        self.log.lock().unwrap().spawned.push(agent_id.clone());
        Ok(AgentHandle::new(
            agent_id.clone(),
            self.name.clone(),
            format!("session-{}", agent_id),
        ))
    }

    async fn kill(&self, handle: &AgentHandle, _options: KillOptions) -> Result<KillResult> {
        self.log.lock().unwrap().killed.push(handle.id.clone());
        Ok(KillResult {
            clean_shutdown: true,
            artifacts_extracted: 0,
        })
    }

    async fn pause(&self, handle: &AgentHandle) -> Result<CheckpointState> {
        self.log.lock().unwrap().paused.push(handle.id.clone());
        Ok(CheckpointState::new(
            handle.id.clone(),
            CheckpointReason::Pause,
            json!({ "session_id": handle.session_id }),
        ))
    }

    async fn resume(&self, state: &CheckpointState) -> Result<AgentHandle> {
        self.log.lock().unwrap().resumed.push(state.agent_id.clone());
        Ok(AgentHandle::new(
            state.agent_id.clone(),
            self.name.clone(),
            format!("session-{}", Uuid::new_v4()),
        ))
    }

    async fn resolve_decision(
        &self,
        _handle: &AgentHandle,
        decision_id: &str,
        _resolution: &Resolution,
    ) -> Result<()> {
        self.log
            .lock()
            .unwrap()
            .resolutions
            .push(decision_id.to_string());
        Ok(())
    }

    async fn inject_context(
        &self,
        _handle: &AgentHandle,
        _injection: ContextInjection,
    ) -> Result<()> {
        Ok(())
    }

    async fn update_brief(&self, _handle: &AgentHandle, _changes: BriefChanges) -> Result<()> {
        Ok(())
    }

    async fn request_checkpoint(
        &self,
        handle: &AgentHandle,
        decision_id: Option<&str>,
    ) -> Result<CheckpointState> {
        if self.fail_checkpoints {
            return Err(Error::Plugin("checkpoint unavailable".to_string()));
        }
        self.log
            .lock()
            .unwrap()
            .checkpoints
            .push((handle.id.clone(), decision_id.map(String::from)));
        Ok(CheckpointState::new(
            handle.id.clone(),
            CheckpointReason::Pause,
            json!({ "session_id": handle.session_id }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_null_plugin_round_trip() {
        let plugin = NullPlugin::new();
        let handle = plugin
            .spawn(AgentBrief {
                agent_id: Some("agent-1".to_string()),
                title: "t".to_string(),
                instructions: "i".to_string(),
                workstream: None,
                metadata: json!({}),
            })
            .await
            .unwrap();
        assert_eq!(handle.id, "agent-1");

        let checkpoint = plugin.request_checkpoint(&handle, Some("dec-1")).await.unwrap();
        assert_eq!(checkpoint.agent_id, "agent-1");

        let resumed = plugin.resume(&checkpoint).await.unwrap();
        assert_eq!(resumed.id, "agent-1");

        let log = plugin.log();
        assert_eq!(log.spawned, vec!["agent-1"]);
        assert_eq!(log.checkpoints.len(), 1);
    }

    #[tokio::test]
    async fn test_failing_checkpoints() {
        let plugin = NullPlugin::new().failing_checkpoints();
        let handle = AgentHandle::new("agent-1", "null", "s");
        assert!(plugin.request_checkpoint(&handle, None).await.is_err());
    }
}
