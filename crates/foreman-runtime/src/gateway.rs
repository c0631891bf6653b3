use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};

use foreman_types::{AgentHandle, AgentStatus, CheckpointReason};

use crate::coordinator::Coordinator;
use crate::error::{Error, Result};
use crate::plugin::{AgentBrief, AgentPlugin, KillOptions, KillResult};

// Gateway operations: every multi-step sequence against one agent holds
// that agent's op lock across its plugin calls, so concurrent spawn/kill/
// pause/resume interleave per-agent in some serial order.

impl Coordinator {
    fn plugin(&self, name: &str) -> Result<Arc<dyn AgentPlugin>> {
        self.services
            .plugins
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownPlugin(name.to_string()))
    }

    fn handle(&self, agent_id: &str) -> Result<AgentHandle> {
        self.services
            .registry
            .get(agent_id)
            .ok_or_else(|| Error::UnknownAgent(agent_id.to_string()))
    }

    pub async fn spawn_agent(&self, plugin_name: &str, brief: AgentBrief) -> Result<AgentHandle> {
        let plugin = self.plugin(plugin_name)?;
        let handle = plugin.spawn(brief).await?;

        let _guard = self.services.registry.op_lock(&handle.id).await;
        self.services.registry.insert(handle.clone());
        self.services.trust.register_agent(&handle.id, 0.0);
        {
            let mut store = self.services.store.lock().unwrap();
            store.register_agent(&handle, None)?;
            store.append_audit_log("agent", &handle.id, "spawn", plugin_name, None)?;
        }
        info!(agent_id = %handle.id, plugin = plugin_name, "agent spawned");
        Ok(handle)
    }

    /// Kill an agent. With `grace` the agent's pending decisions get the
    /// orphan grace window; without it they move to triage immediately.
    pub async fn kill_agent(&self, agent_id: &str, options: KillOptions) -> Result<KillResult> {
        let _guard = self.services.registry.op_lock(agent_id).await;
        let handle = self.handle(agent_id)?;
        let plugin = self.plugin(&handle.plugin_name)?;

        let result = plugin.kill(&handle, options).await?;

        if options.grace {
            let tick = self.services.ticks.current_tick();
            self.services.queue.schedule_orphan_triage(agent_id, tick);
        } else {
            self.services.queue.handle_agent_killed(agent_id);
        }

        self.services.registry.remove(agent_id);
        self.services.idle_since.lock().unwrap().remove(agent_id);

        let outcomes = self.services.trust.flush_domain_log(agent_id);
        {
            let mut store = self.services.store.lock().unwrap();
            store.remove_agent(agent_id)?;
            if !outcomes.is_empty() {
                store.append_audit_log(
                    "trust",
                    agent_id,
                    "flush",
                    agent_id,
                    Some(&serde_json::to_value(&outcomes).map_err(foreman_store::Error::from)?),
                )?;
            }
            store.append_audit_log(
                "agent",
                agent_id,
                "kill",
                agent_id,
                Some(&json!({
                    "clean_shutdown": result.clean_shutdown,
                    "artifacts_extracted": result.artifacts_extracted,
                })),
            )?;
        }
        info!(agent_id, clean = result.clean_shutdown, "agent killed");
        Ok(result)
    }

    /// Pause through the plugin and keep the returned checkpoint
    pub async fn pause_agent(&self, agent_id: &str) -> Result<()> {
        let _guard = self.services.registry.op_lock(agent_id).await;
        let handle = self.handle(agent_id)?;
        let plugin = self.plugin(&handle.plugin_name)?;

        if !plugin.capabilities().supports_pause {
            return Err(Error::Conflict(format!(
                "plugin {} does not support pause",
                handle.plugin_name
            )));
        }

        let state = plugin.pause(&handle).await?;
        self.services.checkpoints.lock().unwrap().store_checkpoint(
            state,
            None,
            self.services.config.checkpoints.max_per_agent,
        );
        self.services.registry.set_status(agent_id, AgentStatus::Paused);
        self.services
            .store
            .lock()
            .unwrap()
            .update_agent_status(agent_id, AgentStatus::Paused)?;
        Ok(())
    }

    /// Resume from the latest stored checkpoint
    pub async fn resume_agent(&self, agent_id: &str) -> Result<AgentHandle> {
        let _guard = self.services.registry.op_lock(agent_id).await;
        let handle = self.handle(agent_id)?;
        let plugin = self.plugin(&handle.plugin_name)?;

        let state = self
            .services
            .checkpoints
            .lock()
            .unwrap()
            .latest_checkpoint(agent_id)
            .map(|record| record.state.clone())
            .ok_or_else(|| {
                Error::Conflict(format!("no checkpoint available for agent {}", agent_id))
            })?;

        let resumed = plugin.resume(&state).await?;
        self.services.registry.insert(resumed.clone());
        self.services.registry.set_status(&resumed.id, AgentStatus::Running);
        self.services
            .store
            .lock()
            .unwrap()
            .update_agent_status(&resumed.id, AgentStatus::Running)?;
        Ok(resumed)
    }

    /// Hand new work to an idle agent. Assignment resumes the session from
    /// its idle checkpoint; an idle agent without one is a conflict.
    pub async fn assign_work(&self, agent_id: &str, brief: AgentBrief) -> Result<AgentHandle> {
        let _guard = self.services.registry.op_lock(agent_id).await;
        let handle = self.handle(agent_id)?;
        if handle.status != AgentStatus::Idle {
            return Err(Error::Conflict(format!(
                "agent {} is {:?}, not idle",
                agent_id, handle.status
            )));
        }
        let plugin = self.plugin(&handle.plugin_name)?;

        let checkpoint = self
            .services
            .checkpoints
            .lock()
            .unwrap()
            .checkpoints(agent_id)
            .iter()
            .find(|record| record.state.serialized_by == CheckpointReason::IdleCompletion)
            .map(|record| record.state.clone())
            .ok_or_else(|| {
                Error::Conflict(format!(
                    "agent {} has no idle checkpoint; cannot assign work",
                    agent_id
                ))
            })?;

        let resumed = plugin.resume(&checkpoint).await?;
        if let Err(err) = plugin
            .update_brief(&resumed, crate::plugin::BriefChanges {
                instructions: Some(brief.instructions.clone()),
                metadata: Some(brief.metadata.clone()),
            })
            .await
        {
            warn!(agent_id, error = %err, "brief update failed after resume");
        }

        self.services.registry.insert(resumed.clone());
        self.services.registry.set_status(&resumed.id, AgentStatus::Running);
        self.services.idle_since.lock().unwrap().remove(agent_id);
        {
            let mut store = self.services.store.lock().unwrap();
            store.update_agent_status(&resumed.id, AgentStatus::Running)?;
            store.append_audit_log("agent", agent_id, "assign", &brief.title, None)?;
        }
        info!(agent_id, title = %brief.title, "work assigned");
        Ok(resumed)
    }
}
