use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use foreman_types::{
    AgentStatus, BrakeBehavior, BrakePayload, BrakeScope, ReleaseCondition,
};

use crate::coordinator::Coordinator;
use crate::error::Result;
use crate::outbound::OutboundMessage;
use crate::plugin::KillOptions;

/// Live brake bookkeeping: the payload plus the agents it actually caught
#[derive(Debug, Clone)]
pub(crate) struct BrakeState {
    pub payload: BrakePayload,
    pub braked_agents: Vec<String>,
}

impl Coordinator {
    pub fn brake_engaged(&self) -> bool {
        self.services.brake.lock().unwrap().is_some()
    }

    pub fn control_mode(&self) -> String {
        if self.brake_engaged() {
            "braked".to_string()
        } else {
            "normal".to_string()
        }
    }

    /// Agents the scope covers, at engage time
    fn agents_in_scope(&self, scope: &BrakeScope) -> Vec<String> {
        match scope {
            BrakeScope::All => self
                .services
                .registry
                .list()
                .into_iter()
                .map(|h| h.id)
                .collect(),
            BrakeScope::Agent { agent_id } => vec![agent_id.clone()],
            BrakeScope::Workstream { workstream } => {
                let store = self.services.store.lock().unwrap();
                match store.list_artifacts() {
                    Ok(grouped) => {
                        let mut agents: Vec<String> = grouped
                            .iter()
                            .filter(|g| &g.workstream == workstream)
                            .flat_map(|g| g.artifacts.iter().map(|a| a.event.agent_id.clone()))
                            .collect();
                        agents.sort_unstable();
                        agents.dedup();
                        agents
                    }
                    Err(err) => {
                        warn!(error = %err, "workstream scope lookup failed");
                        Vec::new()
                    }
                }
            }
        }
    }

    /// Engage a brake: pause (checkpointing where supported) or kill every
    /// agent in scope and suspend their pending decisions. Engaging while
    /// already braked widens to the new payload.
    pub async fn engage_brake(&self, payload: BrakePayload) -> Result<Vec<String>> {
        let agents = self.agents_in_scope(&payload.scope);
        info!(
            reason = %payload.reason,
            behavior = ?payload.behavior,
            agents = agents.len(),
            "brake engaged"
        );

        for agent_id in &agents {
            match payload.behavior {
                BrakeBehavior::Pause => {
                    if let Err(err) = self.pause_agent(agent_id).await {
                        // Metadata-only pause keeps the registry honest even
                        // when the plugin cannot snapshot
                        warn!(agent_id = %agent_id, error = %err, "plugin pause failed; marking paused");
                        self.services.registry.set_status(agent_id, AgentStatus::Paused);
                        let mut store = self.services.store.lock().unwrap();
                        if let Err(err) = store.update_agent_status(agent_id, AgentStatus::Paused) {
                            warn!(agent_id = %agent_id, error = %err, "status write failed");
                        }
                    }
                }
                BrakeBehavior::Kill => {
                    let options = KillOptions {
                        grace: true,
                        grace_timeout_ms: None,
                    };
                    if let Err(err) = self.kill_agent(agent_id, options).await {
                        warn!(agent_id = %agent_id, error = %err, "brake kill failed");
                    }
                }
            }
            self.services.queue.suspend_agent_decisions(agent_id);
        }

        {
            let mut store = self.services.store.lock().unwrap();
            store.append_audit_log(
                "brake",
                &payload.initiated_by,
                "engage",
                &payload.reason,
                Some(&serde_json::to_value(&payload).map_err(foreman_store::Error::from)?),
            )?;
        }

        *self.services.brake.lock().unwrap() = Some(BrakeState {
            payload: payload.clone(),
            braked_agents: agents.clone(),
        });

        let _ = self.services.outbound.send(OutboundMessage::Brake {
            engaged: true,
            payload: Some(payload.clone()),
        });

        self.arm_release(&payload);
        Ok(agents)
    }

    /// Release the brake: agents with a checkpoint resume through their
    /// plugin; agents without one are marked running, metadata-only.
    /// Suspended decisions return to pending.
    pub async fn release_brake(&self) -> Result<Vec<String>> {
        let Some(state) = self.services.brake.lock().unwrap().take() else {
            return Ok(Vec::new());
        };
        info!(agents = state.braked_agents.len(), "brake released");

        for agent_id in &state.braked_agents {
            let has_checkpoint = self
                .services
                .checkpoints
                .lock()
                .unwrap()
                .latest_checkpoint(agent_id)
                .is_some();

            if has_checkpoint {
                if let Err(err) = self.resume_agent(agent_id).await {
                    warn!(agent_id = %agent_id, error = %err, "resume failed on brake release");
                }
            } else if self.services.registry.get(agent_id).is_some() {
                self.services.registry.set_status(agent_id, AgentStatus::Running);
                let mut store = self.services.store.lock().unwrap();
                if let Err(err) = store.update_agent_status(agent_id, AgentStatus::Running) {
                    warn!(agent_id = %agent_id, error = %err, "status write failed");
                }
            }
            self.services.queue.resume_agent_decisions(agent_id);
        }

        {
            let mut store = self.services.store.lock().unwrap();
            store.append_audit_log(
                "brake",
                &state.payload.initiated_by,
                "release",
                &state.payload.reason,
                None,
            )?;
        }

        let _ = self.services.outbound.send(OutboundMessage::Brake {
            engaged: false,
            payload: None,
        });
        Ok(state.braked_agents)
    }

    /// Timer and decision release conditions run as background tasks;
    /// manual brakes wait for the operator.
    fn arm_release(&self, payload: &BrakePayload) {
        match &payload.release_condition {
            Some(ReleaseCondition::Timer { release_after_ms }) => {
                let coordinator = self.clone();
                let delay = Duration::from_millis(*release_after_ms);
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Err(err) = coordinator.release_brake().await {
                        warn!(error = %err, "timed brake release failed");
                    }
                });
            }
            Some(ReleaseCondition::Decision { decision_id }) => {
                let coordinator = self.clone();
                let queue = Arc::clone(&self.services.queue);
                let decision_id = decision_id.clone();
                tokio::spawn(async move {
                    match queue.wait_for_resolution(&decision_id).await {
                        Ok(_) => {
                            if let Err(err) = coordinator.release_brake().await {
                                warn!(error = %err, "decision brake release failed");
                            }
                        }
                        Err(err) => {
                            warn!(decision_id = %decision_id, error = %err, "brake release wait failed")
                        }
                    }
                });
            }
            Some(ReleaseCondition::Manual) | None => {}
        }
    }
}
