use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{info, warn};

use foreman_engine::{
    CoherenceMonitor, DecisionQueue, EventBus, QueuedDecision, ReviewProvider, TickService,
    TrustEngine,
};
use foreman_store::{CheckpointStore, KnowledgeStore};
use foreman_types::{
    AgentStatus, EventEnvelope, Resolution, TrustOutcome,
};

use crate::config::{Config, TickMode};
use crate::error::Result;
use crate::handlers;
use crate::outbound::OutboundMessage;
use crate::plugin::AgentPlugin;
use crate::quarantine::{Quarantine, QuarantinedPayload};
use crate::registry::AgentRegistry;

const OUTBOUND_CHANNEL_CAPACITY: usize = 1024;

/// What happened to one inbound payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Published,
    Deduplicated,
    Quarantined,
}

/// Shared service singletons. Writers are exactly the subscribers wired in
/// `handlers` plus the gateway operations on `Coordinator`.
pub(crate) struct Services {
    pub(crate) config: Config,
    pub(crate) bus: Arc<EventBus>,
    pub(crate) ticks: Arc<TickService>,
    pub(crate) queue: Arc<DecisionQueue>,
    pub(crate) trust: Arc<TrustEngine>,
    pub(crate) coherence: Arc<CoherenceMonitor>,
    pub(crate) store: Arc<Mutex<KnowledgeStore>>,
    pub(crate) checkpoints: Arc<Mutex<CheckpointStore>>,
    pub(crate) registry: Arc<AgentRegistry>,
    pub(crate) plugins: HashMap<String, Arc<dyn AgentPlugin>>,
    pub(crate) review: Arc<dyn ReviewProvider>,
    pub(crate) outbound: broadcast::Sender<OutboundMessage>,
    pub(crate) quarantine: Quarantine,
    /// agent id -> tick at which it went idle
    pub(crate) idle_since: Mutex<HashMap<String, u64>>,
    /// collapses overlapping coherence pipeline runs
    pub(crate) pipeline_running: AtomicBool,
    pub(crate) brake: Mutex<Option<crate::brake::BrakeState>>,
}

/// Orchestrates the high-level operations of the control plane: envelope
/// ingestion, agent gateway calls, decision resolution, brake and state
/// sync. Everything event-driven happens in the handler graph it installs
/// at construction.
///
/// Cloning is cheap and shares the same service singletons.
#[derive(Clone)]
pub struct Coordinator {
    pub(crate) services: Arc<Services>,
}

impl Coordinator {
    pub fn new(
        config: Config,
        store: KnowledgeStore,
        plugins: Vec<Arc<dyn AgentPlugin>>,
    ) -> Self {
        Self::with_review(config, store, plugins, Arc::new(foreman_engine::NoopReview))
    }

    pub fn with_review(
        config: Config,
        store: KnowledgeStore,
        plugins: Vec<Arc<dyn AgentPlugin>>,
        review: Arc<dyn ReviewProvider>,
    ) -> Self {
        let bus = Arc::new(EventBus::new(config.bus_config()));
        let ticks = Arc::new(TickService::manual());
        let queue = Arc::new(DecisionQueue::new(config.decision_policy()));
        let trust = Arc::new(TrustEngine::new(config.trust_config()));
        let coherence = Arc::new(CoherenceMonitor::new(config.coherence_config()));
        let (outbound, _) = broadcast::channel(OUTBOUND_CHANNEL_CAPACITY);

        let plugins = plugins
            .into_iter()
            .map(|p| (p.name().to_string(), p))
            .collect();

        let services = Arc::new(Services {
            config,
            bus,
            ticks,
            queue: Arc::clone(&queue),
            trust,
            coherence,
            store: Arc::new(Mutex::new(store)),
            checkpoints: Arc::new(Mutex::new(CheckpointStore::new())),
            registry: Arc::new(AgentRegistry::new()),
            plugins,
            review,
            outbound,
            quarantine: Quarantine::new(),
            idle_since: Mutex::new(HashMap::new()),
            pipeline_running: AtomicBool::new(false),
            brake: Mutex::new(None),
        });

        // The decision sweep runs before the coherence/idle sweep on every
        // tick; both are installed here, once.
        queue.subscribe_to(&services.ticks);
        handlers::install(&services);

        if services.config.tick.mode == TickMode::Interval {
            if tokio::runtime::Handle::try_current().is_ok() {
                services
                    .ticks
                    .start_interval(std::time::Duration::from_millis(
                        services.config.tick.interval_ms,
                    ));
            } else {
                warn!("interval tick mode requires a tokio runtime; staying manual");
            }
        }

        Self { services }
    }

    /// Parse and publish one inbound payload. Schema rejections are
    /// quarantined with the original payload and the validation error.
    pub fn ingest(&self, payload: Value) -> IngestOutcome {
        let envelope: EventEnvelope = match serde_json::from_value(payload.clone()) {
            Ok(envelope) => envelope,
            Err(err) => {
                self.services.quarantine.add(payload, err.to_string());
                return IngestOutcome::Quarantined;
            }
        };

        if let Err(reason) = validate_envelope(&envelope) {
            self.services.quarantine.add(payload, reason);
            return IngestOutcome::Quarantined;
        }

        if self.services.bus.publish(&envelope) {
            IngestOutcome::Published
        } else {
            IngestOutcome::Deduplicated
        }
    }

    /// Publish an already-validated envelope; returns false on dedup
    pub fn publish(&self, envelope: &EventEnvelope) -> bool {
        self.services.bus.publish(envelope)
    }

    /// Resolve a pending decision on behalf of a human. Unknown or settled
    /// decisions resolve to None without error.
    pub async fn resolve_decision(
        &self,
        decision_id: &str,
        resolution: Resolution,
    ) -> Result<Option<QueuedDecision>> {
        let Some(settled) = self.services.queue.resolve(decision_id, resolution.clone()) else {
            return Ok(None);
        };
        let agent_id = settled.event.agent_id.clone();
        info!(decision_id, agent_id = %agent_id, "decision resolved by human");

        {
            let mut store = self.services.store.lock().unwrap();
            store.append_audit_log(
                "decision",
                &agent_id,
                "resolve",
                decision_id,
                Some(&serde_json::to_value(&resolution).map_err(foreman_store::Error::from)?),
            )?;
        }

        if let Some(outcome) = approval_outcome(&resolution) {
            let tick = self.services.ticks.current_tick();
            if let Some(change) = self.services.trust.apply_outcome(
                &agent_id,
                outcome,
                tick,
                Default::default(),
            ) {
                let _ = self
                    .services
                    .outbound
                    .send(OutboundMessage::TrustUpdate { change });
            }
        }

        // Hand the verdict back to the agent runtime, best-effort
        if let Some(handle) = self.services.registry.get(&agent_id) {
            if let Some(plugin) = self.services.plugins.get(&handle.plugin_name) {
                let plugin = Arc::clone(plugin);
                let resolution = resolution.clone();
                let decision_id = decision_id.to_string();
                let handle_for_plugin = handle.clone();
                tokio::spawn(async move {
                    if let Err(err) = plugin
                        .resolve_decision(&handle_for_plugin, &decision_id, &resolution)
                        .await
                    {
                        warn!(decision_id = %decision_id, error = %err, "plugin resolve_decision failed");
                    }
                });
            }

            // Nothing left to wait on: the agent goes back to work
            if handle.status == AgentStatus::WaitingOnHuman
                && self.services.queue.list_pending(Some(&agent_id)).is_empty()
            {
                self.services.registry.set_status(&agent_id, AgentStatus::Running);
                let mut store = self.services.store.lock().unwrap();
                if let Err(err) = store.update_agent_status(&agent_id, AgentStatus::Running) {
                    warn!(agent_id = %agent_id, error = %err, "status write failed");
                }
            }
        }

        let _ = self.services.outbound.send(OutboundMessage::DecisionResolved {
            decision_id: decision_id.to_string(),
            resolution,
            timed_out: false,
        });

        Ok(Some(settled))
    }

    /// Full `state_sync` message: store snapshot with pending decisions
    /// injected, live agents, trust scores and the control mode.
    pub fn state_message(&self) -> Result<OutboundMessage> {
        let mut snapshot = self.services.store.lock().unwrap().snapshot()?;
        snapshot.pending_decisions = self
            .services
            .queue
            .list_pending(None)
            .iter()
            .filter_map(|d| serde_json::to_value(d).ok())
            .collect();

        Ok(OutboundMessage::StateSync {
            snapshot,
            active_agents: self.services.registry.list(),
            trust_scores: self.services.trust.scores(),
            control_mode: self.control_mode(),
        })
    }

    pub fn subscribe_outbound(&self) -> broadcast::Receiver<OutboundMessage> {
        self.services.outbound.subscribe()
    }

    pub fn outbound_sender(&self) -> broadcast::Sender<OutboundMessage> {
        self.services.outbound.clone()
    }

    pub fn pending_decisions(&self, agent_id: Option<&str>) -> Vec<QueuedDecision> {
        self.services.queue.list_pending(agent_id)
    }

    /// Every decision ever enqueued, settled ones included
    pub fn all_decisions(&self) -> Vec<QueuedDecision> {
        self.services.queue.list_all()
    }

    pub fn decision(&self, decision_id: &str) -> Option<QueuedDecision> {
        self.services.queue.get(decision_id)
    }

    pub fn quarantined(&self) -> Vec<QuarantinedPayload> {
        self.services.quarantine.list()
    }

    pub fn clear_quarantine(&self) -> usize {
        self.services.quarantine.clear()
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.services.bus
    }

    pub fn ticks(&self) -> &Arc<TickService> {
        &self.services.ticks
    }

    pub fn trust(&self) -> &Arc<TrustEngine> {
        &self.services.trust
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.services.registry
    }

    pub fn store(&self) -> &Arc<Mutex<KnowledgeStore>> {
        &self.services.store
    }

    pub fn checkpoints(&self) -> &Arc<Mutex<CheckpointStore>> {
        &self.services.checkpoints
    }

    /// Stop the clock first so nothing re-arms, then let owners of the hub
    /// and child processes finish their own teardown.
    pub fn shutdown(&self) {
        info!("coordinator shutting down");
        self.services.ticks.stop();
    }
}

fn validate_envelope(envelope: &EventEnvelope) -> std::result::Result<(), String> {
    if envelope.source_event_id.is_empty() {
        return Err("source_event_id must be non-empty".to_string());
    }
    if envelope.run_id.is_empty() {
        return Err("run_id must be non-empty".to_string());
    }
    if envelope.source_sequence < 0 {
        return Err("source_sequence must be non-negative on inbound envelopes".to_string());
    }
    if envelope.agent_id().is_empty() {
        return Err("agent_id must be non-empty".to_string());
    }
    Ok(())
}

fn approval_outcome(resolution: &Resolution) -> Option<TrustOutcome> {
    // Modified approvals carry no trust signal until the upstream defines one
    match resolution {
        Resolution::ToolApproval {
            action: foreman_types::ApprovalAction::Approve,
            always_approve,
            ..
        } => {
            if *always_approve == Some(true) {
                Some(TrustOutcome::HumanApprovesAlways)
            } else {
                Some(TrustOutcome::HumanApprovesRecommendation)
            }
        }
        Resolution::ToolApproval {
            action: foreman_types::ApprovalAction::Reject,
            ..
        } => Some(TrustOutcome::HumanRejectsToolCall),
        _ => None,
    }
}
