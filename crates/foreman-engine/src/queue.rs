use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{info, warn};

use foreman_types::{
    ActionKind, ApprovalAction, DecisionBody, DecisionEvent, Resolution,
};

use crate::error::{Error, Result};
use crate::tick::{TickHandlerId, TickService};

pub const DEFAULT_TIMEOUT_TICKS: u64 = 300;
pub const DEFAULT_ORPHAN_GRACE_TICKS: u64 = 30;

/// Priority bump applied when a decision enters triage
const TRIAGE_PRIORITY_BUMP: u32 = 100;

const BADGE_AGENT_KILLED: &str = "agent killed";
const BADGE_GRACE_PERIOD: &str = "grace period";
const BADGE_AGENT_BRAKED: &str = "source agent braked";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    Pending,
    Resolved,
    TimedOut,
    Triage,
    Suspended,
}

/// A decision held for a human. Owned exclusively by the queue; history is
/// retained forever, resolutions are additive.
#[derive(Debug, Clone, Serialize)]
pub struct QueuedDecision {
    pub event: DecisionEvent,
    pub status: DecisionStatus,
    pub enqueued_at_tick: u64,
    pub priority: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grace_deadline_tick: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
}

#[derive(Debug, Clone)]
pub struct DecisionPolicy {
    /// None disables timeout sweeps entirely
    pub timeout_ticks: Option<u64>,
    pub orphan_grace_period_ticks: u64,
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self {
            timeout_ticks: Some(DEFAULT_TIMEOUT_TICKS),
            orphan_grace_period_ticks: DEFAULT_ORPHAN_GRACE_TICKS,
        }
    }
}

#[derive(Default)]
struct QueueState {
    decisions: HashMap<String, QueuedDecision>,
    waiters: HashMap<String, Vec<oneshot::Sender<Resolution>>>,
}

/// Priority-ordered blocking decisions with tick-driven timeout,
/// auto-recommend, orphan grace and suspend/resume.
pub struct DecisionQueue {
    state: Mutex<QueueState>,
    policy: DecisionPolicy,
}

impl DecisionQueue {
    pub fn new(policy: DecisionPolicy) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            policy,
        }
    }

    /// Enqueue at the current tick. Re-enqueueing a known decision id is a
    /// no-op; returns false in that case.
    pub fn enqueue(&self, event: DecisionEvent, tick: u64) -> bool {
        let mut state = self.state.lock().unwrap();
        let decision_id = event.decision_id().to_string();
        if state.decisions.contains_key(&decision_id) {
            return false;
        }
        let priority = event.severity().priority();
        state.decisions.insert(
            decision_id.clone(),
            QueuedDecision {
                event,
                status: DecisionStatus::Pending,
                enqueued_at_tick: tick,
                priority,
                badge: None,
                grace_deadline_tick: None,
                resolved_at: None,
                resolution: None,
            },
        );
        info!(decision_id = %decision_id, tick, "decision enqueued");
        true
    }

    /// Resolve a pending decision. Resolving an unknown or already-settled
    /// decision is a no-op returning None.
    pub fn resolve(&self, decision_id: &str, resolution: Resolution) -> Option<QueuedDecision> {
        let mut state = self.state.lock().unwrap();
        let decision = state.decisions.get_mut(decision_id)?;
        if decision.status != DecisionStatus::Pending {
            return None;
        }
        decision.status = DecisionStatus::Resolved;
        decision.resolution = Some(resolution.clone());
        decision.resolved_at = Some(Utc::now());
        let settled = decision.clone();

        notify_waiters(&mut state, decision_id, &resolution);
        Some(settled)
    }

    /// Suspend until the decision settles. A decision that already carries
    /// a resolution (resolved or timed out) answers synchronously.
    pub async fn wait_for_resolution(&self, decision_id: &str) -> Result<Resolution> {
        let receiver = {
            let mut state = self.state.lock().unwrap();
            let decision = state
                .decisions
                .get(decision_id)
                .ok_or_else(|| Error::UnknownDecision(decision_id.to_string()))?;
            if let Some(resolution) = &decision.resolution {
                return Ok(resolution.clone());
            }
            let (tx, rx) = oneshot::channel();
            state
                .waiters
                .entry(decision_id.to_string())
                .or_default()
                .push(tx);
            rx
        };

        receiver
            .await
            .map_err(|_| Error::ResolutionChannel(decision_id.to_string()))
    }

    pub fn get(&self, decision_id: &str) -> Option<QueuedDecision> {
        self.state.lock().unwrap().decisions.get(decision_id).cloned()
    }

    /// Pending decisions, highest priority first. Ties carry no defined
    /// order.
    pub fn list_pending(&self, agent_id: Option<&str>) -> Vec<QueuedDecision> {
        let state = self.state.lock().unwrap();
        let mut pending: Vec<QueuedDecision> = state
            .decisions
            .values()
            .filter(|d| d.status == DecisionStatus::Pending)
            .filter(|d| agent_id.is_none_or(|id| d.event.agent_id == id))
            .cloned()
            .collect();
        pending.sort_by(|a, b| b.priority.cmp(&a.priority));
        pending
    }

    pub fn list_all(&self) -> Vec<QueuedDecision> {
        self.state.lock().unwrap().decisions.values().cloned().collect()
    }

    /// The owning agent is gone: move its pending decisions straight to
    /// triage.
    pub fn handle_agent_killed(&self, agent_id: &str) {
        let mut state = self.state.lock().unwrap();
        for decision in pending_for_agent(&mut state, agent_id) {
            decision.status = DecisionStatus::Triage;
            decision.badge = Some(BADGE_AGENT_KILLED.to_string());
            decision.priority += TRIAGE_PRIORITY_BUMP;
            decision.grace_deadline_tick = None;
        }
    }

    /// Like `handle_agent_killed` but deferred: decisions stay resolvable
    /// for the grace window, then the tick sweep moves them to triage.
    pub fn schedule_orphan_triage(&self, agent_id: &str, tick: u64) {
        let deadline = tick + self.policy.orphan_grace_period_ticks;
        let mut state = self.state.lock().unwrap();
        for decision in pending_for_agent(&mut state, agent_id) {
            decision.badge = Some(BADGE_GRACE_PERIOD.to_string());
            decision.grace_deadline_tick = Some(deadline);
        }
    }

    /// Brake engaged: park the agent's pending decisions. Suspended
    /// decisions are exempt from every timeout.
    pub fn suspend_agent_decisions(&self, agent_id: &str) {
        let mut state = self.state.lock().unwrap();
        for decision in pending_for_agent(&mut state, agent_id) {
            decision.status = DecisionStatus::Suspended;
            decision.badge = Some(BADGE_AGENT_BRAKED.to_string());
        }
    }

    /// Brake released: suspended decisions return to pending
    pub fn resume_agent_decisions(&self, agent_id: &str) {
        let mut state = self.state.lock().unwrap();
        for decision in state.decisions.values_mut() {
            if decision.status == DecisionStatus::Suspended && decision.event.agent_id == agent_id {
                decision.status = DecisionStatus::Pending;
                decision.badge = None;
            }
        }
    }

    /// Tick sweep: expired grace windows first, then timeouts
    pub fn on_tick(&self, tick: u64) {
        let mut state = self.state.lock().unwrap();

        let ids: Vec<String> = state.decisions.keys().cloned().collect();
        for id in &ids {
            let Some(decision) = state.decisions.get_mut(id) else {
                continue;
            };
            if decision.status != DecisionStatus::Pending {
                continue;
            }
            if let Some(deadline) = decision.grace_deadline_tick {
                if tick >= deadline {
                    decision.status = DecisionStatus::Triage;
                    decision.badge = Some(BADGE_AGENT_KILLED.to_string());
                    decision.priority += TRIAGE_PRIORITY_BUMP;
                    decision.grace_deadline_tick = None;
                    warn!(decision_id = %id, tick, "orphan grace expired; moved to triage");
                }
            }
        }

        let Some(timeout_ticks) = self.policy.timeout_ticks else {
            return;
        };
        for id in &ids {
            let Some(decision) = state.decisions.get_mut(id) else {
                continue;
            };
            if decision.status != DecisionStatus::Pending {
                continue;
            }
            let due = decision.event.due_by_tick().is_some_and(|due| tick >= due);
            let aged = tick.saturating_sub(decision.enqueued_at_tick) >= timeout_ticks;
            if !due && !aged {
                continue;
            }

            let resolution = auto_recommend(&decision.event);
            decision.status = DecisionStatus::TimedOut;
            decision.resolution = Some(resolution.clone());
            decision.resolved_at = Some(Utc::now());
            info!(decision_id = %id, tick, "decision timed out; auto-recommended");

            notify_waiters(&mut state, id, &resolution);
        }
    }

    /// Register the tick sweep on a tick service
    pub fn subscribe_to(self: &Arc<Self>, ticks: &TickService) -> TickHandlerId {
        let queue = Arc::clone(self);
        ticks.on_tick(move |tick| {
            queue.on_tick(tick);
            Ok(())
        })
    }
}

fn pending_for_agent<'a>(
    state: &'a mut QueueState,
    agent_id: &'a str,
) -> impl Iterator<Item = &'a mut QueuedDecision> + 'a {
    state
        .decisions
        .values_mut()
        .filter(move |d| d.status == DecisionStatus::Pending && d.event.agent_id == agent_id)
}

fn notify_waiters(state: &mut QueueState, decision_id: &str, resolution: &Resolution) {
    if let Some(waiters) = state.waiters.remove(decision_id) {
        for waiter in waiters {
            let _ = waiter.send(resolution.clone());
        }
    }
}

/// Timeout resolution: option decisions take the recommendation (or the
/// first option), tool approvals auto-approve.
fn auto_recommend(event: &DecisionEvent) -> Resolution {
    match &event.body {
        DecisionBody::Choice(decision) => {
            let chosen = decision
                .recommended_option_id
                .clone()
                .or_else(|| decision.options.first().map(|o| o.id.clone()))
                .unwrap_or_default();
            Resolution::Choice {
                chosen_option_id: chosen,
                rationale: "Auto-recommended due to timeout".to_string(),
                action_kind: ActionKind::Review,
            }
        }
        DecisionBody::ToolApproval(_) => Resolution::ToolApproval {
            action: ApprovalAction::Approve,
            modified_args: None,
            always_approve: None,
            rationale: Some("Auto-approved due to timeout".to_string()),
            action_kind: ActionKind::Review,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use foreman_types::{
        BlastRadius, DecisionOption, OptionDecision, Severity, ToolApprovalDecision,
    };

    fn option_decision(agent: &str, id: &str, severity: Severity) -> DecisionEvent {
        DecisionEvent {
            agent_id: agent.to_string(),
            body: DecisionBody::Choice(OptionDecision {
                decision_id: id.to_string(),
                title: "choose".to_string(),
                summary: String::new(),
                severity,
                confidence: 0.5,
                blast_radius: BlastRadius::Artifact,
                options: vec![
                    DecisionOption {
                        id: "o1".to_string(),
                        label: "first".to_string(),
                        description: None,
                    },
                    DecisionOption {
                        id: "o2".to_string(),
                        label: "second".to_string(),
                        description: None,
                    },
                ],
                recommended_option_id: Some("o1".to_string()),
                affected_artifact_ids: vec![],
                requires_rationale: false,
                due_by_tick: None,
            }),
        }
    }

    fn tool_decision(agent: &str, id: &str, due_by_tick: Option<u64>) -> DecisionEvent {
        DecisionEvent {
            agent_id: agent.to_string(),
            body: DecisionBody::ToolApproval(ToolApprovalDecision {
                decision_id: id.to_string(),
                tool_name: "shell".to_string(),
                tool_args: serde_json::Value::Null,
                severity: None,
                blast_radius: None,
                due_by_tick,
            }),
        }
    }

    fn human_choice(option: &str) -> Resolution {
        Resolution::Choice {
            chosen_option_id: option.to_string(),
            rationale: "reviewed".to_string(),
            action_kind: ActionKind::Update,
        }
    }

    #[test]
    fn test_enqueue_is_idempotent_per_decision_id() {
        let queue = DecisionQueue::new(DecisionPolicy::default());
        assert!(queue.enqueue(option_decision("a", "dec-1", Severity::High), 0));
        assert!(!queue.enqueue(option_decision("a", "dec-1", Severity::Low), 5));

        let stored = queue.get("dec-1").unwrap();
        assert_eq!(stored.enqueued_at_tick, 0);
        assert_eq!(stored.priority, 40);
    }

    #[test]
    fn test_list_pending_orders_by_priority() {
        let queue = DecisionQueue::new(DecisionPolicy::default());
        queue.enqueue(option_decision("a", "low", Severity::Low), 0);
        queue.enqueue(option_decision("a", "critical", Severity::Critical), 0);
        queue.enqueue(tool_decision("b", "tool", None), 0);

        let pending = queue.list_pending(None);
        let priorities: Vec<u32> = pending.iter().map(|d| d.priority).collect();
        assert_eq!(priorities, vec![50, 30, 20]);

        let only_a = queue.list_pending(Some("a"));
        assert_eq!(only_a.len(), 2);
    }

    #[test]
    fn test_resolve_once_then_noop() {
        let queue = DecisionQueue::new(DecisionPolicy::default());
        queue.enqueue(option_decision("a", "dec-1", Severity::Medium), 0);

        let settled = queue.resolve("dec-1", human_choice("o2")).unwrap();
        assert_eq!(settled.status, DecisionStatus::Resolved);

        assert!(queue.resolve("dec-1", human_choice("o1")).is_none());
        assert!(queue.resolve("missing", human_choice("o1")).is_none());
    }

    #[tokio::test]
    async fn test_waiters_resolve_and_late_waiters_get_stored_resolution() {
        let queue = Arc::new(DecisionQueue::new(DecisionPolicy::default()));
        queue.enqueue(option_decision("a", "dec-1", Severity::Medium), 0);

        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.wait_for_resolution("dec-1").await })
        };
        tokio::task::yield_now().await;

        queue.resolve("dec-1", human_choice("o2"));
        let resolution = waiter.await.unwrap().unwrap();
        match resolution {
            Resolution::Choice { chosen_option_id, .. } => assert_eq!(chosen_option_id, "o2"),
            _ => panic!("Wrong resolution type"),
        }

        // Late waiter answers synchronously from the stored resolution
        let late = queue.wait_for_resolution("dec-1").await.unwrap();
        assert!(matches!(late, Resolution::Choice { .. }));

        assert!(queue.wait_for_resolution("missing").await.is_err());
    }

    #[test]
    fn test_timeout_auto_recommends_option() {
        let queue = DecisionQueue::new(DecisionPolicy {
            timeout_ticks: Some(3),
            ..Default::default()
        });
        queue.enqueue(option_decision("a", "dec-1", Severity::Medium), 0);

        queue.on_tick(2);
        assert_eq!(queue.get("dec-1").unwrap().status, DecisionStatus::Pending);

        queue.on_tick(3);
        let timed_out = queue.get("dec-1").unwrap();
        assert_eq!(timed_out.status, DecisionStatus::TimedOut);
        match timed_out.resolution.unwrap() {
            Resolution::Choice {
                chosen_option_id,
                rationale,
                action_kind,
            } => {
                assert_eq!(chosen_option_id, "o1");
                assert_eq!(rationale, "Auto-recommended due to timeout");
                assert_eq!(action_kind, ActionKind::Review);
            }
            _ => panic!("Wrong resolution type"),
        }
    }

    #[test]
    fn test_due_by_tick_beats_age_timeout() {
        let queue = DecisionQueue::new(DecisionPolicy {
            timeout_ticks: Some(300),
            ..Default::default()
        });
        queue.enqueue(tool_decision("a", "dec-1", Some(2)), 0);

        queue.on_tick(2);
        let timed_out = queue.get("dec-1").unwrap();
        assert_eq!(timed_out.status, DecisionStatus::TimedOut);
        match timed_out.resolution.unwrap() {
            Resolution::ToolApproval { action, rationale, .. } => {
                assert_eq!(action, ApprovalAction::Approve);
                assert_eq!(rationale.as_deref(), Some("Auto-approved due to timeout"));
            }
            _ => panic!("Wrong resolution type"),
        }
    }

    #[test]
    fn test_null_timeout_disables_sweeps() {
        let queue = DecisionQueue::new(DecisionPolicy {
            timeout_ticks: None,
            ..Default::default()
        });
        queue.enqueue(tool_decision("a", "dec-1", Some(1)), 0);

        queue.on_tick(10_000);
        assert_eq!(queue.get("dec-1").unwrap().status, DecisionStatus::Pending);
    }

    #[test]
    fn test_agent_killed_immediate_triage() {
        let queue = DecisionQueue::new(DecisionPolicy::default());
        queue.enqueue(option_decision("a", "dec-1", Severity::Medium), 0);
        queue.enqueue(option_decision("b", "dec-2", Severity::Medium), 0);

        queue.handle_agent_killed("a");
        let orphaned = queue.get("dec-1").unwrap();
        assert_eq!(orphaned.status, DecisionStatus::Triage);
        assert_eq!(orphaned.badge.as_deref(), Some("agent killed"));
        assert_eq!(orphaned.priority, 130);
        assert_eq!(queue.get("dec-2").unwrap().status, DecisionStatus::Pending);
    }

    #[test]
    fn test_orphan_grace_defers_triage_and_allows_resolution() {
        let queue = DecisionQueue::new(DecisionPolicy {
            orphan_grace_period_ticks: 5,
            ..Default::default()
        });
        queue.enqueue(option_decision("a", "dec-1", Severity::Medium), 0);
        queue.enqueue(option_decision("a", "dec-2", Severity::Medium), 0);
        queue.schedule_orphan_triage("a", 10);

        let graced = queue.get("dec-1").unwrap();
        assert_eq!(graced.status, DecisionStatus::Pending);
        assert_eq!(graced.badge.as_deref(), Some("grace period"));
        assert_eq!(graced.grace_deadline_tick, Some(15));

        // A human resolves one inside the window
        queue.resolve("dec-1", human_choice("o1"));

        queue.on_tick(15);
        assert_eq!(queue.get("dec-1").unwrap().status, DecisionStatus::Resolved);
        let triaged = queue.get("dec-2").unwrap();
        assert_eq!(triaged.status, DecisionStatus::Triage);
        assert_eq!(triaged.badge.as_deref(), Some("agent killed"));
        assert!(triaged.grace_deadline_tick.is_none());
    }

    #[test]
    fn test_suspend_exempts_from_timeout_and_resume_restores() {
        let queue = DecisionQueue::new(DecisionPolicy {
            timeout_ticks: Some(2),
            ..Default::default()
        });
        queue.enqueue(option_decision("a", "dec-1", Severity::Medium), 0);
        queue.suspend_agent_decisions("a");

        let suspended = queue.get("dec-1").unwrap();
        assert_eq!(suspended.status, DecisionStatus::Suspended);
        assert_eq!(suspended.badge.as_deref(), Some("source agent braked"));

        queue.on_tick(50);
        assert_eq!(queue.get("dec-1").unwrap().status, DecisionStatus::Suspended);

        // Suspended decisions are unresolvable until release
        assert!(queue.resolve("dec-1", human_choice("o1")).is_none());

        queue.resume_agent_decisions("a");
        let restored = queue.get("dec-1").unwrap();
        assert_eq!(restored.status, DecisionStatus::Pending);
        assert!(restored.badge.is_none());
    }

    #[test]
    fn test_tick_subscription_drives_sweep() {
        let ticks = TickService::manual();
        let queue = Arc::new(DecisionQueue::new(DecisionPolicy {
            timeout_ticks: Some(3),
            ..Default::default()
        }));
        queue.subscribe_to(&ticks);

        queue.enqueue(option_decision("a", "dec-1", Severity::Medium), 0);
        ticks.advance(3);
        assert_eq!(queue.get("dec-1").unwrap().status, DecisionStatus::TimedOut);
    }
}
