use std::collections::HashMap;
use std::sync::Mutex;

use tracing::debug;

use foreman_types::{
    ArtifactKind, DomainOutcome, ToolCategory, TrustChange, TrustOutcome, TrustProfile,
};

pub const DEFAULT_INITIAL_SCORE: f64 = 50.0;

const MIN_SCORE: f64 = 0.0;
const MAX_SCORE: f64 = 100.0;

/// Outcome-keyed deltas. The table is configuration, not behaviour: tuning
/// it never touches the engine.
#[derive(Debug, Clone)]
pub struct TrustConfig {
    pub initial_score: f64,
    pub task_completed_clean: f64,
    pub task_completed_partial: f64,
    pub task_abandoned_or_max_turns: f64,
    pub human_approves_recommendation: f64,
    pub human_approves_always: f64,
    pub human_rejects_tool_call: f64,
    pub error_read: f64,
    pub error_write: f64,
    pub error_execute: f64,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            initial_score: DEFAULT_INITIAL_SCORE,
            task_completed_clean: 3.0,
            task_completed_partial: 1.0,
            task_abandoned_or_max_turns: -2.0,
            human_approves_recommendation: 2.0,
            human_approves_always: 3.0,
            human_rejects_tool_call: -2.0,
            error_read: -1.0,
            error_write: -2.0,
            error_execute: -3.0,
        }
    }
}

/// Extra attribution recorded alongside an outcome
#[derive(Debug, Clone, Default)]
pub struct OutcomeContext {
    pub artifact_kinds: Option<Vec<ArtifactKind>>,
    pub workstreams: Option<Vec<String>>,
    pub tool_category: Option<ToolCategory>,
}

/// Per-agent score with outcome-keyed deltas, clamped to 0..=100
pub struct TrustEngine {
    profiles: Mutex<HashMap<String, TrustProfile>>,
    config: TrustConfig,
}

impl TrustEngine {
    pub fn new(config: TrustConfig) -> Self {
        Self {
            profiles: Mutex::new(HashMap::new()),
            config,
        }
    }

    pub fn register_agent(&self, agent_id: &str, initial_delta: f64) {
        let mut profiles = self.profiles.lock().unwrap();
        profiles
            .entry(agent_id.to_string())
            .or_insert_with(|| TrustProfile {
                agent_id: agent_id.to_string(),
                score: (self.config.initial_score + initial_delta).clamp(MIN_SCORE, MAX_SCORE),
                last_updated_tick: 0,
                domain_log: Vec::new(),
            });
    }

    pub fn get_score(&self, agent_id: &str) -> Option<f64> {
        self.profiles.lock().unwrap().get(agent_id).map(|p| p.score)
    }

    pub fn scores(&self) -> HashMap<String, f64> {
        self.profiles
            .lock()
            .unwrap()
            .iter()
            .map(|(id, p)| (id.clone(), p.score))
            .collect()
    }

    /// Apply an outcome; the agent is registered on first contact. Returns
    /// the change only when the stored score actually moved.
    pub fn apply_outcome(
        &self,
        agent_id: &str,
        outcome: TrustOutcome,
        tick: u64,
        context: OutcomeContext,
    ) -> Option<TrustChange> {
        let delta = self.delta_for(outcome, context.tool_category);

        let mut profiles = self.profiles.lock().unwrap();
        let profile = profiles
            .entry(agent_id.to_string())
            .or_insert_with(|| TrustProfile {
                agent_id: agent_id.to_string(),
                score: self.config.initial_score,
                last_updated_tick: tick,
                domain_log: Vec::new(),
            });

        let previous = profile.score;
        profile.score = (profile.score + delta).clamp(MIN_SCORE, MAX_SCORE);
        profile.last_updated_tick = tick;
        profile.domain_log.push(DomainOutcome {
            outcome,
            artifact_kinds: context.artifact_kinds,
            workstreams: context.workstreams,
            tool_category: context.tool_category,
        });

        debug!(
            agent_id,
            outcome = outcome.as_str(),
            previous,
            new = profile.score,
            "trust outcome applied"
        );

        if (profile.score - previous).abs() > f64::EPSILON {
            Some(TrustChange {
                agent_id: agent_id.to_string(),
                previous_score: previous,
                new_score: profile.score,
                delta: profile.score - previous,
                reason: outcome,
            })
        } else {
            None
        }
    }

    /// Drain and return the recorded outcomes for audit-log append
    pub fn flush_domain_log(&self, agent_id: &str) -> Vec<DomainOutcome> {
        let mut profiles = self.profiles.lock().unwrap();
        profiles
            .get_mut(agent_id)
            .map(|p| std::mem::take(&mut p.domain_log))
            .unwrap_or_default()
    }

    fn delta_for(&self, outcome: TrustOutcome, tool_category: Option<ToolCategory>) -> f64 {
        match outcome {
            TrustOutcome::TaskCompletedClean => self.config.task_completed_clean,
            TrustOutcome::TaskCompletedPartial => self.config.task_completed_partial,
            TrustOutcome::TaskAbandonedOrMaxTurns => self.config.task_abandoned_or_max_turns,
            TrustOutcome::HumanApprovesRecommendation => self.config.human_approves_recommendation,
            TrustOutcome::HumanApprovesAlways => self.config.human_approves_always,
            TrustOutcome::HumanRejectsToolCall => self.config.human_rejects_tool_call,
            TrustOutcome::ErrorEvent => match tool_category {
                Some(ToolCategory::Read) => self.config.error_read,
                Some(ToolCategory::Write) => self.config.error_write,
                Some(ToolCategory::Execute) | None => self.config.error_execute,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_and_default_score() {
        let engine = TrustEngine::new(TrustConfig::default());
        assert!(engine.get_score("agent-1").is_none());

        engine.register_agent("agent-1", 0.0);
        assert_eq!(engine.get_score("agent-1"), Some(50.0));

        engine.register_agent("agent-2", 10.0);
        assert_eq!(engine.get_score("agent-2"), Some(60.0));
    }

    #[test]
    fn test_outcomes_shift_and_clamp() {
        let engine = TrustEngine::new(TrustConfig::default());
        engine.register_agent("agent-1", 0.0);

        let change = engine
            .apply_outcome(
                "agent-1",
                TrustOutcome::TaskCompletedClean,
                1,
                OutcomeContext::default(),
            )
            .unwrap();
        assert_eq!(change.previous_score, 50.0);
        assert_eq!(change.new_score, 53.0);
        assert_eq!(change.delta, 3.0);

        for tick in 0..100 {
            engine.apply_outcome(
                "agent-1",
                TrustOutcome::TaskCompletedClean,
                tick,
                OutcomeContext::default(),
            );
        }
        assert_eq!(engine.get_score("agent-1"), Some(100.0));

        // Clamped at the ceiling: no change to report
        assert!(engine
            .apply_outcome(
                "agent-1",
                TrustOutcome::TaskCompletedClean,
                200,
                OutcomeContext::default(),
            )
            .is_none());
    }

    #[test]
    fn test_error_delta_follows_tool_category() {
        let engine = TrustEngine::new(TrustConfig::default());
        engine.register_agent("agent-1", 0.0);

        let change = engine
            .apply_outcome(
                "agent-1",
                TrustOutcome::ErrorEvent,
                1,
                OutcomeContext {
                    tool_category: Some(ToolCategory::Read),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(change.delta, -1.0);

        let change = engine
            .apply_outcome(
                "agent-1",
                TrustOutcome::ErrorEvent,
                2,
                OutcomeContext {
                    tool_category: Some(ToolCategory::Execute),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(change.delta, -3.0);
    }

    #[test]
    fn test_unknown_agent_auto_registers_on_outcome() {
        let engine = TrustEngine::new(TrustConfig::default());
        engine.apply_outcome(
            "agent-9",
            TrustOutcome::TaskCompletedPartial,
            3,
            OutcomeContext::default(),
        );
        assert_eq!(engine.get_score("agent-9"), Some(51.0));
    }

    #[test]
    fn test_domain_log_accumulates_and_flushes() {
        let engine = TrustEngine::new(TrustConfig::default());
        engine.apply_outcome(
            "agent-1",
            TrustOutcome::TaskCompletedClean,
            1,
            OutcomeContext {
                workstreams: Some(vec!["backend".to_string()]),
                ..Default::default()
            },
        );
        engine.apply_outcome(
            "agent-1",
            TrustOutcome::ErrorEvent,
            2,
            OutcomeContext {
                tool_category: Some(ToolCategory::Write),
                ..Default::default()
            },
        );

        let drained = engine.flush_domain_log("agent-1");
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].outcome, TrustOutcome::TaskCompletedClean);
        assert_eq!(drained[1].tool_category, Some(ToolCategory::Write));

        assert!(engine.flush_domain_log("agent-1").is_empty());
        assert!(engine.flush_domain_log("missing").is_empty());
    }
}
