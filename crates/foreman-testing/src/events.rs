//! Envelope and event builders with sensible defaults.
//!
//! Each helper produces a fully valid inbound envelope; tests override the
//! handful of fields a scenario cares about.

use chrono::Utc;
use serde_json::Value;

use foreman_types::{
    AgentEvent, ArtifactEvent, ArtifactKind, ArtifactStatus, BlastRadius, CompletionEvent,
    CompletionOutcome, DecisionBody, DecisionEvent, DecisionOption, ErrorCategory, ErrorContext,
    ErrorEvent, EventEnvelope, LifecycleAction, LifecycleEvent, OptionDecision, ProducedArtifact,
    Provenance, Severity, StatusEvent, ToolApprovalDecision,
};

pub fn envelope(id: &str, sequence: i64, run_id: &str, event: AgentEvent) -> EventEnvelope {
    EventEnvelope::new(id, sequence, run_id, event)
}

pub fn status(agent_id: &str, id: &str, sequence: i64) -> EventEnvelope {
    envelope(
        id,
        sequence,
        "run-1",
        AgentEvent::Status(StatusEvent {
            agent_id: agent_id.to_string(),
            message: "working".to_string(),
            tick: None,
        }),
    )
}

pub fn lifecycle(agent_id: &str, id: &str, sequence: i64, action: LifecycleAction) -> EventEnvelope {
    envelope(
        id,
        sequence,
        "run-1",
        AgentEvent::Lifecycle(LifecycleEvent {
            agent_id: agent_id.to_string(),
            action,
        }),
    )
}

pub fn artifact_event(
    agent_id: &str,
    artifact_id: &str,
    workstream: &str,
    source_path: Option<&str>,
) -> ArtifactEvent {
    ArtifactEvent {
        agent_id: agent_id.to_string(),
        artifact_id: artifact_id.to_string(),
        name: format!("{} artifact", artifact_id),
        kind: ArtifactKind::Code,
        workstream: workstream.to_string(),
        status: ArtifactStatus::Draft,
        quality_score: 0.8,
        provenance: Provenance {
            created_by: agent_id.to_string(),
            created_at: Utc::now(),
            source_path: source_path.map(String::from),
            source_artifact_ids: None,
        },
    }
}

pub fn artifact(
    agent_id: &str,
    id: &str,
    sequence: i64,
    artifact_id: &str,
    source_path: Option<&str>,
) -> EventEnvelope {
    envelope(
        id,
        sequence,
        "run-1",
        AgentEvent::Artifact(artifact_event(agent_id, artifact_id, "main", source_path)),
    )
}

pub fn option_decision(
    agent_id: &str,
    decision_id: &str,
    options: &[&str],
    recommended: Option<&str>,
) -> DecisionEvent {
    DecisionEvent {
        agent_id: agent_id.to_string(),
        body: DecisionBody::Choice(OptionDecision {
            decision_id: decision_id.to_string(),
            title: format!("decide {}", decision_id),
            summary: String::new(),
            severity: Severity::Medium,
            confidence: 0.6,
            blast_radius: BlastRadius::Artifact,
            options: options
                .iter()
                .map(|id| DecisionOption {
                    id: id.to_string(),
                    label: id.to_string(),
                    description: None,
                })
                .collect(),
            recommended_option_id: recommended.map(String::from),
            affected_artifact_ids: vec![],
            requires_rationale: false,
            due_by_tick: None,
        }),
    }
}

pub fn tool_approval(agent_id: &str, decision_id: &str, tool_name: &str) -> DecisionEvent {
    DecisionEvent {
        agent_id: agent_id.to_string(),
        body: DecisionBody::ToolApproval(ToolApprovalDecision {
            decision_id: decision_id.to_string(),
            tool_name: tool_name.to_string(),
            tool_args: Value::Null,
            severity: None,
            blast_radius: None,
            due_by_tick: None,
        }),
    }
}

pub fn decision(id: &str, sequence: i64, event: DecisionEvent) -> EventEnvelope {
    envelope(id, sequence, "run-1", AgentEvent::Decision(event))
}

pub fn completion(
    agent_id: &str,
    id: &str,
    sequence: i64,
    outcome: CompletionOutcome,
    produced: &[(&str, &str)],
) -> EventEnvelope {
    envelope(
        id,
        sequence,
        "run-1",
        AgentEvent::Completion(CompletionEvent {
            agent_id: agent_id.to_string(),
            summary: "done".to_string(),
            artifacts_produced: produced
                .iter()
                .map(|(artifact_id, workstream)| ProducedArtifact {
                    artifact_id: artifact_id.to_string(),
                    kind: ArtifactKind::Code,
                    workstream: workstream.to_string(),
                })
                .collect(),
            decisions_needed: vec![],
            outcome,
        }),
    )
}

pub fn tool_error(agent_id: &str, id: &str, sequence: i64, tool_name: &str) -> EventEnvelope {
    envelope(
        id,
        sequence,
        "run-1",
        AgentEvent::Error(ErrorEvent {
            agent_id: agent_id.to_string(),
            severity: Severity::High,
            message: format!("{} failed", tool_name),
            recoverable: true,
            category: ErrorCategory::Tool,
            context: Some(ErrorContext {
                tool_name: Some(tool_name.to_string()),
            }),
        }),
    )
}
