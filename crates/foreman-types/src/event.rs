use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::decision::DecisionEvent;

// NOTE: Schema Design Goals
//
// 1. Closed union: every inbound event is one of these variants; consumers
//    discriminate with an exhaustive match, never by probing field presence.
// 2. Uniform attribution: every variant carries `agent_id` so routing,
//    backpressure accounting and trust updates need no side lookup.
// 3. Wire stability: variants are tagged `type`/`content`; decision events
//    nest a second `subtype` tag for the option/tool-approval split.

/// Event severity, shared by decisions, errors and coherence issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Warning,
}

impl Severity {
    /// Queue priority for a decision of this severity
    pub fn priority(&self) -> u32 {
        match self {
            Severity::Critical => 50,
            Severity::High => 40,
            Severity::Medium => 30,
            Severity::Low => 20,
            Severity::Warning => 10,
        }
    }
}

/// How far a decision's consequences reach
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlastRadius {
    Artifact,
    Workstream,
    Project,
}

/// Kind of artifact an agent produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Code,
    Document,
    Design,
    Config,
    Test,
    Other,
}

/// Review state of an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactStatus {
    Draft,
    InReview,
    Approved,
    Rejected,
}

/// Category of a coherence issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoherenceCategory {
    Contradiction,
    Duplication,
    Gap,
    DependencyViolation,
}

/// Terminal outcome of an agent run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionOutcome {
    Success,
    Partial,
    Abandoned,
    MaxTurns,
}

/// Agent session lifecycle transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleAction {
    Started,
    Paused,
    Resumed,
    Killed,
    Crashed,
    SessionStart,
    SessionEnd,
}

/// Coarse error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Internal,
    Tool,
    Provider,
    Validation,
    Unknown,
}

/// Where an artifact came from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provenance {
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_artifact_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEvent {
    pub agent_id: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tick: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallEvent {
    pub agent_id: String,
    pub tool_name: String,
    #[serde(default)]
    pub tool_args: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactEvent {
    pub agent_id: String,
    pub artifact_id: String,
    pub name: String,
    pub kind: ArtifactKind,
    pub workstream: String,
    pub status: ArtifactStatus,
    pub quality_score: f64,
    pub provenance: Provenance,
}

/// Always synthetic; emitted by the coherence monitor, never by agents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoherenceEvent {
    pub agent_id: String,
    pub issue_id: String,
    pub category: CoherenceCategory,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub affected_workstreams: Vec<String>,
    pub affected_artifact_ids: Vec<String>,
}

/// Artifact descriptor attached to a completion report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProducedArtifact {
    pub artifact_id: String,
    pub kind: ArtifactKind,
    pub workstream: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionEvent {
    pub agent_id: String,
    pub summary: String,
    #[serde(default)]
    pub artifacts_produced: Vec<ProducedArtifact>,
    #[serde(default)]
    pub decisions_needed: Vec<String>,
    pub outcome: CompletionOutcome,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub agent_id: String,
    pub severity: Severity,
    pub message: String,
    pub recoverable: bool,
    pub category: ErrorCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ErrorContext>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationEvent {
    pub agent_id: String,
    pub delegate_id: String,
    pub task: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailEvent {
    pub agent_id: String,
    pub guardrail: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub agent_id: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fraction: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub agent_id: String,
    pub action: LifecycleAction,
}

/// Unprocessed provider payload, carried for later inspection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawProviderEvent {
    pub agent_id: String,
    pub provider: String,
    pub payload: Value,
}

/// Agent event union
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "content")]
#[serde(rename_all = "snake_case")]
pub enum AgentEvent {
    Status(StatusEvent),
    Decision(DecisionEvent),
    ToolCall(ToolCallEvent),
    Artifact(ArtifactEvent),
    Coherence(CoherenceEvent),
    Completion(CompletionEvent),
    Error(ErrorEvent),
    Delegation(DelegationEvent),
    Guardrail(GuardrailEvent),
    Lifecycle(LifecycleEvent),
    Progress(ProgressEvent),
    RawProvider(RawProviderEvent),
}

impl AgentEvent {
    /// Originating agent, present on every variant
    pub fn agent_id(&self) -> &str {
        match self {
            AgentEvent::Status(e) => &e.agent_id,
            AgentEvent::Decision(e) => &e.agent_id,
            AgentEvent::ToolCall(e) => &e.agent_id,
            AgentEvent::Artifact(e) => &e.agent_id,
            AgentEvent::Coherence(e) => &e.agent_id,
            AgentEvent::Completion(e) => &e.agent_id,
            AgentEvent::Error(e) => &e.agent_id,
            AgentEvent::Delegation(e) => &e.agent_id,
            AgentEvent::Guardrail(e) => &e.agent_id,
            AgentEvent::Lifecycle(e) => &e.agent_id,
            AgentEvent::Progress(e) => &e.agent_id,
            AgentEvent::RawProvider(e) => &e.agent_id,
        }
    }

    /// Wire name of the variant, matching the serde tag
    pub fn type_name(&self) -> &'static str {
        match self {
            AgentEvent::Status(_) => "status",
            AgentEvent::Decision(_) => "decision",
            AgentEvent::ToolCall(_) => "tool_call",
            AgentEvent::Artifact(_) => "artifact",
            AgentEvent::Coherence(_) => "coherence",
            AgentEvent::Completion(_) => "completion",
            AgentEvent::Error(_) => "error",
            AgentEvent::Delegation(_) => "delegation",
            AgentEvent::Guardrail(_) => "guardrail",
            AgentEvent::Lifecycle(_) => "lifecycle",
            AgentEvent::Progress(_) => "progress",
            AgentEvent::RawProvider(_) => "raw_provider",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_round_trip() {
        let event = AgentEvent::Status(StatusEvent {
            agent_id: "agent-1".to_string(),
            message: "indexing".to_string(),
            tick: Some(12),
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"status""#));

        let back: AgentEvent = serde_json::from_str(&json).unwrap();
        match back {
            AgentEvent::Status(payload) => assert_eq!(payload.message, "indexing"),
            _ => panic!("Wrong payload type"),
        }
    }

    #[test]
    fn test_agent_id_uniform_across_variants() {
        let event = AgentEvent::Lifecycle(LifecycleEvent {
            agent_id: "agent-7".to_string(),
            action: LifecycleAction::Started,
        });
        assert_eq!(event.agent_id(), "agent-7");
        assert_eq!(event.type_name(), "lifecycle");
    }

    #[test]
    fn test_severity_priority_table() {
        assert_eq!(Severity::Critical.priority(), 50);
        assert_eq!(Severity::High.priority(), 40);
        assert_eq!(Severity::Medium.priority(), 30);
        assert_eq!(Severity::Low.priority(), 20);
        assert_eq!(Severity::Warning.priority(), 10);
    }
}
