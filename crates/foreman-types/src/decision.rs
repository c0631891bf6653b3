use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::event::{BlastRadius, Severity};

/// One selectable answer to an option decision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionOption {
    pub id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A blocking choice the agent cannot make on its own
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionDecision {
    pub decision_id: String,
    pub title: String,
    pub summary: String,
    pub severity: Severity,
    /// Agent's self-reported confidence in its recommendation, 0..=1
    pub confidence: f64,
    pub blast_radius: BlastRadius,
    pub options: Vec<DecisionOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommended_option_id: Option<String>,
    #[serde(default)]
    pub affected_artifact_ids: Vec<String>,
    #[serde(default)]
    pub requires_rationale: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_by_tick: Option<u64>,
}

/// A gated tool invocation awaiting human approval
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolApprovalDecision {
    pub decision_id: String,
    pub tool_name: String,
    #[serde(default)]
    pub tool_args: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blast_radius: Option<BlastRadius>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_by_tick: Option<u64>,
}

/// The two decision shapes, discriminated by `subtype` on the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "subtype")]
#[serde(rename_all = "snake_case")]
pub enum DecisionBody {
    #[serde(rename = "option")]
    Choice(OptionDecision),
    ToolApproval(ToolApprovalDecision),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionEvent {
    pub agent_id: String,
    #[serde(flatten)]
    pub body: DecisionBody,
}

impl DecisionEvent {
    pub fn decision_id(&self) -> &str {
        match &self.body {
            DecisionBody::Choice(d) => &d.decision_id,
            DecisionBody::ToolApproval(d) => &d.decision_id,
        }
    }

    /// Effective severity; tool approvals without one default to medium
    pub fn severity(&self) -> Severity {
        match &self.body {
            DecisionBody::Choice(d) => d.severity,
            DecisionBody::ToolApproval(d) => d.severity.unwrap_or(Severity::Medium),
        }
    }

    pub fn due_by_tick(&self) -> Option<u64> {
        match &self.body {
            DecisionBody::Choice(d) => d.due_by_tick,
            DecisionBody::ToolApproval(d) => d.due_by_tick,
        }
    }
}

/// What a resolution does downstream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Create,
    Update,
    Delete,
    Review,
    Deploy,
}

/// Human verdict on a tool approval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalAction {
    Approve,
    Reject,
    Modify,
}

/// Answer attached to a queued decision on resolve
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    #[serde(rename = "option")]
    Choice {
        chosen_option_id: String,
        rationale: String,
        action_kind: ActionKind,
    },
    ToolApproval {
        action: ApprovalAction,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        modified_args: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        always_approve: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rationale: Option<String>,
        action_kind: ActionKind,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_choice() -> DecisionEvent {
        DecisionEvent {
            agent_id: "agent-1".to_string(),
            body: DecisionBody::Choice(OptionDecision {
                decision_id: "dec-1".to_string(),
                title: "Pick storage layout".to_string(),
                summary: "Two viable layouts".to_string(),
                severity: Severity::High,
                confidence: 0.7,
                blast_radius: BlastRadius::Workstream,
                options: vec![DecisionOption {
                    id: "o1".to_string(),
                    label: "Normalized".to_string(),
                    description: None,
                }],
                recommended_option_id: Some("o1".to_string()),
                affected_artifact_ids: vec![],
                requires_rationale: false,
                due_by_tick: None,
            }),
        }
    }

    #[test]
    fn test_subtype_tag_on_wire() {
        let json = serde_json::to_string(&sample_choice()).unwrap();
        assert!(json.contains(r#""subtype":"option""#));

        let back: DecisionEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.decision_id(), "dec-1");
        assert_eq!(back.severity(), Severity::High);
    }

    #[test]
    fn test_tool_approval_severity_defaults_to_medium() {
        let event = DecisionEvent {
            agent_id: "agent-2".to_string(),
            body: DecisionBody::ToolApproval(ToolApprovalDecision {
                decision_id: "dec-2".to_string(),
                tool_name: "shell".to_string(),
                tool_args: serde_json::json!({"cmd": "rm -rf build"}),
                severity: None,
                blast_radius: None,
                due_by_tick: Some(40),
            }),
        };
        assert_eq!(event.severity(), Severity::Medium);
        assert_eq!(event.due_by_tick(), Some(40));
    }

    #[test]
    fn test_resolution_round_trip() {
        let resolution = Resolution::ToolApproval {
            action: ApprovalAction::Approve,
            modified_args: None,
            always_approve: Some(true),
            rationale: Some("known-safe command".to_string()),
            action_kind: ActionKind::Review,
        };
        let json = serde_json::to_string(&resolution).unwrap();
        assert!(json.contains(r#""type":"tool_approval""#));

        let back: Resolution = serde_json::from_str(&json).unwrap();
        match back {
            Resolution::ToolApproval { always_approve, .. } => {
                assert_eq!(always_approve, Some(true))
            }
            _ => panic!("Wrong resolution type"),
        }
    }
}
