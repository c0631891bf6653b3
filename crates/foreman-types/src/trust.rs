use serde::{Deserialize, Serialize};

use crate::event::ArtifactKind;

/// Discrete, named event that shifts an agent's trust score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustOutcome {
    TaskCompletedClean,
    TaskCompletedPartial,
    TaskAbandonedOrMaxTurns,
    HumanApprovesRecommendation,
    HumanApprovesAlways,
    HumanRejectsToolCall,
    ErrorEvent,
}

impl TrustOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrustOutcome::TaskCompletedClean => "task_completed_clean",
            TrustOutcome::TaskCompletedPartial => "task_completed_partial",
            TrustOutcome::TaskAbandonedOrMaxTurns => "task_abandoned_or_max_turns",
            TrustOutcome::HumanApprovesRecommendation => "human_approves_recommendation",
            TrustOutcome::HumanApprovesAlways => "human_approves_always",
            TrustOutcome::HumanRejectsToolCall => "human_rejects_tool_call",
            TrustOutcome::ErrorEvent => "error_event",
        }
    }
}

/// Coarse classification of a tool by its side effects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    Read,
    Write,
    Execute,
}

impl ToolCategory {
    /// Heuristic over the tool name. Unknown tools count as execute, the
    /// highest-impact class.
    pub fn classify(tool_name: &str) -> Self {
        let name = tool_name.to_ascii_lowercase();
        if name.contains("read") || name.contains("get") || name.contains("list")
            || name.contains("search") || name.contains("glob") || name.contains("grep")
        {
            ToolCategory::Read
        } else if name.contains("write") || name.contains("edit") || name.contains("create")
            || name.contains("update") || name.contains("patch") || name.contains("delete")
        {
            ToolCategory::Write
        } else {
            ToolCategory::Execute
        }
    }
}

/// One trust application, kept for later audit-log flush
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainOutcome {
    pub outcome: TrustOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_kinds: Option<Vec<ArtifactKind>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workstreams: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_category: Option<ToolCategory>,
}

/// Per-agent trust state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustProfile {
    pub agent_id: String,
    /// Clamped to 0..=100
    pub score: f64,
    pub last_updated_tick: u64,
    #[serde(default)]
    pub domain_log: Vec<DomainOutcome>,
}

/// Broadcast whenever an application actually moves the stored score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustChange {
    pub agent_id: String,
    pub previous_score: f64,
    pub new_score: f64,
    pub delta: f64,
    pub reason: TrustOutcome,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_classification() {
        assert_eq!(ToolCategory::classify("read_file"), ToolCategory::Read);
        assert_eq!(ToolCategory::classify("Grep"), ToolCategory::Read);
        assert_eq!(ToolCategory::classify("write_file"), ToolCategory::Write);
        assert_eq!(ToolCategory::classify("apply_patch"), ToolCategory::Write);
        assert_eq!(ToolCategory::classify("shell"), ToolCategory::Execute);
        assert_eq!(ToolCategory::classify("unknown_tool"), ToolCategory::Execute);
    }
}
