use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which agents a brake applies to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum BrakeScope {
    All,
    Agent { agent_id: String },
    Workstream { workstream: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrakeBehavior {
    Pause,
    Kill,
}

/// When an engaged brake lifts on its own
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum ReleaseCondition {
    Manual,
    Timer { release_after_ms: u64 },
    Decision { decision_id: String },
}

/// Operator-initiated stop order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrakePayload {
    pub scope: BrakeScope,
    pub reason: String,
    pub behavior: BrakeBehavior,
    pub initiated_by: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_condition: Option<ReleaseCondition>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_tag_on_wire() {
        let payload = BrakePayload {
            scope: BrakeScope::Agent {
                agent_id: "agent-3".to_string(),
            },
            reason: "runaway tool loop".to_string(),
            behavior: BrakeBehavior::Pause,
            initiated_by: "operator".to_string(),
            timestamp: Utc::now(),
            release_condition: Some(ReleaseCondition::Timer {
                release_after_ms: 60_000,
            }),
        };

        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains(r#""scope":{"type":"agent","agent_id":"agent-3"}"#));

        let back: BrakePayload = serde_json::from_str(&json).unwrap();
        assert_eq!(back.behavior, BrakeBehavior::Pause);
    }
}
