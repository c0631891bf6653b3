use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use foreman_types::{
    AgentHandle, BrakePayload, EventEnvelope, Resolution, TrustChange, WorkspaceTag,
};

use foreman_store::KnowledgeSnapshot;

/// Everything the hub can push to a client, discriminated by `type`.
/// Inbound carries nothing; the command plane is HTTP.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum OutboundMessage {
    /// First message on every connection, and on demand afterwards
    StateSync {
        snapshot: KnowledgeSnapshot,
        active_agents: Vec<AgentHandle>,
        trust_scores: HashMap<String, f64>,
        control_mode: String,
    },

    /// A classified envelope fanned out to every client
    Event {
        workspace: WorkspaceTag,
        secondary_workspaces: Vec<WorkspaceTag>,
        envelope: EventEnvelope,
    },

    TrustUpdate {
        #[serde(flatten)]
        change: TrustChange,
    },

    DecisionResolved {
        decision_id: String,
        resolution: Resolution,
        timed_out: bool,
    },

    Brake {
        engaged: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        payload: Option<BrakePayload>,
    },

    #[serde(rename = "devserver-started")]
    DevServerStarted { pid: u32 },

    #[serde(rename = "devserver-stopped")]
    DevServerStopped { exit_code: Option<i32> },

    #[serde(rename = "devserver-error")]
    DevServerError { message: String },

    #[serde(rename = "pipeline-start")]
    PipelineStart { pipeline_id: String, command: String },

    #[serde(rename = "pipeline-output")]
    PipelineOutput {
        pipeline_id: String,
        stream: String,
        line: String,
    },

    #[serde(rename = "pipeline-complete")]
    PipelineComplete {
        pipeline_id: String,
        exit_code: Option<i32>,
    },

    #[serde(rename = "pipeline-error")]
    PipelineError { pipeline_id: String, message: String },

    #[serde(rename = "manifest-changed")]
    ManifestChanged { slug: String },

    #[serde(rename = "file-changed")]
    FileChanged { path: String },

    #[serde(rename = "content-changed")]
    ContentChanged { path: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_tags_on_wire() {
        let message = OutboundMessage::PipelineOutput {
            pipeline_id: "build-1".to_string(),
            stream: "stdout".to_string(),
            line: "compiling".to_string(),
        };
        let json = serde_json::to_string(&message).unwrap();
        assert!(json.contains(r#""type":"pipeline-output""#));

        let message = OutboundMessage::Brake {
            engaged: false,
            payload: None,
        };
        let json = serde_json::to_string(&message).unwrap();
        assert!(json.contains(r#""type":"brake""#));
    }
}
