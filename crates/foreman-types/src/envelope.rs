use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::{AgentEvent, CoherenceEvent};

/// Sequence value carried by synthetic envelopes; out of band for every
/// per-agent sequence tracker.
pub const SYNTHETIC_SEQUENCE: i64 = -1;

/// An agent event plus ingestion metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Globally unique within the dedup window; the dedup key
    pub source_event_id: String,

    /// Monotonic per `(agent_id, run_id)`; `-1` marks synthetic envelopes
    pub source_sequence: i64,

    pub source_occurred_at: DateTime<Utc>,

    pub run_id: String,

    pub event: AgentEvent,

    pub ingested_at: DateTime<Utc>,
}

impl EventEnvelope {
    pub fn new(
        source_event_id: impl Into<String>,
        source_sequence: i64,
        run_id: impl Into<String>,
        event: AgentEvent,
    ) -> Self {
        let now = Utc::now();
        Self {
            source_event_id: source_event_id.into(),
            source_sequence,
            source_occurred_at: now,
            run_id: run_id.into(),
            event,
            ingested_at: now,
        }
    }

    /// Wrap a coherence issue emitted by the monitor. Synthetic envelopes
    /// never participate in sequence tracking.
    pub fn synthetic(issue: CoherenceEvent) -> Self {
        let id = format!("coherence-{}", issue.issue_id);
        Self::new(id, SYNTHETIC_SEQUENCE, "system", AgentEvent::Coherence(issue))
    }

    pub fn is_synthetic(&self) -> bool {
        self.source_sequence < 0
    }

    pub fn agent_id(&self) -> &str {
        self.event.agent_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{CoherenceCategory, Severity};

    #[test]
    fn test_synthetic_envelope_shape() {
        let issue = CoherenceEvent {
            agent_id: "agent-1".to_string(),
            issue_id: "abc123".to_string(),
            category: CoherenceCategory::Duplication,
            severity: Severity::High,
            title: "conflicting writes".to_string(),
            description: String::new(),
            affected_workstreams: vec![],
            affected_artifact_ids: vec![],
        };

        let envelope = EventEnvelope::synthetic(issue);
        assert_eq!(envelope.source_event_id, "coherence-abc123");
        assert_eq!(envelope.source_sequence, SYNTHETIC_SEQUENCE);
        assert_eq!(envelope.run_id, "system");
        assert!(envelope.is_synthetic());
    }
}
