use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// A rejected inbound payload, kept verbatim for operator inspection
#[derive(Debug, Clone, Serialize)]
pub struct QuarantinedPayload {
    pub payload: Value,
    pub error: String,
    pub received_at: DateTime<Utc>,
}

/// Holding pen for envelopes that failed schema validation. Quarantined
/// payloads are never delivered; operators retrieve and clear them.
#[derive(Default)]
pub struct Quarantine {
    entries: Mutex<Vec<QuarantinedPayload>>,
}

impl Quarantine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, payload: Value, error: impl Into<String>) {
        self.entries.lock().unwrap().push(QuarantinedPayload {
            payload,
            error: error.into(),
            received_at: Utc::now(),
        });
    }

    pub fn list(&self) -> Vec<QuarantinedPayload> {
        self.entries.lock().unwrap().clone()
    }

    pub fn clear(&self) -> usize {
        let mut entries = self.entries.lock().unwrap();
        let drained = entries.len();
        entries.clear();
        drained
    }
}
