use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use foreman_types::{
    AgentEvent, ErrorCategory, ErrorEvent, EventEnvelope, Severity,
};

// NOTE: Bus Design Rationale
//
// - Dedup and the per-agent queues are bounded FIFOs; eviction removes
//   from the lookup set in lockstep so memory stays flat under any load
// - Fan-out happens after the state lock is released, so a subscriber may
//   itself publish (synthetic coherence envelopes take this path)
// - The per-agent queue tracks recent publishes for backpressure
//   accounting; it does not buffer delivery

pub const DEFAULT_DEDUP_CAPACITY: usize = 10_000;
pub const DEFAULT_MAX_QUEUE_PER_AGENT: usize = 500;

/// Subscription filter; a filter with neither field matches every event
#[derive(Debug, Clone, Default)]
pub struct SubscriptionFilter {
    pub agent_id: Option<String>,
    pub event_type: Option<String>,
}

impl SubscriptionFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn event_type(event_type: impl Into<String>) -> Self {
        Self {
            agent_id: None,
            event_type: Some(event_type.into()),
        }
    }

    fn matches(&self, envelope: &EventEnvelope) -> bool {
        if let Some(agent_id) = &self.agent_id {
            if envelope.agent_id() != agent_id {
                return false;
            }
        }
        if let Some(event_type) = &self.event_type {
            if envelope.event.type_name() != event_type {
                return false;
            }
        }
        true
    }
}

/// Opaque handle returned by `subscribe`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Recorded when a per-agent sequence jumps by more than one
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SequenceGapWarning {
    pub agent_id: String,
    pub run_id: String,
    pub previous_sequence: i64,
    pub current_sequence: i64,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct BusMetrics {
    pub total_published: u64,
    pub total_delivered: u64,
    pub total_deduplicated: u64,
    pub total_dropped: u64,
}

#[derive(Debug, Clone)]
pub struct BusConfig {
    pub dedup_capacity: usize,
    pub max_queue_per_agent: usize,
    pub max_high_priority_per_agent: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            dedup_capacity: DEFAULT_DEDUP_CAPACITY,
            max_queue_per_agent: DEFAULT_MAX_QUEUE_PER_AGENT,
            max_high_priority_per_agent: DEFAULT_MAX_QUEUE_PER_AGENT * 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueueClass {
    Low,
    Middle,
    High,
}

fn queue_class(event: &AgentEvent) -> QueueClass {
    match event {
        AgentEvent::ToolCall(_) | AgentEvent::Progress(_) | AgentEvent::Status(_) => {
            QueueClass::Low
        }
        AgentEvent::Decision(_)
        | AgentEvent::Artifact(_)
        | AgentEvent::Error(_)
        | AgentEvent::Completion(_) => QueueClass::High,
        _ => QueueClass::Middle,
    }
}

/// Bounded FIFO of recently seen event ids
struct DedupWindow {
    order: VecDeque<String>,
    seen: HashSet<String>,
    capacity: usize,
}

impl DedupWindow {
    fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity),
            seen: HashSet::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Returns false when the id was already present
    fn insert(&mut self, id: &str) -> bool {
        if self.seen.contains(id) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.seen.remove(&evicted);
            }
        }
        self.order.push_back(id.to_string());
        self.seen.insert(id.to_string());
        true
    }
}

type SubscriberFn = dyn Fn(&EventEnvelope) -> anyhow::Result<()> + Send + Sync;

struct Subscriber {
    id: u64,
    filter: SubscriptionFilter,
    handler: Arc<SubscriberFn>,
}

struct BusState {
    dedup: DedupWindow,
    highest_sequence: HashMap<(String, String), i64>,
    gap_warnings: Vec<SequenceGapWarning>,
    queues: HashMap<String, VecDeque<QueueClass>>,
    subscribers: Vec<Subscriber>,
    next_subscription: u64,
    metrics: BusMetrics,
}

/// Ordered, deduplicated publish/subscribe with per-agent backpressure.
/// A `publish` call visits every matching subscriber before returning.
pub struct EventBus {
    state: Mutex<BusState>,
    config: BusConfig,
}

impl EventBus {
    pub fn new(config: BusConfig) -> Self {
        Self {
            state: Mutex::new(BusState {
                dedup: DedupWindow::new(config.dedup_capacity),
                highest_sequence: HashMap::new(),
                gap_warnings: Vec::new(),
                queues: HashMap::new(),
                subscribers: Vec::new(),
                next_subscription: 0,
                metrics: BusMetrics::default(),
            }),
            config,
        }
    }

    pub fn subscribe<F>(&self, filter: SubscriptionFilter, handler: F) -> SubscriptionId
    where
        F: Fn(&EventEnvelope) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let mut state = self.state.lock().unwrap();
        let id = state.next_subscription;
        state.next_subscription += 1;
        state.subscribers.push(Subscriber {
            id,
            filter,
            handler: Arc::new(handler),
        });
        SubscriptionId(id)
    }

    /// Unsubscribing an unknown id is a no-op
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let mut state = self.state.lock().unwrap();
        state.subscribers.retain(|s| s.id != id.0);
    }

    /// Publish an envelope; returns false when it was deduplicated.
    pub fn publish(&self, envelope: &EventEnvelope) -> bool {
        let (handlers, backpressure) = {
            let mut state = self.state.lock().unwrap();

            if !state.dedup.insert(&envelope.source_event_id) {
                state.metrics.total_deduplicated += 1;
                debug!(
                    source_event_id = %envelope.source_event_id,
                    "dropping duplicate envelope"
                );
                return false;
            }
            state.metrics.total_published += 1;

            if !envelope.is_synthetic() {
                self.track_sequence(&mut state, envelope);
            }

            let dropped = self.account_queue(&mut state, envelope);
            if dropped > 0 {
                state.metrics.total_dropped += dropped as u64;
            }

            let handlers = Self::matching_handlers(&state, envelope);
            state.metrics.total_delivered += handlers.len() as u64;

            let backpressure = if dropped > 0 {
                warn!(
                    agent_id = envelope.agent_id(),
                    dropped, "per-agent queue overflow"
                );
                let warning = backpressure_envelope(envelope.agent_id(), dropped);
                let warning_handlers = Self::matching_handlers(&state, &warning);
                state.metrics.total_delivered += warning_handlers.len() as u64;
                Some((warning, warning_handlers))
            } else {
                None
            };

            (handlers, backpressure)
        };

        deliver(envelope, &handlers);
        if let Some((warning, warning_handlers)) = backpressure {
            deliver(&warning, &warning_handlers);
        }
        true
    }

    fn track_sequence(&self, state: &mut BusState, envelope: &EventEnvelope) {
        let key = (envelope.agent_id().to_string(), envelope.run_id.clone());
        let current = envelope.source_sequence;
        match state.highest_sequence.get(&key) {
            Some(&previous) => {
                if current > previous + 1 {
                    let warning = SequenceGapWarning {
                        agent_id: key.0.clone(),
                        run_id: key.1.clone(),
                        previous_sequence: previous,
                        current_sequence: current,
                    };
                    warn!(
                        agent_id = %warning.agent_id,
                        run_id = %warning.run_id,
                        previous, current, "sequence gap observed"
                    );
                    state.gap_warnings.push(warning);
                }
                if current > previous {
                    state.highest_sequence.insert(key, current);
                }
            }
            None => {
                state.highest_sequence.insert(key, current);
            }
        }
    }

    /// Track the publish in the agent's queue and shed excess, cheapest
    /// class first. Only above the hard high-priority cap do high-priority
    /// entries drop. Returns the number of entries shed.
    fn account_queue(&self, state: &mut BusState, envelope: &EventEnvelope) -> usize {
        let queue = state
            .queues
            .entry(envelope.agent_id().to_string())
            .or_default();
        queue.push_back(queue_class(&envelope.event));

        let mut dropped = 0;
        for class in [QueueClass::Low, QueueClass::Middle] {
            while queue.len() > self.config.max_queue_per_agent {
                match queue.iter().position(|c| *c == class) {
                    Some(pos) => {
                        queue.remove(pos);
                        dropped += 1;
                    }
                    None => break,
                }
            }
        }
        while queue.len() > self.config.max_high_priority_per_agent {
            queue.pop_front();
            dropped += 1;
        }
        dropped
    }

    fn matching_handlers(state: &BusState, envelope: &EventEnvelope) -> Vec<Arc<SubscriberFn>> {
        state
            .subscribers
            .iter()
            .filter(|s| s.filter.matches(envelope))
            .map(|s| Arc::clone(&s.handler))
            .collect()
    }

    pub fn metrics(&self) -> BusMetrics {
        self.state.lock().unwrap().metrics
    }

    pub fn agent_queue_size(&self, agent_id: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .queues
            .get(agent_id)
            .map(|q| q.len())
            .unwrap_or(0)
    }

    pub fn sequence_gap_warnings(&self) -> Vec<SequenceGapWarning> {
        self.state.lock().unwrap().gap_warnings.clone()
    }
}

/// One failing subscriber never hides the event from the rest
fn deliver(envelope: &EventEnvelope, handlers: &[Arc<SubscriberFn>]) {
    for handler in handlers {
        if let Err(err) = handler(envelope) {
            warn!(
                source_event_id = %envelope.source_event_id,
                error = %err,
                "subscriber failed; continuing fan-out"
            );
        }
    }
}

fn backpressure_envelope(agent_id: &str, dropped: usize) -> EventEnvelope {
    EventEnvelope::new(
        format!("backpressure-{}", Uuid::new_v4()),
        foreman_types::SYNTHETIC_SEQUENCE,
        "system",
        AgentEvent::Error(ErrorEvent {
            agent_id: agent_id.to_string(),
            severity: Severity::Warning,
            message: format!(
                "backpressure: {} events dropped for agent {}",
                dropped, agent_id
            ),
            recoverable: true,
            category: ErrorCategory::Internal,
            context: None,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use foreman_types::StatusEvent;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn status(agent: &str, id: &str, seq: i64) -> EventEnvelope {
        EventEnvelope::new(
            id,
            seq,
            "run-1",
            AgentEvent::Status(StatusEvent {
                agent_id: agent.to_string(),
                message: "tick".to_string(),
                tick: None,
            }),
        )
    }

    fn decision(agent: &str, id: &str, seq: i64) -> EventEnvelope {
        use foreman_types::{DecisionBody, DecisionEvent, ToolApprovalDecision};
        EventEnvelope::new(
            id,
            seq,
            "run-1",
            AgentEvent::Decision(DecisionEvent {
                agent_id: agent.to_string(),
                body: DecisionBody::ToolApproval(ToolApprovalDecision {
                    decision_id: id.to_string(),
                    tool_name: "shell".to_string(),
                    tool_args: serde_json::Value::Null,
                    severity: None,
                    blast_radius: None,
                    due_by_tick: None,
                }),
            }),
        )
    }

    #[test]
    fn test_dedup_drops_and_counts() {
        let bus = EventBus::new(BusConfig::default());
        let delivered = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&delivered);
        bus.subscribe(SubscriptionFilter::all(), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        assert!(bus.publish(&status("agent-1", "e1", 1)));
        assert!(!bus.publish(&status("agent-1", "e1", 2)));

        assert_eq!(delivered.load(Ordering::SeqCst), 1);
        let metrics = bus.metrics();
        assert_eq!(metrics.total_deduplicated, 1);
        assert_eq!(metrics.total_delivered, 1);
    }

    #[test]
    fn test_dedup_window_eviction_readmits_oldest() {
        let bus = EventBus::new(BusConfig {
            dedup_capacity: 3,
            ..Default::default()
        });
        for i in 0..4 {
            assert!(bus.publish(&status("agent-1", &format!("e{}", i), i as i64)));
        }
        // e0 was evicted and may be accepted again
        assert!(bus.publish(&status("agent-1", "e0", 10)));
    }

    #[test]
    fn test_sequence_gap_warns_but_delivers() {
        let bus = EventBus::new(BusConfig::default());
        let delivered = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&delivered);
        bus.subscribe(SubscriptionFilter::all(), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        bus.publish(&status("agent-1", "e1", 1));
        bus.publish(&status("agent-1", "e2", 5));

        assert_eq!(delivered.load(Ordering::SeqCst), 2);
        let warnings = bus.sequence_gap_warnings();
        assert_eq!(
            warnings,
            vec![SequenceGapWarning {
                agent_id: "agent-1".to_string(),
                run_id: "run-1".to_string(),
                previous_sequence: 1,
                current_sequence: 5,
            }]
        );
    }

    #[test]
    fn test_synthetic_sequence_is_out_of_band() {
        let bus = EventBus::new(BusConfig::default());
        bus.publish(&status("agent-1", "e1", 7));
        bus.publish(&EventEnvelope::synthetic(foreman_types::CoherenceEvent {
            agent_id: "agent-1".to_string(),
            issue_id: "i1".to_string(),
            category: foreman_types::CoherenceCategory::Duplication,
            severity: Severity::High,
            title: "t".to_string(),
            description: String::new(),
            affected_workstreams: vec![],
            affected_artifact_ids: vec![],
        }));
        bus.publish(&status("agent-1", "e2", 8));

        assert!(bus.sequence_gap_warnings().is_empty());
    }

    #[test]
    fn test_backpressure_drops_low_priority_first() {
        let bus = EventBus::new(BusConfig {
            max_queue_per_agent: 3,
            max_high_priority_per_agent: 6,
            ..Default::default()
        });
        let warnings = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&warnings);
        bus.subscribe(SubscriptionFilter::event_type("error"), move |envelope| {
            if let AgentEvent::Error(e) = &envelope.event {
                assert_eq!(e.severity, Severity::Warning);
                assert_eq!(e.category, ErrorCategory::Internal);
                assert!(e.message.contains("backpressure"));
                counter.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        });

        bus.publish(&status("agent-1", "s1", 1));
        bus.publish(&status("agent-1", "s2", 2));
        bus.publish(&status("agent-1", "s3", 3));
        bus.publish(&decision("agent-1", "d1", 4));

        assert_eq!(bus.agent_queue_size("agent-1"), 3);
        assert_eq!(bus.metrics().total_dropped, 1);
        assert_eq!(warnings.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_high_priority_survives_until_hard_cap() {
        let bus = EventBus::new(BusConfig {
            max_queue_per_agent: 2,
            max_high_priority_per_agent: 4,
            ..Default::default()
        });

        for i in 0..6 {
            bus.publish(&decision("agent-1", &format!("d{}", i), i as i64));
        }
        // Nothing below the hard cap sheds high-priority entries
        assert_eq!(bus.agent_queue_size("agent-1"), 4);
        assert_eq!(bus.metrics().total_dropped, 2);
    }

    #[test]
    fn test_filters_route_by_agent_and_type() {
        let bus = EventBus::new(BusConfig::default());
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&hits);
        bus.subscribe(
            SubscriptionFilter {
                agent_id: Some("agent-1".to_string()),
                event_type: Some("status".to_string()),
            },
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
        );

        bus.publish(&status("agent-1", "e1", 1));
        bus.publish(&status("agent-2", "e2", 1));
        bus.publish(&decision("agent-1", "e3", 2));

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failing_subscriber_is_isolated() {
        let bus = EventBus::new(BusConfig::default());
        let hits = Arc::new(AtomicUsize::new(0));

        bus.subscribe(SubscriptionFilter::all(), |_| {
            anyhow::bail!("handler exploded")
        });
        let counter = Arc::clone(&hits);
        bus.subscribe(SubscriptionFilter::all(), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        assert!(bus.publish(&status("agent-1", "e1", 1)));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(bus.metrics().total_delivered, 2);
    }

    #[test]
    fn test_unsubscribe_unknown_is_noop() {
        let bus = EventBus::new(BusConfig::default());
        let id = bus.subscribe(SubscriptionFilter::all(), |_| Ok(()));
        bus.unsubscribe(id);
        bus.unsubscribe(id);

        bus.publish(&status("agent-1", "e1", 1));
        assert_eq!(bus.metrics().total_delivered, 0);
    }

    #[test]
    fn test_subscriber_may_republish() {
        let bus = Arc::new(EventBus::new(BusConfig::default()));
        let inner = Arc::clone(&bus);
        bus.subscribe(SubscriptionFilter::event_type("status"), move |envelope| {
            if envelope.source_event_id == "e1" {
                inner.publish(&status("agent-2", "relayed", 1));
            }
            Ok(())
        });

        assert!(bus.publish(&status("agent-1", "e1", 1)));
        assert_eq!(bus.metrics().total_published, 2);
    }
}
