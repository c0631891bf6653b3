// Engine layer - the event-driven core of the control plane
// Bus, logical clock, decision queue, trust scoring and coherence checks

mod bus;
mod coherence;
mod error;
mod queue;
mod tick;
mod trust;

pub use bus::{
    BusConfig, BusMetrics, EventBus, SequenceGapWarning, SubscriptionFilter, SubscriptionId,
    DEFAULT_DEDUP_CAPACITY, DEFAULT_MAX_QUEUE_PER_AGENT,
};
pub use coherence::{
    CoherenceConfig, CoherenceMonitor, NoopReview, ReviewProvider,
    DEFAULT_LAYER1C_INTERVAL_TICKS, DEFAULT_LAYER1_INTERVAL_TICKS,
};
pub use error::{Error, Result};
pub use queue::{
    DecisionPolicy, DecisionQueue, DecisionStatus, QueuedDecision, DEFAULT_ORPHAN_GRACE_TICKS,
    DEFAULT_TIMEOUT_TICKS,
};
pub use tick::{TickHandlerId, TickService};
pub use trust::{OutcomeContext, TrustConfig, TrustEngine, DEFAULT_INITIAL_SCORE};
