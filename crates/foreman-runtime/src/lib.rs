// Runtime layer - coordinator, handler graph and gateway services
// Wires the engine singletons together and owns everything long-running

mod brake;
mod classify;
mod config;
mod coordinator;
mod error;
mod gateway;
mod handlers;
mod outbound;
mod plugin;
mod process;
mod quarantine;
mod registry;
mod sync;
mod watcher;

pub use classify::{classify, Classified};
pub use config::{
    resolve_data_path, AgentsSection, BusSection, CheckpointSection, CoherenceSection, Config,
    DecisionSection, TickMode, TickSection, TrustSection, WsSection, DEFAULT_HEARTBEAT_MS,
    DEFAULT_IDLE_TIMEOUT_TICKS, DEFAULT_TICK_INTERVAL_MS,
};
pub use coordinator::{Coordinator, IngestOutcome};
pub use error::{Error, Result};
pub use outbound::OutboundMessage;
pub use plugin::{
    AgentBrief, AgentPlugin, BriefChanges, ContextInjection, KillOptions, KillResult,
    PluginCapabilities,
};
pub use process::{ProcessKind, ProcessSupervisor, DEFAULT_GRACE};
pub use quarantine::{Quarantine, QuarantinedPayload};
pub use registry::AgentRegistry;
pub use sync::KeyedLocks;
pub use watcher::ContentWatcher;
