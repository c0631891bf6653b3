use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use foreman_engine::{
    BusConfig, CoherenceConfig, DecisionPolicy, TrustConfig, DEFAULT_DEDUP_CAPACITY,
    DEFAULT_INITIAL_SCORE, DEFAULT_LAYER1C_INTERVAL_TICKS, DEFAULT_LAYER1_INTERVAL_TICKS,
    DEFAULT_MAX_QUEUE_PER_AGENT, DEFAULT_ORPHAN_GRACE_TICKS, DEFAULT_TIMEOUT_TICKS,
};
use foreman_store::DEFAULT_MAX_PER_AGENT;

use crate::error::{Error, Result};

pub const DEFAULT_IDLE_TIMEOUT_TICKS: u64 = 500;
pub const DEFAULT_HEARTBEAT_MS: u64 = 30_000;
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1_000;

/// Resolve the data directory path based on priority:
/// 1. Explicit path (with tilde expansion)
/// 2. FOREMAN_PATH environment variable (with tilde expansion)
/// 3. XDG data directory (recommended default)
/// 4. ~/.foreman (fallback for systems without XDG)
pub fn resolve_data_path(explicit_path: Option<&str>) -> Result<PathBuf> {
    if let Some(path) = explicit_path {
        return Ok(expand_tilde(path));
    }

    if let Ok(env_path) = std::env::var("FOREMAN_PATH") {
        return Ok(expand_tilde(&env_path));
    }

    if let Some(data_dir) = dirs::data_dir() {
        return Ok(data_dir.join("foreman"));
    }

    if let Some(home) = std::env::var_os("HOME") {
        return Ok(PathBuf::from(home).join(".foreman"));
    }

    Err(Error::Config(
        "Could not determine data path: no HOME directory or XDG data directory found".to_string(),
    ))
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(stripped);
        }
    }
    PathBuf::from(path)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusSection {
    pub dedup_capacity: usize,
    pub max_queue_per_agent: usize,
    /// Defaults to twice `max_queue_per_agent` when absent
    pub max_high_priority_per_agent: Option<usize>,
}

impl Default for BusSection {
    fn default() -> Self {
        Self {
            dedup_capacity: DEFAULT_DEDUP_CAPACITY,
            max_queue_per_agent: DEFAULT_MAX_QUEUE_PER_AGENT,
            max_high_priority_per_agent: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionSection {
    /// 0 disables timeout sweeps entirely
    pub timeout_ticks: u64,
    pub orphan_grace_period_ticks: u64,
}

impl Default for DecisionSection {
    fn default() -> Self {
        Self {
            timeout_ticks: DEFAULT_TIMEOUT_TICKS,
            orphan_grace_period_ticks: DEFAULT_ORPHAN_GRACE_TICKS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointSection {
    pub max_per_agent: usize,
}

impl Default for CheckpointSection {
    fn default() -> Self {
        Self {
            max_per_agent: DEFAULT_MAX_PER_AGENT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TickMode {
    Manual,
    Interval,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TickSection {
    pub mode: TickMode,
    pub interval_ms: u64,
}

impl Default for TickSection {
    fn default() -> Self {
        Self {
            mode: TickMode::Interval,
            interval_ms: DEFAULT_TICK_INTERVAL_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustSection {
    pub initial_score: f64,
}

impl Default for TrustSection {
    fn default() -> Self {
        Self {
            initial_score: DEFAULT_INITIAL_SCORE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentsSection {
    pub idle_timeout_ticks: u64,
}

impl Default for AgentsSection {
    fn default() -> Self {
        Self {
            idle_timeout_ticks: DEFAULT_IDLE_TIMEOUT_TICKS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WsSection {
    pub heartbeat_ms: u64,
}

impl Default for WsSection {
    fn default() -> Self {
        Self {
            heartbeat_ms: DEFAULT_HEARTBEAT_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoherenceSection {
    pub layer1_interval_ticks: u64,
    pub layer1c_interval_ticks: u64,
    pub enable_layer2: bool,
}

impl Default for CoherenceSection {
    fn default() -> Self {
        Self {
            layer1_interval_ticks: DEFAULT_LAYER1_INTERVAL_TICKS,
            layer1c_interval_ticks: DEFAULT_LAYER1C_INTERVAL_TICKS,
            enable_layer2: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bus: BusSection,
    pub decision: DecisionSection,
    pub checkpoints: CheckpointSection,
    pub tick: TickSection,
    pub trust: TrustSection,
    pub agents: AgentsSection,
    pub ws: WsSection,
    pub coherence: CoherenceSection,
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::default_path()?;
        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn default_path() -> Result<PathBuf> {
        Ok(resolve_data_path(None)?.join("config.toml"))
    }

    pub fn bus_config(&self) -> BusConfig {
        BusConfig {
            dedup_capacity: self.bus.dedup_capacity,
            max_queue_per_agent: self.bus.max_queue_per_agent,
            max_high_priority_per_agent: self
                .bus
                .max_high_priority_per_agent
                .unwrap_or(self.bus.max_queue_per_agent * 2),
        }
    }

    pub fn decision_policy(&self) -> DecisionPolicy {
        DecisionPolicy {
            timeout_ticks: (self.decision.timeout_ticks > 0).then_some(self.decision.timeout_ticks),
            orphan_grace_period_ticks: self.decision.orphan_grace_period_ticks,
        }
    }

    pub fn trust_config(&self) -> TrustConfig {
        TrustConfig {
            initial_score: self.trust.initial_score.clamp(0.0, 100.0),
            ..Default::default()
        }
    }

    pub fn coherence_config(&self) -> CoherenceConfig {
        CoherenceConfig {
            layer1_interval_ticks: self.coherence.layer1_interval_ticks,
            layer1c_interval_ticks: self.coherence.layer1c_interval_ticks,
            enable_layer2: self.coherence.enable_layer2,
        }
    }
}
