use std::collections::HashMap;
use std::sync::Mutex;

use sha2::{Digest, Sha256};
use tracing::debug;

use foreman_types::{ArtifactEvent, CoherenceCategory, CoherenceEvent, Severity};

pub const DEFAULT_LAYER1_INTERVAL_TICKS: u64 = 50;
pub const DEFAULT_LAYER1C_INTERVAL_TICKS: u64 = 200;

/// Tick-gated scan cadence and the optional deep-review layer
#[derive(Debug, Clone)]
pub struct CoherenceConfig {
    pub layer1_interval_ticks: u64,
    pub layer1c_interval_ticks: u64,
    pub enable_layer2: bool,
}

impl Default for CoherenceConfig {
    fn default() -> Self {
        Self {
            layer1_interval_ticks: DEFAULT_LAYER1_INTERVAL_TICKS,
            layer1c_interval_ticks: DEFAULT_LAYER1C_INTERVAL_TICKS,
            enable_layer2: false,
        }
    }
}

/// Externally configured deep review. The core tolerates a no-op
/// implementation.
pub trait ReviewProvider: Send + Sync {
    fn review(&self, artifacts: &[ArtifactEvent]) -> Vec<CoherenceEvent>;
}

/// Review provider that finds nothing
pub struct NoopReview;

impl ReviewProvider for NoopReview {
    fn review(&self, _artifacts: &[ArtifactEvent]) -> Vec<CoherenceEvent> {
        Vec::new()
    }
}

#[derive(Debug, Clone)]
struct PathWriter {
    agent_id: String,
    artifact_id: String,
    workstream: String,
}

#[derive(Default)]
struct MonitorState {
    /// source_path -> writers, one slot per agent (same-agent rewrites
    /// replace in place)
    path_writers: HashMap<String, Vec<PathWriter>>,
    detected: HashMap<String, CoherenceEvent>,
    last_layer1_tick: Option<u64>,
    last_layer1c_tick: Option<u64>,
}

/// Detects cross-agent conflicts on artifact writes. Issue ids are stable
/// per conflict so downstream id-dedup holds across re-detection.
pub struct CoherenceMonitor {
    state: Mutex<MonitorState>,
    config: CoherenceConfig,
}

impl CoherenceMonitor {
    pub fn new(config: CoherenceConfig) -> Self {
        Self {
            state: Mutex::new(MonitorState::default()),
            config,
        }
    }

    pub fn config(&self) -> &CoherenceConfig {
        &self.config
    }

    /// Synchronous per-artifact check, called from the artifact subscriber.
    /// Two artifacts sharing a non-empty `source_path` across different
    /// agents produce a single high-severity duplication issue.
    pub fn process_artifact(&self, event: &ArtifactEvent) -> Option<CoherenceEvent> {
        let source_path = event.provenance.source_path.as_deref()?;
        if source_path.is_empty() {
            return None;
        }

        let mut state = self.state.lock().unwrap();
        let writers = state
            .path_writers
            .entry(source_path.to_string())
            .or_default();

        match writers.iter_mut().find(|w| w.agent_id == event.agent_id) {
            Some(writer) => writer.artifact_id = event.artifact_id.clone(),
            None => writers.push(PathWriter {
                agent_id: event.agent_id.clone(),
                artifact_id: event.artifact_id.clone(),
                workstream: event.workstream.clone(),
            }),
        }

        if writers.len() < 2 {
            return None;
        }

        let issue = duplication_issue(source_path, writers, &event.agent_id);
        debug!(issue_id = %issue.issue_id, path = source_path, "path conflict detected");
        state.detected.insert(issue.issue_id.clone(), issue.clone());
        Some(issue)
    }

    pub fn should_run_layer1_scan(&self, tick: u64) -> bool {
        let state = self.state.lock().unwrap();
        due(state.last_layer1_tick, tick, self.config.layer1_interval_ticks)
    }

    /// Re-derive path conflicts from artifacts still present in the store.
    /// Catches conflicts whose inline detection was lost (e.g. process
    /// restart) and retires writers whose artifacts are gone.
    pub fn run_layer1_scan(
        &self,
        tick: u64,
        get_artifact: &dyn Fn(&str) -> Option<ArtifactEvent>,
    ) -> Vec<CoherenceEvent> {
        let mut state = self.state.lock().unwrap();
        state.last_layer1_tick = Some(tick);

        let mut fresh = Vec::new();
        let paths: Vec<String> = state.path_writers.keys().cloned().collect();
        for path in paths {
            let Some(writers) = state.path_writers.get_mut(&path) else {
                continue;
            };
            writers.retain(|w| get_artifact(&w.artifact_id).is_some());
            if writers.len() < 2 {
                continue;
            }
            let lead = writers[writers.len() - 1].agent_id.clone();
            let issue = duplication_issue(&path, writers, &lead);
            if !state.detected.contains_key(&issue.issue_id) {
                state.detected.insert(issue.issue_id.clone(), issue.clone());
                fresh.push(issue);
            }
        }
        fresh
    }

    pub fn should_run_layer1c_sweep(&self, tick: u64) -> bool {
        let state = self.state.lock().unwrap();
        due(
            state.last_layer1c_tick,
            tick,
            self.config.layer1c_interval_ticks,
        )
    }

    /// Content sweep: artifacts whose uploaded bytes hash identically
    /// across different agents are duplicated effort even when their
    /// source paths differ.
    pub fn run_layer1c_sweep(
        &self,
        tick: u64,
        artifacts: &[ArtifactEvent],
        content_provider: &dyn Fn(&str, &str) -> Option<Vec<u8>>,
    ) -> Vec<CoherenceEvent> {
        {
            let mut state = self.state.lock().unwrap();
            state.last_layer1c_tick = Some(tick);
        }

        let mut by_digest: HashMap<String, Vec<&ArtifactEvent>> = HashMap::new();
        for artifact in artifacts {
            if let Some(content) = content_provider(&artifact.agent_id, &artifact.artifact_id) {
                let digest = hex_digest(&content);
                by_digest.entry(digest).or_default().push(artifact);
            }
        }

        let mut fresh = Vec::new();
        let mut state = self.state.lock().unwrap();
        for (digest, group) in by_digest {
            let mut agents: Vec<&str> = group.iter().map(|a| a.agent_id.as_str()).collect();
            agents.sort_unstable();
            agents.dedup();
            if agents.len() < 2 {
                continue;
            }

            let issue_id = stable_issue_id("content", &digest);
            if state.detected.contains_key(&issue_id) {
                continue;
            }
            let issue = CoherenceEvent {
                agent_id: group[group.len() - 1].agent_id.clone(),
                issue_id: issue_id.clone(),
                category: CoherenceCategory::Duplication,
                severity: Severity::Medium,
                title: "Identical artifact content produced by multiple agents".to_string(),
                description: format!(
                    "{} artifacts share the same content digest {}",
                    group.len(),
                    &digest[..12.min(digest.len())]
                ),
                affected_workstreams: dedup_strings(
                    group.iter().map(|a| a.workstream.clone()).collect(),
                ),
                affected_artifact_ids: group.iter().map(|a| a.artifact_id.clone()).collect(),
            };
            state.detected.insert(issue_id, issue.clone());
            fresh.push(issue);
        }
        fresh
    }

    /// Deep review, externally configured. Disabled or no-op providers
    /// yield nothing.
    pub fn run_layer2_review(
        &self,
        artifacts: &[ArtifactEvent],
        provider: &dyn ReviewProvider,
    ) -> Vec<CoherenceEvent> {
        if !self.config.enable_layer2 {
            return Vec::new();
        }
        let issues = provider.review(artifacts);
        let mut state = self.state.lock().unwrap();
        let mut fresh = Vec::new();
        for issue in issues {
            if !state.detected.contains_key(&issue.issue_id) {
                state.detected.insert(issue.issue_id.clone(), issue.clone());
                fresh.push(issue);
            }
        }
        fresh
    }

    pub fn detected_issues(&self) -> Vec<CoherenceEvent> {
        self.state.lock().unwrap().detected.values().cloned().collect()
    }
}

fn due(last: Option<u64>, tick: u64, interval: u64) -> bool {
    match last {
        Some(last) => tick.saturating_sub(last) >= interval,
        None => true,
    }
}

fn duplication_issue(path: &str, writers: &[PathWriter], lead_agent: &str) -> CoherenceEvent {
    CoherenceEvent {
        agent_id: lead_agent.to_string(),
        issue_id: stable_issue_id("path", path),
        category: CoherenceCategory::Duplication,
        severity: Severity::High,
        title: format!("Conflicting writes to {}", path),
        description: format!(
            "{} agents produced artifacts from the same source path",
            writers.len()
        ),
        affected_workstreams: dedup_strings(writers.iter().map(|w| w.workstream.clone()).collect()),
        affected_artifact_ids: writers.iter().map(|w| w.artifact_id.clone()).collect(),
    }
}

/// Stable per-conflict id: the same path (or digest) always maps to the
/// same issue id
fn stable_issue_id(kind: &str, key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_bytes());
    hasher.update(b":");
    hasher.update(key.as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    hex[..16].to_string()
}

fn hex_digest(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

fn dedup_strings(mut values: Vec<String>) -> Vec<String> {
    values.sort_unstable();
    values.dedup();
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use foreman_types::{ArtifactKind, ArtifactStatus, Provenance};

    fn artifact(agent: &str, artifact_id: &str, source_path: Option<&str>) -> ArtifactEvent {
        ArtifactEvent {
            agent_id: agent.to_string(),
            artifact_id: artifact_id.to_string(),
            name: artifact_id.to_string(),
            kind: ArtifactKind::Config,
            workstream: format!("{}-stream", agent),
            status: ArtifactStatus::Draft,
            quality_score: 0.5,
            provenance: Provenance {
                created_by: agent.to_string(),
                created_at: Utc::now(),
                source_path: source_path.map(String::from),
                source_artifact_ids: None,
            },
        }
    }

    #[test]
    fn test_cross_agent_same_path_conflicts_once() {
        let monitor = CoherenceMonitor::new(CoherenceConfig::default());

        assert!(monitor
            .process_artifact(&artifact("agent-a", "art-a1", Some("/config/shared.json")))
            .is_none());

        let issue = monitor
            .process_artifact(&artifact("agent-b", "art-b1", Some("/config/shared.json")))
            .unwrap();

        assert_eq!(issue.category, CoherenceCategory::Duplication);
        assert_eq!(issue.severity, Severity::High);
        assert!(issue.title.contains("/config/shared.json"));
        assert!(issue.affected_artifact_ids.contains(&"art-a1".to_string()));
        assert!(issue.affected_artifact_ids.contains(&"art-b1".to_string()));

        // Re-detection keeps the id stable
        let again = monitor
            .process_artifact(&artifact("agent-b", "art-b2", Some("/config/shared.json")))
            .unwrap();
        assert_eq!(again.issue_id, issue.issue_id);
        assert_eq!(monitor.detected_issues().len(), 1);
    }

    #[test]
    fn test_same_agent_rewrites_never_conflict() {
        let monitor = CoherenceMonitor::new(CoherenceConfig::default());
        assert!(monitor
            .process_artifact(&artifact("agent-a", "art-1", Some("/src/index.ts")))
            .is_none());
        assert!(monitor
            .process_artifact(&artifact("agent-a", "art-2", Some("/src/index.ts")))
            .is_none());
    }

    #[test]
    fn test_pathless_artifacts_never_conflict() {
        let monitor = CoherenceMonitor::new(CoherenceConfig::default());
        assert!(monitor.process_artifact(&artifact("agent-a", "a1", None)).is_none());
        assert!(monitor.process_artifact(&artifact("agent-b", "b1", None)).is_none());
        assert!(monitor.process_artifact(&artifact("agent-c", "c1", Some(""))).is_none());
    }

    #[test]
    fn test_layer1_scan_is_tick_gated_and_retires_dead_artifacts() {
        let monitor = CoherenceMonitor::new(CoherenceConfig {
            layer1_interval_ticks: 10,
            ..Default::default()
        });
        assert!(monitor.should_run_layer1_scan(0));

        monitor.process_artifact(&artifact("agent-a", "art-a1", Some("/shared.md")));
        monitor.process_artifact(&artifact("agent-b", "art-b1", Some("/shared.md")));

        // Scan with agent-b's artifact removed from the store: the conflict
        // collapses and nothing new is reported
        let live = ["art-a1"];
        let fresh = monitor.run_layer1_scan(5, &|id| {
            live.contains(&id).then(|| artifact("agent-a", id, Some("/shared.md")))
        });
        assert!(fresh.is_empty());

        assert!(!monitor.should_run_layer1_scan(10));
        assert!(monitor.should_run_layer1_scan(15));
    }

    #[test]
    fn test_layer1c_sweep_groups_by_content_digest() {
        let monitor = CoherenceMonitor::new(CoherenceConfig::default());
        let artifacts = vec![
            artifact("agent-a", "art-a1", None),
            artifact("agent-b", "art-b1", None),
            artifact("agent-c", "art-c1", None),
        ];

        let fresh = monitor.run_layer1c_sweep(0, &artifacts, &|agent, _| match agent {
            "agent-a" | "agent-b" => Some(b"identical body".to_vec()),
            _ => Some(b"different body".to_vec()),
        });

        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].category, CoherenceCategory::Duplication);
        assert_eq!(fresh[0].severity, Severity::Medium);
        assert_eq!(fresh[0].affected_artifact_ids.len(), 2);

        // Second sweep reports nothing new
        let again = monitor.run_layer1c_sweep(300, &artifacts, &|_, _| {
            Some(b"identical body".to_vec())
        });
        assert!(again.iter().all(|i| i.issue_id != fresh[0].issue_id));
    }

    #[test]
    fn test_layer2_disabled_and_noop_tolerated() {
        let monitor = CoherenceMonitor::new(CoherenceConfig::default());
        assert!(monitor.run_layer2_review(&[], &NoopReview).is_empty());

        let enabled = CoherenceMonitor::new(CoherenceConfig {
            enable_layer2: true,
            ..Default::default()
        });
        assert!(enabled.run_layer2_review(&[], &NoopReview).is_empty());
    }
}
