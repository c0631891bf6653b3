use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

use foreman_types::{
    AgentHandle, AgentStatus, ArtifactEvent, CoherenceEvent, EventEnvelope,
};

use crate::error::{Error, Result};

// NOTE: Store Design Rationale
//
// Why SQLite rows with JSON payload columns?
// - Event shapes evolve with the agent protocol; the typed columns carry
//   only what queries filter on (agent, run, type, time), the payload
//   column carries the full envelope for faithful replay
// - Upserts keep artifact identity stable across rewrites
// - Parameterised statements everywhere; filter input never reaches SQL text
//
// Why an in-row version counter (meta table)?
// - Snapshot `version` must strictly increase across any state-changing
//   write, including across process restarts

const DEFAULT_QUERY_LIMIT: usize = 100;
const MAX_QUERY_LIMIT: usize = 1000;

/// Filter for the event log
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub agent_id: Option<String>,
    pub event_types: Option<Vec<String>>,
    pub since: Option<DateTime<Utc>>,
    pub run_id: Option<String>,
    pub limit: Option<usize>,
}

/// Stored artifact plus bookkeeping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub event: ArtifactEvent,
    pub updated_at: DateTime<Utc>,
}

/// Uploaded artifact content blob
#[derive(Debug, Clone)]
pub struct ArtifactContent {
    pub content: Vec<u8>,
    pub mime_type: Option<String>,
}

/// Artifacts grouped per workstream, for `list_artifacts`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkstreamArtifacts {
    pub workstream: String,
    pub artifacts: Vec<ArtifactRecord>,
}

/// Compact artifact entry for snapshots
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactIndexEntry {
    pub artifact_id: String,
    pub name: String,
    pub workstream: String,
    pub agent_id: String,
}

/// Connect-time and on-demand state snapshot. `pending_decisions` is filled
/// by the coordinator; the store itself does not own the decision queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeSnapshot {
    pub version: u64,
    pub generated_at: DateTime<Utc>,
    pub workstreams: Vec<String>,
    #[serde(default)]
    pub pending_decisions: Vec<Value>,
    pub recent_coherence_issues: Vec<CoherenceEvent>,
    pub artifact_index: Vec<ArtifactIndexEntry>,
    pub active_agents: Vec<AgentHandle>,
    pub estimated_tokens: u64,
}

pub struct KnowledgeStore {
    conn: Connection,
    version: u64,
    generated_at: DateTime<Utc>,
}

impl KnowledgeStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let mut store = Self {
            conn,
            version: 0,
            generated_at: Utc::now(),
        };
        store.init_schema()?;
        store.version = store.load_version()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_event_id TEXT NOT NULL,
                agent_id TEXT NOT NULL,
                run_id TEXT NOT NULL,
                event_type TEXT NOT NULL,
                source_sequence INTEGER NOT NULL,
                occurred_at TEXT NOT NULL,
                ingested_at TEXT NOT NULL,
                payload TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS artifacts (
                artifact_id TEXT PRIMARY KEY,
                agent_id TEXT NOT NULL,
                name TEXT NOT NULL,
                workstream TEXT NOT NULL,
                payload TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS artifact_contents (
                agent_id TEXT NOT NULL,
                artifact_id TEXT NOT NULL,
                content BLOB NOT NULL,
                mime_type TEXT,
                stored_at TEXT NOT NULL,
                PRIMARY KEY (agent_id, artifact_id)
            );

            CREATE TABLE IF NOT EXISTS coherence_issues (
                issue_id TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                detected_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS agents (
                id TEXT PRIMARY KEY,
                plugin_name TEXT NOT NULL,
                status TEXT NOT NULL,
                session_id TEXT NOT NULL,
                metadata TEXT,
                registered_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL,
                subject TEXT NOT NULL,
                action TEXT NOT NULL,
                target TEXT NOT NULL,
                payload TEXT,
                logged_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_events_agent ON events(agent_id);
            CREATE INDEX IF NOT EXISTS idx_events_run ON events(run_id);
            CREATE INDEX IF NOT EXISTS idx_events_type ON events(event_type);
            CREATE INDEX IF NOT EXISTS idx_artifacts_workstream ON artifacts(workstream);
            "#,
        )?;
        Ok(())
    }

    fn load_version(&self) -> Result<u64> {
        let stored: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM meta WHERE key = 'version'",
                [],
                |row| row.get(0),
            )
            .optional()?;

        Ok(stored.and_then(|v| v.parse().ok()).unwrap_or(0))
    }

    fn bump_version(&mut self) -> Result<()> {
        self.version += 1;
        self.generated_at = Utc::now();
        self.conn.execute(
            r#"
            INSERT INTO meta (key, value) VALUES ('version', ?1)
            ON CONFLICT(key) DO UPDATE SET value = ?1
            "#,
            params![self.version.to_string()],
        )?;
        Ok(())
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn append_event(&mut self, envelope: &EventEnvelope) -> Result<()> {
        let payload = serde_json::to_string(envelope)?;
        self.conn.execute(
            r#"
            INSERT INTO events
                (source_event_id, agent_id, run_id, event_type, source_sequence,
                 occurred_at, ingested_at, payload)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                envelope.source_event_id,
                envelope.agent_id(),
                envelope.run_id,
                envelope.event.type_name(),
                envelope.source_sequence,
                envelope.source_occurred_at.to_rfc3339(),
                envelope.ingested_at.to_rfc3339(),
                payload,
            ],
        )?;
        self.bump_version()
    }

    /// Filtered, bounded retrieval from the event log, newest rows last
    pub fn query_events(&self, filter: &EventFilter) -> Result<Vec<EventEnvelope>> {
        let mut sql = String::from("SELECT payload FROM events WHERE 1=1");
        let mut args: Vec<String> = Vec::new();

        if let Some(agent_id) = &filter.agent_id {
            sql.push_str(&format!(" AND agent_id = ?{}", args.len() + 1));
            args.push(agent_id.clone());
        }
        if let Some(run_id) = &filter.run_id {
            sql.push_str(&format!(" AND run_id = ?{}", args.len() + 1));
            args.push(run_id.clone());
        }
        if let Some(since) = &filter.since {
            sql.push_str(&format!(" AND ingested_at >= ?{}", args.len() + 1));
            args.push(since.to_rfc3339());
        }
        if let Some(types) = &filter.event_types {
            if !types.is_empty() {
                let placeholders: Vec<String> = types
                    .iter()
                    .enumerate()
                    .map(|(i, _)| format!("?{}", args.len() + i + 1))
                    .collect();
                sql.push_str(&format!(" AND event_type IN ({})", placeholders.join(", ")));
                args.extend(types.iter().cloned());
            }
        }

        let limit = filter
            .limit
            .unwrap_or(DEFAULT_QUERY_LIMIT)
            .clamp(1, MAX_QUERY_LIMIT);
        sql.push_str(&format!(" ORDER BY id DESC LIMIT {}", limit));

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), |row| {
            row.get::<_, String>(0)
        })?;

        let mut envelopes = Vec::new();
        for row in rows {
            envelopes.push(serde_json::from_str(&row?)?);
        }
        envelopes.reverse();
        Ok(envelopes)
    }

    pub fn store_artifact(&mut self, event: &ArtifactEvent) -> Result<()> {
        let payload = serde_json::to_string(event)?;
        let now = Utc::now();
        self.conn.execute(
            r#"
            INSERT INTO artifacts (artifact_id, agent_id, name, workstream, payload, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(artifact_id) DO UPDATE SET
                agent_id = ?2,
                name = ?3,
                workstream = ?4,
                payload = ?5,
                updated_at = ?6
            "#,
            params![
                event.artifact_id,
                event.agent_id,
                event.name,
                event.workstream,
                payload,
                now.to_rfc3339(),
            ],
        )?;
        self.bump_version()
    }

    pub fn get_artifact(&self, artifact_id: &str) -> Result<Option<ArtifactRecord>> {
        let row: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT payload, updated_at FROM artifacts WHERE artifact_id = ?1",
                params![artifact_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((payload, updated_at)) => Ok(Some(ArtifactRecord {
                event: serde_json::from_str(&payload)?,
                updated_at: parse_ts(&updated_at)?,
            })),
            None => Ok(None),
        }
    }

    /// All artifacts, grouped by workstream (stable identity per artifact)
    pub fn list_artifacts(&self) -> Result<Vec<WorkstreamArtifacts>> {
        let mut stmt = self.conn.prepare(
            "SELECT workstream, payload, updated_at FROM artifacts ORDER BY workstream, artifact_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut grouped: Vec<WorkstreamArtifacts> = Vec::new();
        for row in rows {
            let (workstream, payload, updated_at) = row?;
            let record = ArtifactRecord {
                event: serde_json::from_str(&payload)?,
                updated_at: parse_ts(&updated_at)?,
            };
            match grouped.last_mut() {
                Some(group) if group.workstream == workstream => group.artifacts.push(record),
                _ => grouped.push(WorkstreamArtifacts {
                    workstream,
                    artifacts: vec![record],
                }),
            }
        }
        Ok(grouped)
    }

    /// Idempotent overwrite of the content blob for `(agent_id, artifact_id)`
    pub fn store_artifact_content(
        &mut self,
        agent_id: &str,
        artifact_id: &str,
        content: &[u8],
        mime_type: Option<&str>,
    ) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO artifact_contents (agent_id, artifact_id, content, mime_type, stored_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(agent_id, artifact_id) DO UPDATE SET
                content = ?3,
                mime_type = ?4,
                stored_at = ?5
            "#,
            params![
                agent_id,
                artifact_id,
                content,
                mime_type,
                Utc::now().to_rfc3339(),
            ],
        )?;
        self.bump_version()
    }

    pub fn get_artifact_content(
        &self,
        agent_id: &str,
        artifact_id: &str,
    ) -> Result<Option<ArtifactContent>> {
        let row = self
            .conn
            .query_row(
                "SELECT content, mime_type FROM artifact_contents WHERE agent_id = ?1 AND artifact_id = ?2",
                params![agent_id, artifact_id],
                |row| {
                    Ok(ArtifactContent {
                        content: row.get(0)?,
                        mime_type: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn store_coherence_issue(&mut self, issue: &CoherenceEvent) -> Result<()> {
        let payload = serde_json::to_string(issue)?;
        self.conn.execute(
            r#"
            INSERT INTO coherence_issues (issue_id, payload, detected_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(issue_id) DO UPDATE SET payload = ?2
            "#,
            params![issue.issue_id, payload, Utc::now().to_rfc3339()],
        )?;
        self.bump_version()
    }

    pub fn list_coherence_issues(&self) -> Result<Vec<CoherenceEvent>> {
        let mut stmt = self
            .conn
            .prepare("SELECT payload FROM coherence_issues ORDER BY detected_at DESC")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut issues = Vec::new();
        for row in rows {
            issues.push(serde_json::from_str(&row?)?);
        }
        Ok(issues)
    }

    pub fn register_agent(&mut self, handle: &AgentHandle, metadata: Option<&Value>) -> Result<()> {
        let metadata = metadata.map(serde_json::to_string).transpose()?;
        self.conn.execute(
            r#"
            INSERT INTO agents (id, plugin_name, status, session_id, metadata, registered_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                plugin_name = ?2,
                status = ?3,
                session_id = ?4,
                metadata = COALESCE(?5, metadata)
            "#,
            params![
                handle.id,
                handle.plugin_name,
                status_str(handle.status),
                handle.session_id,
                metadata,
                Utc::now().to_rfc3339(),
            ],
        )?;
        self.bump_version()
    }

    /// Returns false when the agent is unknown; callers treat that as
    /// not-found, never as an error
    pub fn update_agent_status(&mut self, agent_id: &str, status: AgentStatus) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE agents SET status = ?2 WHERE id = ?1",
            params![agent_id, status_str(status)],
        )?;
        if changed > 0 {
            self.bump_version()?;
        }
        Ok(changed > 0)
    }

    pub fn remove_agent(&mut self, agent_id: &str) -> Result<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM agents WHERE id = ?1", params![agent_id])?;
        if changed > 0 {
            self.bump_version()?;
        }
        Ok(changed > 0)
    }

    pub fn list_agents(&self) -> Result<Vec<AgentHandle>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, plugin_name, status, session_id FROM agents ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut handles = Vec::new();
        for row in rows {
            let (id, plugin_name, status, session_id) = row?;
            handles.push(AgentHandle {
                id,
                plugin_name,
                status: parse_status(&status)?,
                session_id,
            });
        }
        Ok(handles)
    }

    pub fn append_audit_log(
        &mut self,
        kind: &str,
        subject: &str,
        action: &str,
        target: &str,
        payload: Option<&Value>,
    ) -> Result<()> {
        let payload = payload.map(serde_json::to_string).transpose()?;
        self.conn.execute(
            r#"
            INSERT INTO audit_log (kind, subject, action, target, payload, logged_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![kind, subject, action, target, payload, Utc::now().to_rfc3339()],
        )?;
        self.bump_version()
    }

    /// Store-side snapshot. Pending decisions are injected by the
    /// coordinator, which owns the queue.
    pub fn snapshot(&self) -> Result<KnowledgeSnapshot> {
        let grouped = self.list_artifacts()?;
        let workstreams: Vec<String> = grouped.iter().map(|g| g.workstream.clone()).collect();
        let artifact_index: Vec<ArtifactIndexEntry> = grouped
            .iter()
            .flat_map(|g| {
                g.artifacts.iter().map(|a| ArtifactIndexEntry {
                    artifact_id: a.event.artifact_id.clone(),
                    name: a.event.name.clone(),
                    workstream: a.event.workstream.clone(),
                    agent_id: a.event.agent_id.clone(),
                })
            })
            .collect();

        let recent_coherence_issues: Vec<CoherenceEvent> =
            self.list_coherence_issues()?.into_iter().take(20).collect();
        let active_agents = self.list_agents()?;

        let mut snapshot = KnowledgeSnapshot {
            version: self.version,
            generated_at: self.generated_at,
            workstreams,
            pending_decisions: Vec::new(),
            recent_coherence_issues,
            artifact_index,
            active_agents,
            estimated_tokens: 0,
        };
        let serialized = serde_json::to_string(&snapshot)?;
        snapshot.estimated_tokens = (serialized.len() / 4) as u64;
        Ok(snapshot)
    }
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Query(format!("bad timestamp '{}': {}", raw, e)))
}

fn status_str(status: AgentStatus) -> &'static str {
    match status {
        AgentStatus::Running => "running",
        AgentStatus::Paused => "paused",
        AgentStatus::WaitingOnHuman => "waiting_on_human",
        AgentStatus::Idle => "idle",
        AgentStatus::Completed => "completed",
        AgentStatus::Error => "error",
    }
}

fn parse_status(raw: &str) -> Result<AgentStatus> {
    match raw {
        "running" => Ok(AgentStatus::Running),
        "paused" => Ok(AgentStatus::Paused),
        "waiting_on_human" => Ok(AgentStatus::WaitingOnHuman),
        "idle" => Ok(AgentStatus::Idle),
        "completed" => Ok(AgentStatus::Completed),
        "error" => Ok(AgentStatus::Error),
        other => Err(Error::Query(format!("unknown agent status '{}'", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use foreman_types::{
        AgentEvent, ArtifactKind, ArtifactStatus, Provenance, StatusEvent,
    };

    fn status_envelope(id: &str, agent: &str, seq: i64) -> EventEnvelope {
        EventEnvelope::new(
            id,
            seq,
            "run-1",
            AgentEvent::Status(StatusEvent {
                agent_id: agent.to_string(),
                message: "working".to_string(),
                tick: None,
            }),
        )
    }

    fn artifact_event(agent: &str, artifact: &str, workstream: &str) -> ArtifactEvent {
        ArtifactEvent {
            agent_id: agent.to_string(),
            artifact_id: artifact.to_string(),
            name: format!("{} artifact", artifact),
            kind: ArtifactKind::Code,
            workstream: workstream.to_string(),
            status: ArtifactStatus::Draft,
            quality_score: 0.8,
            provenance: Provenance {
                created_by: agent.to_string(),
                created_at: Utc::now(),
                source_path: None,
                source_artifact_ids: None,
            },
        }
    }

    #[test]
    fn test_version_strictly_increases_on_writes() -> Result<()> {
        let mut store = KnowledgeStore::open_in_memory()?;
        let v0 = store.version();

        store.append_event(&status_envelope("e1", "agent-1", 1))?;
        let v1 = store.version();
        assert!(v1 > v0);

        store.store_artifact(&artifact_event("agent-1", "art-1", "backend"))?;
        assert!(store.version() > v1);
        Ok(())
    }

    #[test]
    fn test_event_query_filters_and_limit() -> Result<()> {
        let mut store = KnowledgeStore::open_in_memory()?;
        for i in 0..5 {
            store.append_event(&status_envelope(&format!("e{}", i), "agent-1", i))?;
        }
        store.append_event(&status_envelope("other", "agent-2", 1))?;

        let filter = EventFilter {
            agent_id: Some("agent-1".to_string()),
            limit: Some(3),
            ..Default::default()
        };
        let events = store.query_events(&filter)?;
        assert_eq!(events.len(), 3);
        assert!(events.iter().all(|e| e.agent_id() == "agent-1"));

        // Oversized limits clamp rather than error
        let filter = EventFilter {
            limit: Some(50_000),
            ..Default::default()
        };
        assert_eq!(store.query_events(&filter)?.len(), 6);
        Ok(())
    }

    #[test]
    fn test_injection_shaped_filter_is_inert() -> Result<()> {
        let mut store = KnowledgeStore::open_in_memory()?;
        store.append_event(&status_envelope("e1", "agent-1", 1))?;

        let filter = EventFilter {
            agent_id: Some("agent-1' OR '1'='1".to_string()),
            ..Default::default()
        };
        assert!(store.query_events(&filter)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_artifact_upsert_keeps_identity() -> Result<()> {
        let mut store = KnowledgeStore::open_in_memory()?;
        store.store_artifact(&artifact_event("agent-1", "art-1", "backend"))?;

        let mut rewrite = artifact_event("agent-1", "art-1", "backend");
        rewrite.name = "renamed".to_string();
        store.store_artifact(&rewrite)?;

        let grouped = store.list_artifacts()?;
        assert_eq!(grouped.len(), 1);
        assert_eq!(grouped[0].artifacts.len(), 1);
        assert_eq!(grouped[0].artifacts[0].event.name, "renamed");
        Ok(())
    }

    #[test]
    fn test_content_round_trip() -> Result<()> {
        let mut store = KnowledgeStore::open_in_memory()?;
        let body = b"fn main() {}".to_vec();
        store.store_artifact_content("agent-1", "art-1", &body, Some("text/x-rust"))?;

        let stored = store.get_artifact_content("agent-1", "art-1")?.unwrap();
        assert_eq!(stored.content, body);
        assert_eq!(stored.mime_type.as_deref(), Some("text/x-rust"));

        // Overwrite is idempotent on the same key
        store.store_artifact_content("agent-1", "art-1", b"fn main() { run() }", None)?;
        let stored = store.get_artifact_content("agent-1", "art-1")?.unwrap();
        assert_eq!(stored.content, b"fn main() { run() }");
        assert_eq!(stored.mime_type, None);

        assert!(store.get_artifact_content("agent-2", "art-1")?.is_none());
        Ok(())
    }

    #[test]
    fn test_unknown_reads_return_none() -> Result<()> {
        let store = KnowledgeStore::open_in_memory()?;
        assert!(store.get_artifact("missing")?.is_none());
        assert!(store.get_artifact_content("a", "b")?.is_none());
        Ok(())
    }

    #[test]
    fn test_snapshot_reflects_store_state() -> Result<()> {
        let mut store = KnowledgeStore::open_in_memory()?;
        store.store_artifact(&artifact_event("agent-1", "art-1", "backend"))?;
        store.store_artifact(&artifact_event("agent-2", "art-2", "frontend"))?;
        store.register_agent(&AgentHandle::new("agent-1", "null", "sess-1"), None)?;

        let snapshot = store.snapshot()?;
        assert_eq!(snapshot.version, store.version());
        assert_eq!(snapshot.workstreams, vec!["backend", "frontend"]);
        assert_eq!(snapshot.artifact_index.len(), 2);
        assert_eq!(snapshot.active_agents.len(), 1);
        assert!(snapshot.estimated_tokens > 0);
        Ok(())
    }

    #[test]
    fn test_version_survives_reopen() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("store.db");

        let v = {
            let mut store = KnowledgeStore::open(&path)?;
            store.append_event(&status_envelope("e1", "agent-1", 1))?;
            store.version()
        };

        let store = KnowledgeStore::open(&path)?;
        assert_eq!(store.version(), v);
        Ok(())
    }
}
