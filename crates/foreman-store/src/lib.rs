// Authoritative server-side state
// SQLite-backed knowledge store plus the in-memory checkpoint rings

mod checkpoint;
mod error;
mod knowledge;

pub use checkpoint::{CheckpointRecord, CheckpointStore, DEFAULT_MAX_PER_AGENT};
pub use error::{Error, Result};
pub use knowledge::{
    ArtifactContent, ArtifactIndexEntry, ArtifactRecord, EventFilter, KnowledgeSnapshot,
    KnowledgeStore, WorkstreamArtifacts,
};
