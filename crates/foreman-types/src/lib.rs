mod agent;
mod brake;
mod checkpoint;
mod decision;
mod envelope;
mod event;
mod trust;

pub use agent::*;
pub use brake::*;
pub use checkpoint::*;
pub use decision::*;
pub use envelope::*;
pub use event::*;
pub use trust::*;

use serde::{Deserialize, Serialize};

/// Client-side routing tag assigned by the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceTag {
    /// Pending decisions and anything needing human attention
    Queue,
    /// Artifact and coherence topology
    Map,
    /// Everything else, in arrival order
    Timeline,
}

