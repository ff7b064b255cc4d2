//! Request and response bodies for the HTTP adapters.

use serde::{Deserialize, Serialize};
use yoconf_core::{Chunk, Snapshot, Version};

/// Request to store a new chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateChunkRequest {
    pub project: String,
    pub version: Version,
    #[serde(default)]
    pub data: String,
    /// Whether the new chunk becomes the project's active version.
    #[serde(default, alias = "in_use")]
    pub active: bool,
}

impl From<CreateChunkRequest> for Chunk {
    fn from(req: CreateChunkRequest) -> Self {
        Chunk::new(req.project, req.version, req.data, req.active)
    }
}

/// Request to promote a stored version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollOnRequest {
    pub version: Version,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListVersionsResponse {
    pub project: String,
    pub versions: Vec<Version>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListSnapshotsResponse {
    pub project: String,
    pub snapshots: Vec<Snapshot>,
}
