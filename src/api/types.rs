//! API request and response types.

use serde::{Deserialize, Serialize};

use crate::board::{BulkWriteResult, ReorderEntry};

/// Body of `PUT /tasks/reorder-tasks`.
#[derive(Debug, Clone, Deserialize)]
pub struct ReorderRequest {
    /// Desired rank and category for each task
    #[serde(default)]
    pub tasks: Vec<ReorderEntry>,
}

/// Response after a batch reorder.
#[derive(Debug, Clone, Serialize)]
pub struct ReorderResponse {
    pub message: String,

    /// Tasks found for the submitted ids
    pub matched: u64,

    /// Tasks whose rank or category actually changed
    pub modified: u64,
}

impl From<BulkWriteResult> for ReorderResponse {
    fn from(result: BulkWriteResult) -> Self {
        Self {
            message: "Tasks reordered successfully".to_string(),
            matched: result.matched,
            modified: result.modified,
        }
    }
}

/// Plain acknowledgement or error body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,

    /// Active storage backend
    pub store: String,

    /// Whether data survives a restart
    pub persistent: bool,
}
