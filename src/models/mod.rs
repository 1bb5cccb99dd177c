use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod result;
pub mod stats;
pub mod task;

// Re-exports for convenience
pub use result::*;
pub use stats::*;
pub use task::*;

/// Everything a caller gets back from one batch execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub batch_id: Uuid,
    pub results: Vec<ScrapingResult>,
    pub stats: BatchStats,
    pub cancelled: bool,
}

/// Emitted once per task as soon as its result is known.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    /// 1-based position of the task in the submitted list.
    pub position: usize,
    pub total: usize,
    pub result: ScrapingResult,
}
