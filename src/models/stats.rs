use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::result::ScrapingResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStats {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    /// Diffing against stored snapshots happens in the caller; always 0 here.
    pub changes_detected: usize,
    pub duration_ms: u64,
    pub average_per_item: f64,
}

impl BatchStats {
    pub fn from_results(
        results: &[ScrapingResult],
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        let total = results.len();
        let success = results.iter().filter(|r| r.success).count();
        let duration_ms = finished_at
            .signed_duration_since(started_at)
            .num_milliseconds()
            .max(0) as u64;

        let average_per_item = if total == 0 {
            0.0
        } else {
            duration_ms as f64 / total as f64
        };

        Self {
            total,
            success,
            failed: total - success,
            changes_detected: 0,
            duration_ms,
            average_per_item,
        }
    }
}
