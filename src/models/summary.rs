use serde::{Deserialize, Serialize};

/// End-of-run report of a scan or replay.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    /// HEAD of the scanned repository
    #[serde(skip_serializing_if = "Option::is_none")]
    pub head: Option<String>,
    pub commits_total: usize,
    pub commits_processed: usize,
    pub merges_skipped: usize,
    pub refactoring_samples: usize,
    pub stable_samples: usize,
    /// Refactored files that had no tracker (sentinel samples)
    pub untracked_refactorings: usize,
    /// Stable crossings dropped because the source was unavailable
    pub dropped_stable: usize,
    /// Oracle timeouts/failures plus samples that could not be persisted
    pub exceptions: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_commit: Option<String>,
    pub thresholds: Vec<u64>,
    pub finished_in_secs: f64,
}
