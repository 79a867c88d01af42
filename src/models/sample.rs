use serde::{Deserialize, Serialize};

/// Process metrics of one file over its current observation window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProcessMetrics {
    pub qty_of_commits: i64,
    pub lines_added: i64,
    pub lines_deleted: i64,
    pub qty_of_authors: i64,
    pub qty_minor_authors: i64,
    pub qty_major_authors: i64,
    pub author_ownership: f64,
    pub bug_fix_count: i64,
    pub refactorings_involved: i64,
}

impl ProcessMetrics {
    /// Marker for a refactored file that had no tracker.
    pub const SENTINEL: Self = Self {
        qty_of_commits: -1,
        lines_added: -1,
        lines_deleted: -1,
        qty_of_authors: -1,
        qty_minor_authors: -1,
        qty_major_authors: -1,
        author_ownership: -1.0,
        bug_fix_count: -1,
        refactorings_involved: -1,
    };

    pub fn is_sentinel(&self) -> bool {
        *self == Self::SENTINEL
    }
}

/// Pre-refactoring history of a file touched by a refactoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefactoringSample {
    pub file_path: String,
    pub class_name: String,
    pub process_metrics: ProcessMetrics,
    pub refactoring_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub commit_id: String,
}

/// History of a file that stayed unrefactored for `threshold` commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StableSample {
    pub file_path: String,
    pub process_metrics: ProcessMetrics,
    pub threshold: u64,
    pub baseline_commit_id: String,
    /// Path of the file at the baseline commit; differs after a rename
    pub baseline_path: String,
    pub baseline_message: String,
    pub baseline_timestamp: i64,
    /// Commit at which the stability ceiling was reached
    pub commit_id: String,
    /// Source of the file at the baseline commit
    #[serde(skip)]
    pub source: String,
}

/// One emitted sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Sample {
    Refactoring(RefactoringSample),
    Stable(StableSample),
}

impl Sample {
    pub fn file_path(&self) -> &str {
        match self {
            Self::Refactoring(s) => &s.file_path,
            Self::Stable(s) => &s.file_path,
        }
    }

    pub fn commit_id(&self) -> &str {
        match self {
            Self::Refactoring(s) => &s.commit_id,
            Self::Stable(s) => &s.commit_id,
        }
    }
}
