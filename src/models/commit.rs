use serde::{Deserialize, Serialize};

use super::refactoring::Refactoring;

/// Kind of change a diff entry applies to a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeType {
    Add,
    Modify,
    Delete,
    Rename,
}

/// One file entry of a commit diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub change_type: ChangeType,
    /// Path before the change (renames and deletions)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_path: Option<String>,
    pub new_path: String,
    #[serde(default)]
    pub lines_added: u64,
    #[serde(default)]
    pub lines_deleted: u64,
}

impl FileChange {
    /// Path whose tracker a deletion removes.
    pub fn deleted_path(&self) -> &str {
        self.old_path.as_deref().unwrap_or(&self.new_path)
    }
}

/// Identity of a commit: everything a tracker needs besides the diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitMeta {
    pub id: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub author: String,
    /// Commit time, seconds since the Unix epoch
    #[serde(default)]
    pub timestamp: i64,
}

/// Start of a tracker's observation window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Baseline {
    pub commit_id: String,
    pub message: String,
    pub timestamp: i64,
}

impl From<&CommitMeta> for Baseline {
    fn from(commit: &CommitMeta) -> Self {
        Self {
            commit_id: commit.id.clone(),
            message: commit.message.clone(),
            timestamp: commit.timestamp,
        }
    }
}

/// A commit of a replayed stream: metadata, diff and the oracle's answer.
///
/// `refactorings` absent or `null` means detection was undetermined for this
/// commit; an empty list means no refactoring was found.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitRecord {
    #[serde(flatten)]
    pub meta: CommitMeta,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<String>,
    #[serde(default)]
    pub changes: Vec<FileChange>,
    #[serde(default)]
    pub refactorings: Option<Vec<Refactoring>>,
}

impl CommitRecord {
    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }
}
