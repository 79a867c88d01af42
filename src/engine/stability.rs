use anyhow::{Result, bail};

use super::tracker::FileTracker;
use crate::error::SightError;

/// Decides when a file has stayed unrefactored long enough to be sampled.
///
/// Only the highest threshold (the ceiling) triggers emission and reset. The
/// lower thresholds tag extra records cut from the same snapshot, one per
/// threshold not above the snapshot's commit count.
///
/// A tracker goes past the ceiling only when it reached it on a commit that
/// also refactored it, so anything at or above the ceiling is due.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StabilityPolicy {
    thresholds: Vec<u64>,
    ceiling: u64,
}

impl StabilityPolicy {
    pub fn new(thresholds: impl IntoIterator<Item = u64>) -> Result<Self> {
        let mut thresholds: Vec<u64> = thresholds.into_iter().collect();
        thresholds.sort_unstable();
        thresholds.dedup();

        let Some(&ceiling) = thresholds.last() else {
            bail!(SightError::invalid_config(
                "stability_thresholds must not be empty"
            ));
        };
        if thresholds.first() == Some(&0) {
            bail!(SightError::invalid_config(
                "stability_thresholds must be positive"
            ));
        }
        Ok(Self {
            thresholds,
            ceiling,
        })
    }

    pub fn thresholds(&self) -> &[u64] {
        &self.thresholds
    }

    pub fn is_crossing(&self, tracker: &FileTracker) -> bool {
        tracker.consecutive_counter() >= self.ceiling
    }

    /// Thresholds a snapshot with `commit_count` commits can be tagged with.
    pub fn thresholds_for(&self, commit_count: i64) -> impl Iterator<Item = u64> + '_ {
        self.thresholds
            .iter()
            .copied()
            .filter(move |&t| i64::try_from(t).is_ok_and(|t| t <= commit_count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tracker::BugKeywords;
    use crate::error::{ErrorCode, SightError};
    use crate::models::commit::{Baseline, CommitMeta};

    fn tracker_with(commits: u64) -> FileTracker {
        let bugs = BugKeywords::new(["fix"]).unwrap();
        let mut tracker = FileTracker::new(
            "A.java",
            Baseline {
                commit_id: "0".into(),
                message: String::new(),
                timestamp: 0,
            },
        );
        let commit = CommitMeta {
            id: "c".into(),
            message: "m".into(),
            author: "a".into(),
            timestamp: 0,
        };
        for _ in 0..commits {
            tracker.record_commit(&commit, 1, 1, &bugs);
        }
        tracker
    }

    fn error_code(err: &anyhow::Error) -> ErrorCode {
        err.downcast_ref::<SightError>().unwrap().code
    }

    #[test]
    fn thresholds_are_sorted_and_deduplicated() {
        let policy = StabilityPolicy::new([15, 5, 10, 5]).unwrap();
        assert_eq!(policy.thresholds(), [5, 10, 15]);
    }

    #[test]
    fn rejects_empty_and_zero() {
        let err = StabilityPolicy::new(Vec::new()).unwrap_err();
        assert_eq!(error_code(&err), ErrorCode::InvalidConfig);
        let err = StabilityPolicy::new([0, 5]).unwrap_err();
        assert_eq!(error_code(&err), ErrorCode::InvalidConfig);
    }

    #[test]
    fn ceiling_and_beyond_trigger() {
        let policy = StabilityPolicy::new([5, 10]).unwrap();
        assert!(!policy.is_crossing(&tracker_with(4)));
        assert!(!policy.is_crossing(&tracker_with(5)));
        assert!(!policy.is_crossing(&tracker_with(9)));
        assert!(policy.is_crossing(&tracker_with(10)));
        assert!(policy.is_crossing(&tracker_with(11)));
    }

    #[test]
    fn thresholds_for_commit_count() {
        let policy = StabilityPolicy::new([5, 10, 15]).unwrap();
        assert_eq!(policy.thresholds_for(15).collect::<Vec<_>>(), [5, 10, 15]);
        assert_eq!(policy.thresholds_for(12).collect::<Vec<_>>(), [5, 10]);
        assert!(policy.thresholds_for(-1).next().is_none());
    }
}
