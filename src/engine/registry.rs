use std::collections::hash_map::Entry;

use ahash::AHashMap;

use super::stability::StabilityPolicy;
use super::tracker::FileTracker;
use crate::models::commit::Baseline;

/// Trackers of one repository scan, keyed by current file path.
#[derive(Debug, Default)]
pub struct TrackerRegistry {
    trackers: AHashMap<String, FileTracker>,
}

impl TrackerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracker for `path`, created with `baseline` if the file is new.
    pub fn upsert(&mut self, path: &str, baseline: &Baseline) -> &mut FileTracker {
        self.trackers
            .entry(path.to_string())
            .or_insert_with(|| FileTracker::new(path, baseline.clone()))
    }

    /// Move the tracker of `old_path` to `new_path`, keeping its counters.
    ///
    /// An untracked `old_path` yields a fresh tracker at `new_path`.
    pub fn rename(
        &mut self,
        old_path: &str,
        new_path: &str,
        baseline: &Baseline,
    ) -> &mut FileTracker {
        let mut tracker = self
            .trackers
            .remove(old_path)
            .unwrap_or_else(|| FileTracker::new(new_path, baseline.clone()));
        tracker.move_to(new_path, &baseline.commit_id);

        match self.trackers.entry(new_path.to_string()) {
            Entry::Occupied(mut slot) => {
                slot.insert(tracker);
                slot.into_mut()
            }
            Entry::Vacant(slot) => slot.insert(tracker),
        }
    }

    pub fn remove(&mut self, path: &str) -> Option<FileTracker> {
        self.trackers.remove(path)
    }

    pub fn get(&self, path: &str) -> Option<&FileTracker> {
        self.trackers.get(path)
    }

    pub fn get_mut(&mut self, path: &str) -> Option<&mut FileTracker> {
        self.trackers.get_mut(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.trackers.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.trackers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trackers.is_empty()
    }

    /// Paths whose trackers reached the policy's ceiling, sorted.
    pub fn find_crossing_threshold(&self, policy: &StabilityPolicy) -> Vec<String> {
        let mut paths: Vec<String> = self
            .trackers
            .values()
            .filter(|tracker| policy.is_crossing(tracker))
            .map(|tracker| tracker.path().to_string())
            .collect();
        paths.sort();
        paths
    }
}
