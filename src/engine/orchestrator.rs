//! Per-commit update protocol: refactoring check, diff application, stability check.

use ahash::{AHashMap, AHashSet};
use anyhow::Result;
use tracing::{debug, error, info};

use super::filter::{FileFilter, unix_path};
use super::observer::{ResetCause, TrackerEvent, TrackerObserver, TracingObserver};
use super::registry::TrackerRegistry;
use super::stability::StabilityPolicy;
use super::tracker::TrackerSettings;
use crate::models::commit::{Baseline, ChangeType, CommitMeta, FileChange};
use crate::models::refactoring::Refactoring;
use crate::models::sample::{ProcessMetrics, RefactoringSample, Sample, StableSample};

/// Reads a file as it was at a given commit.
pub trait SourceProvider {
    fn read_source(&self, commit_id: &str, path: &str) -> Result<String>;
}

/// Source provider for streams without a repository behind them.
#[derive(Debug, Default)]
pub struct SkipSources;

impl SourceProvider for SkipSources {
    fn read_source(&self, _commit_id: &str, _path: &str) -> Result<String> {
        Ok(String::new())
    }
}

/// Everything one commit produced.
#[derive(Debug, Default)]
pub struct CommitOutcome {
    pub samples: Vec<Sample>,
    /// Refactored paths that had no tracker
    pub untracked_refactorings: usize,
    /// Stable crossings dropped because the source could not be read
    pub dropped_stable: usize,
}

pub struct TrackingOrchestrator {
    registry: TrackerRegistry,
    settings: TrackerSettings,
    policy: StabilityPolicy,
    filter: FileFilter,
    observer: Box<dyn TrackerObserver>,
}

impl TrackingOrchestrator {
    pub fn new(settings: TrackerSettings, policy: StabilityPolicy, filter: FileFilter) -> Self {
        Self {
            registry: TrackerRegistry::new(),
            settings,
            policy,
            filter,
            observer: Box::new(TracingObserver),
        }
    }

    pub fn with_observer(mut self, observer: Box<dyn TrackerObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn registry(&self) -> &TrackerRegistry {
        &self.registry
    }

    pub fn policy(&self) -> &StabilityPolicy {
        &self.policy
    }

    /// Run one non-merge commit through the engine.
    ///
    /// `refactorings` is the oracle's answer for this commit; an undetermined
    /// answer is passed as an empty slice by the caller.
    pub fn process_commit(
        &mut self,
        commit: &CommitMeta,
        changes: &[FileChange],
        refactorings: &[Refactoring],
        sources: &dyn SourceProvider,
    ) -> CommitOutcome {
        debug!(
            commit = %commit.id,
            changes = changes.len(),
            refactorings = refactorings.len(),
            "Processing commit"
        );
        let mut outcome = CommitOutcome::default();
        let refactored = self.apply_refactorings(commit, refactorings, &mut outcome);
        self.apply_changes(commit, changes);
        self.emit_stable(commit, &refactored, sources, &mut outcome);
        outcome
    }

    // ------------------------------------------------------------------
    // REFCHECK
    // ------------------------------------------------------------------

    fn apply_refactorings(
        &mut self,
        commit: &CommitMeta,
        refactorings: &[Refactoring],
        outcome: &mut CommitOutcome,
    ) -> AHashSet<String> {
        let mut snapshots: AHashMap<String, Option<ProcessMetrics>> = AHashMap::new();
        let mut order: Vec<String> = Vec::new();

        for refactoring in refactorings {
            let path = unix_path(&refactoring.file_path);
            let metrics = match snapshots.get(&path) {
                Some(metrics) => *metrics,
                None => {
                    let metrics = self
                        .registry
                        .get(&path)
                        .map(|tracker| tracker.snapshot(&self.settings).metrics);
                    if metrics.is_none() {
                        error!(
                            commit = %commit.id,
                            path = %path,
                            "Refactored file has no tracker"
                        );
                        outcome.untracked_refactorings += 1;
                    }
                    snapshots.insert(path.clone(), metrics);
                    order.push(path.clone());
                    metrics
                }
            };

            self.observer.on_event(&TrackerEvent::RefactoringSampled {
                path: &path,
                commit_id: &commit.id,
                refactoring_type: &refactoring.refactoring_type,
                tracked: metrics.is_some(),
            });
            outcome.samples.push(Sample::Refactoring(RefactoringSample {
                file_path: path,
                class_name: refactoring.class_name(),
                process_metrics: metrics.unwrap_or(ProcessMetrics::SENTINEL),
                refactoring_type: refactoring.refactoring_type.clone(),
                description: refactoring.description.clone(),
                commit_id: commit.id.clone(),
            }));
        }

        let baseline = Baseline::from(commit);
        for path in &order {
            if let Some(tracker) = self.registry.get_mut(path) {
                tracker.reset(baseline.clone(), true);
                let refactorings_involved = tracker.refactorings_involved();
                self.observer.on_event(&TrackerEvent::Reset {
                    path,
                    commit_id: &commit.id,
                    cause: ResetCause::Refactoring,
                    refactorings_involved,
                });
            }
        }
        order.into_iter().collect()
    }

    // ------------------------------------------------------------------
    // DIFFAPPLY
    // ------------------------------------------------------------------

    fn apply_changes(&mut self, commit: &CommitMeta, changes: &[FileChange]) {
        let baseline = Baseline::from(commit);
        for change in changes {
            match change.change_type {
                ChangeType::Delete => {
                    let path = unix_path(change.deleted_path());
                    if self.filter.accepts(&path) {
                        self.remove(&path, commit);
                    }
                }
                ChangeType::Rename => {
                    let new_path = unix_path(&change.new_path);
                    match change.old_path.as_deref().map(unix_path) {
                        Some(old_path) if old_path != new_path => {
                            if !self.filter.accepts(&new_path) {
                                // Moved out of the tracked file types
                                if self.filter.accepts(&old_path) {
                                    self.remove(&old_path, commit);
                                }
                                continue;
                            }
                            let carried = self.registry.contains(&old_path);
                            self.registry.rename(&old_path, &new_path, &baseline);
                            self.observer.on_event(&TrackerEvent::Renamed {
                                from: &old_path,
                                to: &new_path,
                                commit_id: &commit.id,
                                carried,
                            });
                            self.record(&new_path, commit, &baseline, change);
                        }
                        _ => {
                            if self.filter.accepts(&new_path) {
                                self.record(&new_path, commit, &baseline, change);
                            }
                        }
                    }
                }
                ChangeType::Add | ChangeType::Modify => {
                    let path = unix_path(&change.new_path);
                    if self.filter.accepts(&path) {
                        self.record(&path, commit, &baseline, change);
                    }
                }
            }
        }
    }

    fn record(
        &mut self,
        path: &str,
        commit: &CommitMeta,
        baseline: &Baseline,
        change: &FileChange,
    ) {
        if !self.registry.contains(path) {
            self.observer.on_event(&TrackerEvent::Created {
                path,
                commit_id: &commit.id,
            });
        }
        let tracker = self.registry.upsert(path, baseline);
        tracker.record_commit(
            commit,
            change.lines_added,
            change.lines_deleted,
            &self.settings.bug_keywords,
        );
        let commit_count = tracker.commit_count();
        let consecutive_counter = tracker.consecutive_counter();
        self.observer.on_event(&TrackerEvent::Recorded {
            path,
            commit_id: &commit.id,
            commit_count,
            consecutive_counter,
        });
    }

    fn remove(&mut self, path: &str, commit: &CommitMeta) {
        if self.registry.remove(path).is_some() {
            self.observer.on_event(&TrackerEvent::Removed {
                path,
                commit_id: &commit.id,
            });
        }
    }

    // ------------------------------------------------------------------
    // STABLECHECK
    // ------------------------------------------------------------------

    fn emit_stable(
        &mut self,
        commit: &CommitMeta,
        refactored: &AHashSet<String>,
        sources: &dyn SourceProvider,
        outcome: &mut CommitOutcome,
    ) {
        for path in self.registry.find_crossing_threshold(&self.policy) {
            if refactored.contains(&path) {
                continue;
            }
            let Some(tracker) = self.registry.get(&path) else {
                continue;
            };
            let snapshot = tracker.snapshot(&self.settings);
            let baseline_id = snapshot.baseline.commit_id.as_str();
            let baseline_path = snapshot.baseline_path.as_str();

            let source = match sources.read_source(baseline_id, baseline_path) {
                Ok(source) => source,
                Err(err) => {
                    error!(
                        commit = %commit.id,
                        path = %path,
                        baseline = %baseline_id,
                        baseline_path = %baseline_path,
                        error = %err,
                        "Dropping stable file: source unavailable"
                    );
                    self.observer.on_event(&TrackerEvent::SourceUnavailable {
                        path: &path,
                        baseline_commit_id: baseline_id,
                    });
                    self.remove(&path, commit);
                    outcome.dropped_stable += 1;
                    continue;
                }
            };

            let before = outcome.samples.len();
            for threshold in self.policy.thresholds_for(snapshot.metrics.qty_of_commits) {
                outcome.samples.push(Sample::Stable(StableSample {
                    file_path: path.clone(),
                    process_metrics: snapshot.metrics,
                    threshold,
                    baseline_commit_id: snapshot.baseline.commit_id.clone(),
                    baseline_path: snapshot.baseline_path.clone(),
                    baseline_message: snapshot.baseline.message.clone(),
                    baseline_timestamp: snapshot.baseline.timestamp,
                    commit_id: commit.id.clone(),
                    source: source.clone(),
                }));
            }
            let emitted = outcome.samples.len() - before;
            info!(
                commit = %commit.id,
                path = %path,
                baseline = %baseline_id,
                samples = emitted,
                "Found not-refactored example"
            );
            self.observer.on_event(&TrackerEvent::StableSampled {
                path: &path,
                commit_id: &commit.id,
                baseline_commit_id: baseline_id,
                samples: emitted,
            });

            if let Some(tracker) = self.registry.get_mut(&path) {
                tracker.reset(Baseline::from(commit), false);
                let refactorings_involved = tracker.refactorings_involved();
                self.observer.on_event(&TrackerEvent::Reset {
                    path: &path,
                    commit_id: &commit.id,
                    cause: ResetCause::Stability,
                    refactorings_involved,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use anyhow::bail;

    use super::*;
    use crate::engine::tracker::BugKeywords;
    use crate::error::SightError;

    struct FailingSources;

    impl SourceProvider for FailingSources {
        fn read_source(&self, commit_id: &str, path: &str) -> Result<String> {
            bail!(SightError::source_unavailable(commit_id, path))
        }
    }

    struct FixedSource;

    impl SourceProvider for FixedSource {
        fn read_source(&self, commit_id: &str, path: &str) -> Result<String> {
            Ok(format!("// {path}@{commit_id}"))
        }
    }

    #[derive(Clone, Default)]
    struct Recorder(Rc<RefCell<Vec<String>>>);

    impl TrackerObserver for Recorder {
        fn on_event(&self, event: &TrackerEvent<'_>) {
            let name = match event {
                TrackerEvent::Created { .. } => "created",
                TrackerEvent::Recorded { .. } => "recorded",
                TrackerEvent::Renamed { .. } => "renamed",
                TrackerEvent::Removed { .. } => "removed",
                TrackerEvent::Reset { .. } => "reset",
                TrackerEvent::RefactoringSampled { .. } => "refactoring",
                TrackerEvent::StableSampled { .. } => "stable",
                TrackerEvent::SourceUnavailable { .. } => "unavailable",
            };
            self.0.borrow_mut().push(name.to_string());
        }
    }

    fn orchestrator(thresholds: &[u64]) -> TrackingOrchestrator {
        let settings = TrackerSettings {
            bug_keywords: BugKeywords::new(["fix", "bug"]).unwrap(),
            major_author_share: 0.05,
        };
        let policy = StabilityPolicy::new(thresholds.iter().copied()).unwrap();
        TrackingOrchestrator::new(settings, policy, FileFilter::new(["java"]))
    }

    fn commit(n: usize) -> CommitMeta {
        CommitMeta {
            id: format!("c{n}"),
            message: format!("change {n}"),
            author: format!("dev{}", n % 2),
            timestamp: n as i64,
        }
    }

    fn change(change_type: ChangeType, old: Option<&str>, new: &str) -> FileChange {
        FileChange {
            change_type,
            old_path: old.map(str::to_string),
            new_path: new.to_string(),
            lines_added: 2,
            lines_deleted: 1,
        }
    }

    fn modify(path: &str) -> FileChange {
        change(ChangeType::Modify, None, path)
    }

    fn refactoring(path: &str, kind: &str) -> Refactoring {
        Refactoring {
            file_path: path.to_string(),
            refactoring_type: kind.to_string(),
            description: format!("{kind} in {path}"),
            class_name: None,
        }
    }

    fn stable(samples: &[Sample]) -> Vec<&StableSample> {
        samples
            .iter()
            .filter_map(|s| match s {
                Sample::Stable(s) => Some(s),
                Sample::Refactoring(_) => None,
            })
            .collect()
    }

    fn refactored(samples: &[Sample]) -> Vec<&RefactoringSample> {
        samples
            .iter()
            .filter_map(|s| match s {
                Sample::Refactoring(s) => Some(s),
                Sample::Stable(_) => None,
            })
            .collect()
    }

    #[test]
    fn emits_at_ceiling_then_repeats() {
        let mut engine = orchestrator(&[5, 10]);
        let mut emitted_at = Vec::new();
        for n in 1..=25 {
            let outcome = engine.process_commit(&commit(n), &[modify("A.java")], &[], &FixedSource);
            let samples = stable(&outcome.samples);
            if !samples.is_empty() {
                assert_eq!(
                    samples.iter().map(|s| s.threshold).collect::<Vec<_>>(),
                    [5, 10]
                );
                for sample in &samples {
                    assert_eq!(sample.process_metrics.qty_of_commits, 10);
                    assert_eq!(sample.process_metrics.lines_added, 20);
                }
                emitted_at.push(n);
            }
        }
        assert_eq!(emitted_at, [10, 20]);
        assert_eq!(
            engine.registry().get("A.java").unwrap().consecutive_counter(),
            5
        );
    }

    #[test]
    fn single_threshold_emits_every_commit() {
        let mut engine = orchestrator(&[1]);
        let mut all = Vec::new();
        for n in 1..=3 {
            let kind = if n == 1 { ChangeType::Add } else { ChangeType::Modify };
            let outcome = engine.process_commit(
                &commit(n),
                &[change(kind, None, "A.java")],
                &[],
                &FixedSource,
            );
            all.extend(outcome.samples);
        }
        let samples = stable(&all);
        assert_eq!(samples.len(), 3);
        for sample in &samples {
            assert_eq!(sample.process_metrics.qty_of_commits, 1);
            assert_eq!(sample.threshold, 1);
        }
        assert_eq!(samples[0].baseline_commit_id, "c1");
        assert_eq!(samples[1].baseline_commit_id, "c1");
        assert_eq!(samples[2].baseline_commit_id, "c2");
        assert_eq!(samples[2].commit_id, "c3");
        assert_eq!(samples[2].source, "// A.java@c2");
    }

    #[test]
    fn untracked_refactoring_gets_sentinel_metrics() {
        let mut engine = orchestrator(&[5]);
        let outcome = engine.process_commit(
            &commit(1),
            &[],
            &[refactoring("src/Ghost.java", "Extract Method")],
            &SkipSources,
        );
        assert_eq!(outcome.untracked_refactorings, 1);
        let samples = refactored(&outcome.samples);
        assert_eq!(samples.len(), 1);
        assert!(samples[0].process_metrics.is_sentinel());
        assert_eq!(samples[0].class_name, "Ghost");
        assert!(engine.registry().get("src/Ghost.java").is_none());
    }

    #[test]
    fn refactoring_uses_pre_commit_snapshot_and_resets_once() {
        let mut engine = orchestrator(&[50]);
        for n in 1..=3 {
            engine.process_commit(&commit(n), &[modify("A.java")], &[], &SkipSources);
        }

        let outcome = engine.process_commit(
            &commit(4),
            &[modify("A.java")],
            &[
                refactoring("A.java", "Extract Method"),
                refactoring("A.java", "Rename Variable"),
            ],
            &SkipSources,
        );
        let samples = refactored(&outcome.samples);
        assert_eq!(samples.len(), 2);
        for sample in &samples {
            assert_eq!(sample.process_metrics.qty_of_commits, 3);
            assert_eq!(sample.process_metrics.refactorings_involved, 0);
            assert_eq!(sample.commit_id, "c4");
        }
        assert_eq!(samples[1].refactoring_type, "Rename Variable");

        let tracker = engine.registry().get("A.java").unwrap();
        assert_eq!(tracker.refactorings_involved(), 1);
        assert_eq!(tracker.commit_count(), 1, "diff of the refactoring commit is recorded");
        assert_eq!(tracker.baseline().commit_id, "c4");
    }

    #[test]
    fn refactored_file_is_not_sampled_as_stable() {
        let mut engine = orchestrator(&[1]);
        engine.process_commit(&commit(1), &[modify("A.java")], &[], &FixedSource);
        let outcome = engine.process_commit(
            &commit(2),
            &[modify("A.java"), modify("B.java")],
            &[refactoring("A.java", "Move Method")],
            &FixedSource,
        );
        assert_eq!(refactored(&outcome.samples).len(), 1);
        let stable = stable(&outcome.samples);
        assert_eq!(stable.len(), 1);
        assert_eq!(stable[0].file_path, "B.java");
        assert_eq!(
            engine.registry().get("A.java").unwrap().consecutive_counter(),
            1
        );
    }

    #[test]
    fn rename_carries_history() {
        let mut engine = orchestrator(&[3]);
        engine.process_commit(&commit(1), &[modify("old/A.java")], &[], &FixedSource);
        engine.process_commit(
            &commit(2),
            &[change(ChangeType::Rename, Some("old/A.java"), "new/A.java")],
            &[],
            &FixedSource,
        );
        assert!(engine.registry().get("old/A.java").is_none());
        let outcome = engine.process_commit(&commit(3), &[modify("new/A.java")], &[], &FixedSource);

        let samples = stable(&outcome.samples);
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].file_path, "new/A.java");
        assert_eq!(samples[0].baseline_commit_id, "c1");
        assert_eq!(samples[0].baseline_path, "old/A.java");
        assert_eq!(samples[0].source, "// old/A.java@c1");
        assert_eq!(samples[0].process_metrics.qty_of_commits, 3);
    }

    #[test]
    fn rename_in_refactoring_commit_moves_baseline_path() {
        let mut engine = orchestrator(&[2]);
        engine.process_commit(&commit(1), &[modify("old/A.java")], &[], &FixedSource);
        engine.process_commit(
            &commit(2),
            &[change(ChangeType::Rename, Some("old/A.java"), "new/A.java")],
            &[refactoring("old/A.java", "Move Class")],
            &FixedSource,
        );
        let outcome = engine.process_commit(&commit(3), &[modify("new/A.java")], &[], &FixedSource);

        let samples = stable(&outcome.samples);
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].baseline_commit_id, "c2");
        assert_eq!(samples[0].baseline_path, "new/A.java");
        assert_eq!(samples[0].source, "// new/A.java@c2");
    }

    #[test]
    fn ceiling_of_one_keeps_sampling_after_refactoring() {
        let mut engine = orchestrator(&[1]);
        engine.process_commit(&commit(1), &[modify("A.java")], &[], &FixedSource);
        let outcome = engine.process_commit(
            &commit(2),
            &[modify("A.java")],
            &[refactoring("A.java", "Extract Method")],
            &FixedSource,
        );
        assert!(stable(&outcome.samples).is_empty());

        let mut emitted = 0;
        for n in 3..=10 {
            let outcome = engine.process_commit(&commit(n), &[modify("A.java")], &[], &FixedSource);
            let samples = stable(&outcome.samples);
            assert_eq!(samples.len(), 1, "commit c{n}");
            assert_eq!(samples[0].threshold, 1);
            emitted += 1;
        }
        assert_eq!(emitted, 8);
        assert_eq!(
            engine.registry().get("A.java").unwrap().consecutive_counter(),
            0
        );
    }

    #[test]
    fn rename_out_of_filter_drops_tracker() {
        let mut engine = orchestrator(&[3]);
        engine.process_commit(&commit(1), &[modify("A.java")], &[], &SkipSources);
        engine.process_commit(
            &commit(2),
            &[change(ChangeType::Rename, Some("A.java"), "A.kt")],
            &[],
            &SkipSources,
        );
        assert!(engine.registry().is_empty());
    }

    #[test]
    fn delete_then_readd_starts_from_zero() {
        let mut engine = orchestrator(&[10]);
        engine.process_commit(&commit(1), &[modify("A.java")], &[], &SkipSources);
        engine.process_commit(&commit(2), &[modify("A.java")], &[], &SkipSources);
        engine.process_commit(
            &commit(3),
            &[change(ChangeType::Delete, Some("A.java"), "A.java")],
            &[],
            &SkipSources,
        );
        assert!(engine.registry().get("A.java").is_none());

        engine.process_commit(
            &commit(4),
            &[change(ChangeType::Add, None, "A.java")],
            &[],
            &SkipSources,
        );
        let tracker = engine.registry().get("A.java").unwrap();
        assert_eq!(tracker.commit_count(), 1);
        assert_eq!(tracker.baseline().commit_id, "c4");
    }

    #[test]
    fn unavailable_source_drops_tracker() {
        let mut engine = orchestrator(&[2]);
        engine.process_commit(&commit(1), &[modify("A.java")], &[], &FailingSources);
        let outcome = engine.process_commit(&commit(2), &[modify("A.java")], &[], &FailingSources);
        assert!(outcome.samples.is_empty());
        assert_eq!(outcome.dropped_stable, 1);
        assert!(engine.registry().get("A.java").is_none());
    }

    #[test]
    fn filtered_files_are_ignored() {
        let mut engine = orchestrator(&[1]);
        let outcome = engine.process_commit(
            &commit(1),
            &[modify("README.md"), modify(r"src\App.java")],
            &[],
            &SkipSources,
        );
        assert_eq!(engine.registry().len(), 1);
        assert_eq!(stable(&outcome.samples)[0].file_path, "src/App.java");
    }

    #[test]
    fn observer_sees_every_mutation() {
        let recorder = Recorder::default();
        let mut engine = orchestrator(&[2]).with_observer(Box::new(recorder.clone()));
        engine.process_commit(&commit(1), &[modify("A.java")], &[], &FixedSource);
        engine.process_commit(&commit(2), &[modify("A.java")], &[], &FixedSource);
        engine.process_commit(
            &commit(3),
            &[modify("A.java")],
            &[refactoring("A.java", "Inline Method")],
            &FixedSource,
        );
        assert_eq!(
            *recorder.0.borrow(),
            [
                "created",
                "recorded",
                "recorded",
                "stable",
                "reset",
                "refactoring",
                "reset",
                "recorded",
            ]
        );
    }
}
