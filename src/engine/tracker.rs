//! Per-file process metrics since the last refactoring or stability reset.

use aho_corasick::AhoCorasick;
use anyhow::{Context, Result};

use super::ledger::AuthorLedger;
use crate::models::commit::{Baseline, CommitMeta};
use crate::models::sample::ProcessMetrics;

/// Case-insensitive substring matcher for bug-fix commit messages.
///
/// Keywords and messages are folded with `str::to_lowercase`, so non-ASCII
/// letters match regardless of case too.
#[derive(Debug, Clone)]
pub struct BugKeywords {
    matcher: AhoCorasick,
    keywords: Vec<String>,
}

impl BugKeywords {
    pub fn new<I, S>(keywords: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords: Vec<String> = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        let folded: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();
        let matcher = AhoCorasick::new(&folded)
            .context("Failed to build bug keyword matcher")?;
        Ok(Self { matcher, keywords })
    }

    pub fn matches(&self, message: &str) -> bool {
        self.matcher.is_match(&message.to_lowercase())
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }
}

/// Classification knobs shared by every tracker of a scan.
#[derive(Debug, Clone)]
pub struct TrackerSettings {
    pub bug_keywords: BugKeywords,
    /// Minimum share of a file's commits that makes an author "major"
    pub major_author_share: f64,
}

/// Immutable copy of a tracker, taken before it is reset.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerSnapshot {
    pub path: String,
    pub baseline: Baseline,
    /// Path of the file at the baseline commit
    pub baseline_path: String,
    pub consecutive_counter: u64,
    pub metrics: ProcessMetrics,
}

#[derive(Debug, Clone)]
pub struct FileTracker {
    path: String,
    commit_count: u64,
    lines_added: u64,
    lines_deleted: u64,
    authors: AuthorLedger,
    bug_fix_count: u64,
    refactorings_involved: u64,
    baseline: Baseline,
    /// Where the file lived at `baseline`; unchanged by later renames
    baseline_path: String,
    consecutive_counter: u64,
}

impl FileTracker {
    pub fn new(path: impl Into<String>, baseline: Baseline) -> Self {
        let path = path.into();
        Self {
            baseline_path: path.clone(),
            path,
            commit_count: 0,
            lines_added: 0,
            lines_deleted: 0,
            authors: AuthorLedger::new(),
            bug_fix_count: 0,
            refactorings_involved: 0,
            baseline,
            consecutive_counter: 0,
        }
    }

    /// Account for one commit touching this file.
    pub fn record_commit(
        &mut self,
        commit: &CommitMeta,
        lines_added: u64,
        lines_deleted: u64,
        bug_keywords: &BugKeywords,
    ) {
        self.commit_count += 1;
        self.consecutive_counter += 1;
        self.lines_added += lines_added;
        self.lines_deleted += lines_deleted;
        self.authors.increment(&commit.author);
        if bug_keywords.matches(&commit.message) {
            self.bug_fix_count += 1;
        }
    }

    /// Share of the top author in this window; `None` before any commit.
    pub fn author_ownership(&self) -> Option<f64> {
        if self.commit_count == 0 {
            return None;
        }
        Some(self.authors.max_count() as f64 / self.commit_count as f64)
    }

    pub fn major_author_count(&self, share: f64) -> usize {
        if self.commit_count == 0 {
            return 0;
        }
        let total = self.commit_count as f64;
        self.authors
            .iter()
            .filter(|(_, count)| *count as f64 / total >= share)
            .count()
    }

    pub fn minor_author_count(&self, share: f64) -> usize {
        self.authors.len() - self.major_author_count(share)
    }

    /// Start a new observation window at `baseline`.
    pub fn reset(&mut self, baseline: Baseline, caused_by_refactoring: bool) {
        if caused_by_refactoring {
            self.refactorings_involved += 1;
        }
        self.commit_count = 0;
        self.lines_added = 0;
        self.lines_deleted = 0;
        self.bug_fix_count = 0;
        self.authors.clear();
        self.consecutive_counter = 0;
        self.baseline = baseline;
        self.baseline_path = self.path.clone();
    }

    pub fn snapshot(&self, settings: &TrackerSettings) -> TrackerSnapshot {
        let share = settings.major_author_share;
        TrackerSnapshot {
            path: self.path.clone(),
            baseline: self.baseline.clone(),
            baseline_path: self.baseline_path.clone(),
            consecutive_counter: self.consecutive_counter,
            metrics: ProcessMetrics {
                qty_of_commits: self.commit_count as i64,
                lines_added: self.lines_added as i64,
                lines_deleted: self.lines_deleted as i64,
                qty_of_authors: self.authors.len() as i64,
                qty_minor_authors: self.minor_author_count(share) as i64,
                qty_major_authors: self.major_author_count(share) as i64,
                author_ownership: self.author_ownership().unwrap_or(0.0),
                bug_fix_count: self.bug_fix_count as i64,
                refactorings_involved: self.refactorings_involved as i64,
            },
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Follow a rename made by `commit_id`.
    ///
    /// The baseline path moves too only when the window started at that same
    /// commit, since the file then exists at the new path in the baseline.
    pub(crate) fn move_to(&mut self, path: &str, commit_id: &str) {
        if self.baseline.commit_id == commit_id {
            self.baseline_path = path.to_string();
        }
        self.path = path.to_string();
    }

    pub fn commit_count(&self) -> u64 {
        self.commit_count
    }

    pub fn lines_added(&self) -> u64 {
        self.lines_added
    }

    pub fn lines_deleted(&self) -> u64 {
        self.lines_deleted
    }

    pub fn authors(&self) -> &AuthorLedger {
        &self.authors
    }

    pub fn bug_fix_count(&self) -> u64 {
        self.bug_fix_count
    }

    pub fn refactorings_involved(&self) -> u64 {
        self.refactorings_involved
    }

    pub fn baseline(&self) -> &Baseline {
        &self.baseline
    }

    pub fn baseline_path(&self) -> &str {
        &self.baseline_path
    }

    pub fn consecutive_counter(&self) -> u64 {
        self.consecutive_counter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEYWORDS: [&str; 7] = ["bug", "error", "mistake", "fault", "wrong", "fail", "fix"];

    fn keywords() -> BugKeywords {
        BugKeywords::new(KEYWORDS).unwrap()
    }

    fn settings() -> TrackerSettings {
        TrackerSettings {
            bug_keywords: keywords(),
            major_author_share: 0.05,
        }
    }

    fn baseline(id: &str) -> Baseline {
        Baseline {
            commit_id: id.to_string(),
            message: format!("commit {id}"),
            timestamp: 0,
        }
    }

    fn commit(author: &str, message: &str) -> CommitMeta {
        CommitMeta {
            id: "c".to_string(),
            message: message.to_string(),
            author: author.to_string(),
            timestamp: 0,
        }
    }

    #[test]
    fn commit_count_matches_calls_and_ledger() {
        let bugs = keywords();
        let mut tracker = FileTracker::new("a.java", baseline("123"));
        for i in 0..37 {
            let author = format!("dev{}", i % 4);
            tracker.record_commit(&commit(&author, "change"), 10, 20, &bugs);
        }
        assert_eq!(tracker.commit_count(), 37);
        assert_eq!(tracker.authors().total(), 37);
        assert_eq!(tracker.consecutive_counter(), 37);
        assert_eq!(tracker.lines_added(), 370);
        assert_eq!(tracker.lines_deleted(), 740);
    }

    #[test]
    fn author_ownership_and_major_minor() {
        let bugs = keywords();
        let mut tracker = FileTracker::new("a.java", baseline("123"));
        for _ in 0..90 {
            tracker.record_commit(&commit("Mauricio", "commit"), 10, 20, &bugs);
        }
        for _ in 0..6 {
            tracker.record_commit(&commit("Diogo", "commit"), 10, 20, &bugs);
        }
        for _ in 0..4 {
            tracker.record_commit(&commit("Rafael", "commit"), 10, 20, &bugs);
        }

        assert_eq!(tracker.authors().len(), 3);
        assert_eq!(tracker.commit_count(), 100);
        assert!((tracker.author_ownership().unwrap() - 0.90).abs() < 1e-4);
        assert_eq!(tracker.major_author_count(0.05), 2);
        assert_eq!(tracker.minor_author_count(0.05), 1);
        assert_eq!(tracker.bug_fix_count(), 0);
    }

    #[test]
    fn ownership_undefined_without_commits() {
        let tracker = FileTracker::new("a.java", baseline("123"));
        assert_eq!(tracker.author_ownership(), None);
        assert_eq!(tracker.major_author_count(0.05), 0);
        assert_eq!(tracker.minor_author_count(0.05), 0);
        assert_eq!(tracker.snapshot(&settings()).metrics.author_ownership, 0.0);
    }

    #[test]
    fn bug_fix_counted_once_per_commit() {
        let bugs = keywords();
        let mut tracker = FileTracker::new("a.java", baseline("123"));
        tracker.record_commit(&commit("r", "bug fix here"), 1, 1, &bugs);
        tracker.record_commit(&commit("r", "Fixed a WRONG error, bug and fault"), 1, 1, &bugs);
        tracker.record_commit(&commit("r", "add feature"), 1, 1, &bugs);
        tracker.record_commit(&commit("r", "prefix matters too"), 1, 1, &bugs);
        assert_eq!(tracker.bug_fix_count(), 3);
    }

    #[test]
    fn bug_keywords_across_many_messages() {
        let bugs = keywords();
        let mut tracker = FileTracker::new("a.java", baseline("123"));
        let mut expected = 0;
        for i in 0..500 {
            let message = if i % 3 == 0 {
                expected += 1;
                format!("bla bla {}ble ble", KEYWORDS[i % KEYWORDS.len()])
            } else {
                "bla bla ble ble".to_string()
            };
            tracker.record_commit(&commit("r", &message), 1, 1, &bugs);
        }
        assert_eq!(tracker.bug_fix_count(), expected);
    }

    #[test]
    fn keywords_fold_non_ascii_case() {
        let bugs = BugKeywords::new(["échec", "FEHLERHAFT"]).unwrap();
        assert!(bugs.matches("ÉCHEC du build nocturne"));
        assert!(bugs.matches("fehlerhafte Eingabe abgefangen"));
        assert!(!bugs.matches("echec sans accent"));
        assert_eq!(bugs.keywords(), ["échec", "FEHLERHAFT"]);
    }

    #[test]
    fn empty_keyword_list_never_matches() {
        let bugs = BugKeywords::new(Vec::<String>::new()).unwrap();
        assert!(!bugs.matches("bug fix"));
        assert!(bugs.keywords().is_empty());
    }

    #[test]
    fn reset_zeroes_window_and_counts_refactorings() {
        let bugs = keywords();
        let mut tracker = FileTracker::new("a.java", baseline("1"));
        tracker.record_commit(&commit("a", "fix"), 3, 4, &bugs);
        tracker.record_commit(&commit("b", "more"), 3, 4, &bugs);

        tracker.reset(baseline("2"), false);
        assert_eq!(tracker.commit_count(), 0);
        assert_eq!(tracker.lines_added(), 0);
        assert_eq!(tracker.lines_deleted(), 0);
        assert_eq!(tracker.bug_fix_count(), 0);
        assert!(tracker.authors().is_empty());
        assert_eq!(tracker.consecutive_counter(), 0);
        assert_eq!(tracker.refactorings_involved(), 0);
        assert_eq!(tracker.baseline().commit_id, "2");

        tracker.reset(baseline("3"), true);
        assert_eq!(tracker.refactorings_involved(), 1);
        tracker.reset(baseline("4"), true);
        tracker.reset(baseline("5"), false);
        assert_eq!(tracker.refactorings_involved(), 2);
        assert_eq!(tracker.baseline().commit_id, "5");
    }

    #[test]
    fn snapshot_is_detached_from_later_resets() {
        let bugs = keywords();
        let mut tracker = FileTracker::new("a.java", baseline("1"));
        tracker.record_commit(&commit("a", "fix typo"), 5, 1, &bugs);
        tracker.record_commit(&commit("b", "feature"), 2, 2, &bugs);

        let snapshot = tracker.snapshot(&settings());
        tracker.reset(baseline("2"), true);

        assert_eq!(snapshot.path, "a.java");
        assert_eq!(snapshot.baseline.commit_id, "1");
        assert_eq!(snapshot.consecutive_counter, 2);
        assert_eq!(snapshot.metrics.qty_of_commits, 2);
        assert_eq!(snapshot.metrics.lines_added, 7);
        assert_eq!(snapshot.metrics.lines_deleted, 3);
        assert_eq!(snapshot.metrics.qty_of_authors, 2);
        assert_eq!(snapshot.metrics.qty_major_authors, 2);
        assert_eq!(snapshot.metrics.qty_minor_authors, 0);
        assert_eq!(snapshot.metrics.author_ownership, 0.5);
        assert_eq!(snapshot.metrics.bug_fix_count, 1);
        assert_eq!(snapshot.metrics.refactorings_involved, 0);
        assert_eq!(tracker.commit_count(), 0);
    }

    #[test]
    fn baseline_path_survives_renames_until_reset() {
        let mut tracker = FileTracker::new("a/A.java", baseline("1"));
        tracker.move_to("b/A.java", "2");
        tracker.move_to("c/A.java", "3");
        assert_eq!(tracker.path(), "c/A.java");
        assert_eq!(tracker.baseline_path(), "a/A.java");
        assert_eq!(tracker.snapshot(&settings()).baseline_path, "a/A.java");

        tracker.reset(baseline("4"), false);
        assert_eq!(tracker.baseline_path(), "c/A.java");

        // Renamed by the commit that opened the window
        tracker.reset(baseline("5"), true);
        tracker.move_to("d/A.java", "5");
        assert_eq!(tracker.baseline_path(), "d/A.java");
    }
}
