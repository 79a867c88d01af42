use anyhow::{Result, bail};
use camino::Utf8Path;
use std::io::BufRead;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::engine::filter::{FileFilter, unix_path};
use crate::engine::git::{CommitInfo, GitRepository};
use crate::engine::observer::WatchObserver;
use crate::engine::oracle::{CommandOracle, NoOracle, RefactoringOracle, ReportOracle};
use crate::engine::orchestrator::{CommitOutcome, SkipSources, TrackingOrchestrator};
use crate::engine::sink::{SampleSink, persist_all};
use crate::engine::stability::StabilityPolicy;
use crate::engine::tracker::{BugKeywords, TrackerSettings};
use crate::error::{ErrorCode, SightError};
use crate::models::refactoring::Refactoring;
use crate::models::sample::Sample;
use crate::models::summary::ScanSummary;
use crate::session::{ReplayFlow, run_replay};

// ---------------------------------------------------------------------------
// ScanService: one full pass over a history, from git or a replayed stream
// ---------------------------------------------------------------------------

pub struct ScanService {
    config: Config,
}

/// Parameters of a repository scan.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub dir: String,
    pub branch: String,
    /// Stop after this commit (full id or unique prefix)
    pub last_commit: Option<String>,
    /// Path whose history is logged in detail
    pub watch: Option<String>,
}

/// Parameters of a replay over an NDJSON commit stream.
#[derive(Debug, Clone, Default)]
pub struct ReplayOptions {
    pub last_commit: Option<String>,
    pub watch: Option<String>,
}

impl ScanService {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Fresh engine for one scan, configured from `[tracking]`.
    pub fn build_orchestrator(&self, watch: Option<&str>) -> Result<TrackingOrchestrator> {
        let tracking = &self.config.tracking;
        let settings = TrackerSettings {
            bug_keywords: BugKeywords::new(&tracking.bug_keywords)?,
            major_author_share: tracking.major_author_share,
        };
        let policy = StabilityPolicy::new(tracking.stability_thresholds.iter().copied())?;
        let filter = FileFilter::new(&tracking.file_extensions);

        let engine = TrackingOrchestrator::new(settings, policy, filter);
        Ok(match watch {
            Some(path) => {
                info!(path = path, "Watching file history");
                engine.with_observer(Box::new(WatchObserver::new(unix_path(path))))
            }
            None => engine,
        })
    }

    /// Detection source configured in `[oracle]`.
    pub fn build_oracle(&self, repo_dir: &Utf8Path) -> Result<Box<dyn RefactoringOracle>> {
        let oracle = &self.config.oracle;
        if let Some(command) = &oracle.command {
            let timeout = Duration::from_secs(oracle.timeout_secs);
            return Ok(Box::new(CommandOracle::new(command.clone(), repo_dir, timeout)?));
        }
        if let Some(report) = &oracle.report {
            let Some(report) = Utf8Path::from_path(report) else {
                bail!(SightError::invalid_config(format!(
                    "oracle.report is not valid UTF-8: {}",
                    report.display()
                )));
            };
            return Ok(Box::new(ReportOracle::load(report)?));
        }
        Ok(Box::new(NoOracle))
    }

    // -----------------------------------------------------------------------
    // Git scan
    // -----------------------------------------------------------------------

    pub fn scan(&self, opts: &ScanOptions, sink: &mut dyn SampleSink) -> Result<ScanSummary> {
        debug!(dir = %opts.dir, branch = %opts.branch, "scan called");
        let started = Instant::now();

        let repo = GitRepository::open(Utf8Path::new(&opts.dir))?;
        let head = repo.head()?;
        let commits_total = repo.commit_count(&opts.branch)?;
        let project = repo.project_name();
        info!(
            project = %project,
            head = %head,
            commits = commits_total,
            "Starting scan"
        );

        let commits = repo.commits(&opts.branch)?;
        let last_commit = resolve_last_commit(&commits, opts.last_commit.as_deref())?;
        let oracle = self.build_oracle(repo.dir())?;
        let mut engine = self.build_orchestrator(opts.watch.as_deref())?;

        let mut summary = ScanSummary {
            project: Some(project),
            head: Some(head),
            commits_total,
            last_commit: last_commit.clone(),
            thresholds: engine.policy().thresholds().to_vec(),
            ..ScanSummary::default()
        };

        for commit in &commits {
            if commit.is_merge() {
                debug!(commit = %commit.meta.id, "Skipping merge commit");
                summary.merges_skipped += 1;
            } else {
                let refactorings = if commit.is_root() {
                    Some(Vec::new())
                } else {
                    detect(oracle.as_ref(), &commit.meta.id)
                };
                if refactorings.is_none() {
                    summary.exceptions += 1;
                }
                let changes = repo.changes(commit)?;
                let outcome = engine.process_commit(
                    &commit.meta,
                    &changes,
                    refactorings.as_deref().unwrap_or_default(),
                    &repo,
                );
                absorb(&mut summary, outcome, sink);
            }

            if last_commit.as_deref() == Some(commit.meta.id.as_str()) {
                info!(commit = %commit.meta.id, "Reached last commit");
                break;
            }
        }

        finish(&mut summary, started);
        Ok(summary)
    }

    // -----------------------------------------------------------------------
    // NDJSON replay
    // -----------------------------------------------------------------------

    pub fn replay(
        &self,
        reader: impl BufRead,
        opts: &ReplayOptions,
        sink: &mut dyn SampleSink,
    ) -> Result<ScanSummary> {
        debug!(last_commit = ?opts.last_commit, "replay called");
        let started = Instant::now();
        let mut engine = self.build_orchestrator(opts.watch.as_deref())?;
        let mut summary = ScanSummary {
            thresholds: engine.policy().thresholds().to_vec(),
            ..ScanSummary::default()
        };
        let target = opts.last_commit.as_deref().filter(|t| !t.is_empty());

        run_replay(reader, |record| {
            summary.commits_total += 1;
            if record.is_merge() {
                debug!(commit = %record.meta.id, "Skipping merge commit");
                summary.merges_skipped += 1;
            } else {
                if record.refactorings.is_none() {
                    warn!(commit = %record.meta.id, "Refactoring detection undetermined");
                    summary.exceptions += 1;
                }
                let outcome = engine.process_commit(
                    &record.meta,
                    &record.changes,
                    record.refactorings.as_deref().unwrap_or_default(),
                    &SkipSources,
                );
                absorb(&mut summary, outcome, sink);
            }

            if let Some(target) = target
                && record.meta.id.starts_with(target)
            {
                info!(commit = %record.meta.id, "Reached last commit");
                summary.last_commit = Some(record.meta.id);
                return Ok(ReplayFlow::Stop);
            }
            Ok(ReplayFlow::Continue)
        })?;

        finish(&mut summary, started);
        Ok(summary)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Oracle answer for one commit; failures count as undetermined.
fn detect(oracle: &dyn RefactoringOracle, commit_id: &str) -> Option<Vec<Refactoring>> {
    match oracle.detect(commit_id) {
        Ok(Some(found)) => Some(found),
        Ok(None) => None,
        Err(e) => {
            warn!(commit = %commit_id, error = %e, "Refactoring detection failed");
            None
        }
    }
}

/// Full id of the commit matching `prefix`, if any.
fn resolve_last_commit(commits: &[CommitInfo], prefix: Option<&str>) -> Result<Option<String>> {
    let Some(prefix) = prefix.map(str::trim).filter(|p| !p.is_empty()) else {
        return Ok(None);
    };
    let mut matches = commits.iter().filter(|c| c.meta.id.starts_with(prefix));
    let Some(found) = matches.next() else {
        warn!(last_commit = prefix, "Last commit not found; walking the whole history");
        return Ok(None);
    };
    if matches.next().is_some() {
        bail!(SightError::new(
            ErrorCode::InvalidRequest,
            format!("Ambiguous last commit prefix: {prefix}"),
        ));
    }
    Ok(Some(found.meta.id.clone()))
}

fn absorb(summary: &mut ScanSummary, outcome: CommitOutcome, sink: &mut dyn SampleSink) {
    summary.commits_processed += 1;
    summary.untracked_refactorings += outcome.untracked_refactorings;
    summary.dropped_stable += outcome.dropped_stable;
    for sample in &outcome.samples {
        match sample {
            Sample::Refactoring(_) => summary.refactoring_samples += 1,
            Sample::Stable(_) => summary.stable_samples += 1,
        }
    }
    summary.exceptions += persist_all(sink, &outcome.samples);
}

fn finish(summary: &mut ScanSummary, started: Instant) {
    let elapsed = started.elapsed().as_secs_f64();
    summary.finished_in_secs = elapsed;
    info!(
        commits = summary.commits_processed,
        refactoring_samples = summary.refactoring_samples,
        stable_samples = summary.stable_samples,
        exceptions = summary.exceptions,
        "Finished in {:.2} minutes",
        elapsed / 60.0
    );
}
