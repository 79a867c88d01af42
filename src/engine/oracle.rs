//! Refactoring detection: precomputed reports or an external detector process.

use std::process::Stdio;
use std::time::Duration;

use ahash::{AHashMap, AHashSet};
use anyhow::{Context, Result, bail};
use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{ErrorCode, SightError};
use crate::models::refactoring::Refactoring;

/// Answers which files a commit refactored.
pub trait RefactoringOracle {
    /// `Ok(None)` means detection was undetermined (e.g. timed out).
    fn detect(&self, commit_id: &str) -> Result<Option<Vec<Refactoring>>>;
}

/// Reports zero refactorings for every commit.
#[derive(Debug, Default)]
pub struct NoOracle;

impl RefactoringOracle for NoOracle {
    fn detect(&self, _commit_id: &str) -> Result<Option<Vec<Refactoring>>> {
        Ok(Some(Vec::new()))
    }
}

// ----------------------------------------------------------------------
// Report format
// ----------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Report {
    #[serde(default)]
    commits: Vec<ReportCommit>,
}

#[derive(Debug, Deserialize)]
struct ReportCommit {
    sha1: String,
    #[serde(default)]
    refactorings: Vec<ReportRefactoring>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportRefactoring {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    left_side_locations: Vec<ReportLocation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportLocation {
    file_path: String,
}

/// Parse a detection report into `commit id -> refactorings`.
///
/// Each distinct left-side file of a refactoring becomes one entry.
pub fn parse_report(json: &str) -> Result<AHashMap<String, Vec<Refactoring>>> {
    let report: Report = serde_json::from_str(json).map_err(|e| {
        SightError::new(
            ErrorCode::OracleError,
            format!("Invalid refactoring report: {e}"),
        )
    })?;

    let mut by_commit: AHashMap<String, Vec<Refactoring>> = AHashMap::new();
    for commit in report.commits {
        let entries = by_commit.entry(commit.sha1).or_default();
        for refactoring in commit.refactorings {
            let mut seen = AHashSet::new();
            for location in refactoring.left_side_locations {
                if !seen.insert(location.file_path.clone()) {
                    continue;
                }
                entries.push(Refactoring {
                    file_path: location.file_path,
                    refactoring_type: refactoring.kind.clone(),
                    description: refactoring.description.clone(),
                    class_name: None,
                });
            }
        }
    }
    Ok(by_commit)
}

/// Oracle backed by a precomputed report covering the whole history.
#[derive(Debug, Default)]
pub struct ReportOracle {
    by_commit: AHashMap<String, Vec<Refactoring>>,
}

impl ReportOracle {
    pub fn load(path: &Utf8Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read refactoring report {path}"))?;
        let oracle = Self::from_json(&json)?;
        debug!(path = %path, commits = oracle.by_commit.len(), "Loaded refactoring report");
        Ok(oracle)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(Self {
            by_commit: parse_report(json)?,
        })
    }
}

impl RefactoringOracle for ReportOracle {
    fn detect(&self, commit_id: &str) -> Result<Option<Vec<Refactoring>>> {
        Ok(Some(
            self.by_commit.get(commit_id).cloned().unwrap_or_default(),
        ))
    }
}

// ----------------------------------------------------------------------
// External detector
// ----------------------------------------------------------------------

/// Runs a detector per commit and reads its report from stdout.
///
/// Template arguments may contain `{repo}` and `{commit}`.
pub struct CommandOracle {
    template: Vec<String>,
    repo: Utf8PathBuf,
    timeout: Duration,
    runtime: tokio::runtime::Runtime,
}

impl CommandOracle {
    pub fn new(template: Vec<String>, repo: &Utf8Path, timeout: Duration) -> Result<Self> {
        if template.is_empty() {
            bail!(SightError::invalid_config("oracle.command must not be empty"));
        }
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to start oracle runtime")?;
        Ok(Self {
            template,
            repo: repo.to_path_buf(),
            timeout,
            runtime,
        })
    }

    fn argv(&self, commit_id: &str) -> Vec<String> {
        self.template
            .iter()
            .map(|arg| {
                arg.replace("{repo}", self.repo.as_str())
                    .replace("{commit}", commit_id)
            })
            .collect()
    }

    async fn run(
        &self,
        program: &str,
        args: &[String],
        commit_id: &str,
    ) -> Result<Option<Vec<Refactoring>>> {
        let child = tokio::process::Command::new(program)
            .args(args)
            .current_dir(&self.repo)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                SightError::new(
                    ErrorCode::OracleError,
                    format!("Failed to run {program}: {e}"),
                )
            })?;

        // Dropping the child on timeout kills it
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output.map_err(|e| {
                SightError::new(ErrorCode::OracleError, format!("{program} failed: {e}"))
            })?,
            Err(_) => {
                warn!(
                    commit = %commit_id,
                    timeout_secs = self.timeout.as_secs_f64(),
                    "Refactoring detection timed out"
                );
                return Ok(None);
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(SightError::new(
                ErrorCode::OracleError,
                format!("{program} exited with {}: {}", output.status, stderr.trim()),
            ));
        }
        let mut by_commit = parse_report(&String::from_utf8_lossy(&output.stdout))?;
        Ok(Some(by_commit.remove(commit_id).unwrap_or_default()))
    }
}

impl RefactoringOracle for CommandOracle {
    fn detect(&self, commit_id: &str) -> Result<Option<Vec<Refactoring>>> {
        let argv = self.argv(commit_id);
        let Some((program, args)) = argv.split_first() else {
            bail!(SightError::invalid_config("oracle.command must not be empty"));
        };
        self.runtime.block_on(self.run(program, args, commit_id))
    }
}
