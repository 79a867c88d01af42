//! Commit walk, diffs and file contents through the `git` command line.

use std::process::Command;

use ahash::AHashMap;
use anyhow::{Result, bail};
use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use super::filter::unix_path;
use super::orchestrator::SourceProvider;
use crate::error::{ErrorCode, SightError};
use crate::models::commit::{ChangeType, CommitMeta, FileChange};

const FIELD_SEP: char = '\u{1f}';
const RECORD_SEP: char = '\u{1e}';
const LOG_FORMAT: &str = "--format=%H%x1f%P%x1f%an%x1f%ct%x1f%B%x1e";

/// A commit of the walk with its parent ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub meta: CommitMeta,
    pub parents: Vec<String>,
}

impl CommitInfo {
    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }

    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct GitRepository {
    dir: Utf8PathBuf,
}

impl GitRepository {
    pub fn open(dir: &Utf8Path) -> Result<Self> {
        if !dir.is_dir() {
            bail!(SightError::new(
                ErrorCode::IoError,
                format!("Directory not found: {dir}"),
            ));
        }
        let repo = Self {
            dir: dir.to_path_buf(),
        };
        let inside = repo.git(&["rev-parse", "--is-inside-work-tree"]).map_err(|_| {
            SightError::git(format!("Not a git work tree: {dir}"))
        })?;
        if String::from_utf8_lossy(&inside).trim() != "true" {
            bail!(SightError::git(format!("Not a git work tree: {dir}")));
        }
        Ok(repo)
    }

    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    /// Name of the repository directory.
    pub fn project_name(&self) -> String {
        self.dir
            .canonicalize_utf8()
            .ok()
            .and_then(|p| p.file_name().map(str::to_string))
            .or_else(|| self.dir.file_name().map(str::to_string))
            .unwrap_or_else(|| self.dir.to_string())
    }

    pub fn head(&self) -> Result<String> {
        let out = self.git(&["rev-parse", "HEAD"])?;
        Ok(String::from_utf8_lossy(&out).trim().to_string())
    }

    pub fn commit_count(&self, rev: &str) -> Result<usize> {
        let out = self.git(&["rev-list", "--count", rev])?;
        let text = String::from_utf8_lossy(&out);
        text.trim().parse().map_err(|_| {
            SightError::git(format!("Unexpected rev-list output: {}", text.trim())).into()
        })
    }

    /// Every commit reachable from `rev`, oldest first.
    pub fn commits(&self, rev: &str) -> Result<Vec<CommitInfo>> {
        let out = self.git(&["log", "--reverse", "--topo-order", LOG_FORMAT, rev])?;
        parse_log(&String::from_utf8_lossy(&out))
    }

    /// File changes of `commit` against its first parent.
    pub fn changes(&self, commit: &CommitInfo) -> Result<Vec<FileChange>> {
        let mut base = vec!["diff-tree", "-r", "-M", "-z", "--no-commit-id"];
        let range: Vec<&str> = match commit.parents.first() {
            Some(parent) => vec![parent.as_str(), commit.meta.id.as_str()],
            None => vec!["--root", commit.meta.id.as_str()],
        };

        base.push("--name-status");
        let mut args = base.clone();
        args.extend(&range);
        let names = self.git(&args)?;

        base.pop();
        base.push("--numstat");
        let mut args = base;
        args.extend(&range);
        let stats = self.git(&args)?;

        let mut changes = parse_name_status(&String::from_utf8_lossy(&names))?;
        let stats = parse_numstat(&String::from_utf8_lossy(&stats));
        for change in &mut changes {
            if let Some(&(added, deleted)) = stats.get(change.new_path.as_str()) {
                change.lines_added = added;
                change.lines_deleted = deleted;
            }
        }
        Ok(changes)
    }

    /// Contents of `path` as of `commit_id`.
    pub fn read_file(&self, commit_id: &str, path: &str) -> Result<String> {
        let object = format!("{commit_id}:{path}");
        match self.git(&["show", &object]) {
            Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            Err(err) => {
                debug!(commit = %commit_id, path = %path, error = %err, "git show failed");
                bail!(SightError::source_unavailable(commit_id, path))
            }
        }
    }

    fn git(&self, args: &[&str]) -> Result<Vec<u8>> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.dir)
            .output()
            .map_err(|e| SightError::new(ErrorCode::IoError, format!("Failed to run git: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(SightError::git(format!(
                "git {} failed: {}",
                args.first().copied().unwrap_or_default(),
                stderr.trim()
            )));
        }
        Ok(output.stdout)
    }
}

impl SourceProvider for GitRepository {
    fn read_source(&self, commit_id: &str, path: &str) -> Result<String> {
        self.read_file(commit_id, path)
    }
}

// ----------------------------------------------------------------------
// Output parsing
// ----------------------------------------------------------------------

/// Parse `git log` output written with [`LOG_FORMAT`].
pub fn parse_log(raw: &str) -> Result<Vec<CommitInfo>> {
    let mut commits = Vec::new();
    for record in raw.split(RECORD_SEP) {
        let record = record.trim_start_matches(['\n', '\r']);
        if record.is_empty() {
            continue;
        }
        let fields: Vec<&str> = record.splitn(5, FIELD_SEP).collect();
        let [id, parents, author, timestamp, message] = fields[..] else {
            bail!(SightError::git(format!(
                "Malformed log record: {}",
                record.lines().next().unwrap_or_default()
            )));
        };
        let timestamp = timestamp.trim().parse::<i64>().map_err(|_| {
            SightError::git(format!("Malformed commit time for {id}: {timestamp}"))
        })?;
        commits.push(CommitInfo {
            meta: CommitMeta {
                id: id.trim().to_string(),
                message: message.trim_end().to_string(),
                author: author.to_string(),
                timestamp,
            },
            parents: parents.split_whitespace().map(str::to_string).collect(),
        });
    }
    Ok(commits)
}

/// Parse `git diff-tree -z --name-status` output. Line counts are left at zero.
pub fn parse_name_status(raw: &str) -> Result<Vec<FileChange>> {
    let mut tokens = raw.split('\0').filter(|t| !t.is_empty());
    let mut changes = Vec::new();

    while let Some(status) = tokens.next() {
        let mut next_path = || {
            tokens
                .next()
                .map(unix_path)
                .ok_or_else(|| SightError::git(format!("Missing path after status {status}")))
        };
        let change = match status.chars().next() {
            Some('A') => added(next_path()?),
            Some('M' | 'T') => {
                let path = next_path()?;
                FileChange {
                    change_type: ChangeType::Modify,
                    old_path: None,
                    new_path: path,
                    lines_added: 0,
                    lines_deleted: 0,
                }
            }
            Some('D') => {
                let path = next_path()?;
                FileChange {
                    change_type: ChangeType::Delete,
                    old_path: Some(path.clone()),
                    new_path: path,
                    lines_added: 0,
                    lines_deleted: 0,
                }
            }
            Some('R') => {
                let old = next_path()?;
                let new = next_path()?;
                FileChange {
                    change_type: ChangeType::Rename,
                    old_path: Some(old),
                    new_path: new,
                    lines_added: 0,
                    lines_deleted: 0,
                }
            }
            Some('C') => {
                let _source = next_path()?;
                added(next_path()?)
            }
            _ => {
                let path = next_path()?;
                debug!(status = %status, path = %path, "Skipping unsupported diff status");
                continue;
            }
        };
        changes.push(change);
    }
    Ok(changes)
}

fn added(path: String) -> FileChange {
    FileChange {
        change_type: ChangeType::Add,
        old_path: None,
        new_path: path,
        lines_added: 0,
        lines_deleted: 0,
    }
}

/// Parse `git diff-tree -z --numstat` output into `new path -> (added, deleted)`.
///
/// Binary files report `-` and count as zero lines.
pub fn parse_numstat(raw: &str) -> AHashMap<String, (u64, u64)> {
    let mut stats = AHashMap::new();
    let mut tokens = raw.split('\0');

    while let Some(entry) = tokens.next() {
        if entry.is_empty() {
            continue;
        }
        let mut parts = entry.splitn(3, '\t');
        let added = parts.next().and_then(|n| n.parse().ok()).unwrap_or(0);
        let deleted = parts.next().and_then(|n| n.parse().ok()).unwrap_or(0);
        let path = match parts.next() {
            Some(path) if !path.is_empty() => path.to_string(),
            // Renames: empty path, then old and new as separate tokens
            _ => {
                let _old = tokens.next();
                match tokens.next() {
                    Some(new) => new.to_string(),
                    None => break,
                }
            }
        };
        stats.insert(unix_path(&path), (added, deleted));
    }
    stats
}
