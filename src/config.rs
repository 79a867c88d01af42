//! Configuration loading, validation and generation.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::SightError;

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Enable debug logging to file
    pub debug: bool,

    /// Path to log directory
    pub log_path: PathBuf,

    pub tracking: TrackingConfig,

    pub oracle: OracleConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debug: false,
            log_path: default_log_path(),
            tracking: TrackingConfig::default(),
            oracle: OracleConfig::default(),
        }
    }
}

/// How file histories are measured and when they count as stable.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Commit messages containing any of these (case-insensitive) count as bug fixes
    pub bug_keywords: Vec<String>,

    /// Minimum share of a file's commits for an author to count as major
    pub major_author_share: f64,

    /// Consecutive unrefactored commits that make a file stable
    pub stability_thresholds: Vec<u64>,

    /// Extensions of tracked files; empty tracks everything
    pub file_extensions: Vec<String>,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            bug_keywords: ["bug", "error", "mistake", "fault", "wrong", "fail", "fix"]
                .map(String::from)
                .to_vec(),
            major_author_share: 0.05,
            stability_thresholds: vec![5, 10, 15],
            file_extensions: vec!["java".to_string()],
        }
    }
}

/// Where refactoring detections come from.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// Per-commit detection budget
    pub timeout_secs: u64,

    /// Detector argv; `{repo}` and `{commit}` are substituted
    pub command: Option<Vec<String>>,

    /// Precomputed detection report
    pub report: Option<PathBuf>,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 20,
            command: None,
            report: None,
        }
    }
}

impl OracleConfig {
    pub fn kind(&self) -> &'static str {
        match (&self.command, &self.report) {
            (Some(_), _) => "command",
            (None, Some(_)) => "report",
            (None, None) => "none",
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        let tracking = &self.tracking;
        if tracking.stability_thresholds.is_empty() {
            bail!(SightError::invalid_config(
                "tracking.stability_thresholds must not be empty"
            ));
        }
        if tracking.stability_thresholds.contains(&0) {
            bail!(SightError::invalid_config(
                "tracking.stability_thresholds must be positive"
            ));
        }
        if !(0.0..=1.0).contains(&tracking.major_author_share) {
            bail!(SightError::invalid_config(format!(
                "tracking.major_author_share must be within [0, 1], got {}",
                tracking.major_author_share
            )));
        }
        if self.oracle.timeout_secs == 0 {
            bail!(SightError::invalid_config(
                "oracle.timeout_secs must be positive"
            ));
        }
        if self.oracle.command.is_some() && self.oracle.report.is_some() {
            bail!(SightError::invalid_config(
                "oracle.command and oracle.report are mutually exclusive"
            ));
        }
        if self.oracle.command.as_ref().is_some_and(|argv| argv.is_empty()) {
            bail!(SightError::invalid_config("oracle.command must not be empty"));
        }
        Ok(())
    }
}

/// Default log path: ~/.config/refactor-sight/logs
fn default_log_path() -> PathBuf {
    config_dir().join("logs")
}

fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("refactor-sight")
}

/// Configuration service.
pub struct ConfigService;

impl ConfigService {
    /// Get the default configuration file path.
    pub fn default_path() -> PathBuf {
        config_dir().join("config.toml")
    }

    /// Load and validate configuration.
    ///
    /// If `path` is `None`, uses the default path.
    /// If the file doesn't exist, returns default configuration.
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let path = path.map(PathBuf::from).unwrap_or_else(Self::default_path);
        let config_dir = path.parent();

        if !path.exists() {
            let mut config = Config::default();
            if let Some(dir) = config_dir {
                config.log_path = dir.join("logs");
            }
            return Ok(config);
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: Config = toml::from_str(&content).map_err(|e| {
            SightError::invalid_config(format!(
                "Failed to parse config file {}: {e}",
                path.display()
            ))
        })?;

        // Logs live next to the config file unless set explicitly
        if config.log_path == default_log_path()
            && let Some(dir) = config_dir
        {
            config.log_path = dir.join("logs");
        }

        config.validate()?;
        Ok(config)
    }

    /// Generate default configuration file at the default path.
    pub fn generate_default() -> Result<PathBuf> {
        let path = Self::default_path();
        Self::generate_at(&path)?;
        Ok(path)
    }

    /// Generate default configuration file at the specified path.
    pub fn generate_at(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, Self::default_config_content())
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Default configuration content with comments.
    fn default_config_content() -> &'static str {
        r#"# refactor-sight configuration file

# Enable debug logging to file (default: false)
debug = false

# Path to log directory (default: ~/.config/refactor-sight/logs)
# log_path = "~/.config/refactor-sight/logs"

[tracking]
# Commit messages containing any of these words count as bug fixes
bug_keywords = ["bug", "error", "mistake", "fault", "wrong", "fail", "fix"]

# Authors with at least this share of a file's commits are major authors
major_author_share = 0.05

# Consecutive commits without refactoring after which a file is sampled as stable.
# Only the highest value triggers; lower values tag extra samples.
stability_thresholds = [5, 10, 15]

# Extensions of tracked files (empty = all files)
file_extensions = ["java"]

[oracle]
# Seconds allowed for detecting refactorings in one commit
timeout_secs = 20

# Detector run per commit; must print a RefactoringMiner JSON report
# command = ["RefactoringMiner", "-c", "{repo}", "{commit}", "-json", "/dev/stdout"]

# Or a report precomputed for the whole history
# report = "refactorings.json"
"#
    }
}
