use std::process::Command;

use serde::Serialize;

use crate::config::Config;

#[derive(Debug, Serialize)]
pub struct DoctorReport {
    pub version: String,
    pub git: GitStatus,
    pub tracking: TrackingStatus,
    pub oracle: &'static str,
}

#[derive(Debug, Serialize)]
pub struct GitStatus {
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TrackingStatus {
    pub thresholds: Vec<u64>,
    pub file_extensions: Vec<String>,
    pub major_author_share: f64,
    pub bug_keywords: Vec<String>,
}

/// Check that git can be run and report the effective tracking setup.
pub fn run_doctor(config: &Config) -> DoctorReport {
    let mut thresholds = config.tracking.stability_thresholds.clone();
    thresholds.sort_unstable();
    thresholds.dedup();

    DoctorReport {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git: check_git(),
        tracking: TrackingStatus {
            thresholds,
            file_extensions: config.tracking.file_extensions.clone(),
            major_author_share: config.tracking.major_author_share,
            bug_keywords: config.tracking.bug_keywords.clone(),
        },
        oracle: config.oracle.kind(),
    }
}

fn check_git() -> GitStatus {
    match Command::new("git").arg("--version").output() {
        Ok(output) if output.status.success() => {
            let text = String::from_utf8_lossy(&output.stdout);
            GitStatus {
                available: true,
                version: Some(text.trim().trim_start_matches("git version ").to_string()),
            }
        }
        _ => GitStatus {
            available: false,
            version: None,
        },
    }
}
