use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    GitError,
    IoError,
    InvalidRequest,
    InvalidConfig,
    OracleError,
    PersistError,
    SourceUnavailable,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GitError => write!(f, "GIT_ERROR"),
            Self::IoError => write!(f, "IO_ERROR"),
            Self::InvalidRequest => write!(f, "INVALID_REQUEST"),
            Self::InvalidConfig => write!(f, "INVALID_CONFIG"),
            Self::OracleError => write!(f, "ORACLE_ERROR"),
            Self::PersistError => write!(f, "PERSIST_ERROR"),
            Self::SourceUnavailable => write!(f, "SOURCE_UNAVAILABLE"),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SightError {
    pub code: ErrorCode,
    pub message: String,
}

impl fmt::Display for SightError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for SightError {}

impl SightError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidConfig, message)
    }

    pub fn git(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::GitError, message)
    }

    pub fn source_unavailable(commit_id: &str, path: &str) -> Self {
        Self::new(
            ErrorCode::SourceUnavailable,
            format!("Cannot read {path} at commit {commit_id}"),
        )
    }
}
