use std::path::PathBuf;

use thiserror::Error;

/// Result alias used across the pipeline.
pub type ForgeResult<T> = Result<T, ForgeError>;

/// Errors of the generation, registry and lifecycle pipeline.
#[derive(Debug, Error)]
pub enum ForgeError {
    /// Specification rejected before any side effect.
    #[error("invalid workflow spec: {0}")]
    Validation(String),

    /// Synthesis backend unreachable or answered with a non-success status.
    /// `body` is the backend's raw response text.
    #[error("synthesis failed ({}): {body}", status_label(.status))]
    Synthesis { status: Option<u16>, body: String },

    /// Filesystem failure while persisting an artifact.
    #[error("failed to write artifact {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Registry document unreadable, unwritable or corrupt.
    #[error("registry error: {0}")]
    Registry(String),

    /// Deploy target does not exist.
    #[error("invalid path: {}", .0.display())]
    InvalidPath(PathBuf),

    /// Requested resource (log, job) does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Stop requested for a pid this supervisor is not running.
    #[error("no supervised running process with pid {0}")]
    UnknownProcess(u32),

    /// Child process could not be spawned.
    #[error("failed to spawn {}: {source}", .path.display())]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Log sink exists but could not be read.
    #[error("failed to read log {}: {source}", .path.display())]
    Log {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// OS rejected the termination signal.
    #[error("failed to signal pid {pid}: {message}")]
    Signal { pid: u32, message: String },
}

impl ForgeError {
    /// Coarse category a caller can branch on.
    ///
    /// `not_found` means the target is missing and retrying will not help,
    /// `failed` means the operation itself failed.
    pub fn category(&self) -> &'static str {
        match self {
            ForgeError::Validation(_) | ForgeError::InvalidPath(_) => "invalid",
            ForgeError::NotFound(_) | ForgeError::UnknownProcess(_) => "not_found",
            ForgeError::Synthesis { .. } => "backend",
            ForgeError::Write { .. }
            | ForgeError::Registry(_)
            | ForgeError::Spawn { .. }
            | ForgeError::Log { .. }
            | ForgeError::Signal { .. } => "failed",
        }
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        ForgeError::Validation(msg.into())
    }
}

fn status_label(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!("status {code}"),
        None => "unreachable".to_string(),
    }
}

impl From<serde_json::Error> for ForgeError {
    fn from(e: serde_json::Error) -> Self {
        ForgeError::Registry(e.to_string())
    }
}
