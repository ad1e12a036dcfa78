//! Typed error hierarchy for the waypoint orchestrator.
//!
//! Three top-level enums cover the three subsystems:
//! - `StoreError`: state directory, checkpoint and error-state persistence
//! - `ConfigError`: loading and validating `waypoint.toml`
//! - `PhaseError`: a phase body that did not return cleanly

use crate::recovery::FailureHint;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from the state directory and the records stored in it.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("No writable state directory among: {}", format_candidates(.candidates))]
    NoWritableDirectory { candidates: Vec<PathBuf> },

    #[error("Invalid step name '{name}': only letters, digits, '.', '_' and '-' are allowed")]
    InvalidStepName { name: String },

    #[error("Failed to write {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove {path}: {source}")]
    RemoveFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt record at {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

fn format_candidates(candidates: &[PathBuf]) -> String {
    candidates
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors from loading `waypoint.toml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ParseFailed {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// A phase body failed. Carries everything the categorizer needs.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct PhaseError {
    /// Exit code of the failed unit, `None` when it was killed by a signal.
    pub exit_code: Option<i32>,
    /// Classification hint detected from the failure, if any.
    pub hint: Option<FailureHint>,
    pub message: String,
    /// Tail of captured stdout.
    pub stdout: String,
    /// Tail of captured stderr.
    pub stderr: String,
}

impl PhaseError {
    pub fn new(exit_code: Option<i32>, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            hint: None,
            message: message.into(),
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    pub fn with_hint(mut self, hint: FailureHint) -> Self {
        self.hint = Some(hint);
        self
    }

    pub fn with_output(mut self, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self.stderr = stderr.into();
        self
    }
}
