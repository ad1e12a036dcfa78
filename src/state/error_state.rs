use super::dir::{StateDir, atomic_write, remove_if_exists};
use crate::errors::StoreError;
use crate::recovery::{ErrorCategory, FailureHint, categorize};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

/// The most recent unrecovered failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorState {
    pub timestamp: DateTime<Utc>,
    /// The unit whose execution failed (a phase name, or `health`).
    pub origin: String,
    /// Where inside the unit it failed, e.g. the command line.
    pub location: String,
    pub exit_code: Option<i32>,
    pub category: ErrorCategory,
    #[serde(default)]
    pub message: String,
}

impl ErrorState {
    pub fn new(
        origin: &str,
        location: &str,
        exit_code: Option<i32>,
        hint: Option<FailureHint>,
        message: &str,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            origin: origin.to_string(),
            location: location.to_string(),
            exit_code,
            category: categorize(exit_code, hint),
            message: message.to_string(),
        }
    }
}

/// Singleton `last_error.json` record in the state directory.
#[derive(Debug, Clone)]
pub struct ErrorStateRecorder {
    file: PathBuf,
}

impl ErrorStateRecorder {
    pub fn new(state: &StateDir) -> Self {
        Self {
            file: state.error_state_file(),
        }
    }

    /// Build, categorize and persist a failure, replacing any previous one.
    pub fn record_failure(
        &self,
        origin: &str,
        location: &str,
        exit_code: Option<i32>,
        hint: Option<FailureHint>,
        message: &str,
    ) -> Result<ErrorState, StoreError> {
        let state = ErrorState::new(origin, location, exit_code, hint, message);
        let json = serde_json::to_vec_pretty(&state).map_err(|source| StoreError::Corrupt {
            path: self.file.clone(),
            source,
        })?;
        atomic_write(&self.file, &json)?;
        info!(
            origin = %state.origin,
            category = %state.category,
            exit_code = ?state.exit_code,
            "Failure recorded"
        );
        Ok(state)
    }

    pub fn load_last_failure(&self) -> Result<Option<ErrorState>, StoreError> {
        let content = match std::fs::read(&self.file) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::ReadFailed {
                    path: self.file.clone(),
                    source,
                });
            }
        };
        serde_json::from_slice(&content)
            .map(Some)
            .map_err(|source| StoreError::Corrupt {
                path: self.file.clone(),
                source,
            })
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        remove_if_exists(&self.file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::CheckpointStore;
    use tempfile::tempdir;

    fn make_recorder() -> (ErrorStateRecorder, StateDir, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let state = StateDir::at(dir.path().join("state")).unwrap();
        (ErrorStateRecorder::new(&state), state, dir)
    }

    #[test]
    fn no_failure_recorded_yet() {
        let (rec, _state, _dir) = make_recorder();
        assert!(rec.load_last_failure().unwrap().is_none());
    }

    #[test]
    fn record_then_load_roundtrip() {
        let (rec, _state, _dir) = make_recorder();
        let written = rec
            .record_failure("deploy", "docker compose up -d", Some(1), None, "exit 1")
            .unwrap();
        assert_eq!(written.category, ErrorCategory::Unknown);

        let loaded = rec.load_last_failure().unwrap().unwrap();
        assert_eq!(loaded, written);
    }

    #[test]
    fn newer_failure_overwrites_previous() {
        let (rec, _state, _dir) = make_recorder();
        rec.record_failure("configure", "x", Some(126), None, "").unwrap();
        rec.record_failure("deploy", "y", None, None, "killed").unwrap();

        let loaded = rec.load_last_failure().unwrap().unwrap();
        assert_eq!(loaded.origin, "deploy");
        assert_eq!(loaded.category, ErrorCategory::Fatal);
        assert_eq!(loaded.exit_code, None);
    }

    #[test]
    fn hint_drives_category() {
        let (rec, _state, _dir) = make_recorder();
        let state = rec
            .record_failure("pull", "docker pull", Some(1), Some(FailureHint::Transient), "")
            .unwrap();
        assert_eq!(state.category, ErrorCategory::Transient);
    }

    #[test]
    fn corrupt_record_is_reported() {
        let (rec, state, _dir) = make_recorder();
        std::fs::write(state.error_state_file(), "{not json").unwrap();
        assert!(matches!(rec.load_last_failure(), Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn clear_all_on_checkpoint_store_removes_error_state() {
        let (rec, state, _dir) = make_recorder();
        rec.record_failure("deploy", "x", Some(1), None, "").unwrap();
        CheckpointStore::new(&state).clear_all().unwrap();
        assert!(rec.load_last_failure().unwrap().is_none());
    }
}
