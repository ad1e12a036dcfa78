use super::dir::{StateDir, atomic_write, remove_if_exists};
use crate::errors::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info};

/// Durable marker that a named step has completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub step: String,
    pub completed_at: DateTime<Utc>,
}

/// One JSON record per completed step under `<state>/checkpoints/`.
///
/// Existence of the record is the only truth of "this step is done"; the
/// timestamp inside is informational.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
    error_state_file: PathBuf,
}

impl CheckpointStore {
    pub fn new(state: &StateDir) -> Self {
        Self {
            dir: state.checkpoints_dir(),
            error_state_file: state.error_state_file(),
        }
    }

    fn record_path(&self, step: &str) -> Result<PathBuf, StoreError> {
        validate_step_name(step)?;
        Ok(self.dir.join(format!("{step}.json")))
    }

    pub fn has(&self, step: &str) -> bool {
        self.record_path(step).map(|p| p.is_file()).unwrap_or(false)
    }

    /// Record completion of `step` now. Calling it again refreshes the timestamp.
    pub fn set(&self, step: &str) -> Result<Checkpoint, StoreError> {
        let path = self.record_path(step)?;
        let checkpoint = Checkpoint {
            step: step.to_string(),
            completed_at: Utc::now(),
        };
        let json = serde_json::to_vec_pretty(&checkpoint).map_err(|source| StoreError::Corrupt {
            path: path.clone(),
            source,
        })?;
        atomic_write(&path, &json)?;
        debug!(step, "Checkpoint set");
        Ok(checkpoint)
    }

    /// Remove one checkpoint. Absent checkpoints are not an error.
    pub fn clear(&self, step: &str) -> Result<(), StoreError> {
        let path = self.record_path(step)?;
        remove_if_exists(&path)?;
        debug!(step, "Checkpoint cleared");
        Ok(())
    }

    /// Remove every checkpoint and the recorded error state.
    pub fn clear_all(&self) -> Result<(), StoreError> {
        if self.dir.exists() {
            fs::remove_dir_all(&self.dir).map_err(|source| StoreError::RemoveFailed {
                path: self.dir.clone(),
                source,
            })?;
        }
        remove_if_exists(&self.error_state_file)?;
        info!("All checkpoints and error state cleared");
        Ok(())
    }

    /// When `step` completed, if it has a readable checkpoint.
    pub fn time_of(&self, step: &str) -> Option<DateTime<Utc>> {
        let path = self.record_path(step).ok()?;
        let content = fs::read(&path).ok()?;
        serde_json::from_slice::<Checkpoint>(&content)
            .ok()
            .map(|c| c.completed_at)
    }

    /// Every readable checkpoint, oldest first.
    pub fn list(&self) -> Result<Vec<Checkpoint>, StoreError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let read_failed = |source| StoreError::ReadFailed {
            path: self.dir.clone(),
            source,
        };

        let mut checkpoints = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(read_failed)? {
            let path = entry.map_err(read_failed)?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(cp) = fs::read(&path)
                .ok()
                .and_then(|c| serde_json::from_slice::<Checkpoint>(&c).ok())
            {
                checkpoints.push(cp);
            }
        }
        checkpoints.sort_by_key(|c| c.completed_at);
        Ok(checkpoints)
    }
}

/// Step names double as file names.
pub fn validate_step_name(name: &str) -> Result<(), StoreError> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidStepName {
            name: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_store() -> (CheckpointStore, StateDir, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let state = StateDir::at(dir.path().join("state")).unwrap();
        (CheckpointStore::new(&state), state, dir)
    }

    #[test]
    fn empty_store_has_nothing() {
        let (store, _state, _dir) = make_store();
        assert!(!store.has("preflight"));
        assert!(store.time_of("preflight").is_none());
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn set_then_has_and_time_of() {
        let (store, _state, _dir) = make_store();
        let before = Utc::now();
        let cp = store.set("preflight").unwrap();
        assert!(store.has("preflight"));
        assert_eq!(store.time_of("preflight"), Some(cp.completed_at));
        assert!(cp.completed_at >= before);
        assert!(!store.has("configure"));
    }

    #[test]
    fn set_twice_is_idempotent_and_refreshes_timestamp() {
        let (store, _state, _dir) = make_store();
        let first = store.set("deploy").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = store.set("deploy").unwrap();
        assert!(store.has("deploy"));
        assert!(second.completed_at >= first.completed_at);
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn clear_missing_checkpoint_is_not_an_error() {
        let (store, _state, _dir) = make_store();
        store.clear("never-set").unwrap();
        store.set("a").unwrap();
        store.clear("a").unwrap();
        assert!(!store.has("a"));
    }

    #[test]
    fn clear_all_removes_checkpoints_and_error_state() {
        let (store, state, _dir) = make_store();
        store.set("a").unwrap();
        store.set("b").unwrap();
        std::fs::write(state.error_state_file(), "{}").unwrap();

        store.clear_all().unwrap();
        assert!(!store.has("a"));
        assert!(!store.has("b"));
        assert!(!state.error_state_file().exists());
        // Safe to call on an already-empty store.
        store.clear_all().unwrap();
    }

    #[test]
    fn unreadable_record_still_counts_as_done() {
        let (store, state, _dir) = make_store();
        std::fs::create_dir_all(state.checkpoints_dir()).unwrap();
        std::fs::write(state.checkpoints_dir().join("build.json"), "garbage").unwrap();
        assert!(store.has("build"));
        assert!(store.time_of("build").is_none());
    }

    #[test]
    fn checkpoints_survive_a_new_store_instance() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state");
        {
            let store = CheckpointStore::new(&StateDir::at(&path).unwrap());
            store.set("preflight").unwrap();
        }
        let store = CheckpointStore::new(&StateDir::at(&path).unwrap());
        assert!(store.has("preflight"));
    }

    #[test]
    fn invalid_step_names_are_rejected() {
        let (store, _state, _dir) = make_store();
        assert!(matches!(
            store.set("../escape"),
            Err(StoreError::InvalidStepName { .. })
        ));
        assert!(store.set("").is_err());
        assert!(store.set("..").is_err());
        assert!(!store.has("a/b"));
        validate_step_name("db-migrate_v2.1").unwrap();
    }
}
