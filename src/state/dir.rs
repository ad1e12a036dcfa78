//! State directory resolution.
//!
//! The checkpoint store and the error state share one directory. Candidates
//! are tried in order and the first writable one wins, so a misconfigured
//! preferred location degrades to a local one instead of failing the run.

use crate::errors::StoreError;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

const CHECKPOINTS_DIR: &str = "checkpoints";
const ERROR_STATE_FILE: &str = "last_error.json";

/// A resolved, writable state directory.
#[derive(Debug, Clone)]
pub struct StateDir {
    path: PathBuf,
    fell_back: bool,
}

impl StateDir {
    /// Resolve the first writable directory among `candidates`.
    ///
    /// Missing directories are created. Every candidate that is skipped is
    /// logged, and choosing anything but the first one is logged as a warning.
    pub fn resolve(candidates: &[PathBuf]) -> Result<Self, StoreError> {
        for (idx, candidate) in candidates.iter().enumerate() {
            match probe_writable(candidate) {
                Ok(()) => {
                    if idx > 0 {
                        warn!(
                            preferred = %candidates[0].display(),
                            using = %candidate.display(),
                            "Preferred state directory is not writable, falling back"
                        );
                    } else {
                        debug!(path = %candidate.display(), "Using state directory");
                    }
                    return Ok(Self {
                        path: candidate.clone(),
                        fell_back: idx > 0,
                    });
                }
                Err(e) => {
                    debug!(path = %candidate.display(), error = %e, "State directory candidate rejected");
                }
            }
        }

        Err(StoreError::NoWritableDirectory {
            candidates: candidates.to_vec(),
        })
    }

    /// Find where state was recorded without creating or writing anything.
    ///
    /// Picks the first candidate holding checkpoints or an error record. When
    /// none does, the preferred candidate is returned as-is (it reads as empty).
    pub fn locate_existing(candidates: &[PathBuf]) -> Option<Self> {
        let holds_state = |dir: &Path| {
            dir.join(CHECKPOINTS_DIR).is_dir() || dir.join(ERROR_STATE_FILE).is_file()
        };
        match candidates.iter().position(|c| holds_state(c)) {
            Some(idx) => Some(Self {
                path: candidates[idx].clone(),
                fell_back: idx > 0,
            }),
            None => candidates.first().map(|c| Self {
                path: c.clone(),
                fell_back: false,
            }),
        }
    }

    /// Use exactly `path`, creating it if needed.
    pub fn at(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        Self::resolve(&[path.into()])
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a secondary candidate was chosen.
    pub fn fell_back(&self) -> bool {
        self.fell_back
    }

    pub fn checkpoints_dir(&self) -> PathBuf {
        self.path.join(CHECKPOINTS_DIR)
    }

    pub fn error_state_file(&self) -> PathBuf {
        self.path.join(ERROR_STATE_FILE)
    }
}

fn probe_writable(dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let mut probe = NamedTempFile::new_in(dir)?;
    probe.write_all(b"probe")?;
    Ok(())
}

/// Atomically replace `path` with `data` via a temp file in the same directory.
pub(crate) fn atomic_write(path: &Path, data: &[u8]) -> Result<(), StoreError> {
    let write_failed = |source| StoreError::WriteFailed {
        path: path.to_path_buf(),
        source,
    };
    let dir = path.parent().unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir).map_err(write_failed)?;
    let mut tmp = NamedTempFile::new_in(dir).map_err(write_failed)?;
    tmp.write_all(data).map_err(write_failed)?;
    tmp.as_file().sync_all().map_err(write_failed)?;
    tmp.persist(path).map_err(|e| write_failed(e.error))?;
    Ok(())
}

/// Remove a file, treating "not found" as success.
pub(crate) fn remove_if_exists(path: &Path) -> Result<(), StoreError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(StoreError::RemoveFailed {
            path: path.to_path_buf(),
            source,
        }),
    }
}
