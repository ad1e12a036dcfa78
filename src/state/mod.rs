//! Durable deployment state: checkpoints and the last recorded failure.
//!
//! ```text
//! <state_dir>/
//! ├── checkpoints/
//! │   ├── preflight.json   # {"step": "preflight", "completed_at": "..."}
//! │   └── ...
//! └── last_error.json      # most recent unrecovered failure
//! ```

pub mod checkpoint;
pub mod dir;
pub mod error_state;

pub use checkpoint::{Checkpoint, CheckpointStore, validate_step_name};
pub use dir::StateDir;
pub use error_state::{ErrorState, ErrorStateRecorder};
