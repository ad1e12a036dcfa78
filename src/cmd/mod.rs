//! CLI command implementations.
//!
//! | Module    | Commands handled                                |
//! |-----------|-------------------------------------------------|
//! | `run`     | default invocation, `--fresh`, `--status`       |
//! | `project` | `Init`, `Reset`                                 |

pub mod project;
pub mod run;

pub use project::{cmd_init, cmd_reset};
pub use run::run_deployment;
