//! Failure categorization and the recovery decision built on it.

pub mod advisor;
pub mod category;

pub use advisor::{
    PresetPrompter, Prompter, RecoveryDecision, TerminalPrompter, advise, remediation_hints,
};
pub use category::{ErrorCategory, FailureHint, categorize};
