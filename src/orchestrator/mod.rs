pub mod relaunch;
pub mod runner;

pub use relaunch::{relaunch, relaunch_args};
pub use runner::{
    COMPLETE, HEALTH_ORIGIN, Orchestrator, PhaseStatus, ResumePoint, RunMode, RunOutcome,
    StatusReport, print_status, resume_point, status_report,
};
