//! The phase orchestrator.
//!
//! Runs a fixed, ordered list of phases against the checkpoint store:
//! `Idle → Resuming → Executing → {Completed | Aborted}`. Retry is never
//! looped in-process; a retry decision is handed back to the caller as
//! [`RunOutcome::Retry`] so it can restart the program from scratch.

use crate::config::HealthSection;
use crate::health::{HealthOutcome, HealthSource, HealthVerifier};
use crate::phase::Phase;
use crate::recovery::{
    ErrorCategory, FailureHint, Prompter, RecoveryDecision, TerminalPrompter, advise,
};
use crate::state::{CheckpointStore, ErrorState, ErrorStateRecorder, StateDir};
use crate::ui::OrchestratorUI;
use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use console::style;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Sentinel returned by [`resume_point`] when every phase is checkpointed.
pub const COMPLETE: &str = "complete";

/// Origin recorded for failures raised by health verification.
pub const HEALTH_ORIGIN: &str = "health";

/// Exit code recorded alongside a health failure.
const HEALTH_FAILURE_EXIT_CODE: i32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Continue from the first phase without a checkpoint.
    Resume,
    /// Clear all state, then run every phase.
    Fresh,
    /// Report progress without executing anything.
    Status,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumePoint {
    Phase(String),
    Complete,
}

impl ResumePoint {
    pub fn as_str(&self) -> &str {
        match self {
            ResumePoint::Phase(name) => name,
            ResumePoint::Complete => COMPLETE,
        }
    }
}

impl std::fmt::Display for ResumePoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every phase is done and health verification passed.
    Completed,
    /// `--status` was printed.
    StatusShown,
    /// Stopped on a failure; checkpoints are untouched.
    Aborted {
        origin: String,
        category: ErrorCategory,
    },
    /// The operator asked for a retry. The caller restarts the process.
    Retry,
}

/// First phase without a checkpoint, in list order.
pub fn resume_point(phases: &[Phase], store: &CheckpointStore) -> ResumePoint {
    phases
        .iter()
        .find(|p| !store.has(&p.name))
        .map(|p| ResumePoint::Phase(p.name.clone()))
        .unwrap_or(ResumePoint::Complete)
}

/// Per-phase progress as reported by `--status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseStatus {
    pub name: String,
    pub done: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct StatusReport {
    pub phases: Vec<PhaseStatus>,
    pub resume_point: ResumePoint,
    pub last_failure: Option<ErrorState>,
}

impl StatusReport {
    pub fn completed(&self) -> usize {
        self.phases.iter().filter(|p| p.done).count()
    }
}

/// Read-only snapshot of progress.
pub fn status_report(
    phases: &[Phase],
    store: &CheckpointStore,
    recorder: &ErrorStateRecorder,
) -> StatusReport {
    let statuses = phases
        .iter()
        .map(|p| PhaseStatus {
            name: p.name.clone(),
            done: store.has(&p.name),
            completed_at: store.time_of(&p.name),
        })
        .collect();
    let last_failure = match recorder.load_last_failure() {
        Ok(last) => last,
        Err(e) => {
            warn!(error = %e, "Ignoring unreadable error state");
            None
        }
    };
    StatusReport {
        phases: statuses,
        resume_point: resume_point(phases, store),
        last_failure,
    }
}

pub fn print_status(deployment: &str, state_dir: &StateDir, report: &StatusReport) {
    println!();
    println!("{} {}", style("Deployment Status:").bold(), style(deployment).cyan());
    println!("{}", "=".repeat(50));
    println!("State:    {}", state_dir.path().display());
    println!(
        "Progress: {}/{} phases complete",
        report.completed(),
        report.phases.len()
    );
    println!();

    for (idx, phase) in report.phases.iter().enumerate() {
        let (marker, name) = if phase.done {
            (style("✓").green(), style(phase.name.as_str()).green())
        } else {
            (style("·").dim(), style(phase.name.as_str()).dim())
        };
        let when = match (phase.done, phase.completed_at) {
            (true, Some(t)) => t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string(),
            (true, None) => "done".to_string(),
            (false, _) => "pending".to_string(),
        };
        println!("  {} {:>2}. {:<24} {}", marker, idx + 1, name, style(when).dim());
    }
    println!();

    match &report.resume_point {
        ResumePoint::Complete => println!("Next:     all phases complete (health verification on next run)"),
        ResumePoint::Phase(name) => println!("Next:     {}", style(name).yellow().bold()),
    }

    if let Some(last) = &report.last_failure {
        println!();
        println!(
            "Last failure: {} ({}) at {}",
            style(&last.origin).red().bold(),
            last.category,
            last.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
        );
        println!("  location:  {}", last.location);
        if let Some(code) = last.exit_code {
            println!("  exit code: {}", code);
        }
        if !last.message.is_empty() {
            println!("  message:   {}", last.message);
        }
    }
    println!();
}

/// Drives phases, recovery and health verification for one invocation.
pub struct Orchestrator {
    deployment: String,
    phases: Vec<Phase>,
    state_dir: StateDir,
    store: CheckpointStore,
    recorder: ErrorStateRecorder,
    health: HealthSection,
    source: Arc<dyn HealthSource>,
    prompter: Box<dyn Prompter>,
    interactive: bool,
    relaunch_count: u32,
    max_relaunches: u32,
    ui: OrchestratorUI,
}

impl Orchestrator {
    pub fn new(
        deployment: impl Into<String>,
        phases: Vec<Phase>,
        state_dir: StateDir,
        health: HealthSection,
        source: Arc<dyn HealthSource>,
    ) -> Self {
        let ui = OrchestratorUI::hidden(phases.len() as u64);
        Self {
            deployment: deployment.into(),
            store: CheckpointStore::new(&state_dir),
            recorder: ErrorStateRecorder::new(&state_dir),
            state_dir,
            phases,
            health,
            source,
            prompter: Box::new(TerminalPrompter),
            interactive: false,
            relaunch_count: 0,
            max_relaunches: u32::MAX,
            ui,
        }
    }

    pub fn with_ui(mut self, ui: OrchestratorUI) -> Self {
        self.ui = ui;
        self
    }

    pub fn with_prompter(mut self, prompter: Box<dyn Prompter>) -> Self {
        self.prompter = prompter;
        self
    }

    pub fn interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    /// `count` relaunches already happened; retries stop at `max`.
    pub fn relaunch_budget(mut self, count: u32, max: u32) -> Self {
        self.relaunch_count = count;
        self.max_relaunches = max;
        self
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    pub fn recorder(&self) -> &ErrorStateRecorder {
        &self.recorder
    }

    pub fn resume_point(&self) -> ResumePoint {
        resume_point(&self.phases, &self.store)
    }

    pub async fn run(&self, mode: RunMode) -> Result<RunOutcome> {
        match mode {
            RunMode::Status => {
                let report = status_report(&self.phases, &self.store, &self.recorder);
                print_status(&self.deployment, &self.state_dir, &report);
                return Ok(RunOutcome::StatusShown);
            }
            RunMode::Fresh => {
                self.store
                    .clear_all()
                    .context("Failed to clear state for a fresh run")?;
                info!(deployment = %self.deployment, "Fresh run, state cleared");
            }
            RunMode::Resume => match self.recorder.load_last_failure() {
                Ok(Some(last)) => self.ui.show_resume(&last),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Ignoring unreadable error state"),
            },
        }

        self.execute().await
    }

    async fn execute(&self) -> Result<RunOutcome> {
        let started = Instant::now();
        self.ui
            .print_header(&self.deployment, &self.state_dir.path().display().to_string());

        let start = match self.resume_point() {
            ResumePoint::Phase(name) => self
                .phases
                .iter()
                .position(|p| p.name == name)
                .unwrap_or(0),
            ResumePoint::Complete => self.phases.len(),
        };
        if let Some(first) = self.phases.get(start) {
            self.ui.show_resume_point(&first.name, start);
        }
        for phase in &self.phases[..start] {
            self.ui
                .phase_skipped(&phase.name, self.store.time_of(&phase.name));
        }
        info!(deployment = %self.deployment, resume_point = %self.resume_point(), "Starting run");

        for phase in &self.phases[start..] {
            // A checkpoint past the resume point means partial state; never re-run it.
            if self.store.has(&phase.name) {
                warn!(phase = %phase.name, "Phase already checkpointed, skipping");
                self.ui
                    .phase_skipped(&phase.name, self.store.time_of(&phase.name));
                continue;
            }

            let location = phase.body().location();
            self.ui.start_phase(&phase.name, &location);
            let phase_started = Instant::now();
            info!(phase = %phase.name, order = phase.order, "Phase started");

            match phase.body().run().await {
                Ok(()) => {
                    self.store
                        .set(&phase.name)
                        .with_context(|| format!("Failed to checkpoint phase '{}'", phase.name))?;
                    info!(phase = %phase.name, elapsed_ms = phase_started.elapsed().as_millis() as u64, "Phase complete");
                    self.ui.phase_complete(&phase.name, phase_started.elapsed());
                }
                Err(err) => {
                    self.ui.phase_failed(&phase.name, &err.message);
                    self.ui.show_output("Output:", &err.stdout);
                    self.ui.show_output("Error:", &err.stderr);
                    let state = self
                        .recorder
                        .record_failure(&phase.name, &location, err.exit_code, err.hint, &err.message)
                        .context("Failed to record phase failure")?;
                    return self.recover(&state);
                }
            }
        }

        self.verify_health(started).await
    }

    async fn verify_health(&self, started: Instant) -> Result<RunOutcome> {
        let verifier = HealthVerifier::from_config(&self.health);

        if !self.health.services.is_empty() {
            let reports = verifier
                .check_services(self.source.as_ref(), &self.health.services)
                .await;
            for report in &reports {
                self.ui.service_result(report);
            }
            let failed: Vec<&str> = reports
                .iter()
                .filter(|r| !r.passed)
                .map(|r| r.name.as_str())
                .collect();
            if !failed.is_empty() {
                let state = self
                    .recorder
                    .record_failure(
                        HEALTH_ORIGIN,
                        &failed.join(", "),
                        Some(HEALTH_FAILURE_EXIT_CODE),
                        Some(FailureHint::Critical),
                        &format!("Unhealthy services: {}", failed.join(", ")),
                    )
                    .context("Failed to record health failure")?;
                return self.recover(&state);
            }
        }

        let endpoint = &self.health.endpoint;
        let required = verifier.required_consecutive;
        let max_attempts = verifier.max_attempts;
        self.ui.start_health(endpoint, required, max_attempts);
        let outcome = verifier
            .wait_for_healthy(self.source.as_ref(), endpoint, |poll| {
                self.ui.health_poll(poll, required, max_attempts)
            })
            .await;
        self.ui.health_done(endpoint, &outcome);

        if let HealthOutcome::Exhausted { attempts, .. } = outcome {
            let state = self
                .recorder
                .record_failure(
                    HEALTH_ORIGIN,
                    &endpoint.to_string(),
                    Some(HEALTH_FAILURE_EXIT_CODE),
                    Some(FailureHint::Critical),
                    &format!(
                        "{endpoint} did not pass {required} consecutive checks within {attempts} attempts"
                    ),
                )
                .context("Failed to record health failure")?;
            return self.recover(&state);
        }

        self.recorder
            .clear()
            .context("Failed to clear recorded error state")?;
        info!(deployment = %self.deployment, "Deployment complete");
        self.ui.finish(&self.deployment, started.elapsed());
        Ok(RunOutcome::Completed)
    }

    fn recover(&self, state: &ErrorState) -> Result<RunOutcome> {
        // Release the bars first; a redraw would overwrite the report and prompt.
        self.ui.abandon();
        let decision = advise(state, self.interactive, self.prompter.as_ref())?;
        let aborted = RunOutcome::Aborted {
            origin: state.origin.clone(),
            category: state.category,
        };

        match decision {
            RecoveryDecision::Retry if self.relaunch_count >= self.max_relaunches => {
                warn!(
                    relaunches = self.relaunch_count,
                    "Relaunch limit reached, aborting instead of retrying"
                );
                println!(
                    "  {}",
                    style(format!(
                        "Retried {} time(s) already; aborting. Run again to resume.",
                        self.relaunch_count
                    ))
                    .yellow()
                );
                Ok(aborted)
            }
            RecoveryDecision::Retry => {
                info!(origin = %state.origin, "Retry requested");
                Ok(RunOutcome::Retry)
            }
            RecoveryDecision::Abort => {
                info!(origin = %state.origin, category = %state.category, "Run aborted");
                Ok(aborted)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PhaseError;
    use crate::health::HealthTarget;
    use crate::health::testing::ScriptedSource;
    use crate::phase::PhaseBody;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::{TempDir, tempdir};

    type CallLog = Arc<Mutex<Vec<String>>>;

    /// Records its invocation and optionally fails.
    struct Recording {
        name: String,
        log: CallLog,
        failure: Option<(Option<i32>, Option<FailureHint>)>,
    }

    #[async_trait]
    impl PhaseBody for Recording {
        async fn run(&self) -> Result<(), PhaseError> {
            self.log.lock().unwrap().push(self.name.clone());
            match self.failure {
                Some((code, hint)) => {
                    let mut err = PhaseError::new(code, format!("{} broke", self.name));
                    if let Some(hint) = hint {
                        err = err.with_hint(hint);
                    }
                    Err(err)
                }
                None => Ok(()),
            }
        }

        fn location(&self) -> String {
            format!("./{}.sh", self.name)
        }
    }

    struct AlwaysAnswer(bool);

    impl Prompter for AlwaysAnswer {
        fn confirm(&self, _prompt: &str, _default: bool) -> Result<bool> {
            Ok(self.0)
        }
    }

    const NAMES: [&str; 5] = ["preflight", "prerequisites", "configure", "deploy", "verify"];

    fn phases(log: &CallLog, failing: Option<(&str, Option<i32>, Option<FailureHint>)>) -> Vec<Phase> {
        NAMES
            .iter()
            .enumerate()
            .map(|(order, name)| {
                let failure = failing
                    .filter(|(f, _, _)| f == name)
                    .map(|(_, code, hint)| (code, hint));
                Phase::new(
                    *name,
                    order,
                    Recording {
                        name: name.to_string(),
                        log: log.clone(),
                        failure,
                    },
                )
            })
            .collect()
    }

    fn health(services: Vec<crate::config::ServiceCheck>) -> HealthSection {
        HealthSection {
            endpoint: HealthTarget::Http {
                url: "http://localhost/health".into(),
                expect_status: None,
            },
            required_consecutive: 3,
            interval_secs: 0,
            max_attempts: 5,
            timeout_secs: 1,
            services,
        }
    }

    struct Harness {
        _dir: TempDir,
        state: StateDir,
        log: CallLog,
    }

    impl Harness {
        fn new() -> Self {
            let dir = tempdir().unwrap();
            let state = StateDir::at(dir.path().join("state")).unwrap();
            Self {
                _dir: dir,
                state,
                log: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn orchestrator(
            &self,
            failing: Option<(&str, Option<i32>, Option<FailureHint>)>,
            source: Arc<ScriptedSource>,
        ) -> Orchestrator {
            Orchestrator::new(
                "shop",
                phases(&self.log, failing),
                self.state.clone(),
                health(Vec::new()),
                source,
            )
        }

        fn store(&self) -> CheckpointStore {
            CheckpointStore::new(&self.state)
        }

        fn calls(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }
    }

    fn healthy() -> Arc<ScriptedSource> {
        Arc::new(ScriptedSource::always(true))
    }

    #[test]
    fn resume_point_for_every_prefix() {
        let h = Harness::new();
        let store = h.store();
        let list = phases(&h.log, None);

        for k in 0..=NAMES.len() {
            store.clear_all().unwrap();
            for name in &NAMES[..k] {
                store.set(name).unwrap();
            }
            let expected = if k == NAMES.len() {
                ResumePoint::Complete
            } else {
                ResumePoint::Phase(NAMES[k].to_string())
            };
            assert_eq!(resume_point(&list, &store), expected, "prefix {k}");
        }
        assert_eq!(ResumePoint::Complete.as_str(), COMPLETE);
    }

    #[tokio::test]
    async fn resume_runs_only_remaining_phases_then_health() {
        let h = Harness::new();
        h.store().set("preflight").unwrap();
        h.store().set("prerequisites").unwrap();
        let source = healthy();

        let outcome = h
            .orchestrator(None, source.clone())
            .run(RunMode::Resume)
            .await
            .unwrap();

        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(h.calls(), vec!["configure", "deploy", "verify"]);
        assert_eq!(source.calls(), 3);
        for name in NAMES {
            assert!(h.store().has(name), "{name} not checkpointed");
        }
    }

    #[tokio::test]
    async fn second_resume_does_not_re_execute() {
        let h = Harness::new();
        h.orchestrator(None, healthy()).run(RunMode::Resume).await.unwrap();
        assert_eq!(h.calls().len(), NAMES.len());

        let source = healthy();
        let outcome = h
            .orchestrator(None, source.clone())
            .run(RunMode::Resume)
            .await
            .unwrap();
        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(h.calls().len(), NAMES.len());
        // Health still verified on an already-complete run.
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test]
    async fn checkpoint_past_resume_point_is_skipped() {
        let h = Harness::new();
        h.store().set("deploy").unwrap();

        h.orchestrator(None, healthy()).run(RunMode::Resume).await.unwrap();
        assert_eq!(h.calls(), vec!["preflight", "prerequisites", "configure", "verify"]);
    }

    #[tokio::test]
    async fn fresh_clears_and_runs_everything() {
        let h = Harness::new();
        for name in NAMES {
            h.store().set(name).unwrap();
        }
        let orchestrator = h.orchestrator(None, healthy());
        assert_eq!(orchestrator.resume_point(), ResumePoint::Complete);

        let outcome = orchestrator.run(RunMode::Fresh).await.unwrap();
        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(h.calls(), NAMES.to_vec());
    }

    #[tokio::test]
    async fn failure_aborts_and_keeps_checkpoints() {
        let h = Harness::new();
        let source = healthy();
        let outcome = h
            .orchestrator(Some(("deploy", Some(1), None)), source.clone())
            .run(RunMode::Resume)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            RunOutcome::Aborted {
                origin: "deploy".into(),
                category: ErrorCategory::Unknown
            }
        );
        assert_eq!(h.calls(), vec!["preflight", "prerequisites", "configure", "deploy"]);
        assert!(h.store().has("configure"));
        assert!(!h.store().has("deploy"));
        assert_eq!(source.calls(), 0);

        let last = ErrorStateRecorder::new(&h.state)
            .load_last_failure()
            .unwrap()
            .unwrap();
        assert_eq!(last.origin, "deploy");
        assert_eq!(last.location, "./deploy.sh");
        assert_eq!(last.exit_code, Some(1));

        // The next run resumes at the failed phase and clears the error on success.
        let outcome = h.orchestrator(None, healthy()).run(RunMode::Resume).await.unwrap();
        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(&h.calls()[4..], ["deploy", "verify"]);
        assert!(ErrorStateRecorder::new(&h.state).load_last_failure().unwrap().is_none());
    }

    #[tokio::test]
    async fn accepted_retry_is_returned_to_caller() {
        let h = Harness::new();
        let outcome = h
            .orchestrator(Some(("configure", Some(1), Some(FailureHint::Transient))), healthy())
            .interactive(true)
            .with_prompter(Box::new(AlwaysAnswer(true)))
            .run(RunMode::Resume)
            .await
            .unwrap();
        assert_eq!(outcome, RunOutcome::Retry);
        assert!(!h.store().has("configure"));
    }

    /// Remembers whether the progress bars were still live when asked.
    struct BarWatcher {
        bar: indicatif::ProgressBar,
        bar_finished: Arc<Mutex<Option<bool>>>,
    }

    impl Prompter for BarWatcher {
        fn confirm(&self, _prompt: &str, _default: bool) -> Result<bool> {
            *self.bar_finished.lock().unwrap() = Some(self.bar.is_finished());
            Ok(false)
        }
    }

    #[tokio::test]
    async fn progress_bars_are_released_before_prompting() {
        let h = Harness::new();
        let ui = OrchestratorUI::hidden(NAMES.len() as u64);
        let bar_finished = Arc::new(Mutex::new(None));
        let watcher = BarWatcher {
            bar: ui.phase_bar(),
            bar_finished: bar_finished.clone(),
        };

        let outcome = h
            .orchestrator(Some(("deploy", Some(1), Some(FailureHint::Transient))), healthy())
            .with_ui(ui)
            .interactive(true)
            .with_prompter(Box::new(watcher))
            .run(RunMode::Resume)
            .await
            .unwrap();

        assert!(matches!(outcome, RunOutcome::Aborted { .. }));
        assert_eq!(*bar_finished.lock().unwrap(), Some(true));
    }

    #[tokio::test]
    async fn retry_is_downgraded_once_relaunch_budget_is_spent() {
        let h = Harness::new();
        let outcome = h
            .orchestrator(Some(("configure", Some(1), Some(FailureHint::Transient))), healthy())
            .interactive(true)
            .with_prompter(Box::new(AlwaysAnswer(true)))
            .relaunch_budget(3, 3)
            .run(RunMode::Resume)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            RunOutcome::Aborted {
                origin: "configure".into(),
                category: ErrorCategory::Transient
            }
        );
    }

    #[tokio::test]
    async fn health_exhaustion_is_critical_and_never_retried() {
        let h = Harness::new();
        let source = Arc::new(ScriptedSource::new(&[true, true, false, true, true]));
        let outcome = h
            .orchestrator(None, source.clone())
            .interactive(true)
            .with_prompter(Box::new(AlwaysAnswer(true)))
            .run(RunMode::Resume)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            RunOutcome::Aborted {
                origin: HEALTH_ORIGIN.into(),
                category: ErrorCategory::Critical
            }
        );
        assert_eq!(source.calls(), 5);
        for name in NAMES {
            assert!(h.store().has(name));
        }
        let last = ErrorStateRecorder::new(&h.state)
            .load_last_failure()
            .unwrap()
            .unwrap();
        assert_eq!(last.category, ErrorCategory::Critical);
    }

    #[tokio::test]
    async fn failing_service_aborts_before_endpoint_is_polled() {
        let h = Harness::new();
        let source = Arc::new(ScriptedSource::always(false));
        let services = vec![crate::config::ServiceCheck {
            name: "postgres".into(),
            target: HealthTarget::Tcp {
                address: "127.0.0.1:5432".into(),
            },
            retries: 2,
        }];
        let orchestrator = Orchestrator::new(
            "shop",
            phases(&h.log, None),
            h.state.clone(),
            health(services),
            source.clone(),
        );

        let outcome = orchestrator.run(RunMode::Resume).await.unwrap();
        assert_eq!(
            outcome,
            RunOutcome::Aborted {
                origin: HEALTH_ORIGIN.into(),
                category: ErrorCategory::Critical
            }
        );
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn status_has_no_side_effects() {
        let h = Harness::new();
        h.store().set("preflight").unwrap();
        let before = h.store().list().unwrap();

        let source = healthy();
        let orchestrator = h.orchestrator(None, source.clone());
        let outcome = orchestrator.run(RunMode::Status).await.unwrap();

        assert_eq!(outcome, RunOutcome::StatusShown);
        assert!(h.calls().is_empty());
        assert_eq!(source.calls(), 0);
        assert_eq!(h.store().list().unwrap(), before);
        assert!(!h.state.error_state_file().exists());
    }

    #[test]
    fn status_report_lists_progress_and_last_failure() {
        let h = Harness::new();
        h.store().set("preflight").unwrap();
        let recorder = ErrorStateRecorder::new(&h.state);
        recorder
            .record_failure("prerequisites", "./prerequisites.sh", Some(126), None, "denied")
            .unwrap();

        let report = status_report(&phases(&h.log, None), &h.store(), &recorder);
        assert_eq!(report.completed(), 1);
        assert!(report.phases[0].done);
        assert!(report.phases[0].completed_at.is_some());
        assert!(!report.phases[1].done);
        assert_eq!(report.resume_point, ResumePoint::Phase("prerequisites".into()));
        assert_eq!(
            report.last_failure.unwrap().category,
            ErrorCategory::RecoverablePermission
        );
    }
}
