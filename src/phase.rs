//! Phase definition and the command-backed phase body.
//!
//! This module provides:
//! - `Phase`, one named step of the fixed deployment sequence
//! - `PhaseBody`, the seam through which the orchestrator invokes a step
//! - `CommandPhase`, a body that runs a shell command and classifies its failure
//! - `build_phases` to turn `[[phases]]` config entries into runnable phases

use crate::config::PhaseConfig;
use crate::errors::PhaseError;
use crate::recovery::FailureHint;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

/// Lines of captured output kept for failure reports.
const OUTPUT_TAIL_LINES: usize = 40;

/// Exit code reported when a phase exceeds its timeout (matches coreutils `timeout`).
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// The work bound to a phase. Must surface every failure as an `Err`;
/// bodies never retry internally.
#[async_trait]
pub trait PhaseBody: Send + Sync {
    async fn run(&self) -> Result<(), PhaseError>;

    /// Human-readable location recorded with a failure (e.g. the command line).
    fn location(&self) -> String;
}

/// One named unit of work in the deployment sequence.
pub struct Phase {
    /// Unique name, also the checkpoint key.
    pub name: String,
    /// Zero-based position in the sequence.
    pub order: usize,
    body: Box<dyn PhaseBody>,
}

impl Phase {
    pub fn new(name: impl Into<String>, order: usize, body: impl PhaseBody + 'static) -> Self {
        Self {
            name: name.into(),
            order,
            body: Box::new(body),
        }
    }

    pub fn body(&self) -> &dyn PhaseBody {
        self.body.as_ref()
    }
}

impl std::fmt::Debug for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Phase")
            .field("name", &self.name)
            .field("order", &self.order)
            .field("location", &self.body.location())
            .finish()
    }
}

/// Runs `sh -c <command>` and maps its outcome onto a `PhaseError`.
#[derive(Debug, Clone)]
pub struct CommandPhase {
    command: String,
    working_dir: PathBuf,
    env: BTreeMap<String, String>,
    timeout: Option<Duration>,
}

impl CommandPhase {
    pub fn new(command: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            working_dir: working_dir.into(),
            env: BTreeMap::new(),
            timeout: None,
        }
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl PhaseBody for CommandPhase {
    async fn run(&self) -> Result<(), PhaseError> {
        debug!(command = %self.command, dir = %self.working_dir.display(), "Running phase command");

        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(&self.command)
            .current_dir(&self.working_dir)
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so a timeout can take down subshells and pipelines too.
        #[cfg(unix)]
        command.process_group(0);

        let child = command.spawn().map_err(|e| {
            PhaseError::new(Some(127), format!("Failed to spawn '{}': {}", self.command, e))
        })?;
        let pid = child.id();

        let output = match self.timeout {
            Some(limit) => match timeout(limit, child.wait_with_output()).await {
                Ok(result) => result,
                Err(_) => {
                    kill_process_group(pid);
                    return Err(PhaseError::new(
                        Some(TIMEOUT_EXIT_CODE),
                        format!("'{}' timed out after {}s", self.command, limit.as_secs()),
                    )
                    .with_hint(FailureHint::Transient));
                }
            },
            None => child.wait_with_output().await,
        }
        .map_err(|e| PhaseError::new(None, format!("Failed to wait for '{}': {}", self.command, e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if output.status.success() {
            if !stdout.trim().is_empty() {
                debug!(stdout = %tail(&stdout, OUTPUT_TAIL_LINES), "Phase command output");
            }
            return Ok(());
        }

        let exit_code = exit_code_of(&output.status);
        let message = match exit_code {
            Some(code) => format!("'{}' exited with code {}", self.command, code),
            None => format!("'{}' was terminated", self.command),
        };
        let mut err = PhaseError::new(exit_code, message).with_output(
            tail(&stdout, OUTPUT_TAIL_LINES),
            tail(&stderr, OUTPUT_TAIL_LINES),
        );
        if let Some(hint) = FailureHint::detect(&format!("{stderr}\n{stdout}")) {
            err = err.with_hint(hint);
        }
        Err(err)
    }

    fn location(&self) -> String {
        self.command.clone()
    }
}

/// SIGKILL every process in the group led by `pid`.
///
/// The `sh` leader itself is reaped by tokio once its `Child` is dropped.
#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    let Some(pgid) = pid.and_then(|p| libc::pid_t::try_from(p).ok()) else {
        return;
    };
    // SAFETY: killpg only sends a signal; `pgid` is a group we created at spawn.
    if unsafe { libc::killpg(pgid, libc::SIGKILL) } != 0 {
        debug!(pgid, error = %std::io::Error::last_os_error(), "Process group already gone");
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

/// Exit code, with signal terminations reported as `128 + signal`.
fn exit_code_of(status: &std::process::ExitStatus) -> Option<i32> {
    if let Some(code) = status.code() {
        return Some(code);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        status.signal().map(|sig| 128 + sig)
    }
    #[cfg(not(unix))]
    {
        None
    }
}

fn tail(text: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = text.trim_end().lines().collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("\n")
}

/// Build runnable phases from config, in file order.
///
/// Relative working directories resolve against `base_dir` (the directory
/// holding `waypoint.toml`).
pub fn build_phases(configs: &[PhaseConfig], base_dir: &Path) -> Result<Vec<Phase>> {
    let mut seen = HashSet::new();
    configs
        .iter()
        .enumerate()
        .map(|(order, cfg)| {
            crate::state::validate_step_name(&cfg.name)
                .with_context(|| format!("Phase #{} has an unusable name", order + 1))?;
            if !seen.insert(cfg.name.as_str()) {
                anyhow::bail!("Duplicate phase name '{}'", cfg.name);
            }
            let working_dir = match &cfg.working_dir {
                Some(dir) if dir.is_absolute() => dir.clone(),
                Some(dir) => base_dir.join(dir),
                None => base_dir.to_path_buf(),
            };
            let body = CommandPhase::new(&cfg.command, working_dir)
                .with_env(cfg.env.clone())
                .with_timeout(cfg.timeout_secs.map(Duration::from_secs));
            Ok(Phase::new(&cfg.name, order, body))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recovery::{ErrorCategory, categorize};
    use tempfile::tempdir;

    fn sh(command: &str) -> CommandPhase {
        CommandPhase::new(command, std::env::temp_dir())
    }

    #[tokio::test]
    async fn successful_command_returns_ok() {
        sh("echo hello").run().await.unwrap();
    }

    #[tokio::test]
    async fn non_zero_exit_is_reported_with_code() {
        let err = sh("echo partial; echo broken >&2; exit 3").run().await.unwrap_err();
        assert_eq!(err.exit_code, Some(3));
        assert_eq!(err.stdout, "partial");
        assert_eq!(err.stderr, "broken");
        assert!(err.hint.is_none());
        assert_eq!(categorize(err.exit_code, err.hint), ErrorCategory::Unknown);
    }

    #[tokio::test]
    async fn permission_message_becomes_hint() {
        let err = sh("echo 'mkdir: /opt/app: Permission denied' >&2; exit 1")
            .run()
            .await
            .unwrap_err();
        assert_eq!(err.hint, Some(FailureHint::Permission));
        assert_eq!(
            categorize(err.exit_code, err.hint),
            ErrorCategory::RecoverablePermission
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn killed_by_signal_is_fatal() {
        let err = sh("kill -9 $$").run().await.unwrap_err();
        assert_eq!(err.exit_code, Some(137));
        assert_eq!(categorize(err.exit_code, err.hint), ErrorCategory::Fatal);
    }

    #[tokio::test]
    async fn timeout_is_transient() {
        let err = sh("sleep 5")
            .with_timeout(Some(Duration::from_millis(100)))
            .run()
            .await
            .unwrap_err();
        assert_eq!(err.exit_code, Some(TIMEOUT_EXIT_CODE));
        assert_eq!(err.hint, Some(FailureHint::Transient));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timeout_stops_background_work_of_the_phase() {
        let dir = tempdir().unwrap();
        let err = CommandPhase::new("(sleep 1; touch marker); true", dir.path())
            .with_timeout(Some(Duration::from_millis(200)))
            .run()
            .await
            .unwrap_err();
        assert_eq!(err.exit_code, Some(TIMEOUT_EXIT_CODE));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!dir.path().join("marker").exists());
    }

    #[tokio::test]
    async fn env_and_working_dir_are_applied() {
        let dir = tempdir().unwrap();
        let mut env = BTreeMap::new();
        env.insert("DEPLOY_ENV".to_string(), "staging".to_string());
        CommandPhase::new("printf %s \"$DEPLOY_ENV\" > marker", dir.path())
            .with_env(env)
            .run()
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("marker")).unwrap(), "staging");
    }

    #[test]
    fn tail_keeps_last_lines() {
        let text = (1..=50).map(|i| i.to_string()).collect::<Vec<_>>().join("\n");
        let t = tail(&text, 3);
        assert_eq!(t, "48\n49\n50");
        assert_eq!(tail("", 3), "");
    }

    fn phase_config(name: &str, dir: Option<&str>) -> PhaseConfig {
        PhaseConfig {
            name: name.to_string(),
            command: "true".to_string(),
            working_dir: dir.map(PathBuf::from),
            timeout_secs: None,
            env: BTreeMap::new(),
        }
    }

    #[test]
    fn build_phases_preserves_order_and_resolves_dirs() {
        let base = Path::new("/srv/app");
        let phases = build_phases(
            &[phase_config("preflight", None), phase_config("deploy", Some("scripts"))],
            base,
        )
        .unwrap();
        assert_eq!(phases.len(), 2);
        assert_eq!(phases[0].name, "preflight");
        assert_eq!(phases[0].order, 0);
        assert_eq!(phases[1].order, 1);
        assert_eq!(phases[1].body().location(), "true");
    }

    #[test]
    fn build_phases_rejects_duplicates_and_bad_names() {
        let base = Path::new("/srv/app");
        let err = build_phases(&[phase_config("a", None), phase_config("a", None)], base).unwrap_err();
        assert!(err.to_string().contains("Duplicate"));
        assert!(build_phases(&[phase_config("bad/name", None)], base).is_err());
    }
}
