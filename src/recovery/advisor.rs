//! Turn a recorded failure into an abort/retry decision.
//!
//! | Category                 | Non-interactive | Interactive                        |
//! |--------------------------|-----------------|------------------------------------|
//! | `critical`, `fatal`      | abort           | abort, remediation only, no prompt |
//! | `transient`              | abort           | prompt, empty answer = retry       |
//! | `recoverable-*`          | abort           | hints, prompt, empty answer = retry|
//! | `unknown`                | abort           | prompt, empty answer = abort       |

use super::category::ErrorCategory;
use crate::state::ErrorState;
use crate::ui::icons::{CROSS, HINT};
use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, theme::ColorfulTheme};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryDecision {
    /// Cold-start the whole orchestration again; checkpoints carry progress.
    Retry,
    Abort,
}

/// Source of operator answers.
pub trait Prompter {
    /// Ask a yes/no question. An empty answer resolves to `default`.
    fn confirm(&self, prompt: &str, default: bool) -> Result<bool>;
}

/// Terminal prompter backed by `dialoguer`.
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn confirm(&self, prompt: &str, default: bool) -> Result<bool> {
        Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt)
            .default(default)
            .show_default(true)
            .interact()
            .context("Failed to read retry answer")
    }
}

/// Answers every prompt with a fixed choice, for unattended runs.
pub struct PresetPrompter {
    pub retry: bool,
}

impl Prompter for PresetPrompter {
    fn confirm(&self, prompt: &str, _default: bool) -> Result<bool> {
        let answer = if self.retry { "retry" } else { "abort" };
        println!("  {} {}", prompt, style(answer).bold());
        Ok(self.retry)
    }
}

/// Decide how to proceed after `state`, prompting only when an operator
/// is present and the category permits a retry.
pub fn advise(
    state: &ErrorState,
    interactive: bool,
    prompter: &dyn Prompter,
) -> Result<RecoveryDecision> {
    print_failure_report(state);

    let retry_by_default = match state.category {
        ErrorCategory::Critical | ErrorCategory::Fatal => {
            println!(
                "  {}",
                style("This failure class is never retried automatically.").dim()
            );
            return Ok(RecoveryDecision::Abort);
        }
        ErrorCategory::Transient
        | ErrorCategory::RecoverablePermission
        | ErrorCategory::RecoverableResource => true,
        ErrorCategory::Unknown => false,
    };

    if !interactive {
        println!(
            "  {}",
            style("Non-interactive run: aborting. Re-run to resume from this phase.").dim()
        );
        return Ok(RecoveryDecision::Abort);
    }

    let prompt = format!("Retry deployment from '{}'?", state.origin);
    if prompter.confirm(&prompt, retry_by_default)? {
        Ok(RecoveryDecision::Retry)
    } else {
        Ok(RecoveryDecision::Abort)
    }
}

fn print_failure_report(state: &ErrorState) {
    println!();
    println!(
        "{}{} failed ({})",
        CROSS,
        style(&state.origin).bold(),
        style(state.category).red().bold()
    );
    if !state.message.is_empty() {
        println!("  {}", state.message);
    }
    for hint in remediation_hints(state) {
        println!("  {}{}", HINT, hint);
    }
}

/// Category-specific remediation text shown to the operator.
pub fn remediation_hints(state: &ErrorState) -> Vec<String> {
    match state.category {
        ErrorCategory::Transient => vec![
            "The failure looks temporary (network, registry or rate limiting).".to_string(),
            "Retrying usually succeeds; wait a minute first if you were rate limited.".to_string(),
        ],
        ErrorCategory::RecoverablePermission => vec![
            format!("'{}' was denied access.", state.location),
            "Fix ownership of the deployment directory: sudo chown -R \"$(id -u):$(id -g)\" <dir>"
                .to_string(),
            "Make scripts executable: chmod +x <script>".to_string(),
            "If docker is involved: sudo usermod -aG docker \"$USER\" and log in again"
                .to_string(),
        ],
        ErrorCategory::RecoverableResource => vec![
            "The host ran out of disk space or memory.".to_string(),
            "Check usage: df -h && free -h".to_string(),
            "Reclaim space: docker system prune -af && journalctl --vacuum-time=7d".to_string(),
            "Stop services that are not needed during the deployment.".to_string(),
        ],
        ErrorCategory::Critical => vec![
            "Manual intervention is required before this deployment can continue.".to_string(),
            "If services are degraded, roll back to the previous release.".to_string(),
            "Inspect service logs, fix the cause, then resume; completed phases are kept."
                .to_string(),
        ],
        ErrorCategory::Fatal => {
            let mut hints = vec![match state.exit_code.and_then(signal_name) {
                Some(name) => format!("The process was terminated by {name}."),
                None => "The process was terminated by a signal.".to_string(),
            }];
            if matches!(state.exit_code, Some(137) | None) {
                hints.push(
                    "Check whether the OOM killer fired: journalctl -k | grep -i oom".to_string(),
                );
            }
            hints.push("Look for crash output in the system log: dmesg | tail -50".to_string());
            hints
        }
        ErrorCategory::Unknown => vec![
            "The failure could not be classified. Review the output above.".to_string(),
            "Retry only once you understand the cause.".to_string(),
        ],
    }
}

fn signal_name(exit_code: i32) -> Option<&'static str> {
    let name = match exit_code - 128 {
        1 => "SIGHUP",
        2 => "SIGINT",
        3 => "SIGQUIT",
        6 => "SIGABRT",
        9 => "SIGKILL",
        11 => "SIGSEGV",
        13 => "SIGPIPE",
        15 => "SIGTERM",
        _ => return None,
    };
    Some(name)
}
