use crate::health::{HealthOutcome, HealthPollResult, HealthTarget, ServiceReport};
use crate::state::ErrorState;
use crate::ui::icons::{CHECK, CLOCK, CROSS, HEART, RESUME, RUNNING, SKIP, SPARKLE};
use chrono::{DateTime, Local, Utc};
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;

/// Terminal UI for a deployment run, rendered via `indicatif` progress bars.
///
/// Two bars are stacked vertically:
/// - Phase bar, counting phases that are done (run or skipped)
/// - Activity spinner, showing the running phase or the health poll
///
/// When the draw target is hidden (no terminal, or tests) lines are printed
/// straight to stdout so the run log is never lost.
pub struct OrchestratorUI {
    multi: MultiProgress,
    phase_bar: ProgressBar,
    activity: ProgressBar,
    verbose: bool,
}

impl OrchestratorUI {
    /// Create the UI sized for `total_phases`.
    pub fn new(total_phases: u64, verbose: bool) -> Self {
        Self::with_target(MultiProgress::new(), total_phases, verbose)
    }

    /// A UI that never draws bars; lines still go to stdout.
    pub fn hidden(total_phases: u64) -> Self {
        Self::with_target(
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden()),
            total_phases,
            false,
        )
    }

    fn with_target(multi: MultiProgress, total_phases: u64, verbose: bool) -> Self {
        let phase_style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .expect("progress bar template is a valid static string")
            .progress_chars("█▓▒░");

        let phase_bar = multi.add(ProgressBar::new(total_phases));
        phase_bar.set_style(phase_style);
        phase_bar.set_prefix("Phases");

        let activity_style = ProgressStyle::default_spinner()
            .template("{prefix:.bold.dim} {spinner} {msg} {elapsed:.dim}")
            .expect("progress bar template is a valid static string");

        let activity = multi.add(ProgressBar::new_spinner());
        activity.set_style(activity_style);
        activity.set_prefix("   Now");

        Self {
            multi,
            phase_bar,
            activity,
            verbose,
        }
    }

    fn print_line(&self, msg: impl AsRef<str>) {
        if self.multi.is_hidden() {
            println!("{}", msg.as_ref());
        } else if self.multi.println(msg.as_ref()).is_err() {
            eprintln!("{}", msg.as_ref());
        }
    }

    pub fn print_header(&self, deployment: &str, state_dir: &str) {
        self.print_line(format!("{}", style("═".repeat(70)).cyan()));
        self.print_line(format!(
            "{} {}",
            style("Deploying").bold(),
            style(deployment).cyan().bold()
        ));
        self.print_line(format!("  {} {}", style("state:").dim(), state_dir));
        self.print_line(format!("{}", style("═".repeat(70)).cyan()));
    }

    /// Show the failure that ended the previous run.
    pub fn show_resume(&self, last: &ErrorState) {
        self.print_line(format!(
            "{}Previous run failed in {} ({}) at {}",
            RESUME,
            style(&last.origin).yellow().bold(),
            last.category,
            local_time(&last.timestamp)
        ));
        if !last.message.is_empty() {
            self.print_line(format!("  {}", style(&last.message).dim()));
        }
    }

    pub fn show_resume_point(&self, phase: &str, skipped: usize) {
        if skipped > 0 {
            self.print_line(format!(
                "{}Resuming at {} ({} phase(s) already complete)",
                RESUME,
                style(phase).cyan().bold(),
                skipped
            ));
        }
    }

    pub fn phase_skipped(&self, name: &str, completed_at: Option<DateTime<Utc>>) {
        self.phase_bar.inc(1);
        let when = completed_at
            .map(|t| format!(" at {}", local_time(&t)))
            .unwrap_or_default();
        self.print_line(format!(
            "{}{} already complete{}",
            SKIP,
            style(name).dim(),
            style(when).dim()
        ));
    }

    /// Start the spinner for a phase. Does not advance the phase bar.
    pub fn start_phase(&self, name: &str, location: &str) {
        self.phase_bar.set_message(format!("{}", style(name).yellow()));
        self.activity.reset_elapsed();
        self.activity
            .set_message(format!("{}{}", RUNNING, style(name).bold()));
        self.activity.enable_steady_tick(Duration::from_millis(100));
        if self.verbose {
            self.print_line(format!("    {} {}", style("→").dim(), style(location).dim()));
        }
    }

    pub fn phase_complete(&self, name: &str, elapsed: Duration) {
        self.activity.finish_and_clear();
        self.phase_bar.inc(1);
        self.print_line(format!(
            "{}{} {}",
            CHECK,
            style(name).green().bold(),
            style(format_elapsed(elapsed)).dim()
        ));
    }

    /// Stop the spinner so the recovery report prints cleanly.
    pub fn phase_failed(&self, name: &str, reason: &str) {
        self.activity.finish_and_clear();
        self.print_line(format!("{}{} failed: {}", CROSS, style(name).red().bold(), reason));
    }

    pub fn show_output(&self, label: &str, text: &str) {
        if text.trim().is_empty() {
            return;
        }
        self.print_line(format!("  {}", style(label).dim().bold()));
        for line in text.lines() {
            self.print_line(format!("    {}", style(line).dim()));
        }
    }

    pub fn service_result(&self, report: &ServiceReport) {
        let icon = if report.passed { CHECK } else { CROSS };
        self.print_line(format!(
            "{}service {} {} after {} attempt(s)",
            icon,
            style(&report.name).bold(),
            if report.passed {
                style("healthy").green()
            } else {
                style("unhealthy").red()
            },
            report.attempts
        ));
    }

    pub fn start_health(&self, target: &HealthTarget, required: u32, max_attempts: u32) {
        self.phase_bar.set_message(format!("{}", style("health").yellow()));
        self.activity.reset_elapsed();
        self.activity.set_message(format!(
            "{}Waiting for {} ({} consecutive passes, {} attempts max)",
            HEART, target, required, max_attempts
        ));
        self.activity.enable_steady_tick(Duration::from_millis(100));
    }

    pub fn health_poll(&self, poll: &HealthPollResult, required: u32, max_attempts: u32) {
        self.activity.set_message(format!(
            "{}Health {}/{} streak {}/{}",
            HEART,
            style(poll.attempt).cyan(),
            max_attempts,
            style(poll.consecutive).cyan(),
            required
        ));
        if self.verbose || self.multi.is_hidden() {
            let mark = if poll.passed {
                style("pass").green()
            } else {
                style("fail").red()
            };
            self.print_line(format!(
                "    {} attempt {} {} (streak {}/{})",
                style("→").dim(),
                poll.attempt,
                mark,
                poll.consecutive,
                required
            ));
        }
    }

    pub fn health_done(&self, target: &HealthTarget, outcome: &HealthOutcome) {
        self.activity.finish_and_clear();
        match outcome {
            HealthOutcome::Success { attempts } => self.print_line(format!(
                "{}{} healthy after {} poll(s)",
                CHECK,
                style(target).green().bold(),
                attempts
            )),
            HealthOutcome::Exhausted {
                attempts,
                best_streak,
            } => self.print_line(format!(
                "{}{} not healthy after {} poll(s), best streak {}",
                CROSS,
                style(target).red().bold(),
                attempts,
                best_streak
            )),
        }
    }

    pub fn finish(&self, deployment: &str, elapsed: Duration) {
        self.phase_bar.finish_with_message("done");
        self.print_line(format!(
            "\n{}Deployment {} complete {}{}\n",
            SPARKLE,
            style(deployment).green().bold(),
            CLOCK,
            style(format_elapsed(elapsed)).dim()
        ));
    }

    /// Leave the bars in place after an abort.
    pub fn abandon(&self) {
        self.activity.finish_and_clear();
        self.phase_bar.abandon();
    }

    #[cfg(test)]
    pub(crate) fn phase_bar(&self) -> ProgressBar {
        self.phase_bar.clone()
    }
}

fn local_time(t: &DateTime<Utc>) -> String {
    t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs == 0 {
        format!("{}ms", elapsed.as_millis())
    } else {
        format!("{}s", secs)
    }
}
