//! Retry by restarting the program.
//!
//! A retry replaces the current process image with a fresh invocation of the
//! same executable and arguments. No in-memory state survives; the new
//! process resumes from the checkpoints on disk.

use crate::config::ENV_RELAUNCH_COUNT;
use anyhow::{Context, Result};
use std::convert::Infallible;
use std::ffi::OsString;
use std::io::Write;
use std::process::Command;
use tracing::info;

/// Flag that must not survive a relaunch, or the retry would wipe progress.
const FRESH_FLAG: &str = "--fresh";

/// Arguments for the relaunched process: `args` without the program name
/// and without `--fresh`.
pub fn relaunch_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .skip(1)
        .filter(|arg| arg.as_os_str() != FRESH_FLAG)
        .collect()
}

/// Replace this process with a new run of the same command line.
///
/// `next_count` is exported to the child so it can enforce the relaunch limit.
/// Only returns on failure.
pub fn relaunch(next_count: u32) -> Result<Infallible> {
    let exe = std::env::current_exe().context("Failed to locate the running executable")?;
    let args = relaunch_args(std::env::args_os());
    info!(exe = %exe.display(), relaunch = next_count, "Relaunching");
    let _ = std::io::stdout().flush();
    let _ = std::io::stderr().flush();

    let mut command = Command::new(&exe);
    command.args(&args).env(ENV_RELAUNCH_COUNT, next_count.to_string());
    exec(command).with_context(|| format!("Failed to relaunch {}", exe.display()))
}

#[cfg(unix)]
fn exec(mut command: Command) -> std::io::Result<Infallible> {
    use std::os::unix::process::CommandExt;
    Err(command.exec())
}

#[cfg(not(unix))]
fn exec(mut command: Command) -> std::io::Result<Infallible> {
    let status = command.status()?;
    std::process::exit(status.code().unwrap_or(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn os(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    #[test]
    fn strips_program_name_and_fresh() {
        let args = relaunch_args(os(&["waypoint", "--fresh", "--config", "deploy/waypoint.toml"]));
        assert_eq!(args, os(&["--config", "deploy/waypoint.toml"]));
    }

    #[test]
    fn keeps_everything_else_in_order() {
        let args = relaunch_args(os(&["waypoint", "-v", "--state-dir", "/tmp/s"]));
        assert_eq!(args, os(&["-v", "--state-dir", "/tmp/s"]));
        assert!(relaunch_args(os(&["waypoint"])).is_empty());
    }
}
