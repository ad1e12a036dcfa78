//! Deployment runs: the default invocation, `--fresh` and `--status`.

use anyhow::{Context, Result};
use console::style;
use std::io::IsTerminal;
use std::process::ExitCode;
use std::sync::Arc;

use super::super::Cli;

/// Load `waypoint.toml` with environment and CLI layers applied.
pub fn load_config(cli: &Cli) -> Result<waypoint::config::Config> {
    use waypoint::config::{CliOverrides, Config, EnvOverrides};

    let overrides = CliOverrides {
        state_dir: cli.state_dir.clone(),
        non_interactive: cli.non_interactive,
        verbose: cli.verbose,
    };
    let has_terminal = std::io::stdin().is_terminal() && std::io::stdout().is_terminal();
    Config::load(
        cli.config.as_deref(),
        &overrides,
        &EnvOverrides::from_process(),
        has_terminal,
    )
    .context("Failed to load configuration. Run 'waypoint init' to create waypoint.toml.")
}

pub async fn run_deployment(cli: &Cli) -> Result<ExitCode> {
    use waypoint::health::ProbeSource;
    use waypoint::logging::init_logging;
    use waypoint::orchestrator::{Orchestrator, RunMode, RunOutcome, relaunch};
    use waypoint::phase::build_phases;
    use waypoint::recovery::PresetPrompter;
    use waypoint::state::StateDir;
    use waypoint::ui::OrchestratorUI;

    let config = load_config(cli)?;

    let mode = if cli.status {
        RunMode::Status
    } else if cli.fresh {
        RunMode::Fresh
    } else {
        RunMode::Resume
    };

    // `--status` writes nothing, the log file included.
    let log_dir = config
        .toml
        .logging
        .dir
        .as_ref()
        .filter(|_| mode != RunMode::Status)
        .map(|dir| {
            if dir.is_absolute() {
                dir.clone()
            } else {
                config.base_dir.join(dir)
            }
        });
    let log_guard = init_logging(config.verbose, log_dir.as_deref());

    let state_dir = if mode == RunMode::Status {
        StateDir::locate_existing(&config.state_candidates)
            .context("No state directory candidates configured")?
    } else {
        StateDir::resolve(&config.state_candidates).context("Failed to set up state directory")?
    };
    if state_dir.fell_back() && mode != RunMode::Status {
        println!(
            "{} preferred state directory unavailable, using {}",
            style("warning:").yellow().bold(),
            state_dir.path().display()
        );
    }

    let phases = build_phases(&config.toml.phases, &config.base_dir)?;
    let health = config.health()?.clone();
    let source = Arc::new(ProbeSource::new(health.probe_timeout())?);
    let ui = OrchestratorUI::new(phases.len() as u64, config.verbose);

    let mut orchestrator = Orchestrator::new(
        config.deployment_name.clone(),
        phases,
        state_dir,
        health,
        source,
    )
    .with_ui(ui)
    .interactive(config.interactive)
    .relaunch_budget(config.relaunch_count, config.toml.deployment.max_relaunches);
    if let Some(retry) = config.recovery_answer {
        orchestrator = orchestrator.with_prompter(Box::new(PresetPrompter { retry }));
    }

    let outcome = orchestrator.run(mode).await?;
    drop(orchestrator);

    match outcome {
        RunOutcome::Completed | RunOutcome::StatusShown => Ok(ExitCode::SUCCESS),
        RunOutcome::Aborted { origin, category } => {
            println!(
                "\nAborted at {} ({}). Completed phases are kept; run again to resume.",
                style(origin).red().bold(),
                category
            );
            Ok(ExitCode::FAILURE)
        }
        RunOutcome::Retry => {
            println!("\n{}", style("Restarting from the failed phase...").cyan());
            // Flush the file log before this process image is replaced.
            drop(log_guard);
            match relaunch(config.relaunch_count + 1)? {}
        }
    }
}
