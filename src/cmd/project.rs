//! Project commands: `waypoint init` and `waypoint reset <step>`.

use anyhow::{Context, Result};
use console::style;

use super::super::Cli;
use super::run::load_config;

pub fn cmd_init(cli: &Cli, force: bool) -> Result<()> {
    use waypoint::config::{STARTER_CONFIG, locate_config};

    let path = locate_config(cli.config.as_deref());
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists. Use --force to overwrite it.",
            path.display()
        );
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(&path, STARTER_CONFIG)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!("Created {}", style(path.display()).green());
    println!();
    println!("Next steps:");
    println!("  1. Point each [[phases]] command at your deployment scripts");
    println!("  2. Set [health] endpoint to the URL that proves the service is up");
    println!("  3. Run `waypoint` to deploy, `waypoint --status` to check progress");
    Ok(())
}

pub fn cmd_reset(cli: &Cli, step: &str) -> Result<()> {
    use waypoint::state::{CheckpointStore, ErrorStateRecorder, StateDir};

    let config = load_config(cli)?;
    if !config.toml.phases.iter().any(|p| p.name == step) {
        let known: Vec<&str> = config.toml.phases.iter().map(|p| p.name.as_str()).collect();
        anyhow::bail!("Unknown phase '{}'. Phases: {}", step, known.join(", "));
    }

    let state_dir = StateDir::locate_existing(&config.state_candidates)
        .context("No state directory candidates configured")?;
    let store = CheckpointStore::new(&state_dir);
    let was_done = store.has(step);
    store.clear(step)?;
    ErrorStateRecorder::new(&state_dir).clear()?;

    if was_done {
        println!("Cleared checkpoint for {}", style(step).yellow().bold());
    } else {
        println!("{} had no checkpoint", style(step).dim());
    }
    Ok(())
}
