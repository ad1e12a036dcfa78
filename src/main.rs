use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

mod cmd;

#[derive(Parser)]
#[command(name = "waypoint")]
#[command(version, about = "Checkpointed, resumable deployment orchestrator")]
pub struct Cli {
    /// Clear all checkpoints and the recorded failure, then run every phase
    #[arg(long, conflicts_with = "status")]
    pub fresh: bool,

    /// Show per-phase progress without running anything
    #[arg(long)]
    pub status: bool,

    /// Path to waypoint.toml (defaults to $WAYPOINT_CONFIG, then ./waypoint.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Preferred state directory. Overrides $WAYPOINT_STATE_DIR and the config file.
    #[arg(long, global = true)]
    pub state_dir: Option<PathBuf>,

    /// Never prompt; any failure aborts
    #[arg(long, global = true)]
    pub non_interactive: bool,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a starter waypoint.toml
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Clear one phase's checkpoint so the next run executes it again
    Reset {
        /// Phase name
        step: String,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    match &cli.command {
        Some(Commands::Init { force }) => {
            cmd::cmd_init(&cli, *force)?;
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Reset { step }) => {
            cmd::cmd_reset(&cli, step)?;
            Ok(ExitCode::SUCCESS)
        }
        None => cmd::run_deployment(&cli).await,
    }
}
