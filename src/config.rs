//! Configuration for waypoint.
//!
//! Settings are read from `waypoint.toml` and layered file → environment → CLI.
//!
//! # Configuration File Format
//!
//! ```toml
//! [deployment]
//! name = "freshtrack"
//! state_dir = "/var/lib/waypoint/freshtrack"
//! fallback_state_dir = ".waypoint/state"
//! max_relaunches = 10
//!
//! [logging]
//! dir = "/var/log/waypoint"
//!
//! [health]
//! required_consecutive = 3
//! interval_secs = 5
//! max_attempts = 30
//! endpoint = { kind = "http", url = "http://localhost:8080/health" }
//!
//! [[health.services]]
//! name = "postgres"
//! target = { kind = "tcp", address = "127.0.0.1:5432" }
//! retries = 10
//!
//! [[phases]]
//! name = "preflight"
//! command = "./scripts/preflight.sh"
//! ```

use crate::errors::ConfigError;
use crate::health::HealthTarget;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "waypoint.toml";

/// Environment variable naming the config file.
pub const ENV_CONFIG: &str = "WAYPOINT_CONFIG";
/// Environment variable overriding the preferred state directory.
pub const ENV_STATE_DIR: &str = "WAYPOINT_STATE_DIR";
/// Environment variable forcing non-interactive mode when set to anything but `0`/`false`.
pub const ENV_NON_INTERACTIVE: &str = "WAYPOINT_NON_INTERACTIVE";
/// Environment variable carrying the relaunch count into a retried process.
pub const ENV_RELAUNCH_COUNT: &str = "WAYPOINT_RELAUNCH_COUNT";
/// Environment variable answering recovery prompts without a terminal (`retry` or `abort`).
pub const ENV_RECOVERY_ANSWER: &str = "WAYPOINT_RECOVERY_ANSWER";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentSection {
    /// Deployment target name (defaults to the config directory name)
    #[serde(default)]
    pub name: Option<String>,
    /// Preferred state directory
    #[serde(default)]
    pub state_dir: Option<PathBuf>,
    /// Secondary state directory tried when the preferred one is not writable
    #[serde(default)]
    pub fallback_state_dir: Option<PathBuf>,
    /// Upper bound on retry relaunches within one operator session
    #[serde(default = "default_max_relaunches")]
    pub max_relaunches: u32,
}

fn default_max_relaunches() -> u32 {
    10
}

impl Default for DeploymentSection {
    fn default() -> Self {
        Self {
            name: None,
            state_dir: None,
            fallback_state_dir: None,
            max_relaunches: default_max_relaunches(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Directory for `waypoint.log`; stderr only when unset
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

/// A dependency checked with bounded simple retries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceCheck {
    pub name: String,
    pub target: HealthTarget,
    #[serde(default = "default_service_retries")]
    pub retries: u32,
}

fn default_service_retries() -> u32 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSection {
    /// The single user-visible endpoint held to the consecutive-pass discipline
    pub endpoint: HealthTarget,
    #[serde(default = "default_required_consecutive")]
    pub required_consecutive: u32,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Per-probe timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub services: Vec<ServiceCheck>,
}

fn default_required_consecutive() -> u32 {
    3
}

fn default_interval_secs() -> u64 {
    5
}

fn default_max_attempts() -> u32 {
    30
}

fn default_timeout_secs() -> u64 {
    5
}

impl HealthSection {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// One `[[phases]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseConfig {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// The complete waypoint.toml structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WaypointToml {
    #[serde(default)]
    pub deployment: DeploymentSection,
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(default)]
    pub health: Option<HealthSection>,
    #[serde(default)]
    pub phases: Vec<PhaseConfig>,
}

impl WaypointToml {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::ParseFailed {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Check the semantic constraints serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.phases.is_empty() {
            return Err(ConfigError::Invalid("at least one [[phases]] entry is required".into()));
        }
        let mut names = std::collections::HashSet::new();
        for phase in &self.phases {
            crate::state::validate_step_name(&phase.name)
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
            if !names.insert(phase.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate phase name '{}'",
                    phase.name
                )));
            }
            if phase.command.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "phase '{}' has an empty command",
                    phase.name
                )));
            }
        }

        let health = self.health.as_ref().ok_or_else(|| {
            ConfigError::Invalid("a [health] section with an endpoint is required".into())
        })?;
        if health.required_consecutive == 0 {
            return Err(ConfigError::Invalid("health.required_consecutive must be at least 1".into()));
        }
        if health.max_attempts < health.required_consecutive {
            return Err(ConfigError::Invalid(format!(
                "health.max_attempts ({}) is lower than health.required_consecutive ({})",
                health.max_attempts, health.required_consecutive
            )));
        }
        for service in &health.services {
            if service.retries == 0 {
                return Err(ConfigError::Invalid(format!(
                    "health service '{}' needs retries >= 1",
                    service.name
                )));
            }
        }
        Ok(())
    }

    pub fn health(&self) -> Option<&HealthSection> {
        self.health.as_ref()
    }
}

/// Settings taken from the process environment.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub state_dir: Option<PathBuf>,
    pub non_interactive: bool,
    pub ci: bool,
    pub relaunch_count: u32,
    /// Preset answer to recovery prompts; `Some(true)` means retry.
    pub recovery_answer: Option<bool>,
}

impl EnvOverrides {
    pub fn from_process() -> Self {
        let flag = |key: &str| {
            std::env::var(key)
                .map(|v| !matches!(v.trim().to_ascii_lowercase().as_str(), "" | "0" | "false"))
                .unwrap_or(false)
        };
        Self {
            state_dir: std::env::var_os(ENV_STATE_DIR).map(PathBuf::from),
            non_interactive: flag(ENV_NON_INTERACTIVE),
            ci: flag("CI"),
            relaunch_count: std::env::var(ENV_RELAUNCH_COUNT)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            recovery_answer: std::env::var(ENV_RECOVERY_ANSWER)
                .ok()
                .and_then(|v| parse_recovery_answer(&v)),
        }
    }
}

/// `retry`/`yes` → `Some(true)`, `abort`/`no` → `Some(false)`, anything else is ignored.
pub fn parse_recovery_answer(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "retry" | "yes" | "y" => Some(true),
        "abort" | "no" | "n" => Some(false),
        _ => None,
    }
}

/// Settings taken from the command line.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub state_dir: Option<PathBuf>,
    pub non_interactive: bool,
    pub verbose: bool,
}

/// Runtime configuration: the parsed file plus environment and CLI layers.
#[derive(Debug, Clone)]
pub struct Config {
    pub config_file: PathBuf,
    /// Directory holding the config file; relative paths resolve against it.
    pub base_dir: PathBuf,
    pub toml: WaypointToml,
    pub deployment_name: String,
    /// Ordered state directory candidates, preferred first.
    pub state_candidates: Vec<PathBuf>,
    pub interactive: bool,
    /// Answer given to recovery prompts instead of asking on the terminal.
    pub recovery_answer: Option<bool>,
    pub verbose: bool,
    pub relaunch_count: u32,
}

impl Config {
    /// Locate, load and validate the config file, then apply overrides.
    pub fn load(
        explicit_path: Option<&Path>,
        cli: &CliOverrides,
        env: &EnvOverrides,
        has_terminal: bool,
    ) -> Result<Self, ConfigError> {
        let config_file = locate_config(explicit_path);
        let toml = WaypointToml::load(&config_file)?;
        toml.validate()?;
        Ok(Self::from_parts(config_file, toml, cli, env, has_terminal))
    }

    pub fn from_parts(
        config_file: PathBuf,
        toml: WaypointToml,
        cli: &CliOverrides,
        env: &EnvOverrides,
        has_terminal: bool,
    ) -> Self {
        let base_dir = config_file
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let deployment_name = toml
            .deployment
            .name
            .clone()
            .or_else(|| {
                std::path::absolute(&base_dir)
                    .ok()
                    .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            })
            .unwrap_or_else(|| "default".to_string());

        let state_candidates = state_candidates(&toml, &base_dir, &deployment_name, cli, env);
        // A preset answer stands in for the operator at the terminal.
        let operator_present = has_terminal || env.recovery_answer.is_some();
        let interactive =
            operator_present && !cli.non_interactive && !env.non_interactive && !env.ci;

        Self {
            config_file,
            base_dir,
            toml,
            deployment_name,
            state_candidates,
            interactive,
            recovery_answer: env.recovery_answer,
            verbose: cli.verbose,
            relaunch_count: env.relaunch_count,
        }
    }

    /// The validated `[health]` section.
    pub fn health(&self) -> Result<&HealthSection, ConfigError> {
        self.toml
            .health()
            .ok_or_else(|| ConfigError::Invalid("a [health] section is required".into()))
    }
}

/// `--config` → `WAYPOINT_CONFIG` → `./waypoint.toml`.
pub fn locate_config(explicit_path: Option<&Path>) -> PathBuf {
    explicit_path
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(ENV_CONFIG).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE))
}

fn state_candidates(
    toml: &WaypointToml,
    base_dir: &Path,
    name: &str,
    cli: &CliOverrides,
    env: &EnvOverrides,
) -> Vec<PathBuf> {
    let resolve = |p: &PathBuf| {
        if p.is_absolute() {
            p.clone()
        } else {
            base_dir.join(p)
        }
    };

    let preferred = cli
        .state_dir
        .clone()
        .or_else(|| env.state_dir.clone())
        .or_else(|| toml.deployment.state_dir.as_ref().map(resolve))
        .unwrap_or_else(|| PathBuf::from("/var/lib/waypoint").join(name));

    let mut candidates = vec![preferred];
    if let Some(fallback) = &toml.deployment.fallback_state_dir {
        candidates.push(resolve(fallback));
    }
    if let Some(data_dir) = dirs::data_local_dir() {
        candidates.push(data_dir.join("waypoint").join(name));
    }
    candidates.push(base_dir.join(".waypoint").join("state"));

    let mut seen = std::collections::HashSet::new();
    candidates.retain(|c| seen.insert(c.clone()));
    candidates
}

/// Starter configuration written by `waypoint init`.
pub const STARTER_CONFIG: &str = r#"# waypoint deployment configuration

[deployment]
# name = "my-app"
# state_dir = "/var/lib/waypoint/my-app"
fallback_state_dir = ".waypoint/state"
max_relaunches = 10

[logging]
# dir = "/var/log/waypoint"

[health]
required_consecutive = 3
interval_secs = 5
max_attempts = 30
timeout_secs = 5
endpoint = { kind = "http", url = "http://localhost:8080/health", expect_status = 200 }

# [[health.services]]
# name = "postgres"
# target = { kind = "tcp", address = "127.0.0.1:5432" }
# retries = 10

[[phases]]
name = "preflight"
command = "./scripts/preflight.sh"

[[phases]]
name = "prerequisites"
command = "./scripts/prerequisites.sh"

[[phases]]
name = "configure"
command = "./scripts/configure.sh"

[[phases]]
name = "secrets"
command = "./scripts/secrets.sh"

[[phases]]
name = "pull"
command = "./scripts/pull.sh"
timeout_secs = 1800

[[phases]]
name = "build"
command = "./scripts/build.sh"

[[phases]]
name = "migrate"
command = "./scripts/migrate.sh"

[[phases]]
name = "deploy"
command = "./scripts/deploy.sh"

[[phases]]
name = "warmup"
command = "./scripts/warmup.sh"

[[phases]]
name = "verify"
command = "./scripts/verify.sh"
"#;
