//! ---
//! upd_section: "01-core-runtime"
//! upd_subsection: "module"
//! upd_type: "source"
//! upd_scope: "code"
//! upd_description: "Shared primitives for the updater daemons."
//! upd_version: "v0.1.0"
//! upd_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use tracing::debug;

use crate::logging::LogFormat;
use outpost_semver::Semver;

fn default_request_dir() -> PathBuf {
    PathBuf::from("/var/lib/outpost/updates/requests")
}

fn default_status_dir() -> PathBuf {
    PathBuf::from("/var/lib/outpost/updates/status")
}

fn default_check_interval_hours() -> u64 {
    24
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(300)
}

fn default_status_poll_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_status_timeout() -> Duration {
    Duration::from_secs(600)
}

fn default_release_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_max_concurrent_checks() -> usize {
    3
}

fn default_script_timeout() -> Duration {
    Duration::from_secs(600)
}

fn default_stale_request_threshold() -> Duration {
    Duration::from_secs(3600)
}

fn default_scripts_dir() -> PathBuf {
    PathBuf::from("/opt/outpost/scripts")
}

fn default_fallback_scan_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("/var/log/outpost")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

/// Primary configuration object for both updater daemons.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub updates: UpdatesConfig,
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    #[serde(default)]
    pub components: IndexMap<String, ComponentConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "OUTPOST_CONFIG";

    /// Load configuration from disk, respecting the `OUTPOST_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                return Self::from_path(PathBuf::from(env_path));
            }
        }
        for candidate in candidates {
            if candidate.as_ref().exists() {
                return Self::from_path(candidate.as_ref().to_path_buf());
            }
        }
        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    fn from_path(path: PathBuf) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Ordered component identifiers managed by this host.
    pub fn component_ids(&self) -> impl Iterator<Item = &str> {
        self.components.keys().map(String::as_str)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        if self.components.is_empty() {
            return Err(anyhow!("configuration must declare at least one component"));
        }
        if self.updates.status_poll_interval.is_zero() {
            return Err(anyhow!("status_poll_interval_secs must be non-zero"));
        }
        // The client-side wait must outlast the coordinator's execution bound,
        // otherwise a legitimately working update is declared failed.
        if self.updates.status_timeout < self.coordinator.script_timeout {
            return Err(anyhow!(
                "status_timeout_secs ({}s) must be >= script_timeout_secs ({}s)",
                self.updates.status_timeout.as_secs(),
                self.coordinator.script_timeout.as_secs()
            ));
        }
        if let Some(primary) = &self.updates.primary_component {
            if !self.components.contains_key(primary) {
                return Err(anyhow!(
                    "primary_component '{}' is not a configured component",
                    primary
                ));
            }
        }
        for (component_id, component) in &self.components {
            component.validate(component_id)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Locations of the request and status sides of the shared store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_request_dir")]
    pub request_dir: PathBuf,
    #[serde(default = "default_status_dir")]
    pub status_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            request_dir: default_request_dir(),
            status_dir: default_status_dir(),
        }
    }
}

/// Orchestrator-side update behaviour.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatesConfig {
    /// Cadence of the periodic housekeeping check, in hours.
    #[serde(default = "default_check_interval_hours")]
    pub check_interval_hours: u64,
    /// Delay before the first periodic check after startup.
    #[serde(default = "default_initial_delay")]
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "initial_delay_secs")]
    pub initial_delay: Duration,
    /// Whether prerelease versions count as update candidates.
    #[serde(default)]
    pub include_prereleases: bool,
    /// Interval between polls for a matching status file.
    #[serde(default = "default_status_poll_interval")]
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "status_poll_interval_secs")]
    pub status_poll_interval: Duration,
    /// How long to wait for a status before giving up on the coordinator.
    #[serde(default = "default_status_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "status_timeout_secs")]
    pub status_timeout: Duration,
    /// Per-call timeout for release source lookups.
    #[serde(default = "default_release_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "release_timeout_secs")]
    pub release_timeout: Duration,
    /// Bound on concurrent release source lookups during a batch check.
    #[serde(default = "default_max_concurrent_checks")]
    pub max_concurrent_checks: usize,
    /// Component that must be updated before any other when it has a
    /// pending update itself.
    #[serde(default)]
    pub primary_component: Option<String>,
}

impl UpdatesConfig {
    /// Periodic check cadence as a [`Duration`].
    #[must_use]
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_hours.saturating_mul(3600))
    }
}

impl Default for UpdatesConfig {
    fn default() -> Self {
        Self {
            check_interval_hours: default_check_interval_hours(),
            initial_delay: default_initial_delay(),
            include_prereleases: false,
            status_poll_interval: default_status_poll_interval(),
            status_timeout: default_status_timeout(),
            release_timeout: default_release_timeout(),
            max_concurrent_checks: default_max_concurrent_checks(),
            primary_component: None,
        }
    }
}

/// Coordinator-side execution behaviour.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Bound on a single component script execution.
    #[serde(default = "default_script_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "script_timeout_secs")]
    pub script_timeout: Duration,
    /// Requests older than this are discarded with a failure status on
    /// startup and during fallback scans.
    #[serde(default = "default_stale_request_threshold")]
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "stale_request_threshold_secs")]
    pub stale_request_threshold: Duration,
    /// Root directory for the default per-component script layout.
    #[serde(default = "default_scripts_dir")]
    pub scripts_dir: PathBuf,
    /// Optional YAML manifest overriding script bindings per component.
    #[serde(default)]
    pub manifest: Option<PathBuf>,
    /// Cadence of the fallback directory scan that tolerates missed events.
    #[serde(default = "default_fallback_scan_interval")]
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "fallback_scan_interval_secs")]
    pub fallback_scan_interval: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            script_timeout: default_script_timeout(),
            stale_request_threshold: default_stale_request_threshold(),
            scripts_dir: default_scripts_dir(),
            manifest: None,
            fallback_scan_interval: default_fallback_scan_interval(),
        }
    }
}

/// A single managed component.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ComponentConfig {
    /// Version currently installed, seeded at startup.
    pub current_version: String,
    /// GitHub owner of the release repository, when released via GitHub.
    #[serde(default)]
    pub github_owner: Option<String>,
    /// GitHub repository name.
    #[serde(default)]
    pub github_repo: Option<String>,
    /// Free-form description for operators.
    #[serde(default)]
    pub description: Option<String>,
}

impl ComponentConfig {
    fn validate(&self, component_id: &str) -> Result<()> {
        self.current_version
            .parse::<Semver>()
            .map_err(|err| {
                anyhow!(
                    "component '{}' has unparseable current_version '{}': {}",
                    component_id,
                    self.current_version,
                    err
                )
            })
            .map(|_| ())?;
        if self.github_owner.is_some() != self.github_repo.is_some() {
            return Err(anyhow!(
                "component '{}' must set both github_owner and github_repo or neither",
                component_id
            ));
        }
        Ok(())
    }

    /// GitHub coordinates when both halves are configured.
    #[must_use]
    pub fn github(&self) -> Option<(&str, &str)> {
        self.github_owner
            .as_deref()
            .zip(self.github_repo.as_deref())
    }
}

/// Logging destination and format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}
