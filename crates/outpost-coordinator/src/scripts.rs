//! ---
//! upd_section: "06-coordinator"
//! upd_subsection: "module"
//! upd_type: "source"
//! upd_scope: "code"
//! upd_description: "Privileged execution of component scripts."
//! upd_version: "v0.1.0"
//! upd_owner: "tbd"
//! ---
//! Component script resolution and execution.
//!
//! Scripts are the whole of the coordinator's privileged surface. Each
//! component provides up to three entry points (`update`, `rollback`,
//! `health`); the exit code is the sole success signal and stdout/stderr
//! are captured verbatim for the status reply.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde::Deserialize;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use outpost_proto::Action;

/// Script lookup and execution failures.
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    /// No script is bound for this component and action.
    #[error("no {action} script for component '{component}'")]
    NotFound {
        component: String,
        action: Action,
    },
    /// The script ran past the execution bound and was killed.
    #[error("script timed out after {0:?}")]
    Timeout(Duration),
    /// The script manifest could not be read or parsed.
    #[error("script manifest {path}: {reason}")]
    Manifest { path: String, reason: String },
    /// Spawning or reaping the script failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Captured result of a finished script run.
#[derive(Debug, Clone)]
pub struct ScriptOutcome {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    components: HashMap<String, HashMap<Action, PathBuf>>,
}

/// Maps `(component, action)` pairs to executable scripts.
///
/// The convention is `<scripts_dir>/<component>/<action>.sh`; a YAML
/// manifest may override individual bindings. A binding only resolves when
/// the file actually exists, so a component without a `rollback.sh` simply
/// has no rollback.
pub struct ScriptRegistry {
    scripts_dir: PathBuf,
    overrides: HashMap<String, HashMap<Action, PathBuf>>,
    script_timeout: Duration,
}

impl ScriptRegistry {
    /// Registry over the conventional directory layout only.
    #[must_use]
    pub fn new(scripts_dir: &Path, script_timeout: Duration) -> Self {
        Self {
            scripts_dir: scripts_dir.to_path_buf(),
            overrides: HashMap::new(),
            script_timeout,
        }
    }

    /// Registry with bindings overridden from a YAML manifest.
    pub fn with_manifest(
        scripts_dir: &Path,
        manifest_path: &Path,
        script_timeout: Duration,
    ) -> Result<Self, ScriptError> {
        let raw = std::fs::read_to_string(manifest_path).map_err(|err| ScriptError::Manifest {
            path: manifest_path.display().to_string(),
            reason: err.to_string(),
        })?;
        let manifest: Manifest =
            serde_yaml::from_str(&raw).map_err(|err| ScriptError::Manifest {
                path: manifest_path.display().to_string(),
                reason: err.to_string(),
            })?;
        info!(
            manifest = %manifest_path.display(),
            components = manifest.components.len(),
            "script manifest loaded"
        );
        Ok(Self {
            scripts_dir: scripts_dir.to_path_buf(),
            overrides: manifest.components,
            script_timeout,
        })
    }

    /// Resolve the script bound to `(component, action)`.
    pub fn resolve(&self, component: &str, action: Action) -> Result<PathBuf, ScriptError> {
        let path = self
            .overrides
            .get(component)
            .and_then(|actions| actions.get(&action))
            .cloned()
            .unwrap_or_else(|| {
                self.scripts_dir
                    .join(component)
                    .join(format!("{action}.sh"))
            });
        if path.is_file() {
            Ok(path)
        } else {
            Err(ScriptError::NotFound {
                component: component.to_owned(),
                action,
            })
        }
    }

    /// Run the script for `(component, action)`, passing `version` as the
    /// first argument for updates.
    ///
    /// A non-zero exit is a normal outcome, reported through
    /// [`ScriptOutcome::success`]; only spawn failures and timeouts are
    /// errors.
    pub async fn run(
        &self,
        component: &str,
        action: Action,
        version: Option<&str>,
    ) -> Result<ScriptOutcome, ScriptError> {
        let script = self.resolve(component, action)?;
        debug!(component, %action, script = %script.display(), "running component script");

        let mut command = Command::new(&script);
        if let Some(version) = version {
            command.arg(version);
        }
        let child = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        // kill_on_drop reaps the child when the timeout branch drops it.
        let output = match timeout(self.script_timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                warn!(
                    component,
                    %action,
                    timeout_secs = self.script_timeout.as_secs(),
                    "script timed out"
                );
                return Err(ScriptError::Timeout(self.script_timeout));
            }
        };

        let outcome = ScriptOutcome {
            success: output.status.success(),
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        info!(
            component,
            %action,
            success = outcome.success,
            exit_code = outcome.exit_code,
            "component script finished"
        );
        Ok(outcome)
    }
}
