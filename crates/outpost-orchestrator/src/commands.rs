//! ---
//! upd_section: "05-orchestrator"
//! upd_subsection: "module"
//! upd_type: "source"
//! upd_scope: "code"
//! upd_description: "Unprivileged orchestration of component updates."
//! upd_version: "v0.1.0"
//! upd_owner: "tbd"
//! ---
//! Serializable command surface over the orchestrator.
//!
//! These are the payloads external callers (CLI, IPC frontends) speak; the
//! handlers translate them into orchestrator operations and shape the
//! replies.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use outpost_semver::Semver;

use crate::tracker::ComponentVersion;
use crate::{Orchestrator, UpdateError};

/// Ask for a version check across all configured components.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckUpdatesCommand {
    /// Bypass the check interval gate.
    #[serde(default)]
    pub force: bool,
}

/// Per-component slice of a check reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentReport {
    pub current: Semver,
    pub latest: Option<Semver>,
    pub update_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_notes: Option<String>,
    pub last_checked: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&ComponentVersion> for ComponentReport {
    fn from(record: &ComponentVersion) -> Self {
        Self {
            current: record.current.clone(),
            latest: record.latest.clone(),
            update_available: record.update_available,
            release_notes: record.release_notes.clone(),
            last_checked: record.last_checked,
            error: record.error.clone(),
        }
    }
}

/// Reply to [`CheckUpdatesCommand`], keyed by component in configuration
/// order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateCheckResult {
    pub components: IndexMap<String, ComponentReport>,
}

/// Ask for an update of one component to its latest known version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformUpdateCommand {
    pub component: String,
    /// Validate and report without publishing a request.
    #[serde(default)]
    pub dry_run: bool,
}

/// Reply to [`PerformUpdateCommand`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateResultMessage {
    pub component: String,
    pub success: bool,
    pub message: String,
    /// Failure detail passed through from the coordinator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub dry_run: bool,
}

impl Orchestrator {
    /// Handle a check command, returning a report per component.
    pub async fn handle_check_updates(&self, command: &CheckUpdatesCommand) -> UpdateCheckResult {
        let records = self.check_all(command.force).await;
        UpdateCheckResult {
            components: records
                .iter()
                .map(|record| (record.component_id.clone(), ComponentReport::from(record)))
                .collect(),
        }
    }

    /// Handle an update command.
    ///
    /// The target version is whatever the tracker last saw for the
    /// component; a component with no known newer version yields a
    /// non-success reply rather than an error.
    pub async fn handle_perform_update(
        &self,
        command: &PerformUpdateCommand,
    ) -> Result<UpdateResultMessage, UpdateError> {
        let record = self
            .tracker()
            .record(&command.component)
            .ok_or_else(|| UpdateError::UnknownComponent(command.component.clone()))?;
        let Some(target) = record.latest.filter(|_| record.update_available) else {
            return Ok(UpdateResultMessage {
                component: command.component.clone(),
                success: false,
                message: "No update available".to_owned(),
                error: None,
                dry_run: command.dry_run,
            });
        };
        let outcome = self
            .update_component(&command.component, &target.to_string(), command.dry_run)
            .await?;
        Ok(UpdateResultMessage {
            component: outcome.component,
            success: outcome.success,
            message: outcome.message,
            error: outcome.error,
            dry_run: outcome.dry_run,
        })
    }
}
