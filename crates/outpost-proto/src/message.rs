//! ---
//! upd_section: "03-update-protocol"
//! upd_subsection: "module"
//! upd_type: "source"
//! upd_scope: "code"
//! upd_description: "Request/status protocol types and shared store."
//! upd_version: "v0.1.0"
//! upd_owner: "tbd"
//! ---
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ProtocolError;

/// Actions the coordinator can execute on behalf of the orchestrator.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Action {
    /// Install a specific target version.
    Update,
    /// Restore the most recent backup.
    Rollback,
    /// Lightweight liveness probe without side effects.
    Health,
}

/// A single update transaction request.
///
/// Written exactly once by the orchestrator and never mutated afterwards;
/// the coordinator reads it and deletes it when processing completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateRequest {
    /// Globally unique id generated by the orchestrator.
    pub request_id: Uuid,
    /// Component the action targets.
    pub component: String,
    /// Requested action.
    pub action: Action,
    /// Target version, required for `update`, absent otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Creation timestamp.
    pub timestamp: DateTime<Utc>,
}

impl UpdateRequest {
    /// Create a request with a fresh id and timestamp.
    #[must_use]
    pub fn new(component: &str, action: Action, version: Option<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            component: component.to_owned(),
            action,
            version,
            timestamp: Utc::now(),
        }
    }

    /// Validate the request against the configured component set and the
    /// version-presence rule for its action.
    pub fn validate<'a, I>(&self, known_components: I) -> Result<(), ProtocolError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        if !known_components.into_iter().any(|c| c == self.component) {
            return Err(ProtocolError::UnknownComponent(self.component.clone()));
        }
        match (self.action, self.version.as_deref()) {
            (Action::Update, None) => Err(ProtocolError::MissingVersion(self.component.clone())),
            (Action::Rollback | Action::Health, Some(_)) => {
                Err(ProtocolError::UnexpectedVersion {
                    component: self.component.clone(),
                    action: self.action,
                })
            }
            _ => Ok(()),
        }
    }
}

/// Result of a processed request.
///
/// Written exactly once by the coordinator after the request was handled;
/// the orchestrator reads and deletes it, or it expires via the TTL sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatus {
    /// Id of the request this status answers.
    pub request_id: Uuid,
    /// Component the action targeted.
    pub component: String,
    /// Action that was executed.
    pub action: Action,
    /// Whether the action completed cleanly.
    pub success: bool,
    /// Human-readable outcome summary.
    pub message: String,
    /// Captured standard output of the component script.
    #[serde(default)]
    pub output: String,
    /// Captured standard error of the component script.
    #[serde(default)]
    pub error: String,
    /// Completion timestamp.
    pub timestamp: DateTime<Utc>,
}

impl UpdateStatus {
    /// Build a success status answering `request`.
    #[must_use]
    pub fn success(request: &UpdateRequest, message: &str, output: String) -> Self {
        Self {
            request_id: request.request_id,
            component: request.component.clone(),
            action: request.action,
            success: true,
            message: message.to_owned(),
            output,
            error: String::new(),
            timestamp: Utc::now(),
        }
    }

    /// Build a failure status answering `request`.
    #[must_use]
    pub fn failure(request: &UpdateRequest, message: &str, output: String, error: String) -> Self {
        Self {
            request_id: request.request_id,
            component: request.component.clone(),
            action: request.action,
            success: false,
            message: message.to_owned(),
            output,
            error,
            timestamp: Utc::now(),
        }
    }
}
