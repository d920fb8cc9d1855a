//! ---
//! upd_section: "05-orchestrator"
//! upd_subsection: "module"
//! upd_type: "source"
//! upd_scope: "code"
//! upd_description: "Unprivileged orchestration of component updates."
//! upd_version: "v0.1.0"
//! upd_owner: "tbd"
//! ---
//! The unprivileged half of the updater. The orchestrator decides when
//! updates are needed and requests them by publishing files to the shared
//! store; it never executes a privileged action itself. Each update is a
//! transaction walking `IDLE -> REQUEST_WRITTEN -> AWAITING_STATUS` into one
//! of `SUCCESS`, `FAILURE` or `TIMEOUT`.

pub mod commands;
pub mod orchestrator;
pub mod tracker;

pub use orchestrator::{Orchestrator, UpdateOutcome};
pub use tracker::{ComponentVersion, VersionTracker};

use outpost_proto::ProtocolError;
use outpost_release::ReleaseSourceError;
use outpost_semver::SemverError;

/// Errors surfaced by orchestrator operations.
#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    /// The component is not part of the configured set.
    #[error("unknown component '{0}'")]
    UnknownComponent(String),
    /// Another update for the same component is still outstanding.
    #[error("update already in progress for '{0}'")]
    UpdateInProgress(String),
    /// The primary component must be updated before any other.
    #[error("cannot update '{component}' before '{primary}': the primary component has a pending update")]
    PrimaryFirst {
        /// Component the caller asked to update.
        component: String,
        /// Configured primary component holding a pending update.
        primary: String,
    },
    /// The requested target version did not parse.
    #[error("invalid target version '{version}': {source}")]
    Version {
        /// Version string as supplied by the caller.
        version: String,
        /// Underlying parse failure.
        source: SemverError,
    },
    /// Shared store or wire format failure.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// Release source lookup failure.
    #[error(transparent)]
    Release(#[from] ReleaseSourceError),
}
