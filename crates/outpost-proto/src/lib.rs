//! ---
//! upd_section: "03-update-protocol"
//! upd_subsection: "module"
//! upd_type: "source"
//! upd_scope: "code"
//! upd_description: "Request/status protocol types and shared store."
//! upd_version: "v0.1.0"
//! upd_owner: "tbd"
//! ---
//! The file-based protocol connecting the unprivileged orchestrator to the
//! privileged coordinator. The shared store is the only state crossing the
//! privilege boundary: requests and statuses are written atomically (temp
//! file plus rename) and deletion after read is the claim signal. Nothing in
//! the store is ever mutated in place.

pub mod message;
pub mod store;

pub use message::{Action, UpdateRequest, UpdateStatus};
pub use store::SharedStore;

/// Result alias used throughout the protocol crate.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Error type for protocol parsing, validation and store access.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Wrapper for IO errors while touching the shared store.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Wrapper for JSON serialization issues.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    /// A store file exists but its contents cannot be parsed.
    #[error("malformed protocol file {path}: {reason}")]
    Malformed {
        /// Offending file path.
        path: String,
        /// Parse failure detail.
        reason: String,
    },
    /// The request names a component outside the configured set.
    #[error("unknown component '{0}'")]
    UnknownComponent(String),
    /// An update request arrived without a target version.
    #[error("update request for '{0}' is missing a target version")]
    MissingVersion(String),
    /// A non-update request carried a target version.
    #[error("{action} request for '{component}' must not carry a version")]
    UnexpectedVersion {
        /// Component named by the request.
        component: String,
        /// Action that does not take a version.
        action: Action,
    },
}
