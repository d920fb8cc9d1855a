//! ---
//! upd_section: "04-release-sources"
//! upd_subsection: "module"
//! upd_type: "source"
//! upd_scope: "code"
//! upd_description: "Release source capability and backends."
//! upd_version: "v0.1.0"
//! upd_owner: "tbd"
//! ---
//! The release source capability: given a component identifier, resolve the
//! latest available release. The GitHub backend performs the two-tier
//! resolution described in the update flow — a structured `VERSION.json`
//! descriptor attached to the release when present, the bare tag otherwise.

pub mod github;
pub mod testing;

use chrono::{DateTime, Utc};

use outpost_semver::VersionDescriptor;

pub use github::GithubReleaseSource;

/// Errors surfaced by release source lookups.
///
/// These are recovered locally by the version tracker: the cached record is
/// retained and the check is marked failed, never aborting a batch.
#[derive(Debug, thiserror::Error)]
pub enum ReleaseSourceError {
    /// The backend API reported a failure.
    #[error("release source api failure: {0}")]
    Api(String),
    /// The lookup did not complete within its per-call timeout.
    #[error("release source lookup timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Latest-release information for a component.
#[derive(Debug, Clone)]
pub struct ReleaseDescriptor {
    /// Release tag, e.g. `v1.1.0` or `1.0.0-beta.5`.
    pub tag: String,
    /// Whether the release is flagged as a prerelease by the source.
    pub prerelease: bool,
    /// Structured version descriptor attached to the release, when present.
    pub descriptor: Option<VersionDescriptor>,
    /// Release notes body.
    pub notes: Option<String>,
    /// Publication timestamp.
    pub published_at: Option<DateTime<Utc>>,
}

/// Abstract provider of "latest available version" information.
#[async_trait::async_trait]
pub trait ReleaseSource: Send + Sync {
    /// Resolve the latest release for `component`, honouring the prerelease
    /// filter. `Ok(None)` means the source has no release information for
    /// this component, which is not an error.
    async fn latest_release(
        &self,
        component: &str,
        include_prereleases: bool,
    ) -> Result<Option<ReleaseDescriptor>, ReleaseSourceError>;
}
