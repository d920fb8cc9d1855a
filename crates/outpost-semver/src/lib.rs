//! ---
//! upd_section: "02-version-engine"
//! upd_subsection: "module"
//! upd_type: "source"
//! upd_scope: "code"
//! upd_description: "Semantic version model and comparison engine."
//! upd_version: "v0.1.0"
//! upd_owner: "tbd"
//! ---
//! Version model shared by the orchestrator and coordinator.
//!
//! The ordering implemented here is the single source of truth for every
//! "update available" decision in the workspace: base triple first, a release
//! outranks any prerelease of the same base, prereleases order by identifier
//! precedence and sequence, and the build number is the final tie-break.
//! Development markers (`.devN`, `.dirty`) never participate in comparison.

pub mod descriptor;
pub mod version;

pub use descriptor::{BuildType, VersionDescriptor};
pub use version::{Prerelease, Semver, SemverError};
