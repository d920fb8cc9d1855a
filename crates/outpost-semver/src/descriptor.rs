//! ---
//! upd_section: "02-version-engine"
//! upd_subsection: "module"
//! upd_type: "source"
//! upd_scope: "code"
//! upd_description: "Semantic version model and comparison engine."
//! upd_version: "v0.1.0"
//! upd_owner: "tbd"
//! ---
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::version::{Semver, SemverError};

/// Classification of a build as carried in the version descriptor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum BuildType {
    #[default]
    Release,
    Prerelease,
    PrereleaseDev,
    Development,
}

impl BuildType {
    fn classify(version: &Semver) -> Self {
        match (version.is_prerelease(), version.is_development()) {
            (true, true) => BuildType::PrereleaseDev,
            (true, false) => BuildType::Prerelease,
            (false, true) => BuildType::Development,
            (false, false) => BuildType::Release,
        }
    }
}

/// Structured version descriptor attached to a release.
///
/// This is the wire form published as `VERSION.json` alongside release
/// artifacts; it carries the build metadata a bare tag string cannot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VersionDescriptor {
    /// Base version, e.g. `1.0.0`.
    pub version: String,
    /// Prerelease marker in `ID.N` form, e.g. `beta.5`.
    #[serde(default)]
    pub prerelease: Option<String>,
    /// Build classification.
    #[serde(default)]
    pub build_type: BuildType,
    /// Monotonic build counter, tie-break of last resort.
    #[serde(default)]
    pub build_number: u64,
    /// Short commit hash, informational only.
    #[serde(default = "default_commit")]
    pub commit: String,
    /// Canonical full version string, e.g. `1.0.0-beta.5`.
    pub full_version: String,
}

fn default_commit() -> String {
    "unknown".to_owned()
}

impl VersionDescriptor {
    /// Resolve the descriptor into a [`Semver`], carrying over the build
    /// number and commit that the canonical string cannot express.
    pub fn to_semver(&self) -> Result<Semver, SemverError> {
        let mut version = Semver::from_str(&self.full_version)?;
        version.build_number = self.build_number;
        if self.commit != "unknown" {
            version.commit = Some(self.commit.clone());
        }
        Ok(version)
    }
}

impl From<&Semver> for VersionDescriptor {
    fn from(version: &Semver) -> Self {
        Self {
            version: version.base_version(),
            prerelease: version.prerelease.as_ref().map(ToString::to_string),
            build_type: BuildType::classify(version),
            build_number: version.build_number,
            commit: version.commit.clone().unwrap_or_else(default_commit),
            full_version: version.full_version(),
        }
    }
}
