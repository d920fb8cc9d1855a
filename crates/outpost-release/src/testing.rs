//! ---
//! upd_section: "04-release-sources"
//! upd_subsection: "module"
//! upd_type: "source"
//! upd_scope: "code"
//! upd_description: "Release source capability and backends."
//! upd_version: "v0.1.0"
//! upd_owner: "tbd"
//! ---
//! In-memory release source used by unit and integration tests.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

use outpost_semver::{Semver, VersionDescriptor};

use crate::{ReleaseDescriptor, ReleaseSource, ReleaseSourceError};

/// Preloaded release source with optional per-component failure injection.
#[derive(Default)]
pub struct StaticReleaseSource {
    releases: Mutex<HashMap<String, ReleaseDescriptor>>,
    failures: Mutex<HashSet<String>>,
}

impl StaticReleaseSource {
    /// Empty source; every lookup yields `Ok(None)`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a release for `component`.
    pub fn set_release(&self, component: &str, release: ReleaseDescriptor) {
        self.releases
            .lock()
            .insert(component.to_owned(), release);
    }

    /// Publish a release carrying a full structured descriptor for `version`.
    pub fn set_version(&self, component: &str, version: &Semver) {
        let descriptor = VersionDescriptor::from(version);
        self.set_release(
            component,
            ReleaseDescriptor {
                tag: format!("v{}", descriptor.full_version),
                prerelease: version.is_prerelease(),
                descriptor: Some(descriptor),
                notes: None,
                published_at: None,
            },
        );
    }

    /// Publish a tag-only release with no structured descriptor.
    pub fn set_tag(&self, component: &str, tag: &str, prerelease: bool) {
        self.set_release(
            component,
            ReleaseDescriptor {
                tag: tag.to_owned(),
                prerelease,
                descriptor: None,
                notes: None,
                published_at: None,
            },
        );
    }

    /// Make lookups for `component` fail with an API error.
    pub fn fail_component(&self, component: &str) {
        self.failures.lock().insert(component.to_owned());
    }
}

#[async_trait::async_trait]
impl ReleaseSource for StaticReleaseSource {
    async fn latest_release(
        &self,
        component: &str,
        include_prereleases: bool,
    ) -> Result<Option<ReleaseDescriptor>, ReleaseSourceError> {
        if self.failures.lock().contains(component) {
            return Err(ReleaseSourceError::Api(format!(
                "injected failure for {component}"
            )));
        }
        let release = self.releases.lock().get(component).cloned();
        Ok(release.filter(|release| include_prereleases || !release.prerelease))
    }
}
