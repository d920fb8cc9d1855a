//! ---
//! upd_section: "05-orchestrator"
//! upd_subsection: "module"
//! upd_type: "source"
//! upd_scope: "code"
//! upd_description: "Unprivileged orchestration of component updates."
//! upd_version: "v0.1.0"
//! upd_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use outpost_common::config::ComponentConfig;
use outpost_release::{ReleaseDescriptor, ReleaseSource};
use outpost_semver::Semver;

use crate::UpdateError;

const NO_UPDATE_INFO: &str = "no update information available";

/// Cached version record for a managed component.
///
/// Created on the first check and mutated in place afterwards; records live
/// for the lifetime of the orchestrator process.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentVersion {
    /// Component identifier.
    pub component_id: String,
    /// Version currently installed.
    pub current: Semver,
    /// Latest version the release source reported, when known.
    pub latest: Option<Semver>,
    /// Whether `latest` strictly outranks `current`.
    pub update_available: bool,
    /// Release notes of the latest release.
    pub release_notes: Option<String>,
    /// When the release source was last consulted.
    pub last_checked: Option<DateTime<Utc>>,
    /// Failure note from the most recent check, if it failed.
    pub error: Option<String>,
}

impl ComponentVersion {
    fn seeded(component_id: &str, current: Semver) -> Self {
        Self {
            component_id: component_id.to_owned(),
            current,
            latest: None,
            update_available: false,
            release_notes: None,
            last_checked: None,
            error: None,
        }
    }
}

/// Per-component version cache refreshed against a release source.
pub struct VersionTracker {
    source: Arc<dyn ReleaseSource>,
    records: Mutex<IndexMap<String, ComponentVersion>>,
    check_interval: Duration,
}

impl VersionTracker {
    /// Seed the tracker from the configured component table.
    pub fn new(
        source: Arc<dyn ReleaseSource>,
        components: &IndexMap<String, ComponentConfig>,
        check_interval: Duration,
    ) -> Result<Self, UpdateError> {
        let mut records = IndexMap::new();
        for (component_id, component) in components {
            let current = component
                .current_version
                .parse::<Semver>()
                .map_err(|source| UpdateError::Version {
                    version: component.current_version.clone(),
                    source,
                })?;
            records.insert(
                component_id.clone(),
                ComponentVersion::seeded(component_id, current),
            );
        }
        Ok(Self {
            source,
            records: Mutex::new(records),
            check_interval,
        })
    }

    /// Refresh the record for `component` against the release source.
    ///
    /// Skips the lookup and returns the cached record when the last check is
    /// within the configured interval and `force` is false. A failed release
    /// lookup surfaces as an error; a tag that does not parse is downgraded
    /// to "no update information" and the check still counts as performed.
    pub async fn refresh(
        &self,
        component: &str,
        include_prereleases: bool,
        force: bool,
    ) -> Result<ComponentVersion, UpdateError> {
        let current = {
            let records = self.records.lock();
            let record = records
                .get(component)
                .ok_or_else(|| UpdateError::UnknownComponent(component.to_owned()))?;
            if !force && within_interval(record.last_checked, self.check_interval) {
                debug!(component, "skipping check, cache is fresh");
                return Ok(record.clone());
            }
            record.current.clone()
        };

        let release = self
            .source
            .latest_release(component, include_prereleases)
            .await?;

        let mut records = self.records.lock();
        let record = records
            .get_mut(component)
            .ok_or_else(|| UpdateError::UnknownComponent(component.to_owned()))?;
        record.last_checked = Some(Utc::now());

        let Some(release) = release else {
            debug!(component, "release source has no candidate release");
            record.error = None;
            return Ok(record.clone());
        };

        match resolve_release_version(component, &release) {
            Some(latest) => {
                record.update_available = latest > current;
                record.latest = Some(latest);
                record.release_notes = release.notes.clone();
                record.error = None;
                info!(
                    component,
                    current = %record.current,
                    latest = %record.latest.as_ref().map(ToString::to_string).unwrap_or_default(),
                    update_available = record.update_available,
                    "version check complete"
                );
            }
            None => {
                record.error = Some(NO_UPDATE_INFO.to_owned());
            }
        }
        Ok(record.clone())
    }

    /// Attach a failure note to a component's record, returning the updated
    /// cached record when the component exists.
    pub fn note_error(&self, component: &str, note: &str) -> Option<ComponentVersion> {
        let mut records = self.records.lock();
        let record = records.get_mut(component)?;
        record.error = Some(note.to_owned());
        Some(record.clone())
    }

    /// Advance the installed version after a successful update.
    pub fn set_current(&self, component: &str, version: Semver) {
        let mut records = self.records.lock();
        if let Some(record) = records.get_mut(component) {
            info!(component, from = %record.current, to = %version, "current version advanced");
            record.update_available = record
                .latest
                .as_ref()
                .is_some_and(|latest| latest > &version);
            record.current = version;
        } else {
            warn!(component, "cannot set version for unknown component");
        }
    }

    /// Cached record for a single component.
    pub fn record(&self, component: &str) -> Option<ComponentVersion> {
        self.records.lock().get(component).cloned()
    }

    /// Snapshot of every cached record in configuration order.
    pub fn snapshot(&self) -> IndexMap<String, ComponentVersion> {
        self.records.lock().clone()
    }
}

fn within_interval(last_checked: Option<DateTime<Utc>>, interval: Duration) -> bool {
    let Some(last_checked) = last_checked else {
        return false;
    };
    let Ok(interval) = chrono::Duration::from_std(interval) else {
        return true;
    };
    Utc::now() - last_checked < interval
}

// Two-tier resolution: the structured descriptor attached to the release
// wins; the tag string is the fallback. Parse failures on the fallback path
// are recoverable, they only mean the check produced no usable information.
fn resolve_release_version(component: &str, release: &ReleaseDescriptor) -> Option<Semver> {
    if let Some(descriptor) = &release.descriptor {
        match descriptor.to_semver() {
            Ok(version) => return Some(version),
            Err(err) => {
                warn!(
                    component,
                    full_version = %descriptor.full_version,
                    error = %err,
                    "release descriptor is unusable, falling back to tag"
                );
            }
        }
    }
    match release.tag.parse::<Semver>() {
        Ok(version) => Some(version),
        Err(err) => {
            warn!(component, tag = %release.tag, error = %err, "release tag does not parse");
            None
        }
    }
}
