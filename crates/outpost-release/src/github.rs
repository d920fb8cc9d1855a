//! ---
//! upd_section: "04-release-sources"
//! upd_subsection: "module"
//! upd_type: "source"
//! upd_scope: "code"
//! upd_description: "Release source capability and backends."
//! upd_version: "v0.1.0"
//! upd_owner: "tbd"
//! ---
use std::time::Duration;

use indexmap::IndexMap;
use octocrab::Octocrab;
use tokio::time::timeout;
use tracing::{debug, warn};

use outpost_common::config::ComponentConfig;
use outpost_semver::VersionDescriptor;

use crate::{ReleaseDescriptor, ReleaseSource, ReleaseSourceError};

const DESCRIPTOR_ASSET_NAME: &str = "VERSION.json";
const RELEASE_PAGE_SIZE: u8 = 10;

/// GitHub releases backend.
///
/// Components are mapped to `owner/repo` pairs from configuration; a
/// component without GitHub coordinates simply yields no release
/// information.
pub struct GithubReleaseSource {
    octo: Octocrab,
    http: reqwest::Client,
    repos: IndexMap<String, (String, String)>,
    call_timeout: Duration,
}

impl GithubReleaseSource {
    /// Build the source from the configured component table.
    pub fn from_components(
        components: &IndexMap<String, ComponentConfig>,
        call_timeout: Duration,
    ) -> Result<Self, ReleaseSourceError> {
        let octo = Octocrab::builder()
            .build()
            .map_err(|err| ReleaseSourceError::Api(err.to_string()))?;
        let http = reqwest::Client::builder()
            .timeout(call_timeout)
            .build()
            .map_err(|err| ReleaseSourceError::Api(err.to_string()))?;
        let repos = components
            .iter()
            .filter_map(|(component_id, component)| {
                component
                    .github()
                    .map(|(owner, repo)| (component_id.clone(), (owner.to_owned(), repo.to_owned())))
            })
            .collect();
        Ok(Self {
            octo,
            http,
            repos,
            call_timeout,
        })
    }

    async fn fetch_latest(
        &self,
        owner: &str,
        repo: &str,
        include_prereleases: bool,
    ) -> Result<Option<ReleaseDescriptor>, ReleaseSourceError> {
        let page = self
            .octo
            .repos(owner.to_owned(), repo.to_owned())
            .releases()
            .list()
            .per_page(RELEASE_PAGE_SIZE)
            .send()
            .await
            .map_err(|err| ReleaseSourceError::Api(err.to_string()))?;

        // Releases arrive newest first; the first non-draft survivor of the
        // prerelease filter is the candidate.
        let Some(release) = page
            .items
            .into_iter()
            .find(|release| !release.draft && (include_prereleases || !release.prerelease))
        else {
            return Ok(None);
        };

        let descriptor = self.fetch_descriptor_asset(&release).await;
        Ok(Some(ReleaseDescriptor {
            tag: release.tag_name,
            prerelease: release.prerelease,
            descriptor,
            notes: release.body,
            published_at: release.published_at,
        }))
    }

    // First tier of version resolution: a structured VERSION.json asset.
    // Any failure here degrades to tag parsing in the tracker, so errors are
    // logged and swallowed.
    async fn fetch_descriptor_asset(
        &self,
        release: &octocrab::models::repos::Release,
    ) -> Option<VersionDescriptor> {
        let asset = release
            .assets
            .iter()
            .find(|asset| asset.name == DESCRIPTOR_ASSET_NAME)?;
        let url = asset.browser_download_url.clone();
        match self.http.get(url.clone()).send().await {
            Ok(response) => match response.error_for_status() {
                Ok(response) => match response.json::<VersionDescriptor>().await {
                    Ok(descriptor) => {
                        debug!(tag = %release.tag_name, "structured version descriptor resolved");
                        Some(descriptor)
                    }
                    Err(err) => {
                        warn!(url = %url, error = %err, "version descriptor asset is not valid JSON");
                        None
                    }
                },
                Err(err) => {
                    warn!(url = %url, error = %err, "version descriptor download rejected");
                    None
                }
            },
            Err(err) => {
                warn!(url = %url, error = %err, "version descriptor download failed");
                None
            }
        }
    }
}

#[async_trait::async_trait]
impl ReleaseSource for GithubReleaseSource {
    async fn latest_release(
        &self,
        component: &str,
        include_prereleases: bool,
    ) -> Result<Option<ReleaseDescriptor>, ReleaseSourceError> {
        let Some((owner, repo)) = self.repos.get(component) else {
            debug!(component, "no release repository configured");
            return Ok(None);
        };
        match timeout(
            self.call_timeout,
            self.fetch_latest(owner, repo, include_prereleases),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ReleaseSourceError::Timeout(self.call_timeout)),
        }
    }
}
