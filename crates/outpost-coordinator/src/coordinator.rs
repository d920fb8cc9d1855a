//! ---
//! upd_section: "06-coordinator"
//! upd_subsection: "module"
//! upd_type: "source"
//! upd_scope: "code"
//! upd_description: "Privileged execution of component scripts."
//! upd_version: "v0.1.0"
//! upd_owner: "tbd"
//! ---
use std::sync::Arc;

use chrono::Utc;
use once_cell::sync::Lazy;
use prometheus::{register_int_counter, IntCounter};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use outpost_common::config::AppConfig;
use outpost_proto::{Action, ProtocolError, SharedStore, UpdateRequest, UpdateStatus};

use crate::scripts::{ScriptError, ScriptRegistry};
use crate::watcher::DirectoryWatcher;

static REQUESTS_PROCESSED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "outpost_requests_processed_total",
        "Request files taken from the shared store"
    )
    .unwrap()
});
static SCRIPTS_FAILED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "outpost_scripts_failed_total",
        "Component script runs that did not succeed"
    )
    .unwrap()
});
static STALE_REQUESTS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "outpost_stale_requests_total",
        "Requests discarded because they outlived the stale threshold"
    )
    .unwrap()
});

/// Coordinator construction failures.
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Script(#[from] ScriptError),
}

/// The privileged request processor.
///
/// Requests are handled strictly one at a time in arrival order; update
/// scripts mutate the host, so there is deliberately no request
/// concurrency.
pub struct Coordinator {
    config: Arc<AppConfig>,
    store: SharedStore,
    registry: ScriptRegistry,
}

impl Coordinator {
    /// Build the coordinator over the configured store and script layout.
    pub fn new(config: Arc<AppConfig>) -> Result<Self, CoordinatorError> {
        let store = SharedStore::open(
            &config.store.request_dir,
            &config.store.status_dir,
        )?;
        let registry = match &config.coordinator.manifest {
            Some(manifest) => ScriptRegistry::with_manifest(
                &config.coordinator.scripts_dir,
                manifest,
                config.coordinator.script_timeout,
            )?,
            None => ScriptRegistry::new(
                &config.coordinator.scripts_dir,
                config.coordinator.script_timeout,
            ),
        };
        Ok(Self {
            config,
            store,
            registry,
        })
    }

    /// Shared store handle, mainly for tests.
    #[must_use]
    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Main processing loop.
    ///
    /// On startup every leftover request is either discarded as stale or
    /// processed; afterwards the loop wakes on watcher signals and on the
    /// fallback scan cadence, and every wake-up rescans the directory.
    pub async fn run(
        &self,
        mut watcher: Box<dyn DirectoryWatcher>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        info!(
            request_dir = %self.config.store.request_dir.display(),
            "coordinator starting, draining leftover requests"
        );
        self.scan_pending().await;

        let mut fallback = tokio::time::interval(self.config.coordinator.fallback_scan_interval);
        fallback.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        fallback.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("coordinator stopping");
                    return;
                }
                signal = watcher.next() => {
                    if signal.is_none() {
                        warn!("request watcher closed, relying on fallback scans");
                        // Park this branch; the fallback interval keeps the
                        // loop alive.
                        watcher = Box::new(crate::watcher::PollingWatcher::new(
                            &self.config.store.request_dir,
                            self.config.coordinator.fallback_scan_interval,
                        ));
                    }
                    self.scan_pending().await;
                }
                _ = fallback.tick() => {
                    debug!("fallback request scan");
                    self.scan_pending().await;
                }
            }
        }
    }

    /// Process every pending request in arrival order.
    pub async fn scan_pending(&self) {
        let pending = match self.store.pending_requests() {
            Ok(pending) => pending,
            Err(err) => {
                error!(error = %err, "cannot scan request directory");
                return;
            }
        };
        for path in pending {
            let request = match self.store.read_request(&path) {
                Ok(request) => request,
                Err(err) => {
                    // A malformed file carries no usable request id, so no
                    // status can be addressed to its sender. Removal is the
                    // only way to stop rescanning it forever.
                    warn!(path = %path.display(), error = %err, "discarding malformed request");
                    if let Err(err) = self.store.remove_file(&path) {
                        error!(path = %path.display(), error = %err, "cannot remove malformed request");
                    }
                    continue;
                }
            };
            REQUESTS_PROCESSED_TOTAL.inc();
            let status = self.process_request(&request).await;
            if !status.success {
                SCRIPTS_FAILED_TOTAL.inc();
            }
            if let Err(err) = self.store.publish_status(&status) {
                // Removing the request without a durable status on disk would
                // lose the result. Keep it; the fallback scan retries it.
                error!(
                    request_id = %request.request_id,
                    error = %err,
                    "cannot publish status, keeping request for a later scan"
                );
                continue;
            }
            if let Err(err) = self.store.remove_request(request.request_id) {
                error!(request_id = %request.request_id, error = %err, "cannot remove request");
            }
        }
    }

    /// Validate and execute a single request, producing its status.
    pub async fn process_request(&self, request: &UpdateRequest) -> UpdateStatus {
        info!(
            request_id = %request.request_id,
            component = %request.component,
            action = %request.action,
            version = request.version.as_deref().unwrap_or("-"),
            "processing request"
        );

        if self.is_stale(request) {
            STALE_REQUESTS_TOTAL.inc();
            warn!(
                request_id = %request.request_id,
                age_secs = (Utc::now() - request.timestamp).num_seconds(),
                "request outlived the stale threshold"
            );
            return UpdateStatus::failure(
                request,
                "request expired before processing",
                String::new(),
                format!(
                    "request is older than {}s and was discarded",
                    self.config.coordinator.stale_request_threshold.as_secs()
                ),
            );
        }

        if let Err(err) = request.validate(self.config.component_ids()) {
            warn!(request_id = %request.request_id, error = %err, "request rejected");
            return UpdateStatus::failure(
                request,
                "request rejected",
                String::new(),
                err.to_string(),
            );
        }

        match self
            .registry
            .run(&request.component, request.action, request.version.as_deref())
            .await
        {
            Ok(outcome) if outcome.success => UpdateStatus::success(
                request,
                &success_message(request),
                outcome.stdout,
            ),
            Ok(outcome) => UpdateStatus::failure(
                request,
                &failure_message(request),
                outcome.stdout,
                if outcome.stderr.is_empty() {
                    format!("script exited with status {:?}", outcome.exit_code)
                } else {
                    outcome.stderr
                },
            ),
            Err(err) => {
                error!(
                    request_id = %request.request_id,
                    component = %request.component,
                    error = %err,
                    "script execution failed"
                );
                UpdateStatus::failure(request, &failure_message(request), String::new(), err.to_string())
            }
        }
    }

    fn is_stale(&self, request: &UpdateRequest) -> bool {
        let Ok(threshold) =
            chrono::Duration::from_std(self.config.coordinator.stale_request_threshold)
        else {
            return false;
        };
        Utc::now() - request.timestamp > threshold
    }
}

fn success_message(request: &UpdateRequest) -> String {
    match request.action {
        Action::Update => format!(
            "{} updated to {}",
            request.component,
            request.version.as_deref().unwrap_or("requested version")
        ),
        Action::Rollback => format!("{} rolled back", request.component),
        Action::Health => format!("{} is healthy", request.component),
    }
}

fn failure_message(request: &UpdateRequest) -> String {
    match request.action {
        Action::Update => format!("{} update failed", request.component),
        Action::Rollback => format!("{} rollback failed", request.component),
        Action::Health => format!("{} health check failed", request.component),
    }
}
