//! ---
//! upd_section: "05-orchestrator"
//! upd_subsection: "module"
//! upd_type: "source"
//! upd_scope: "code"
//! upd_description: "Unprivileged orchestration of component updates."
//! upd_version: "v0.1.0"
//! upd_owner: "tbd"
//! ---
use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use prometheus::{register_int_counter, IntCounter};
use serde::Serialize;
use tokio::sync::{broadcast, Semaphore};
use tracing::{debug, error, info, warn};

use outpost_common::config::AppConfig;
use outpost_proto::{Action, SharedStore, UpdateRequest, UpdateStatus};
use outpost_release::ReleaseSource;
use outpost_semver::Semver;

use crate::tracker::{ComponentVersion, VersionTracker};
use crate::UpdateError;

static UPDATE_REQUESTS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "outpost_update_requests_total",
        "Update requests published to the shared store"
    )
    .unwrap()
});
static UPDATE_SUCCESS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "outpost_update_success_total",
        "Update requests acknowledged as successful"
    )
    .unwrap()
});
static UPDATE_FAILURE_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "outpost_update_failure_total",
        "Update requests that failed or timed out"
    )
    .unwrap()
});

/// Terminal result of a single update, rollback or health transaction.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateOutcome {
    /// Component the transaction targeted.
    pub component: String,
    /// Whether the coordinator reported success.
    pub success: bool,
    /// Operator-facing summary line.
    pub message: String,
    /// Captured script output, when the coordinator produced any.
    pub output: Option<String>,
    /// Failure detail from the coordinator, typically the script's stderr.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// True when no request was published and the outcome is simulated.
    pub dry_run: bool,
}

/// The unprivileged half of the updater.
///
/// Owns the version tracker and the request side of the shared store. All
/// privileged effects happen in the coordinator; this type only publishes
/// requests and waits for matching statuses.
pub struct Orchestrator {
    config: Arc<AppConfig>,
    store: SharedStore,
    tracker: Arc<VersionTracker>,
    in_flight: Mutex<HashSet<String>>,
    check_permits: Arc<Semaphore>,
}

impl Orchestrator {
    /// Build the orchestrator over the configured shared store.
    pub fn new(
        config: Arc<AppConfig>,
        source: Arc<dyn ReleaseSource>,
    ) -> Result<Self, UpdateError> {
        let store = SharedStore::open(
            &config.store.request_dir,
            &config.store.status_dir,
        )?;
        let tracker = Arc::new(VersionTracker::new(
            source,
            &config.components,
            config.updates.check_interval(),
        )?);
        let check_permits = Arc::new(Semaphore::new(config.updates.max_concurrent_checks.max(1)));
        Ok(Self {
            config,
            store,
            tracker,
            in_flight: Mutex::new(HashSet::new()),
            check_permits,
        })
    }

    /// Version tracker shared with command handlers.
    #[must_use]
    pub fn tracker(&self) -> Arc<VersionTracker> {
        Arc::clone(&self.tracker)
    }

    /// Shared store handle, mainly for tests and housekeeping.
    #[must_use]
    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Check the given components against the release source, concurrently
    /// but bounded by `max_concurrent_checks`.
    ///
    /// A failing lookup never poisons the batch: the failure is noted on the
    /// component's record and the cached record is returned in its place.
    pub async fn check_updates(
        &self,
        components: &[String],
        force: bool,
    ) -> Vec<ComponentVersion> {
        let include_prereleases = self.config.updates.include_prereleases;
        let checks = components.iter().map(|component| {
            let permits = Arc::clone(&self.check_permits);
            let tracker = Arc::clone(&self.tracker);
            async move {
                let _permit = permits.acquire().await.ok();
                match tracker.refresh(component, include_prereleases, force).await {
                    Ok(record) => Some(record),
                    Err(err) => {
                        warn!(component = %component, error = %err, "version check failed");
                        tracker.note_error(component, &err.to_string())
                    }
                }
            }
        });
        join_all(checks).await.into_iter().flatten().collect()
    }

    /// Check every configured component.
    pub async fn check_all(&self, force: bool) -> Vec<ComponentVersion> {
        let components: Vec<String> =
            self.config.component_ids().map(str::to_owned).collect();
        self.check_updates(&components, force).await
    }

    /// Perform a full update transaction for `component` to `version`.
    ///
    /// With `dry_run` set, the transaction is validated and reported as a
    /// simulated success without touching the shared store.
    pub async fn update_component(
        &self,
        component: &str,
        version: &str,
        dry_run: bool,
    ) -> Result<UpdateOutcome, UpdateError> {
        self.ensure_known(component)?;
        let target = version
            .parse::<Semver>()
            .map_err(|source| UpdateError::Version {
                version: version.to_owned(),
                source,
            })?;
        self.ensure_primary_first(component)?;

        if dry_run {
            info!(component, version = %target, "dry run, no request published");
            return Ok(UpdateOutcome {
                component: component.to_owned(),
                success: true,
                message: format!("dry run: would update to {target}"),
                output: None,
                error: None,
                dry_run: true,
            });
        }

        let _guard = InFlightGuard::acquire(self, component)?;
        let request = UpdateRequest::new(component, Action::Update, Some(target.to_string()));
        let outcome = self.dispatch_and_wait(&request).await?;
        if outcome.success {
            self.tracker.set_current(component, target);
        }
        Ok(outcome)
    }

    /// Ask the coordinator to roll `component` back to its previous version.
    pub async fn rollback_component(
        &self,
        component: &str,
    ) -> Result<UpdateOutcome, UpdateError> {
        self.ensure_known(component)?;
        let _guard = InFlightGuard::acquire(self, component)?;
        let request = UpdateRequest::new(component, Action::Rollback, None);
        self.dispatch_and_wait(&request).await
    }

    /// Run the component's health probe through the coordinator.
    pub async fn health_check(&self, component: &str) -> Result<UpdateOutcome, UpdateError> {
        self.ensure_known(component)?;
        let _guard = InFlightGuard::acquire(self, component)?;
        let request = UpdateRequest::new(component, Action::Health, None);
        self.dispatch_and_wait(&request).await
    }

    // Publishes the request and polls the status side until a matching
    // status arrives or the configured timeout elapses. Timeout is a normal
    // outcome, not an error.
    async fn dispatch_and_wait(
        &self,
        request: &UpdateRequest,
    ) -> Result<UpdateOutcome, UpdateError> {
        self.store.publish_request(request)?;
        UPDATE_REQUESTS_TOTAL.inc();
        info!(
            request_id = %request.request_id,
            component = %request.component,
            action = %request.action,
            "request published"
        );

        let deadline = tokio::time::Instant::now() + self.config.updates.status_timeout;
        let mut poll = tokio::time::interval(self.config.updates.status_poll_interval);
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            if tokio::time::Instant::now() >= deadline {
                break;
            }
            poll.tick().await;
            if let Some(status) = self.store.take_status(request.request_id)? {
                return Ok(self.conclude(request, status));
            }
        }

        UPDATE_FAILURE_TOTAL.inc();
        // The orphaned request stays in the store: the coordinator either
        // processes it late (its status then ages out via the TTL sweep) or
        // discards it as stale with a failure status nobody collects.
        warn!(
            request_id = %request.request_id,
            component = %request.component,
            timeout_secs = self.config.updates.status_timeout.as_secs(),
            "no status within timeout, request left for the coordinator to expire"
        );
        Ok(UpdateOutcome {
            component: request.component.clone(),
            success: false,
            message: "coordinator unresponsive: no status within timeout".to_owned(),
            output: None,
            error: None,
            dry_run: false,
        })
    }

    fn conclude(&self, request: &UpdateRequest, status: UpdateStatus) -> UpdateOutcome {
        if status.success {
            UPDATE_SUCCESS_TOTAL.inc();
            info!(
                request_id = %request.request_id,
                component = %request.component,
                action = %request.action,
                "transaction succeeded"
            );
        } else {
            UPDATE_FAILURE_TOTAL.inc();
            error!(
                request_id = %request.request_id,
                component = %request.component,
                action = %request.action,
                error = %status.error,
                "transaction failed"
            );
        }
        UpdateOutcome {
            component: request.component.clone(),
            success: status.success,
            message: status.message,
            output: (!status.output.is_empty()).then_some(status.output),
            error: (!status.error.is_empty()).then_some(status.error),
            dry_run: false,
        }
    }

    /// Periodic housekeeping loop: delayed first pass, then a check of every
    /// component plus a stale status sweep at the configured cadence.
    pub async fn run_periodic_checks(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let initial_delay = self.config.updates.initial_delay;
        debug!(delay_secs = initial_delay.as_secs(), "periodic checks armed");
        tokio::select! {
            _ = tokio::time::sleep(initial_delay) => {}
            _ = shutdown.recv() => {
                info!("shutdown before first periodic check");
                return;
            }
        }

        let mut cadence = tokio::time::interval(self.config.updates.check_interval());
        cadence.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cadence.tick() => {
                    let records = self.check_all(false).await;
                    let pending = records.iter().filter(|r| r.update_available).count();
                    info!(checked = records.len(), updates_available = pending, "periodic check complete");
                    match self
                        .store
                        .sweep_statuses(self.config.coordinator.stale_request_threshold)
                    {
                        Ok(0) => {}
                        Ok(swept) => info!(swept, "stale status files removed"),
                        Err(err) => warn!(error = %err, "stale status sweep failed"),
                    }
                }
                _ = shutdown.recv() => {
                    info!("periodic checks stopping");
                    return;
                }
            }
        }
    }

    fn ensure_known(&self, component: &str) -> Result<(), UpdateError> {
        if self.config.components.contains_key(component) {
            Ok(())
        } else {
            Err(UpdateError::UnknownComponent(component.to_owned()))
        }
    }

    // The primary component updates before anything else. Other components
    // are refused while the primary itself still has an update pending.
    fn ensure_primary_first(&self, component: &str) -> Result<(), UpdateError> {
        let Some(primary) = &self.config.updates.primary_component else {
            return Ok(());
        };
        if primary == component {
            return Ok(());
        }
        let primary_pending = self
            .tracker
            .record(primary)
            .is_some_and(|record| record.update_available);
        if primary_pending {
            return Err(UpdateError::PrimaryFirst {
                component: component.to_owned(),
                primary: primary.clone(),
            });
        }
        Ok(())
    }
}

// Marks a component as having an outstanding transaction for the guard's
// lifetime. Acquisition fails instead of blocking: overlapping updates of
// the same component are a caller error.
struct InFlightGuard<'a> {
    orchestrator: &'a Orchestrator,
    component: String,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(orchestrator: &'a Orchestrator, component: &str) -> Result<Self, UpdateError> {
        let mut in_flight = orchestrator.in_flight.lock();
        if !in_flight.insert(component.to_owned()) {
            return Err(UpdateError::UpdateInProgress(component.to_owned()));
        }
        Ok(Self {
            orchestrator,
            component: component.to_owned(),
        })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.orchestrator.in_flight.lock().remove(&self.component);
    }
}
