//! ---
//! upd_section: "05-orchestrator"
//! upd_subsection: "tests"
//! upd_type: "test"
//! upd_scope: "validation"
//! upd_description: "Orchestrator transaction behaviour over a real shared store."
//! upd_version: "v0.1.0"
//! upd_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use outpost_common::config::{AppConfig, ComponentConfig};
use outpost_orchestrator::commands::PerformUpdateCommand;
use outpost_orchestrator::{Orchestrator, UpdateError};
use outpost_proto::{SharedStore, UpdateStatus};
use outpost_release::testing::StaticReleaseSource;
use outpost_semver::Semver;

fn test_config(store_root: &TempDir, components: &[(&str, &str)]) -> Arc<AppConfig> {
    let mut config = AppConfig::default();
    config.store.request_dir = store_root.path().join("requests");
    config.store.status_dir = store_root.path().join("status");
    config.updates.status_poll_interval = Duration::from_millis(25);
    config.updates.status_timeout = Duration::from_secs(5);
    for (component_id, version) in components {
        config.components.insert(
            (*component_id).to_owned(),
            ComponentConfig {
                current_version: (*version).to_owned(),
                ..ComponentConfig::default()
            },
        );
    }
    Arc::new(config)
}

fn orchestrator_with(
    config: Arc<AppConfig>,
    source: Arc<StaticReleaseSource>,
) -> Arc<Orchestrator> {
    Arc::new(Orchestrator::new(config, source).expect("orchestrator builds"))
}

// Plays the privileged half: waits for one pending request and answers it.
async fn answer_next_request(store: SharedStore, success: bool) {
    for _ in 0..200 {
        let pending = store.pending_requests().expect("scan requests");
        if let Some(path) = pending.first() {
            let request = store.read_request(path).expect("request parses");
            let status = if success {
                UpdateStatus::success(&request, "update completed", "applied".to_owned())
            } else {
                UpdateStatus::failure(
                    &request,
                    "update failed",
                    String::new(),
                    "script exited with status 1".to_owned(),
                )
            };
            store.publish_status(&status).expect("status published");
            store
                .remove_request(request.request_id)
                .expect("request removed");
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("no request appeared in the store");
}

#[tokio::test]
async fn successful_update_advances_current_version() {
    let store_root = TempDir::new().expect("tempdir");
    let config = test_config(&store_root, &[("scheduler", "1.0.0")]);
    let source = Arc::new(StaticReleaseSource::new());
    source.set_version("scheduler", &"1.1.0".parse().expect("version"));
    let orchestrator = orchestrator_with(config.clone(), source);

    let coordinator = tokio::spawn(answer_next_request(
        SharedStore::open(&config.store.request_dir, &config.store.status_dir)
            .expect("store opens"),
        true,
    ));

    let outcome = orchestrator
        .update_component("scheduler", "1.1.0", false)
        .await
        .expect("transaction completes");
    coordinator.await.expect("coordinator task");

    assert!(outcome.success);
    assert!(!outcome.dry_run);
    let record = orchestrator
        .tracker()
        .record("scheduler")
        .expect("record exists");
    assert_eq!(record.current, "1.1.0".parse::<Semver>().expect("version"));
}

#[tokio::test]
async fn failed_update_keeps_current_version() {
    let store_root = TempDir::new().expect("tempdir");
    let config = test_config(&store_root, &[("core", "1.0.0")]);
    let orchestrator = orchestrator_with(config.clone(), Arc::new(StaticReleaseSource::new()));

    let coordinator = tokio::spawn(answer_next_request(
        SharedStore::open(&config.store.request_dir, &config.store.status_dir)
            .expect("store opens"),
        false,
    ));

    let outcome = orchestrator
        .update_component("core", "1.1.0", false)
        .await
        .expect("transaction completes");
    coordinator.await.expect("coordinator task");

    assert!(!outcome.success);
    assert_eq!(
        outcome.error.as_deref(),
        Some("script exited with status 1")
    );
    let record = orchestrator.tracker().record("core").expect("record exists");
    assert_eq!(record.current, Semver::release(1, 0, 0));
}

#[tokio::test]
async fn unknown_component_is_rejected_before_any_request() {
    let store_root = TempDir::new().expect("tempdir");
    let config = test_config(&store_root, &[("core", "1.0.0")]);
    let orchestrator = orchestrator_with(config, Arc::new(StaticReleaseSource::new()));

    let err = orchestrator
        .update_component("ghost", "1.1.0", false)
        .await
        .expect_err("must be rejected");
    assert!(matches!(err, UpdateError::UnknownComponent(_)));
    assert!(orchestrator
        .store()
        .pending_requests()
        .expect("scan requests")
        .is_empty());
}

#[tokio::test]
async fn silent_coordinator_times_out_and_leaves_the_request() {
    let store_root = TempDir::new().expect("tempdir");
    let mut config = AppConfig::default();
    config.store.request_dir = store_root.path().join("requests");
    config.store.status_dir = store_root.path().join("status");
    config.updates.status_poll_interval = Duration::from_millis(25);
    config.updates.status_timeout = Duration::from_millis(200);
    config.components.insert(
        "core".to_owned(),
        ComponentConfig {
            current_version: "1.0.0".to_owned(),
            ..ComponentConfig::default()
        },
    );
    let orchestrator = orchestrator_with(Arc::new(config), Arc::new(StaticReleaseSource::new()));

    let outcome = orchestrator
        .update_component("core", "1.1.0", false)
        .await
        .expect("timeout is an outcome, not an error");
    assert!(!outcome.success);
    assert!(outcome.message.contains("coordinator unresponsive"));
    // The orphaned request stays for the coordinator to process or expire.
    assert_eq!(
        orchestrator
            .store()
            .pending_requests()
            .expect("scan requests")
            .len(),
        1
    );
}

#[tokio::test]
async fn dry_run_publishes_nothing() {
    let store_root = TempDir::new().expect("tempdir");
    let config = test_config(&store_root, &[("core", "1.0.0")]);
    let orchestrator = orchestrator_with(config, Arc::new(StaticReleaseSource::new()));

    let outcome = orchestrator
        .update_component("core", "1.1.0", true)
        .await
        .expect("dry run completes");
    assert!(outcome.success);
    assert!(outcome.dry_run);
    assert!(orchestrator
        .store()
        .pending_requests()
        .expect("scan requests")
        .is_empty());
    // The tracked version does not move on a simulated update.
    let record = orchestrator.tracker().record("core").expect("record exists");
    assert_eq!(record.current, Semver::release(1, 0, 0));
}

#[tokio::test]
async fn overlapping_updates_of_one_component_are_refused() {
    let store_root = TempDir::new().expect("tempdir");
    let config = test_config(&store_root, &[("core", "1.0.0")]);
    let orchestrator = orchestrator_with(config.clone(), Arc::new(StaticReleaseSource::new()));

    let first = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move { orchestrator.update_component("core", "1.1.0", false).await })
    };
    // Give the first transaction time to claim the in-flight slot.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let err = orchestrator
        .update_component("core", "1.2.0", false)
        .await
        .expect_err("second transaction must be refused");
    assert!(matches!(err, UpdateError::UpdateInProgress(_)));

    answer_next_request(
        SharedStore::open(&config.store.request_dir, &config.store.status_dir)
            .expect("store opens"),
        true,
    )
    .await;
    let outcome = first
        .await
        .expect("first task")
        .expect("first transaction completes");
    assert!(outcome.success);
}

#[tokio::test]
async fn batch_check_isolates_failing_components() {
    let store_root = TempDir::new().expect("tempdir");
    let config = test_config(&store_root, &[("core", "1.0.0"), ("remote", "2.0.0")]);
    let source = Arc::new(StaticReleaseSource::new());
    source.set_version("core", &"1.1.0".parse().expect("version"));
    source.fail_component("remote");
    let orchestrator = orchestrator_with(config, source);

    let records = orchestrator.check_all(true).await;
    assert_eq!(records.len(), 2);
    let core = records
        .iter()
        .find(|r| r.component_id == "core")
        .expect("core record");
    assert!(core.update_available);
    assert!(core.error.is_none());
    let remote = records
        .iter()
        .find(|r| r.component_id == "remote")
        .expect("remote record");
    assert!(!remote.update_available);
    assert!(remote.error.is_some());
}

#[tokio::test]
async fn perform_update_without_candidate_reports_no_update() {
    let store_root = TempDir::new().expect("tempdir");
    let config = test_config(&store_root, &[("core", "1.0.0")]);
    let orchestrator = orchestrator_with(config, Arc::new(StaticReleaseSource::new()));

    let reply = orchestrator
        .handle_perform_update(&PerformUpdateCommand {
            component: "core".to_owned(),
            dry_run: false,
        })
        .await
        .expect("command handled");
    assert!(!reply.success);
    assert_eq!(reply.message, "No update available");
}

#[tokio::test]
async fn primary_component_updates_first() {
    let store_root = TempDir::new().expect("tempdir");
    let mut config = AppConfig::default();
    config.store.request_dir = store_root.path().join("requests");
    config.store.status_dir = store_root.path().join("status");
    config.updates.status_poll_interval = Duration::from_millis(25);
    config.updates.status_timeout = Duration::from_secs(5);
    config.updates.primary_component = Some("core".to_owned());
    for component_id in ["core", "scheduler"] {
        config.components.insert(
            component_id.to_owned(),
            ComponentConfig {
                current_version: "1.0.0".to_owned(),
                ..ComponentConfig::default()
            },
        );
    }
    let config = Arc::new(config);
    let source = Arc::new(StaticReleaseSource::new());
    source.set_version("core", &"1.1.0".parse().expect("version"));
    source.set_version("scheduler", &"1.1.0".parse().expect("version"));
    let orchestrator = orchestrator_with(config.clone(), source);

    orchestrator.check_all(true).await;
    let err = orchestrator
        .update_component("scheduler", "1.1.0", false)
        .await
        .expect_err("secondary must wait for the primary");
    assert!(matches!(err, UpdateError::PrimaryFirst { .. }));

    // Once the primary is current, the secondary may proceed.
    let coordinator = tokio::spawn(answer_next_request(
        SharedStore::open(&config.store.request_dir, &config.store.status_dir)
            .expect("store opens"),
        true,
    ));
    orchestrator
        .update_component("core", "1.1.0", false)
        .await
        .expect("primary update completes");
    coordinator.await.expect("coordinator task");

    let coordinator = tokio::spawn(answer_next_request(
        SharedStore::open(&config.store.request_dir, &config.store.status_dir)
            .expect("store opens"),
        true,
    ));
    let outcome = orchestrator
        .update_component("scheduler", "1.1.0", false)
        .await
        .expect("secondary update completes");
    coordinator.await.expect("coordinator task");
    assert!(outcome.success);
}
