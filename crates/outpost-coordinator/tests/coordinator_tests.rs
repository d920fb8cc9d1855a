//! ---
//! upd_section: "06-coordinator"
//! upd_subsection: "tests"
//! upd_type: "test"
//! upd_scope: "validation"
//! upd_description: "Coordinator request processing over real scripts."
//! upd_version: "v0.1.0"
//! upd_owner: "tbd"
//! ---
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tempfile::TempDir;

use outpost_common::config::{AppConfig, ComponentConfig};
use outpost_coordinator::Coordinator;
use outpost_proto::{Action, SharedStore, UpdateRequest};

fn install_script(scripts_dir: &Path, component: &str, action: &str, body: &str) {
    let dir = scripts_dir.join(component);
    std::fs::create_dir_all(&dir).expect("script dir");
    let path = dir.join(format!("{action}.sh"));
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("script written");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("script executable");
}

fn test_config(root: &TempDir, components: &[&str]) -> Arc<AppConfig> {
    let mut config = AppConfig::default();
    config.store.request_dir = root.path().join("requests");
    config.store.status_dir = root.path().join("status");
    config.coordinator.scripts_dir = root.path().join("scripts");
    config.coordinator.script_timeout = Duration::from_secs(5);
    for component_id in components {
        config.components.insert(
            (*component_id).to_owned(),
            ComponentConfig {
                current_version: "1.0.0".to_owned(),
                ..ComponentConfig::default()
            },
        );
    }
    Arc::new(config)
}

fn store_for(config: &AppConfig) -> SharedStore {
    SharedStore::open(&config.store.request_dir, &config.store.status_dir).expect("store opens")
}

#[tokio::test]
async fn successful_update_produces_a_success_status_and_consumes_the_request() {
    let root = TempDir::new().expect("tempdir");
    let config = test_config(&root, &["core"]);
    install_script(
        &config.coordinator.scripts_dir,
        "core",
        "update",
        "echo installed \"$1\"",
    );
    let coordinator = Coordinator::new(config.clone()).expect("coordinator builds");
    let store = store_for(&config);

    let request = UpdateRequest::new("core", Action::Update, Some("1.1.0".to_owned()));
    store.publish_request(&request).expect("request published");

    coordinator.scan_pending().await;

    let status = store
        .take_status(request.request_id)
        .expect("status readable")
        .expect("status present");
    assert!(status.success);
    assert_eq!(status.component, "core");
    assert_eq!(status.action, Action::Update);
    assert!(status.message.contains("1.1.0"));
    assert!(status.output.trim().ends_with("installed 1.1.0"));
    assert!(store.pending_requests().expect("scan").is_empty());
}

#[tokio::test]
async fn failing_script_produces_a_failure_status_with_stderr() {
    let root = TempDir::new().expect("tempdir");
    let config = test_config(&root, &["core"]);
    install_script(
        &config.coordinator.scripts_dir,
        "core",
        "update",
        "echo disk full >&2; exit 1",
    );
    let coordinator = Coordinator::new(config.clone()).expect("coordinator builds");
    let store = store_for(&config);

    let request = UpdateRequest::new("core", Action::Update, Some("1.1.0".to_owned()));
    store.publish_request(&request).expect("request published");

    coordinator.scan_pending().await;

    let status = store
        .take_status(request.request_id)
        .expect("status readable")
        .expect("status present");
    assert!(!status.success);
    assert!(status.error.contains("disk full"));
    assert!(store.pending_requests().expect("scan").is_empty());
}

#[tokio::test]
async fn unknown_component_is_rejected_without_running_anything() {
    let root = TempDir::new().expect("tempdir");
    let config = test_config(&root, &["core"]);
    let coordinator = Coordinator::new(config.clone()).expect("coordinator builds");
    let store = store_for(&config);

    let request = UpdateRequest::new("ghost", Action::Update, Some("1.1.0".to_owned()));
    store.publish_request(&request).expect("request published");

    coordinator.scan_pending().await;

    let status = store
        .take_status(request.request_id)
        .expect("status readable")
        .expect("status present");
    assert!(!status.success);
    assert!(status.error.contains("ghost"));
}

#[tokio::test]
async fn update_without_a_version_is_rejected() {
    let root = TempDir::new().expect("tempdir");
    let config = test_config(&root, &["core"]);
    install_script(&config.coordinator.scripts_dir, "core", "update", "exit 0");
    let coordinator = Coordinator::new(config.clone()).expect("coordinator builds");
    let store = store_for(&config);

    let request = UpdateRequest::new("core", Action::Update, None);
    store.publish_request(&request).expect("request published");

    coordinator.scan_pending().await;

    let status = store
        .take_status(request.request_id)
        .expect("status readable")
        .expect("status present");
    assert!(!status.success);
    assert_eq!(status.message, "request rejected");
}

#[tokio::test]
async fn stale_request_is_discarded_with_a_failure_status() {
    let root = TempDir::new().expect("tempdir");
    let config = test_config(&root, &["core"]);
    install_script(&config.coordinator.scripts_dir, "core", "update", "exit 0");
    let coordinator = Coordinator::new(config.clone()).expect("coordinator builds");
    let store = store_for(&config);

    let mut request = UpdateRequest::new("core", Action::Update, Some("1.1.0".to_owned()));
    request.timestamp = Utc::now() - chrono::Duration::hours(2);
    store.publish_request(&request).expect("request published");

    coordinator.scan_pending().await;

    let status = store
        .take_status(request.request_id)
        .expect("status readable")
        .expect("status present");
    assert!(!status.success);
    assert!(status.message.contains("expired"));
    assert!(store.pending_requests().expect("scan").is_empty());
}

#[tokio::test]
async fn malformed_request_files_are_removed() {
    let root = TempDir::new().expect("tempdir");
    let config = test_config(&root, &["core"]);
    let coordinator = Coordinator::new(config.clone()).expect("coordinator builds");
    let store = store_for(&config);

    std::fs::write(
        config.store.request_dir.join("garbage.json"),
        b"this is not a request",
    )
    .expect("garbage written");

    coordinator.scan_pending().await;

    assert!(store.pending_requests().expect("scan").is_empty());
    assert!(std::fs::read_dir(&config.store.status_dir)
        .expect("status dir")
        .next()
        .is_none());
}

#[tokio::test]
async fn request_survives_until_its_status_is_durably_written() {
    let root = TempDir::new().expect("tempdir");
    let config = test_config(&root, &["core"]);
    install_script(&config.coordinator.scripts_dir, "core", "update", "echo done");
    let coordinator = Coordinator::new(config.clone()).expect("coordinator builds");
    let store = store_for(&config);

    let request = UpdateRequest::new("core", Action::Update, Some("1.1.0".to_owned()));
    store.publish_request(&request).expect("request published");

    // Swap the status directory for a plain file so no status can land.
    std::fs::remove_dir_all(&config.store.status_dir).expect("status dir removed");
    std::fs::write(&config.store.status_dir, b"").expect("blocker written");

    coordinator.scan_pending().await;
    assert_eq!(
        store.pending_requests().expect("scan").len(),
        1,
        "request must outlive a failed status write"
    );

    // Once the store heals, a rescan completes the transaction.
    std::fs::remove_file(&config.store.status_dir).expect("blocker removed");
    std::fs::create_dir_all(&config.store.status_dir).expect("status dir restored");
    coordinator.scan_pending().await;
    let status = store
        .take_status(request.request_id)
        .expect("status readable")
        .expect("status present");
    assert!(status.success);
    assert!(store.pending_requests().expect("scan").is_empty());
}

#[tokio::test]
async fn health_check_runs_without_a_version() {
    let root = TempDir::new().expect("tempdir");
    let config = test_config(&root, &["remote"]);
    install_script(
        &config.coordinator.scripts_dir,
        "remote",
        "health",
        "echo ok",
    );
    let coordinator = Coordinator::new(config.clone()).expect("coordinator builds");
    let store = store_for(&config);

    let request = UpdateRequest::new("remote", Action::Health, None);
    store.publish_request(&request).expect("request published");

    coordinator.scan_pending().await;

    let status = store
        .take_status(request.request_id)
        .expect("status readable")
        .expect("status present");
    assert!(status.success);
    assert!(status.message.contains("healthy"));
}

#[tokio::test]
async fn component_without_a_rollback_script_reports_failure() {
    let root = TempDir::new().expect("tempdir");
    let config = test_config(&root, &["core"]);
    install_script(&config.coordinator.scripts_dir, "core", "update", "exit 0");
    let coordinator = Coordinator::new(config.clone()).expect("coordinator builds");
    let store = store_for(&config);

    let request = UpdateRequest::new("core", Action::Rollback, None);
    store.publish_request(&request).expect("request published");

    coordinator.scan_pending().await;

    let status = store
        .take_status(request.request_id)
        .expect("status readable")
        .expect("status present");
    assert!(!status.success);
    assert!(status.error.contains("no rollback script"));
}
