//! ---
//! upd_section: "07-testing"
//! upd_subsection: "integration-tests"
//! upd_type: "source"
//! upd_scope: "code"
//! upd_description: "Configuration surface validation against real TOML."
//! upd_version: "v0.1.0"
//! upd_owner: "tbd"
//! ---
use std::time::Duration;

use outpost_common::config::AppConfig;

const FULL_CONFIG: &str = r#"
[store]
request_dir = "/var/lib/outpost/requests"
status_dir = "/var/lib/outpost/status"

[updates]
check_interval_hours = 12
initial_delay_secs = 60
include_prereleases = true
status_poll_interval_secs = 2
status_timeout_secs = 900
primary_component = "core"

[coordinator]
script_timeout_secs = 600
stale_request_threshold_secs = 1800
scripts_dir = "/opt/outpost/scripts"

[components.core]
current_version = "1.4.0"
github_owner = "acme"
github_repo = "outpost-core"

[components.scheduler]
current_version = "0.9.2-beta.1"

[components.remote]
current_version = "2.0.0"
description = "remote control frontend"
"#;

#[test]
fn full_config_round_trips_with_durations() {
    let config: AppConfig = FULL_CONFIG.parse().expect("config parses");
    assert_eq!(config.updates.check_interval(), Duration::from_secs(12 * 3600));
    assert_eq!(config.updates.initial_delay, Duration::from_secs(60));
    assert!(config.updates.include_prereleases);
    assert_eq!(config.updates.status_timeout, Duration::from_secs(900));
    assert_eq!(config.updates.primary_component.as_deref(), Some("core"));
    assert_eq!(
        config.coordinator.stale_request_threshold,
        Duration::from_secs(1800)
    );
    assert_eq!(
        config.component_ids().collect::<Vec<_>>(),
        ["core", "scheduler", "remote"]
    );
    assert_eq!(
        config.components["core"].github(),
        Some(("acme", "outpost-core"))
    );
    assert!(config.components["scheduler"].github().is_none());
}

#[test]
fn minimal_config_falls_back_to_defaults() {
    let config: AppConfig = r#"
[components.core]
current_version = "1.0.0"
"#
    .parse()
    .expect("config parses");
    assert_eq!(config.updates.check_interval_hours, 24);
    assert_eq!(config.updates.initial_delay, Duration::from_secs(300));
    assert!(!config.updates.include_prereleases);
    assert_eq!(config.updates.status_timeout, Duration::from_secs(600));
    assert_eq!(config.coordinator.script_timeout, Duration::from_secs(600));
    assert_eq!(
        config.coordinator.fallback_scan_interval,
        Duration::from_secs(30)
    );
}

#[test]
fn component_free_config_is_rejected() {
    let err = "[updates]\ncheck_interval_hours = 1\n"
        .parse::<AppConfig>()
        .expect_err("must be rejected");
    assert!(err.to_string().contains("at least one component"));
}

#[test]
fn status_timeout_shorter_than_script_timeout_is_rejected() {
    let err = r#"
[updates]
status_timeout_secs = 60

[coordinator]
script_timeout_secs = 600

[components.core]
current_version = "1.0.0"
"#
    .parse::<AppConfig>()
    .expect_err("must be rejected");
    assert!(err.to_string().contains("status_timeout_secs"));
}

#[test]
fn unparseable_component_version_is_rejected() {
    let err = r#"
[components.core]
current_version = "latest"
"#
    .parse::<AppConfig>()
    .expect_err("must be rejected");
    assert!(err.to_string().contains("current_version"));
}
