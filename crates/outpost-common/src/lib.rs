//! ---
//! upd_section: "01-core-runtime"
//! upd_subsection: "module"
//! upd_type: "source"
//! upd_scope: "code"
//! upd_description: "Shared primitives for the updater daemons."
//! upd_version: "v0.1.0"
//! upd_owner: "tbd"
//! ---
//! Shared primitives for the Outpost updater workspace: configuration
//! loading, tracing initialisation and build-time version metadata. Both
//! daemons receive an explicit [`config::AppConfig`]; there is no global
//! settings instance anywhere in the workspace.

pub mod config;
pub mod logging;
pub mod version;

pub use config::{
    AppConfig, ComponentConfig, CoordinatorConfig, LoggingConfig, StoreConfig, UpdatesConfig,
};
pub use logging::{init_tracing, LogFormat};
pub use version::VersionInfo;
