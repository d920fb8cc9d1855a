//! ---
//! upd_section: "01-core-functionality"
//! upd_subsection: "binary"
//! upd_type: "source"
//! upd_scope: "code"
//! upd_description: "Binary entrypoint for the coordinator daemon."
//! upd_version: "v0.1.0"
//! upd_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{ArgAction, Parser};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{info, warn};

use outpost_common::config::AppConfig;
use outpost_common::logging::init_tracing;
use outpost_common::version::VersionInfo;
use outpost_coordinator::{Coordinator, DirectoryWatcher, NotifyWatcher, PollingWatcher};

#[derive(Debug, Parser)]
#[command(
    author,
    disable_version_flag = true,
    version = concat!("outpost-coordd ", env!("CARGO_PKG_VERSION")),
    about = "Outpost update coordinator (privileged)",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(long, help = "Poll the request directory instead of watching it")]
    poll: bool,

    #[arg(
        short = 'V',
        long = "version",
        action = ArgAction::SetTrue,
        help = "Print extended version information and exit"
    )]
    version: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let version = VersionInfo::current();
    if cli.version {
        println!("{}", version.extended());
        return Ok(());
    }

    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/outpost.toml"));
    candidates.push(PathBuf::from("/etc/outpost/outpost.toml"));
    let config = Arc::new(AppConfig::load(&candidates)?);
    init_tracing("outpost-coordd", &config.logging)?;
    info!(
        version = %version.cli_string(),
        scripts_dir = %config.coordinator.scripts_dir.display(),
        "configuration loaded"
    );

    let coordinator = Coordinator::new(config.clone())?;
    let watcher: Box<dyn DirectoryWatcher> = if cli.poll {
        Box::new(PollingWatcher::new(
            &config.store.request_dir,
            config.coordinator.fallback_scan_interval,
        ))
    } else {
        match NotifyWatcher::new(&config.store.request_dir) {
            Ok(watcher) => Box::new(watcher),
            Err(err) => {
                warn!(error = %err, "file notifications unavailable, falling back to polling");
                Box::new(PollingWatcher::new(
                    &config.store.request_dir,
                    config.coordinator.fallback_scan_interval,
                ))
            }
        }
    };

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received; shutting down");
            let _ = shutdown_tx.send(());
        }
    });

    coordinator.run(watcher, shutdown_rx).await;
    Ok(())
}
