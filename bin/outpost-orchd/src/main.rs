//! ---
//! upd_section: "01-core-functionality"
//! upd_subsection: "binary"
//! upd_type: "source"
//! upd_scope: "code"
//! upd_description: "Binary entrypoint for the orchestrator daemon."
//! upd_version: "v0.1.0"
//! upd_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{info, warn};

use outpost_common::config::AppConfig;
use outpost_common::logging::init_tracing;
use outpost_common::version::VersionInfo;
use outpost_orchestrator::commands::{CheckUpdatesCommand, PerformUpdateCommand};
use outpost_orchestrator::Orchestrator;
use outpost_release::github::GithubReleaseSource;
use outpost_release::ReleaseSource;

#[derive(Debug, Parser)]
#[command(
    author,
    disable_version_flag = true,
    version = concat!("outpost-orchd ", env!("CARGO_PKG_VERSION")),
    about = "Outpost update orchestrator",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(
        short = 'V',
        long = "version",
        action = ArgAction::SetTrue,
        help = "Print extended version information and exit"
    )]
    version: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Run the orchestrator daemon")]
    Run,
    #[command(about = "Check every component for updates and exit")]
    CheckUpdates {
        #[arg(long, help = "Bypass the check interval gate")]
        force: bool,
    },
    #[command(about = "Update one component and exit")]
    Update {
        #[arg(help = "Component to update")]
        component: String,
        #[arg(long, value_name = "VERSION", help = "Explicit target version")]
        version: Option<String>,
        #[arg(long, help = "Validate and report without requesting anything")]
        dry_run: bool,
    },
    #[command(about = "Roll one component back to its previous version")]
    Rollback {
        #[arg(help = "Component to roll back")]
        component: String,
    },
    #[command(about = "Run one component's health probe")]
    Health {
        #[arg(help = "Component to probe")]
        component: String,
    },
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
    init_tracing("outpost-orchd", &config.logging)?;
    info!(version = %version.cli_string(), components = config.components.len(), "configuration loaded");

    let source: Arc<dyn ReleaseSource> = Arc::new(GithubReleaseSource::from_components(
        &config.components,
        config.updates.release_timeout,
    )?);
    let orchestrator = Arc::new(Orchestrator::new(config.clone(), source)?);

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_daemon(orchestrator).await?,
        Commands::CheckUpdates { force } => {
            let result = orchestrator
                .handle_check_updates(&CheckUpdatesCommand { force })
                .await;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Update {
            component,
            version,
            dry_run,
        } => {
            let reply = match version {
                Some(version) => {
                    let outcome = orchestrator
                        .update_component(&component, &version, dry_run)
                        .await?;
                    serde_json::to_string_pretty(&outcome)?
                }
                None => {
                    // No explicit target: check first, then update to the
                    // latest release the tracker saw.
                    orchestrator
                        .check_updates(std::slice::from_ref(&component), true)
                        .await;
                    let reply = orchestrator
                        .handle_perform_update(&PerformUpdateCommand { component, dry_run })
                        .await?;
                    serde_json::to_string_pretty(&reply)?
                }
            };
            println!("{reply}");
        }
        Commands::Rollback { component } => {
            let outcome = orchestrator.rollback_component(&component).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Commands::Health { component } => {
            let outcome = orchestrator.health_check(&component).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
    }

    Ok(())
}

async fn run_daemon(orchestrator: Arc<Orchestrator>) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let checker = tokio::spawn(Arc::clone(&orchestrator).run_periodic_checks(shutdown_rx));

    info!("orchestrator daemon running; waiting for termination signal");
    signal::ctrl_c().await?;
    info!("ctrl-c received; shutting down");
    if shutdown_tx.send(()).is_err() {
        warn!("periodic checker already stopped");
    }
    checker.await?;
    Ok(())
}
