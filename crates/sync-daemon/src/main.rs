//! library-sync: Mirrors a markdown vault into a knowledge-base library.
//!
//! Runs one command and exits, or with `watch` keeps the library in sync on
//! a schedule and follows deletions until interrupted.

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use library_sync_core::{FileSystem, RemoteLibrary, SyncOrchestrator, SyncReport};
use library_sync_daemon::{Cli, Command, Config, DeleteWatcher, HttpLibrary, NativeFs};

type Orchestrator = SyncOrchestrator<NativeFs, HttpLibrary>;

/// Fail the command when any file could not be uploaded.
fn finish(operation: &str, report: SyncReport) -> Result<()> {
    info!("{}: {}", operation, report);
    if report.has_failures() {
        for path in &report.failed {
            warn!("Not synced: {}", path);
        }
        bail!("{} file(s) could not be uploaded", report.failed.len());
    }
    Ok(())
}

/// Scheduled smart syncs plus delete notifications, until Ctrl+C.
async fn watch<F: FileSystem, R: RemoteLibrary>(
    orchestrator: &SyncOrchestrator<F, R>,
    config: &Config,
) -> Result<()> {
    let mut watcher =
        DeleteWatcher::new(config.vault_path.clone()).context("Failed to start file watcher")?;
    info!("File watcher started on {:?}", watcher.vault_path());

    // First tick fires immediately, which gives the startup sync
    let mut ticker = time::interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        "Watching. Syncing every {} minute(s). Press Ctrl+C to stop.",
        config.interval.as_secs() / 60
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                debug!("Scheduled sync");
                match orchestrator.smart_sync().await {
                    Ok(report) if report.has_failures() => {
                        warn!("Scheduled sync left {} file(s) unsynced", report.failed.len());
                    }
                    Ok(_) => {}
                    Err(e) => error!("Scheduled sync failed: {}", e),
                }
            }

            Some(event) = watcher.event_rx().recv() => {
                match orchestrator.on_path_deleted(&event.path).await {
                    Ok(report) if report.has_changes() => {
                        info!("Deleted {}: {}", event.path, report);
                    }
                    Ok(_) => debug!("Nothing mapped at {}", event.path),
                    Err(e) => error!("Failed to handle deletion of {}: {}", event.path, e),
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    Ok(())
}

async fn run(orchestrator: &Orchestrator, config: &Config, command: Command) -> Result<()> {
    match command {
        Command::Sync => finish("Sync", orchestrator.smart_sync().await?),
        Command::Incremental => finish("Incremental sync", orchestrator.incremental_sync().await?),
        Command::Rebuild => {
            let report = orchestrator
                .rebuild_mapping()
                .await
                .context("Failed to rebuild mapping")?;
            finish("Rebuild", report)
        }
        Command::Upload { path } => {
            let path = config.vault_relative(&path)?;
            let mapping = orchestrator
                .manual_upload(&path)
                .await
                .with_context(|| format!("Failed to upload {}", path))?;
            info!(
                "Uploaded {} as {}",
                mapping.file_full_path,
                mapping.remote_doc_id.unwrap_or_default()
            );
            Ok(())
        }
        Command::Delete { path } => {
            let path = config.vault_relative(&path)?;
            let report = orchestrator
                .on_path_deleted(&path)
                .await
                .with_context(|| format!("Failed to delete {}", path))?;
            finish("Delete", report)
        }
        Command::Ask { query } => {
            let answer = orchestrator.ask(&query).await.context("Question failed")?;
            println!("{}", answer.answer);
            if !answer.documents.is_empty() {
                println!();
                println!("Sources:");
                for doc in &answer.documents {
                    println!("  - {}", doc.title);
                }
            }
            Ok(())
        }
        Command::Watch => watch(orchestrator, config).await,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging - respects RUST_LOG env var, defaults to info (or debug with --verbose)
    let default_filter = if cli.verbose {
        "debug,library_sync_daemon=debug,library_sync_core=debug"
    } else {
        "info,library_sync_daemon=info,library_sync_core=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::from_cli(&cli).context("Invalid configuration")?;
    info!("Vault path: {:?}", config.vault_path);
    info!("Mapping file: {:?}", config.mapping_path());

    let library = HttpLibrary::new(
        config.api_key.clone(),
        config.base_url.clone(),
        config.ask_url.clone(),
    )
    .context("Failed to build HTTP client")?;
    let fs = NativeFs::new(config.vault_path.clone());
    let orchestrator = SyncOrchestrator::new(fs, library, config.sync_config());

    run(&orchestrator, &config, cli.command).await
}
