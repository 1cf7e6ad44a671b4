///
/// This module implements the CLI interface for notion-sync: command parsing, config
/// loading and wiring the Notion client into the synchronisation engine.
///
/// All engine logic (rendering, diffing, file ownership) lives in the [`notion-sync-core`] crate.
/// This module is strictly CLI glue.
///
/// ## How To Use
/// - From the shell: `notion-sync sync --config ./config.json [--watch] [--clean]`.
/// - Programmatically or from integration tests: call [`run`] with a constructed [`Cli`].
///
/// [`notion-sync-core`]: ../../notion-sync-core/
use crate::load_config::load_config;
use crate::notion::NotionClient;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use notion_sync_core::synchronise::CollectionSync;
use notion_sync_core::watch::watch;
use std::path::PathBuf;
use std::time::Duration;

/// CLI for notion-sync: mirror a Notion collection view into markdown files.
#[derive(Parser)]
#[clap(
    name = "notion-sync",
    version,
    about = "Synchronizes markdown documents from a Notion collection view",
    after_help = "Options such as --config, --watch and --clean belong to the sync subcommand:\n  notion-sync sync --config ./config.json --watch"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Synchronise the configured collection view into the destination directory
    Sync {
        /// Path to the JSON config file
        #[clap(long, short, default_value = "./config.json")]
        config: PathBuf,

        /// Keep running, re-syncing on every poll interval and change notification
        #[clap(long)]
        watch: bool,

        /// Remove the destination directory before the first sync
        #[clap(long)]
        clean: bool,

        /// Seconds between polls in watch mode
        #[clap(long, default_value_t = 10)]
        interval: u64,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Sync {
            config,
            watch: watch_mode,
            clean,
            interval,
        } => {
            let config = load_config(config)?;

            let client = NotionClient::new(&config.token_v2)?;
            let root = client
                .resolve_collection(&config.sync_root)
                .await
                .context("Failed to resolve sync_root to a collection")?;
            tracing::info!(
                command = "sync",
                collection_id = %root.collection_id,
                view_id = ?root.view_id,
                "Resolved collection view"
            );

            let mut sync = CollectionSync::with_link_prefix(
                client,
                root.collection_id,
                config.destination,
                config.link_prefix,
            );
            sync.prepare_destination(clean)?;

            if watch_mode {
                tracing::info!(command = "sync", interval, "Entering watch mode");
                let shutdown = async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                        std::future::pending::<()>().await;
                    }
                };
                let summary = watch(&mut sync, Duration::from_secs(interval.max(1)), shutdown).await;
                tracing::info!(command = "sync", ?summary, "Watch mode finished");
                Ok(())
            } else {
                match sync.reconcile_all().await {
                    Ok(report) => {
                        tracing::info!(command = "sync", ?report, "Synchronisation complete");
                        println!(
                            "Done! {} written, {} removed, {} unchanged",
                            report.written.len(),
                            report.deleted.len(),
                            report.unchanged
                        );
                        Ok(())
                    }
                    Err(e) => {
                        tracing::error!(command = "sync", error = %e, "Synchronisation failed");
                        Err(anyhow::Error::new(e).context("Synchronisation failed"))
                    }
                }
            }
        }
    }
}
