use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "fgw-cli")]
#[command(about = "Free Game Watcher command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one watch pass: fetch, reconcile, notify, persist.
    Sync,
    /// Keep running on the configured cron schedule until interrupted.
    Watch,
    /// Summarize the most recent run reports.
    Report {
        #[arg(long, default_value_t = 5)]
        runs: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Sync) {
        Commands::Sync => {
            let summary = fgw_engine::run_watch_once_from_env().await?;
            println!(
                "watch complete: run_id={} offers={} added={} removed={} events={}",
                summary.run_id,
                summary.offers_seen,
                summary.added,
                summary.removed,
                summary.events_emitted
            );
        }
        Commands::Watch => {
            let mut config = fgw_engine::WatchConfig::from_env();
            config.scheduler_enabled = true;
            let pipeline = Arc::new(fgw_engine::build_pipeline(config)?);
            if let Some(scheduler) = pipeline.maybe_build_scheduler().await? {
                scheduler.start().await.context("starting scheduler")?;
                println!("watch scheduler running; press Ctrl-C to stop");
                tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
            }
        }
        Commands::Report { runs } => {
            let config = fgw_engine::WatchConfig::from_env();
            let markdown = fgw_engine::report_recent_markdown(runs, Some(config.state_dir))?;
            println!("{markdown}");
        }
    }

    Ok(())
}
