use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{error, info, warn};

use job_alert_harvester::archive::EmailArchive;
use job_alert_harvester::config::AppConfig;
use job_alert_harvester::gmail::GmailMailbox;
use job_alert_harvester::lock::InstanceLock;
use job_alert_harvester::logging::{init_logging, OperationTimer};
use job_alert_harvester::mailbox::Mailbox;
use job_alert_harvester::metrics::MetricsCollector;
use job_alert_harvester::pipeline::{Harvester, HarvesterSettings};
use job_alert_harvester::store::{CsvPeriodLog, PeriodLog};
use job_alert_harvester::HarvestError;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file layered over the defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Also write JSON logs to this file, rotated daily
    #[arg(long)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Clone, Copy)]
enum Commands {
    /// Poll the mailbox until interrupted (default)
    Run,
    /// Run a single polling tick and exit
    Once,
    /// Rebuild the deduplicated copy of the latest period
    Dedupe,
    /// Summarize the most recent period datasets
    Stats {
        /// Number of periods to include, newest first
        #[arg(short, long, default_value = "3")]
        months: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = AppConfig::load_from(cli.config.as_deref())?;

    // Initialize logging
    let log_file = cli.log_file.clone().or_else(|| config.logging.file_path.as_ref().map(PathBuf::from));
    let _log_guard = init_logging(Some(&config.get_log_level()), &config.logging.format, log_file.as_deref())?;

    info!("Starting job-alert-harvester");

    let store = CsvPeriodLog::new(&config.storage.raw_dir, &config.storage.processed_dir);

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => harvest(&config, store, false).await?,
        Commands::Once => harvest(&config, store, true).await?,
        Commands::Dedupe => dedupe(&store)?,
        Commands::Stats { months } => show_stats(&store, months)?,
    }

    Ok(())
}

/// Authenticate once up front, then poll.
async fn harvest(config: &AppConfig, store: CsvPeriodLog, once: bool) -> Result<()> {
    let _lock = InstanceLock::acquire(Path::new(&config.storage.lock_path))?;

    let settings = HarvesterSettings::from_config(config);
    let mailbox = GmailMailbox::new(config)?;
    settings
        .retry
        .run("authenticate", &MetricsCollector::default(), || mailbox.authenticate())
        .await
        .context("Initial mailbox authentication failed")?;

    let archive = EmailArchive::new(
        &config.storage.emails_dir,
        &config.storage.failed_dir,
        &config.storage.flagged_dir,
    );
    let harvester = Harvester::new(mailbox, store, archive, settings);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    if once {
        let summary = harvester.run_tick(Local::now().date_naive(), &shutdown_rx).await?;
        info!(
            listed = summary.listed,
            processed = summary.processed,
            flagged = summary.flagged,
            quarantined = summary.quarantined,
            jobs = summary.jobs_appended,
            "Single tick finished"
        );
    } else {
        harvester.run(shutdown_rx).await;
    }
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(e) => {
            warn!(error = %e, "Could not install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn dedupe(store: &CsvPeriodLog) -> Result<()> {
    let timer = OperationTimer::new("dedupe");
    match store.deduplicate_latest() {
        Ok(dataset) => {
            info!(
                period = %dataset.period,
                kept = dataset.kept,
                dropped = dataset.dropped,
                path = %dataset.path.display(),
                "Deduplicated latest period"
            );
        }
        Err(HarvestError::NoPeriodData(dir)) => warn!(dir = %dir, "No period dataset to deduplicate"),
        Err(e) => {
            error!(error = %e, "Deduplication failed");
            return Err(e.into());
        }
    }
    timer.finish();
    Ok(())
}

fn show_stats(store: &CsvPeriodLog, months: usize) -> Result<()> {
    let recent = store.read_recent(Some(months))?;
    if recent.is_empty() {
        warn!(store = %store.describe(), "No period datasets found");
        return Ok(());
    }

    for (period, records) in recent {
        let companies: HashSet<&str> = records.iter().filter_map(|r| r.company.as_deref()).collect();
        let fresh = records.iter().filter(|r| r.days_ago.is_some_and(|days| days <= 7)).count();
        let newest = records.iter().filter_map(|r| r.posting_date).max();
        info!(
            period = %period,
            jobs = records.len(),
            companies = companies.len(),
            posted_this_week = fresh,
            newest_posting = %newest.map_or_else(|| "-".to_string(), |date| date.to_string()),
            "Period summary"
        );
    }
    Ok(())
}
