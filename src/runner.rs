//! High-level runner API for the ingest tool.
//!
//! Wraps reading the manifest, connecting to the database and driving the
//! coordinator behind a single call. This is the API the CLI uses.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::info;

use crate::coordination::{BatchLoader, Coordinator, read_manifest};
use crate::db::pool::{self as db_pool, PoolArgsBuilder};
use crate::io::Downloader;
use crate::settings::Settings;

pub use crate::coordination::PlannedLoad;

/// Per-invocation options that are not part of the settings file
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Directory downloads are written to
    pub work_dir: PathBuf,
    /// Print the plan without touching the network or the database
    pub dry_run: bool,
    /// Hide download progress bars
    pub quiet: bool,

    // Test-only: inject a pre-created pool (for SQLite testing)
    #[cfg(test)]
    pub test_pool: Option<crate::db::Pool>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("."),
            dry_run: false,
            quiet: false,
            #[cfg(test)]
            test_pool: None,
        }
    }
}

/// Result of a completed run
#[derive(Debug)]
pub struct RunSummary {
    pub entries: usize,
    /// Resolved entries, filled in dry-run mode only
    pub planned: Vec<PlannedLoad>,
    pub files_downloaded: usize,
    pub files_loaded: usize,
    pub files_skipped: usize,
    pub bytes_downloaded: u64,
    pub records_loaded: u64,
    pub batches: usize,
    pub duration: Duration,
    /// Batch latency percentiles in milliseconds (p50, p90, p99)
    pub batch_latency_ms: (Option<u64>, Option<u64>, Option<u64>),
}

impl RunSummary {
    fn dry_run(planned: Vec<PlannedLoad>, duration: Duration) -> Self {
        Self {
            entries: planned.len(),
            planned,
            files_downloaded: 0,
            files_loaded: 0,
            files_skipped: 0,
            bytes_downloaded: 0,
            records_loaded: 0,
            batches: 0,
            duration,
            batch_latency_ms: (None, None, None),
        }
    }
}

/// Run every entry of the manifest named in `settings`
///
/// Entries are processed strictly in order and the first failure aborts the
/// run with the failing entry named in the error chain.
///
/// # Example
///
/// ```no_run
/// use tabular_ingest::runner::{RunOptions, run};
/// use tabular_ingest::settings::Settings;
///
/// # async fn example() -> anyhow::Result<()> {
/// let settings = Settings::load("config.yaml")?;
/// let summary = run(&settings, RunOptions::default()).await?;
/// println!("Loaded {} rows in {:?}", summary.records_loaded, summary.duration);
/// # Ok(())
/// # }
/// ```
pub async fn run(settings: &Settings, options: RunOptions) -> Result<RunSummary> {
    let start_time = Instant::now();

    let entries = read_manifest(&settings.source_file)?;
    info!(
        "Read {} entries from {}",
        entries.len(),
        settings.source_file.display()
    );

    if options.dry_run {
        let planned = entries
            .iter()
            .map(|entry| PlannedLoad::for_entry(&options.work_dir, entry))
            .collect::<Result<Vec<_>>>()?;
        return Ok(RunSummary::dry_run(planned, start_time.elapsed()));
    }

    // Create connection pool (or use test pool if provided)
    #[cfg(test)]
    let pool = if let Some(test_pool) = options.test_pool.clone() {
        test_pool
    } else {
        connect(settings).await?
    };

    #[cfg(not(test))]
    let pool = connect(settings).await?;

    let downloader = Downloader::new(settings.http_timeout(), !options.quiet)?;
    let loader = BatchLoader::new(pool, settings.create_table_if_missing);
    let coordinator = Coordinator::new(
        downloader,
        loader,
        options.work_dir.clone(),
        settings.batch_size,
    );

    let stats = coordinator.run(&entries).await?;

    Ok(RunSummary {
        entries: entries.len(),
        planned: Vec::new(),
        files_downloaded: stats.files_downloaded,
        files_loaded: stats.files_loaded,
        files_skipped: stats.files_skipped,
        bytes_downloaded: stats.bytes_downloaded,
        records_loaded: stats.records_loaded,
        batches: stats.batches(),
        duration: start_time.elapsed(),
        batch_latency_ms: stats.get_percentiles(),
    })
}

async fn connect(settings: &Settings) -> Result<crate::db::Pool> {
    info!("Connecting to {}", settings.postgres.display_url());

    let pool_args = PoolArgsBuilder::from_settings(&settings.postgres)
        .build()
        .context("Invalid connection settings")?;

    db_pool::pool(pool_args).await
}
