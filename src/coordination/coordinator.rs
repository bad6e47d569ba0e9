use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::loader::BatchLoader;
use super::manifest::ManifestEntry;
use crate::db::TableRef;
use crate::formats::{BatchReader, FileFormat, open_reader};
use crate::io::{DownloadOutcome, Downloader, local_path_for};
use crate::telemetry::{ProgressStats, TelemetryEvent};

/// What the coordinator will do with one manifest entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedLoad {
    pub url: String,
    pub local_path: PathBuf,
    pub format: FileFormat,
    pub table: TableRef,
}

impl PlannedLoad {
    /// Resolve the local file, format and target table of an entry
    pub fn for_entry(work_dir: &Path, entry: &ManifestEntry) -> Result<Self> {
        let local_path = local_path_for(work_dir, &entry.url)?;
        let format = FileFormat::from_path(&local_path);
        let table = TableRef::parse(&entry.table_name)?;

        Ok(Self {
            url: entry.url.clone(),
            local_path,
            format,
            table,
        })
    }
}

/// Works through manifest entries one at a time: download, load, delete
///
/// The first error stops the run. Batches committed before the error stay in
/// the database and the file being loaded stays on disk.
pub struct Coordinator {
    downloader: Downloader,
    loader: BatchLoader,
    work_dir: PathBuf,
    batch_size: usize,
}

impl Coordinator {
    pub fn new(
        downloader: Downloader,
        loader: BatchLoader,
        work_dir: PathBuf,
        batch_size: usize,
    ) -> Self {
        Self {
            downloader,
            loader,
            work_dir,
            batch_size,
        }
    }

    /// Process every entry in manifest order
    pub async fn run(&self, entries: &[ManifestEntry]) -> Result<ProgressStats> {
        let mut stats = ProgressStats::new();

        for (idx, entry) in entries.iter().enumerate() {
            info!(
                "[{}/{}] {} -> {}",
                idx + 1,
                entries.len(),
                entry.url,
                entry.table_name
            );

            self.process_entry(entry, &mut stats)
                .await
                .with_context(|| {
                    format!(
                        "Failed to process manifest entry {} ({} -> {})",
                        idx + 1,
                        entry.url,
                        entry.table_name
                    )
                })?;
        }

        Ok(stats)
    }

    async fn process_entry(&self, entry: &ManifestEntry, stats: &mut ProgressStats) -> Result<()> {
        let plan = PlannedLoad::for_entry(&self.work_dir, entry)?;

        let outcome = self
            .downloader
            .ensure_local(&plan.url, &plan.local_path)
            .await?;
        if let DownloadOutcome::Downloaded { bytes } = outcome {
            stats.update(&TelemetryEvent::FileDownloaded { bytes });
        }

        let Some(mut reader) = open_reader(&plan.local_path, plan.format, self.batch_size)? else {
            warn!(
                "Unsupported file format: {}, leaving it in place",
                plan.local_path.display()
            );
            stats.update(&TelemetryEvent::FileSkipped);
            return Ok(());
        };

        info!("Loading {} ({})", plan.local_path.display(), plan.format);
        let records = self.load_file(reader.as_mut(), &plan.table, stats).await?;

        // Closes the file and removes any spill file before deletion
        drop(reader);

        tokio::fs::remove_file(&plan.local_path)
            .await
            .with_context(|| format!("Failed to delete {}", plan.local_path.display()))?;
        info!(
            "Loaded {} rows into {}; deleted {}",
            records,
            plan.table,
            plan.local_path.display()
        );
        stats.update(&TelemetryEvent::FileLoaded);

        Ok(())
    }

    /// Append every batch of `reader` to `table`, returning the row count
    async fn load_file(
        &self,
        reader: &mut dyn BatchReader,
        table: &TableRef,
        stats: &mut ProgressStats,
    ) -> Result<u64> {
        let Some(first) = reader.next_batch()? else {
            info!("No data rows, nothing to load into {}", table);
            return Ok(0);
        };

        let target = self.loader.prepare(table, reader.columns(), &first).await?;
        if target.created {
            info!("Created table {} with {} columns", table, target.columns.len());
        }

        let mut total = 0u64;
        let mut batch = Some(first);

        while let Some(records) = batch {
            let result = self.loader.append_batch(&target, &records).await?;
            info!(
                "Inserted {} rows into {} in {:.3} seconds",
                result.rows,
                table,
                result.duration.as_secs_f64()
            );
            debug!("Batch used {} INSERT statements", result.statements);

            stats.update(&TelemetryEvent::BatchLoaded {
                records_loaded: result.rows,
                duration_ms: result.duration.as_millis() as u64,
            });
            total += result.rows;

            batch = reader.next_batch()?;
        }

        Ok(total)
    }
}
