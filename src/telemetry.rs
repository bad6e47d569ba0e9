/// Events emitted by the coordinator while it works through the manifest
#[derive(Debug, Clone)]
pub enum TelemetryEvent {
    /// A file was fetched over HTTP
    FileDownloaded { bytes: u64 },
    /// Batch of records was successfully appended
    BatchLoaded { records_loaded: u64, duration_ms: u64 },
    /// Every batch of a file was appended and the file deleted
    FileLoaded,
    /// The file format is not supported; the file was left in place
    FileSkipped,
}

/// Statistics aggregated from telemetry events
#[derive(Debug, Default, Clone)]
pub struct ProgressStats {
    pub files_downloaded: usize,
    pub files_loaded: usize,
    pub files_skipped: usize,
    pub bytes_downloaded: u64,
    pub records_loaded: u64,
    pub batch_durations_ms: Vec<u64>,
}

impl ProgressStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update stats with a telemetry event
    pub fn update(&mut self, event: &TelemetryEvent) {
        match event {
            TelemetryEvent::FileDownloaded { bytes } => {
                self.files_downloaded += 1;
                self.bytes_downloaded += bytes;
            }
            TelemetryEvent::BatchLoaded {
                records_loaded,
                duration_ms,
            } => {
                self.records_loaded += records_loaded;
                self.batch_durations_ms.push(*duration_ms);
            }
            TelemetryEvent::FileLoaded => {
                self.files_loaded += 1;
            }
            TelemetryEvent::FileSkipped => {
                self.files_skipped += 1;
            }
        }
    }

    /// Number of batches appended so far
    pub fn batches(&self) -> usize {
        self.batch_durations_ms.len()
    }

    /// Calculate percentile from batch durations
    pub fn percentile(&self, p: f64) -> Option<u64> {
        if self.batch_durations_ms.is_empty() {
            return None;
        }

        let mut sorted = self.batch_durations_ms.clone();
        sorted.sort_unstable();

        let index = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
        let index = index.saturating_sub(1).min(sorted.len() - 1);

        Some(sorted[index])
    }

    /// Get p50, p90, p99 percentiles
    pub fn get_percentiles(&self) -> (Option<u64>, Option<u64>, Option<u64>) {
        (
            self.percentile(50.0),
            self.percentile(90.0),
            self.percentile(99.0),
        )
    }
}
