use anyhow::{Context, Result};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::info;

use crate::config::{CHUNK_SIZE, PARTIAL_DOWNLOAD_SUFFIX};

/// What `Downloader::ensure_local` did to produce the local file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// A file was already at the target path; nothing was fetched
    AlreadyPresent,
    Downloaded { bytes: u64 },
}

/// Fetches remote files to local paths over HTTP(S)
pub struct Downloader {
    client: Client,
    show_progress: bool,
}

impl Downloader {
    /// Create a downloader; `timeout` of `None` waits on the server indefinitely
    pub fn new(timeout: Option<Duration>, show_progress: bool) -> Result<Self> {
        let mut builder = Client::builder().user_agent(concat!(
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION")
        ));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let client = builder.build().context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            show_progress,
        })
    }

    /// Ensure `target` exists locally, downloading `url` to it if absent
    ///
    /// Presence is treated as success; the existing file is not checked for
    /// size or staleness. The body is streamed into `<target>.part` and renamed
    /// into place once complete.
    pub async fn ensure_local(&self, url: &str, target: &Path) -> Result<DownloadOutcome> {
        if fs::try_exists(target)
            .await
            .with_context(|| format!("Failed to check for {}", target.display()))?
        {
            info!("File already exists: {}, skipping download", target.display());
            return Ok(DownloadOutcome::AlreadyPresent);
        }

        info!("Downloading {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?
            .error_for_status()
            .with_context(|| format!("Download of {} failed", url))?;

        let progress = self.progress_bar(response.content_length(), target);

        let partial = partial_path(target);
        let file = File::create(&partial)
            .await
            .with_context(|| format!("Failed to create {}", partial.display()))?;
        let mut writer = BufWriter::with_capacity(CHUNK_SIZE, file);

        let mut bytes = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.with_context(|| format!("Failed reading body of {}", url))?;
            writer
                .write_all(&chunk)
                .await
                .with_context(|| format!("Failed writing to {}", partial.display()))?;
            bytes += chunk.len() as u64;
            progress.set_position(bytes);
        }

        writer
            .flush()
            .await
            .with_context(|| format!("Failed writing to {}", partial.display()))?;
        drop(writer);

        fs::rename(&partial, target).await.with_context(|| {
            format!(
                "Failed to move {} to {}",
                partial.display(),
                target.display()
            )
        })?;

        progress.finish_and_clear();
        info!("Downloaded {} bytes to {}", bytes, target.display());

        Ok(DownloadOutcome::Downloaded { bytes })
    }

    fn progress_bar(&self, total: Option<u64>, target: &Path) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let pb = match total {
            Some(len) => {
                let pb = ProgressBar::new(len);
                if let Ok(style) = ProgressStyle::default_bar().template(
                    "{msg} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})",
                ) {
                    pb.set_style(style.progress_chars("#>-"));
                }
                pb
            }
            None => ProgressBar::new_spinner(),
        };

        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        pb.set_message(name);
        pb
    }
}

fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_owned();
    name.push(".");
    name.push(PARTIAL_DOWNLOAD_SUFFIX);
    PathBuf::from(name)
}
