//! Network and filesystem plumbing: fetching manifest URLs to local files

pub mod download;
pub mod uri;

pub use download::{DownloadOutcome, Downloader};
pub use uri::local_path_for;
