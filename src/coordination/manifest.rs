use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// One line of the manifest: where to fetch a file and which table receives it
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ManifestEntry {
    pub url: String,
    #[serde(rename = "table")]
    pub table_name: String,
}

/// Read every entry of a manifest CSV, in file order
///
/// The header row must name `url` and `table` columns; any other columns are
/// ignored. Values are trimmed. Duplicate tables and malformed URLs are not
/// checked here.
pub fn read_manifest(path: &Path) -> Result<Vec<ManifestEntry>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open manifest {}", path.display()))?;

    reader
        .deserialize::<ManifestEntry>()
        .enumerate()
        .map(|(idx, row)| {
            // +2: one for the header, one for 1-based line numbers
            row.with_context(|| {
                format!("Invalid manifest entry at {}:{}", path.display(), idx + 2)
            })
        })
        .collect()
}
