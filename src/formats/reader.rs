use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use super::delimited::CsvBatchReader;
use super::parquet::ParquetBatchReader;
use crate::db::SqlType;

/// A single record (row) from the file; `None` is SQL NULL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub fields: Vec<Option<String>>,
}

/// A column as described by the source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceColumn {
    pub name: String,
    /// Type carried by the file itself; delimited text has none
    pub sql_type: Option<SqlType>,
}

/// Streams a source file as fixed-size batches of records
pub trait BatchReader {
    /// Columns in source order
    fn columns(&self) -> &[SourceColumn];

    /// The next batch of at most `batch_size` records, `None` once exhausted
    fn next_batch(&mut self) -> Result<Option<Vec<Record>>>;
}

/// Supported file formats, selected by file name suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Parquet,
    ParquetGz,
    Csv,
    CsvGz,
    Unsupported,
}

impl FileFormat {
    /// Detect the format from a file name (case-insensitive)
    pub fn detect(file_name: &str) -> Self {
        let lower = file_name.to_lowercase();

        if lower.ends_with(".parquet.gz") {
            FileFormat::ParquetGz
        } else if lower.ends_with(".csv.gz") {
            FileFormat::CsvGz
        } else if lower.ends_with(".parquet") {
            FileFormat::Parquet
        } else if lower.ends_with(".csv") {
            FileFormat::Csv
        } else {
            FileFormat::Unsupported
        }
    }

    /// Detect the format of a local path from its final component
    pub fn from_path(path: &Path) -> Self {
        path.file_name()
            .map(|name| Self::detect(&name.to_string_lossy()))
            .unwrap_or(FileFormat::Unsupported)
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FileFormat::Parquet => "parquet",
            FileFormat::ParquetGz => "parquet (gzip)",
            FileFormat::Csv => "csv",
            FileFormat::CsvGz => "csv (gzip)",
            FileFormat::Unsupported => "unsupported",
        })
    }
}

/// Open a batch reader for `path` in the given format
///
/// Returns `None` for `FileFormat::Unsupported`.
pub fn open_reader(
    path: &Path,
    format: FileFormat,
    batch_size: usize,
) -> Result<Option<Box<dyn BatchReader>>> {
    let open = || {
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))
    };

    let reader: Box<dyn BatchReader> = match format {
        FileFormat::Parquet => Box::new(ParquetBatchReader::open(open()?, batch_size)?),
        FileFormat::ParquetGz => Box::new(ParquetBatchReader::open_gzip(path, batch_size)?),
        FileFormat::Csv => Box::new(CsvBatchReader::new(BufReader::new(open()?), batch_size)?),
        FileFormat::CsvGz => Box::new(CsvBatchReader::new(
            GzDecoder::new(BufReader::new(open()?)),
            batch_size,
        )?),
        FileFormat::Unsupported => return Ok(None),
    };

    Ok(Some(reader))
}
