//! Parquet file reader implementation.

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use parquet::arrow::arrow_reader::{ParquetRecordBatchReader, ParquetRecordBatchReaderBuilder};
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::Path;
use tempfile::NamedTempFile;

use crate::formats::reader::{BatchReader, Record, SourceColumn};

use super::conversion::record_batch_to_records;
use super::schema::source_columns;

/// Parquet reader yielding record batches of a fixed row count
///
/// Parquet needs random access to its footer, so gzip-compressed input is
/// first stream-decompressed into a spill file next to the source. The spill
/// file lives as long as the reader and is removed on drop.
pub struct ParquetBatchReader {
    reader: ParquetRecordBatchReader,
    columns: Vec<SourceColumn>,
    _spill: Option<NamedTempFile>,
}

impl ParquetBatchReader {
    /// Open an uncompressed Parquet file
    pub fn open(file: File, batch_size: usize) -> Result<Self> {
        Self::build(file, batch_size, None)
    }

    /// Open a gzip-compressed Parquet file
    pub fn open_gzip(path: &Path, batch_size: usize) -> Result<Self> {
        let spill = decompress_to_spill(path)?;
        let file = spill
            .reopen()
            .context("Failed to reopen decompressed Parquet file")?;

        Self::build(file, batch_size, Some(spill))
    }

    fn build(file: File, batch_size: usize, spill: Option<NamedTempFile>) -> Result<Self> {
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)
            .context("Failed to read Parquet metadata")?;

        let columns = source_columns(builder.schema());

        let reader = builder
            .with_batch_size(batch_size)
            .build()
            .context("Failed to build Parquet reader")?;

        Ok(Self {
            reader,
            columns,
            _spill: spill,
        })
    }
}

impl BatchReader for ParquetBatchReader {
    fn columns(&self) -> &[SourceColumn] {
        &self.columns
    }

    fn next_batch(&mut self) -> Result<Option<Vec<Record>>> {
        for batch in self.reader.by_ref() {
            let batch = batch.context("Failed to read record batch")?;
            let records = record_batch_to_records(&batch)
                .context("Failed to convert RecordBatch to Records")?;

            if !records.is_empty() {
                return Ok(Some(records));
            }
        }

        Ok(None)
    }
}

fn decompress_to_spill(path: &Path) -> Result<NamedTempFile> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));

    let mut spill = tempfile::Builder::new()
        .prefix(".decompressed-")
        .suffix(".parquet")
        .tempfile_in(dir)
        .with_context(|| format!("Failed to create spill file in {}", dir.display()))?;

    let source =
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut decoder = GzDecoder::new(BufReader::new(source));

    std::io::copy(&mut decoder, spill.as_file_mut())
        .with_context(|| format!("Failed to decompress {}", path.display()))?;
    spill.as_file_mut().flush()?;

    Ok(spill)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::record_batch::RecordBatch;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use parquet::arrow::ArrowWriter;
    use std::sync::Arc;
    use tempfile::TempDir;

    use crate::db::SqlType;

    fn write_parquet(path: &Path, rows: i64) {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, true),
        ]));
        let ids: Vec<i64> = (0..rows).collect();
        let names: Vec<Option<String>> = (0..rows)
            .map(|i| (i % 3 != 0).then(|| format!("name_{}", i)))
            .collect();

        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Int64Array::from(ids)),
                Arc::new(StringArray::from(names)),
            ],
        )
        .unwrap();

        let mut writer = ArrowWriter::try_new(File::create(path).unwrap(), schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();
    }

    fn gzip_file(src: &Path, dst: &Path) {
        let mut encoder = GzEncoder::new(File::create(dst).unwrap(), Compression::default());
        std::io::copy(&mut File::open(src).unwrap(), &mut encoder).unwrap();
        encoder.finish().unwrap();
    }

    fn drain(reader: &mut ParquetBatchReader) -> Vec<Vec<Record>> {
        let mut batches = Vec::new();
        while let Some(batch) = reader.next_batch().unwrap() {
            batches.push(batch);
        }
        batches
    }

    #[test]
    fn test_columns_from_schema() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("trips.parquet");
        write_parquet(&path, 5);

        let reader = ParquetBatchReader::open(File::open(&path).unwrap(), 10).unwrap();

        assert_eq!(reader.columns().len(), 2);
        assert_eq!(reader.columns()[0].name, "id");
        assert_eq!(reader.columns()[0].sql_type, Some(SqlType::BigInt));
        assert_eq!(reader.columns()[1].sql_type, Some(SqlType::Text));
    }

    #[test]
    fn test_fixed_size_batches() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("trips.parquet");
        write_parquet(&path, 250);

        let mut reader = ParquetBatchReader::open(File::open(&path).unwrap(), 100).unwrap();
        let sizes: Vec<_> = drain(&mut reader).iter().map(Vec::len).collect();

        assert_eq!(sizes, vec![100, 100, 50]);
    }

    #[test]
    fn test_nulls_survive() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("trips.parquet");
        write_parquet(&path, 3);

        let mut reader = ParquetBatchReader::open(File::open(&path).unwrap(), 10).unwrap();
        let batch = reader.next_batch().unwrap().unwrap();

        assert_eq!(batch[0].fields, vec![Some("0".to_string()), None]);
        assert_eq!(
            batch[1].fields,
            vec![Some("1".to_string()), Some("name_1".to_string())]
        );
    }

    #[test]
    fn test_gzip_matches_plain_and_cleans_spill() {
        let dir = TempDir::new().unwrap();
        let plain_path = dir.path().join("trips.parquet");
        let gz_path = dir.path().join("trips.parquet.gz");
        write_parquet(&plain_path, 120);
        gzip_file(&plain_path, &gz_path);

        let mut plain = ParquetBatchReader::open(File::open(&plain_path).unwrap(), 50).unwrap();
        let mut gzip = ParquetBatchReader::open_gzip(&gz_path, 50).unwrap();

        assert_eq!(plain.columns(), gzip.columns());
        assert_eq!(drain(&mut plain), drain(&mut gzip));

        drop(gzip);
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with(".decompressed-"))
            .collect();
        assert!(leftovers.is_empty(), "spill files left: {:?}", leftovers);
    }

    #[test]
    fn test_not_parquet_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("trips.parquet");
        std::fs::write(&path, b"id,name\n1,a\n").unwrap();

        assert!(ParquetBatchReader::open(File::open(&path).unwrap(), 10).is_err());
    }

    #[test]
    fn test_corrupt_gzip_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("trips.parquet.gz");
        std::fs::write(&path, b"definitely not gzip").unwrap();

        assert!(ParquetBatchReader::open_gzip(&path, 10).is_err());
    }
}
