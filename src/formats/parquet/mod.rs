//! Parquet file format support.
//!
//! - Schema mapping from Arrow to SQL types
//! - Conversion from Arrow RecordBatches to row-based Records
//! - ParquetBatchReader, over plain or gzip-compressed files

mod conversion;
mod reader;
mod schema;

pub use reader::ParquetBatchReader;
