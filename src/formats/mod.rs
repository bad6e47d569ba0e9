//! File format detection and batched readers

pub mod delimited;
pub mod parquet;
pub mod reader;

pub use reader::{BatchReader, FileFormat, Record, SourceColumn, open_reader};
