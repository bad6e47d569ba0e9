use anyhow::{Context, Result};
use std::io::Read;

use crate::formats::reader::{BatchReader, Record, SourceColumn};

/// Field values read as NULL, besides the empty field
const NULL_TOKENS: &[&str] = &[
    "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

fn is_null(field: &str) -> bool {
    field.is_empty() || NULL_TOKENS.contains(&field)
}

/// Comma-separated reader over any byte stream (plain file or gzip decoder)
///
/// The first row names the columns. Empty fields and the usual missing-value
/// markers (`NA`, `NaN`, `null`, `N/A`, ...) are read as NULL. A row whose
/// width differs from the header is a parse error.
pub struct CsvBatchReader<R: Read> {
    reader: csv::Reader<R>,
    columns: Vec<SourceColumn>,
    batch_size: usize,
    row: csv::StringRecord,
}

impl<R: Read> CsvBatchReader<R> {
    pub fn new(source: R, batch_size: usize) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(source);

        let columns = reader
            .headers()
            .context("Failed to read CSV header")?
            .iter()
            .map(|name| SourceColumn {
                name: name.to_string(),
                sql_type: None,
            })
            .collect();

        Ok(Self {
            reader,
            columns,
            batch_size,
            row: csv::StringRecord::new(),
        })
    }
}

impl<R: Read> BatchReader for CsvBatchReader<R> {
    fn columns(&self) -> &[SourceColumn] {
        &self.columns
    }

    fn next_batch(&mut self) -> Result<Option<Vec<Record>>> {
        let mut records = Vec::with_capacity(self.batch_size.min(8192));

        while records.len() < self.batch_size {
            let more = self
                .reader
                .read_record(&mut self.row)
                .context("Failed to parse CSV record")?;
            if !more {
                break;
            }

            records.push(Record {
                fields: self
                    .row
                    .iter()
                    .map(|field| (!is_null(field)).then(|| field.to_string()))
                    .collect(),
            });
        }

        Ok((!records.is_empty()).then_some(records))
    }
}
