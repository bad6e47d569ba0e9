//! Conversion from Arrow RecordBatch to row-based Records.
//!
//! Values are rendered to text with Arrow's display formatting, which yields
//! ISO dates and timestamps and exact decimals that PostgreSQL accepts as
//! input. Binary values are rendered in PostgreSQL's `\x` hex bytea format.
//! Nulls stay `None`.

use anyhow::{Context, Result};
use arrow::array::{Array, AsArray};
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use arrow::util::display::{ArrayFormatter, FormatOptions};

use crate::formats::reader::Record;

/// Convert an Arrow RecordBatch to a vector of Records
pub fn record_batch_to_records(batch: &RecordBatch) -> Result<Vec<Record>> {
    let num_rows = batch.num_rows();

    if num_rows == 0 {
        return Ok(Vec::new());
    }

    let options = FormatOptions::default();
    let schema = batch.schema();

    let mut columns: Vec<std::vec::IntoIter<Option<String>>> =
        Vec::with_capacity(batch.num_columns());
    for (field, array) in schema.fields().iter().zip(batch.columns()) {
        let values = array_to_strings(array.as_ref(), &options).with_context(|| {
            format!(
                "Failed to convert column '{}' ({:?}) to text",
                field.name(),
                array.data_type()
            )
        })?;
        columns.push(values.into_iter());
    }

    // Transpose to rows
    let records = (0..num_rows)
        .map(|_| Record {
            fields: columns.iter_mut().map(|col| col.next().flatten()).collect(),
        })
        .collect();

    Ok(records)
}

fn array_to_strings(array: &dyn Array, options: &FormatOptions) -> Result<Vec<Option<String>>> {
    match array.data_type() {
        DataType::Binary => Ok(array.as_binary::<i32>().iter().map(to_bytea).collect()),
        DataType::LargeBinary => Ok(array.as_binary::<i64>().iter().map(to_bytea).collect()),
        DataType::BinaryView => Ok(array.as_binary_view().iter().map(to_bytea).collect()),
        DataType::FixedSizeBinary(_) => {
            Ok(array.as_fixed_size_binary().iter().map(to_bytea).collect())
        }
        _ => {
            let formatter = ArrayFormatter::try_new(array, options)?;
            (0..array.len())
                .map(|i| {
                    if array.is_null(i) {
                        Ok(None)
                    } else {
                        Ok(Some(formatter.value(i).try_to_string()?))
                    }
                })
                .collect()
        }
    }
}

fn to_bytea(value: Option<&[u8]>) -> Option<String> {
    value.map(|bytes| format!("\\x{}", hex::encode(bytes)))
}
