//! Mapping between Arrow and SQL column types.

use arrow::datatypes::{DataType, Schema};

use crate::db::SqlType;
use crate::formats::reader::SourceColumn;

/// Describe every field of an Arrow schema as a typed source column
pub fn source_columns(schema: &Schema) -> Vec<SourceColumn> {
    schema
        .fields()
        .iter()
        .map(|field| SourceColumn {
            name: field.name().clone(),
            sql_type: Some(arrow_to_sql_type(field.data_type())),
        })
        .collect()
}

/// Map an Arrow data type to the PostgreSQL type used when creating a table
///
/// Nested and otherwise unmapped types fall back to TEXT, carrying Arrow's
/// display rendering of the value.
pub fn arrow_to_sql_type(data_type: &DataType) -> SqlType {
    match data_type {
        DataType::Boolean => SqlType::Boolean,
        DataType::Int8 | DataType::Int16 | DataType::UInt8 => SqlType::SmallInt,
        DataType::Int32 | DataType::UInt16 => SqlType::Integer,
        DataType::Int64 | DataType::UInt32 => SqlType::BigInt,
        DataType::UInt64 | DataType::Decimal128(_, _) | DataType::Decimal256(_, _) => {
            SqlType::Numeric
        }
        DataType::Float16 | DataType::Float32 => SqlType::Real,
        DataType::Float64 => SqlType::DoublePrecision,
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => SqlType::Text,
        DataType::Binary
        | DataType::LargeBinary
        | DataType::BinaryView
        | DataType::FixedSizeBinary(_) => SqlType::Bytea,
        DataType::Date32 | DataType::Date64 => SqlType::Date,
        DataType::Timestamp(_, None) => SqlType::Timestamp,
        DataType::Timestamp(_, Some(_)) => SqlType::TimestampTz,
        DataType::Time32(_) | DataType::Time64(_) => SqlType::Time,
        DataType::Dictionary(_, value) => arrow_to_sql_type(value),
        _ => SqlType::Text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::{Field, TimeUnit};

    #[test]
    fn test_scalar_mappings() {
        let cases = [
            (DataType::Boolean, SqlType::Boolean),
            (DataType::Int16, SqlType::SmallInt),
            (DataType::Int32, SqlType::Integer),
            (DataType::Int64, SqlType::BigInt),
            (DataType::UInt64, SqlType::Numeric),
            (DataType::Float32, SqlType::Real),
            (DataType::Float64, SqlType::DoublePrecision),
            (DataType::Utf8, SqlType::Text),
            (DataType::Binary, SqlType::Bytea),
            (DataType::Date32, SqlType::Date),
            (DataType::Decimal128(10, 2), SqlType::Numeric),
        ];

        for (arrow_type, expected) in cases {
            assert_eq!(arrow_to_sql_type(&arrow_type), expected, "{:?}", arrow_type);
        }
    }

    #[test]
    fn test_timestamp_timezone_selects_timestamptz() {
        assert_eq!(
            arrow_to_sql_type(&DataType::Timestamp(TimeUnit::Microsecond, None)),
            SqlType::Timestamp
        );
        assert_eq!(
            arrow_to_sql_type(&DataType::Timestamp(
                TimeUnit::Microsecond,
                Some("UTC".into())
            )),
            SqlType::TimestampTz
        );
    }

    #[test]
    fn test_dictionary_uses_value_type() {
        let dict = DataType::Dictionary(Box::new(DataType::Int32), Box::new(DataType::Utf8));
        assert_eq!(arrow_to_sql_type(&dict), SqlType::Text);
    }

    #[test]
    fn test_source_columns_keep_order() {
        let schema = Schema::new(vec![
            Field::new("vendor_id", DataType::Int64, true),
            Field::new("pickup", DataType::Timestamp(TimeUnit::Microsecond, None), true),
        ]);

        let columns = source_columns(&schema);

        assert_eq!(columns[0].name, "vendor_id");
        assert_eq!(columns[0].sql_type, Some(SqlType::BigInt));
        assert_eq!(columns[1].name, "pickup");
        assert_eq!(columns[1].sql_type, Some(SqlType::Timestamp));
    }
}
