use anyhow::{Context, Result, bail};
use std::fmt;

use crate::formats::Record;

/// SQL data type of a target column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Boolean,
    SmallInt,
    Integer,
    BigInt,
    Real,
    DoublePrecision,
    Numeric,
    Text,
    Varchar,
    Char,
    Timestamp,
    TimestampTz,
    Date,
    Time,
    Interval,
    Uuid,
    Bytea,
    Json,
    Jsonb,
}

impl SqlType {
    /// Returns the Postgres type name
    pub fn to_postgres(&self) -> &'static str {
        match self {
            SqlType::Boolean => "BOOLEAN",
            SqlType::SmallInt => "SMALLINT",
            SqlType::Integer => "INTEGER",
            SqlType::BigInt => "BIGINT",
            SqlType::Real => "REAL",
            SqlType::DoublePrecision => "DOUBLE PRECISION",
            SqlType::Numeric => "NUMERIC",
            SqlType::Text => "TEXT",
            SqlType::Varchar => "VARCHAR",
            SqlType::Char => "CHAR",
            SqlType::Timestamp => "TIMESTAMP",
            SqlType::TimestampTz => "TIMESTAMP WITH TIME ZONE",
            SqlType::Date => "DATE",
            SqlType::Time => "TIME",
            SqlType::Interval => "INTERVAL",
            SqlType::Uuid => "UUID",
            SqlType::Bytea => "BYTEA",
            SqlType::Json => "JSON",
            SqlType::Jsonb => "JSONB",
        }
    }

    /// Map a catalog type name (`information_schema.columns.data_type`, or a
    /// declared SQLite type) to a SqlType. Unknown names fall back to Text.
    pub fn from_catalog_name(name: &str) -> SqlType {
        match name.trim().to_uppercase().as_str() {
            "BOOLEAN" | "BOOL" => SqlType::Boolean,
            "SMALLINT" | "INT2" => SqlType::SmallInt,
            "INTEGER" | "INT" | "INT4" => SqlType::Integer,
            "BIGINT" | "INT8" => SqlType::BigInt,
            "REAL" | "FLOAT4" => SqlType::Real,
            "DOUBLE PRECISION" | "FLOAT8" | "FLOAT" => SqlType::DoublePrecision,
            "NUMERIC" | "DECIMAL" => SqlType::Numeric,
            "CHARACTER VARYING" | "VARCHAR" => SqlType::Varchar,
            "CHARACTER" | "CHAR" | "BPCHAR" => SqlType::Char,
            "TEXT" => SqlType::Text,
            "DATE" => SqlType::Date,
            "TIMESTAMP" | "TIMESTAMP WITHOUT TIME ZONE" => SqlType::Timestamp,
            "TIMESTAMP WITH TIME ZONE" | "TIMESTAMPTZ" => SqlType::TimestampTz,
            "TIME" | "TIME WITHOUT TIME ZONE" => SqlType::Time,
            "INTERVAL" => SqlType::Interval,
            "UUID" => SqlType::Uuid,
            "BYTEA" | "BLOB" => SqlType::Bytea,
            "JSON" => SqlType::Json,
            "JSONB" => SqlType::Jsonb,
            _ => SqlType::Text,
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_postgres())
    }
}

/// A column of a target table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub sql_type: SqlType,
}

/// A target table, optionally schema-qualified (`trips` or `staging.trips`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub schema: Option<String>,
    pub name: String,
}

impl TableRef {
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let (schema, name) = match s.split_once('.') {
            Some((schema, name)) => (Some(schema.trim()), name.trim()),
            None => (None, s),
        };

        if name.is_empty() || schema.is_some_and(str::is_empty) {
            bail!("Invalid table name '{}'", s);
        }
        if name.contains('.') {
            bail!("Invalid table name '{}': expected 'table' or 'schema.table'", s);
        }

        Ok(Self {
            schema: schema.map(str::to_string),
            name: name.to_string(),
        })
    }

    /// Quoted identifier for use in SQL text
    pub fn qualified(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", quote_ident(schema), quote_ident(&self.name)),
            None => quote_ident(&self.name),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Quote an identifier, doubling embedded quotes
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Columns of an existing table, as reported by the catalog
pub async fn query_table_columns(
    pool: &super::pool::Pool,
    table: &TableRef,
) -> Result<Vec<Column>> {
    let rows = pool
        .table_columns(table)
        .await
        .with_context(|| format!("Failed to query columns of table '{}'", table))?;

    Ok(rows
        .into_iter()
        .map(|(name, data_type)| Column {
            name,
            sql_type: SqlType::from_catalog_name(&data_type),
        })
        .collect())
}

/// Infers column types for a table created from a CSV source
///
/// Follows the types a dataframe library would assign when reading the file:
/// booleans, 64-bit integers, double-precision floats and text. Dates are left
/// as text because the source values are never parsed as dates.
pub struct SchemaInferrer;

impl SchemaInferrer {
    /// Infer the type of a single value; `None` for NULL
    fn infer_value_type(value: &str) -> Option<SqlType> {
        let trimmed = value.trim();

        if trimmed.is_empty() {
            return None;
        }

        if trimmed.eq_ignore_ascii_case("true") || trimmed.eq_ignore_ascii_case("false") {
            return Some(SqlType::Boolean);
        }

        if trimmed.parse::<i64>().is_ok() {
            return Some(SqlType::BigInt);
        }

        if trimmed.parse::<f64>().is_ok() {
            return Some(SqlType::DoublePrecision);
        }

        Some(SqlType::Text)
    }

    /// Widen two observed types to one that holds both
    fn common_type(a: SqlType, b: SqlType) -> SqlType {
        use SqlType::*;
        match (a, b) {
            _ if a == b => a,
            (BigInt, DoublePrecision) | (DoublePrecision, BigInt) => DoublePrecision,
            _ => Text,
        }
    }

    fn infer_column_type<'a>(values: impl Iterator<Item = Option<&'a str>>) -> SqlType {
        values
            .filter_map(|v| v.and_then(Self::infer_value_type))
            .reduce(Self::common_type)
            .unwrap_or(SqlType::Text)
    }

    /// Infer one type per column from a sample of records
    pub fn infer_from_records(names: &[String], records: &[Record]) -> Vec<Column> {
        names
            .iter()
            .enumerate()
            .map(|(idx, name)| Column {
                name: name.clone(),
                sql_type: Self::infer_column_type(
                    records
                        .iter()
                        .map(|r| r.fields.get(idx).and_then(|f| f.as_deref())),
                ),
            })
            .collect()
    }

    /// Generate the DDL statement that creates `table_spec` with `columns`
    ///
    /// `table_spec` is already quoted for the target backend. Every column is
    /// nullable; later batches may contain NULLs the sample did not.
    pub fn generate_ddl(table_spec: &str, columns: &[Column]) -> String {
        let column_defs: Vec<String> = columns
            .iter()
            .map(|col| format!("  {} {}", quote_ident(&col.name), col.sql_type.to_postgres()))
            .collect();

        format!(
            "CREATE TABLE {} (\n{}\n)",
            table_spec,
            column_defs.join(",\n")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(values: &[Option<&str>]) -> Record {
        Record {
            fields: values.iter().map(|v| v.map(str::to_string)).collect(),
        }
    }

    #[test]
    fn test_infer_value_types() {
        assert_eq!(SchemaInferrer::infer_value_type("42"), Some(SqlType::BigInt));
        assert_eq!(
            SchemaInferrer::infer_value_type("9999999999"),
            Some(SqlType::BigInt)
        );
        assert_eq!(
            SchemaInferrer::infer_value_type("3.14"),
            Some(SqlType::DoublePrecision)
        );
        assert_eq!(
            SchemaInferrer::infer_value_type("1e10"),
            Some(SqlType::DoublePrecision)
        );
        assert_eq!(
            SchemaInferrer::infer_value_type("True"),
            Some(SqlType::Boolean)
        );
        assert_eq!(
            SchemaInferrer::infer_value_type("2025-12-03"),
            Some(SqlType::Text)
        );
        assert_eq!(SchemaInferrer::infer_value_type("hello"), Some(SqlType::Text));
        assert_eq!(SchemaInferrer::infer_value_type("  "), None);
    }

    #[test]
    fn test_zero_and_one_are_integers() {
        let names = vec!["flag".to_string()];
        let records = vec![record(&[Some("0")]), record(&[Some("1")])];

        let columns = SchemaInferrer::infer_from_records(&names, &records);
        assert_eq!(columns[0].sql_type, SqlType::BigInt);
    }

    #[test]
    fn test_integer_and_float_widen_to_float() {
        let names = vec!["fare".to_string()];
        let records = vec![
            record(&[Some("5")]),
            record(&[None]),
            record(&[Some("7.25")]),
        ];

        let columns = SchemaInferrer::infer_from_records(&names, &records);
        assert_eq!(columns[0].sql_type, SqlType::DoublePrecision);
    }

    #[test]
    fn test_mixed_types_promote_to_text() {
        let names = vec!["value".to_string()];
        let records = vec![
            record(&[Some("123")]),
            record(&[Some("hello")]),
            record(&[Some("456")]),
        ];

        let columns = SchemaInferrer::infer_from_records(&names, &records);
        assert_eq!(columns[0].sql_type, SqlType::Text);
    }

    #[test]
    fn test_all_null_column_is_text() {
        let names = vec!["id".to_string(), "note".to_string()];
        let records = vec![record(&[Some("1"), None]), record(&[Some("2"), None])];

        let columns = SchemaInferrer::infer_from_records(&names, &records);
        assert_eq!(columns[0].sql_type, SqlType::BigInt);
        assert_eq!(columns[1].sql_type, SqlType::Text);
    }

    #[test]
    fn test_generate_ddl() {
        let table = TableRef::parse("staging.trips").unwrap();
        let columns = vec![
            Column {
                name: "VendorID".to_string(),
                sql_type: SqlType::BigInt,
            },
            Column {
                name: "fare".to_string(),
                sql_type: SqlType::DoublePrecision,
            },
        ];

        let ddl = SchemaInferrer::generate_ddl(&table.qualified(), &columns);

        assert!(ddl.starts_with("CREATE TABLE \"staging\".\"trips\" ("));
        assert!(ddl.contains("\"VendorID\" BIGINT"));
        assert!(ddl.contains("\"fare\" DOUBLE PRECISION"));
        assert!(!ddl.contains("NOT NULL"));
    }

    #[test]
    fn test_table_ref_parse() {
        assert_eq!(
            TableRef::parse("trips").unwrap(),
            TableRef {
                schema: None,
                name: "trips".to_string()
            }
        );

        let qualified = TableRef::parse(" staging.trips ").unwrap();
        assert_eq!(qualified.schema.as_deref(), Some("staging"));
        assert_eq!(qualified.name, "trips");
        assert_eq!(qualified.to_string(), "staging.trips");

        assert!(TableRef::parse("").is_err());
        assert!(TableRef::parse(".trips").is_err());
        assert!(TableRef::parse("a.b.c").is_err());
    }

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("plain"), "\"plain\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_catalog_names() {
        assert_eq!(
            SqlType::from_catalog_name("character varying"),
            SqlType::Varchar
        );
        assert_eq!(
            SqlType::from_catalog_name("timestamp without time zone"),
            SqlType::Timestamp
        );
        assert_eq!(
            SqlType::from_catalog_name("double precision"),
            SqlType::DoublePrecision
        );
        assert_eq!(SqlType::from_catalog_name("USER-DEFINED"), SqlType::Text);
    }
}
