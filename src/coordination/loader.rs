use anyhow::{Context, Result, anyhow, bail};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::db::pool::PoolConnection;
use crate::db::schema::query_table_columns;
use crate::db::{Column, Pool, SchemaInferrer, SqlType, TableRef};
use crate::formats::{Record, SourceColumn};

/// How a text value reaches a column of a given SQL type
///
/// Values are always sent as text. PostgreSQL's own input conversion does the
/// parsing, so anything it accepts for the column type loads.
#[derive(Debug, Clone, Copy, PartialEq)]
enum TypeCategory {
    /// Integer types, cast through NUMERIC so that `"1.0"` loads as 1
    IntegerCast,
    /// Bound as text and converted with CAST in PostgreSQL
    StringCast,
    /// Text types with direct string binding (TEXT, VARCHAR, CHAR)
    DirectString,
}

impl TypeCategory {
    fn of(sql_type: SqlType) -> Self {
        match sql_type {
            SqlType::SmallInt | SqlType::Integer | SqlType::BigInt => TypeCategory::IntegerCast,
            SqlType::Boolean
            | SqlType::Real
            | SqlType::DoublePrecision
            | SqlType::Uuid
            | SqlType::Timestamp
            | SqlType::Numeric
            | SqlType::TimestampTz
            | SqlType::Date
            | SqlType::Time
            | SqlType::Interval
            | SqlType::Bytea
            | SqlType::Json
            | SqlType::Jsonb => TypeCategory::StringCast,
            SqlType::Text | SqlType::Varchar | SqlType::Char => TypeCategory::DirectString,
        }
    }
}

/// Placeholder syntax of the backend a statement is built for
#[derive(Debug, Clone, Copy, PartialEq)]
enum Placeholders {
    /// `$1, $2, ...` with CAST for text-bound types
    Postgres,
    /// `?, ?, ...`; SQLite stores the text as given
    #[cfg_attr(not(test), allow(dead_code))]
    Sqlite,
}

/// The resolved destination of one file's rows
#[derive(Debug, Clone)]
pub struct TargetTable {
    pub table: TableRef,
    /// One column per source column, in source order, typed by the table
    pub columns: Vec<Column>,
    pub created: bool,
}

/// Result of appending one batch
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub rows: u64,
    pub statements: usize,
    pub duration: Duration,
}

/// Appends record batches to a table, one transaction per batch
pub struct BatchLoader {
    pool: Pool,
    create_table_if_missing: bool,
}

impl BatchLoader {
    pub fn new(pool: Pool, create_table_if_missing: bool) -> Self {
        Self {
            pool,
            create_table_if_missing,
        }
    }

    /// Resolve the target table for a file before its first batch is appended
    ///
    /// Looks the table up in the catalog and creates it when missing (if
    /// allowed). Column types of a created table come from the source where it
    /// carries them, otherwise they are inferred from `first_batch`. Every
    /// source column must exist in the table.
    pub async fn prepare(
        &self,
        table: &TableRef,
        source: &[SourceColumn],
        first_batch: &[Record],
    ) -> Result<TargetTable> {
        if source.is_empty() {
            bail!("Source file has no columns to load into table '{}'", table);
        }

        let mut existing = query_table_columns(&self.pool, table).await?;
        let mut created = false;

        if existing.is_empty() {
            if !self.create_table_if_missing {
                bail!(
                    "Table '{}' does not exist. Set create_table_if_missing: true to create it automatically.",
                    table
                );
            }

            existing = Self::columns_for_new_table(source, first_batch);
            created = self.create_table(table, &existing).await?;
        }

        let columns = source
            .iter()
            .map(|src| {
                existing
                    .iter()
                    .find(|col| col.name == src.name)
                    .cloned()
                    .ok_or_else(|| {
                        anyhow!(
                            "Column '{}' of the source file does not exist in table '{}'",
                            src.name,
                            table
                        )
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(TargetTable {
            table: table.clone(),
            columns,
            created,
        })
    }

    fn columns_for_new_table(source: &[SourceColumn], first_batch: &[Record]) -> Vec<Column> {
        if source.iter().all(|c| c.sql_type.is_some()) {
            return source
                .iter()
                .map(|c| Column {
                    name: c.name.clone(),
                    sql_type: c.sql_type.unwrap_or(SqlType::Text),
                })
                .collect();
        }

        let names: Vec<String> = source.iter().map(|c| c.name.clone()).collect();
        let inferred = SchemaInferrer::infer_from_records(&names, first_batch);

        source
            .iter()
            .zip(inferred)
            .map(|(src, guess)| Column {
                name: src.name.clone(),
                sql_type: src.sql_type.unwrap_or(guess.sql_type),
            })
            .collect()
    }

    /// Returns false when another writer created the table first
    async fn create_table(&self, table: &TableRef, columns: &[Column]) -> Result<bool> {
        info!("Creating table: {}", table);

        let table_spec = self.pool.qualified_table_name(table);
        let ddl = SchemaInferrer::generate_ddl(&table_spec, columns);

        match self.pool.execute_query(&ddl).await {
            Ok(_) => {
                info!("Table created successfully");
                Ok(true)
            }
            Err(e) => {
                if e.to_string().contains("already exists") {
                    info!("Table already exists, continuing...");
                    Ok(false)
                } else {
                    Err(e).with_context(|| format!("Failed to create table '{}'", table))
                }
            }
        }
    }

    /// Append one batch to the target table in a single transaction
    ///
    /// The batch is split into multi-row INSERT statements so that none exceeds
    /// the backend's bind-parameter limit. Any failure rolls the whole batch
    /// back; batches committed earlier stay committed.
    pub async fn append_batch(
        &self,
        target: &TargetTable,
        records: &[Record],
    ) -> Result<BatchResult> {
        let start = Instant::now();
        let num_columns = target.columns.len();

        if let Some((idx, record)) = records
            .iter()
            .enumerate()
            .find(|(_, r)| r.fields.len() != num_columns)
        {
            bail!(
                "Record {} of the batch has {} fields, expected {}",
                idx + 1,
                record.fields.len(),
                num_columns
            );
        }

        let rows_per_statement = rows_per_statement(self.pool.max_bind_params(), num_columns);
        let table_spec = self.pool.qualified_table_name(&target.table);
        let mut statements = 0;

        debug!(
            "Appending {} rows to {} in statements of up to {} rows",
            records.len(),
            target.table,
            rows_per_statement
        );

        let mut conn = self
            .pool
            .acquire()
            .await
            .context("Failed to acquire connection from pool")?;

        match &mut conn {
            PoolConnection::Postgres(pg_conn) => {
                let mut tx = sqlx::Connection::begin(&mut **pg_conn)
                    .await
                    .context("Failed to begin transaction")?;

                for chunk in records.chunks(rows_per_statement) {
                    let sql = build_insert_sql(
                        &table_spec,
                        &target.columns,
                        chunk.len(),
                        Placeholders::Postgres,
                    );

                    let mut query = sqlx::query(&sql);
                    for record in chunk {
                        for (field, col) in record.fields.iter().zip(&target.columns) {
                            query = query.bind(field_value(field.as_deref(), col.sql_type));
                        }
                    }

                    query
                        .execute(&mut *tx)
                        .await
                        .with_context(|| insert_error_context(target, chunk))?;
                    statements += 1;
                }

                tx.commit().await.context("Failed to commit batch")?;
            }
            #[cfg(test)]
            PoolConnection::Sqlite(sqlite_conn) => {
                let mut tx = sqlx::Connection::begin(&mut **sqlite_conn)
                    .await
                    .context("Failed to begin transaction")?;

                for chunk in records.chunks(rows_per_statement) {
                    let sql = build_insert_sql(
                        &table_spec,
                        &target.columns,
                        chunk.len(),
                        Placeholders::Sqlite,
                    );

                    // SQLite applies column affinity to the text itself
                    let mut query = sqlx::query(&sql);
                    for record in chunk {
                        for (field, col) in record.fields.iter().zip(&target.columns) {
                            query = query.bind(field_value(field.as_deref(), col.sql_type));
                        }
                    }

                    query
                        .execute(&mut *tx)
                        .await
                        .with_context(|| insert_error_context(target, chunk))?;
                    statements += 1;
                }

                tx.commit().await.context("Failed to commit batch")?;
            }
        }

        Ok(BatchResult {
            rows: records.len() as u64,
            statements,
            duration: start.elapsed(),
        })
    }
}

/// Largest row count per INSERT that stays within `max_params` bind parameters
fn rows_per_statement(max_params: usize, num_columns: usize) -> usize {
    (max_params / num_columns.max(1)).max(1)
}

/// Build `INSERT INTO table ("a", "b") VALUES ($1, $2), ($3, $4), ...`
fn build_insert_sql(
    table_spec: &str,
    columns: &[Column],
    num_rows: usize,
    placeholders: Placeholders,
) -> String {
    let column_list: Vec<String> = columns
        .iter()
        .map(|c| crate::db::schema::quote_ident(&c.name))
        .collect();

    let mut value_groups = Vec::with_capacity(num_rows);
    let mut param_idx = 1;

    for _ in 0..num_rows {
        let row: Vec<String> = columns
            .iter()
            .map(|col| {
                let placeholder = match placeholders {
                    Placeholders::Postgres => format!("${}", param_idx),
                    Placeholders::Sqlite => "?".to_string(),
                };
                param_idx += 1;

                if placeholders == Placeholders::Sqlite {
                    return placeholder;
                }
                match TypeCategory::of(col.sql_type) {
                    TypeCategory::IntegerCast => {
                        format!("CAST(CAST({} AS NUMERIC) AS {})", placeholder, col.sql_type)
                    }
                    TypeCategory::StringCast => format!("CAST({} AS {})", placeholder, col.sql_type),
                    TypeCategory::DirectString => placeholder,
                }
            })
            .collect();
        value_groups.push(format!("({})", row.join(", ")));
    }

    format!(
        "INSERT INTO {} ({}) VALUES {}",
        table_spec,
        column_list.join(", "),
        value_groups.join(", ")
    )
}

fn insert_error_context(target: &TargetTable, chunk: &[Record]) -> String {
    let first_record_sample = chunk
        .first()
        .map(|r| {
            let preview: Vec<String> = r
                .fields
                .iter()
                .take(3)
                .map(|f| match f.as_deref() {
                    None => "NULL".to_string(),
                    Some(v) if v.chars().count() > 20 => {
                        format!("{}...", v.chars().take(20).collect::<String>())
                    }
                    Some(v) => v.to_string(),
                })
                .collect();
            format!(
                "[{}{}]",
                preview.join(", "),
                if r.fields.len() > 3 { ", ..." } else { "" }
            )
        })
        .unwrap_or_else(|| "<empty>".to_string());

    format!(
        "Failed to insert {} rows into '{}' (first record: {})",
        chunk.len(),
        target.table,
        first_record_sample
    )
}

/// Text bound for one field, `None` for NULL
///
/// Blank values of non-text columns are NULL. Text columns keep them as is.
fn field_value(value: Option<&str>, sql_type: SqlType) -> Option<&str> {
    let value = value?;
    if TypeCategory::of(sql_type) == TypeCategory::DirectString {
        return Some(value);
    }

    Some(value.trim()).filter(|v| !v.is_empty())
}
