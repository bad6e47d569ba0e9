//! Adapter between bb8 and the sqlx::Postgres driver.
use anyhow::{Context, Result};
use derive_builder::Builder;
use sqlx::ConnectOptions;
use sqlx::postgres::{PgConnectOptions, PgConnection};

use super::schema::TableRef;
use crate::config::{CONNECT_TIMEOUT, MAX_POOL_SIZE, PING_TIMEOUT, POSTGRES_MAX_BIND_PARAMS};
use crate::settings::PostgresSettings;

pub type Bb8Connection<'a> = bb8::PooledConnection<'a, ConnectionManager>;

/// Inner pool variants
#[derive(Debug, Clone)]
enum PoolInner {
    Postgres(bb8::Pool<ConnectionManager>),
    #[cfg(test)]
    Sqlite(sqlx::SqlitePool),
}

/// Connection that can be either Postgres or SQLite
pub enum PoolConnection {
    Postgres(Bb8Connection<'static>),
    #[cfg(test)]
    Sqlite(sqlx::pool::PoolConnection<sqlx::Sqlite>),
}

// Wrap pool implementations so callers stay agnostic of the test backend.
#[derive(Debug, Clone)]
pub struct Pool {
    inner: PoolInner,
}

#[derive(Builder)]
pub struct PoolArgs {
    #[builder(setter(into))]
    host: String,
    #[builder(default = "5432")]
    port: u16,
    #[builder(setter(into))]
    username: String,
    #[builder(setter(into))]
    password: String,
    #[builder(setter(into))]
    database: String,
    #[builder(default = "MAX_POOL_SIZE")]
    max_pool_size: u32,
}

impl PoolArgsBuilder {
    /// Pre-fill every connection field from the settings file
    pub fn from_settings(settings: &PostgresSettings) -> Self {
        let mut builder = Self::default();
        builder
            .host(&settings.host)
            .port(settings.port)
            .username(&settings.user)
            .password(&settings.password)
            .database(&settings.db);
        builder
    }
}

/// Build a pool and verify the server is reachable with one connection
pub async fn pool(args: PoolArgs) -> Result<Pool> {
    let PoolArgs {
        host,
        port,
        username,
        password,
        database,
        max_pool_size,
    } = args;

    let connect_options = PgConnectOptions::new()
        .host(&host)
        .port(port)
        .username(&username)
        .password(&password)
        .database(&database);

    let bb8_pool = bb8::Builder::new()
        .max_size(max_pool_size)
        .connection_timeout(CONNECT_TIMEOUT)
        .build(ConnectionManager::new(connect_options))
        .await
        .context("Failed to create connection pool")?;

    // bb8 connects lazily; fail here rather than on the first batch
    bb8_pool
        .get()
        .await
        .map_err(map_run_error)
        .with_context(|| format!("Failed to connect to {}:{}/{}", host, port, database))?;

    Ok(Pool {
        inner: PoolInner::Postgres(bb8_pool),
    })
}

fn map_run_error(e: bb8::RunError<sqlx::Error>) -> sqlx::Error {
    match e {
        bb8::RunError::User(e) => e,
        bb8::RunError::TimedOut => sqlx::Error::PoolTimedOut,
    }
}

impl Pool {
    /// Create an in-memory SQLite pool for testing
    ///
    /// Every connection to `sqlite::memory:` opens a separate database, so the
    /// pool is pinned to a single connection.
    #[cfg(test)]
    pub async fn sqlite_in_memory() -> Result<Self, sqlx::Error> {
        let sqlite_pool = sqlx::sqlite::SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        Ok(Pool {
            inner: PoolInner::Sqlite(sqlite_pool),
        })
    }

    pub async fn acquire(&self) -> Result<PoolConnection, sqlx::Error> {
        match &self.inner {
            PoolInner::Postgres(pool) => {
                let conn = pool.get_owned().await.map_err(map_run_error)?;
                Ok(PoolConnection::Postgres(conn))
            }
            #[cfg(test)]
            PoolInner::Sqlite(pool) => {
                let conn = pool.acquire().await?;
                Ok(PoolConnection::Sqlite(conn))
            }
        }
    }

    /// Execute a statement without parameters (DDL such as CREATE TABLE)
    pub async fn execute_query(&self, sql: &str) -> Result<(), sqlx::Error> {
        match &self.inner {
            PoolInner::Postgres(pool) => {
                let mut conn = pool.get().await.map_err(map_run_error)?;
                sqlx::query(sql).execute(&mut *conn).await?;
                Ok(())
            }
            #[cfg(test)]
            PoolInner::Sqlite(pool) => {
                sqlx::query(sql).execute(pool).await?;
                Ok(())
            }
        }
    }

    /// Column names and catalog type names of `table`, in ordinal order
    ///
    /// An empty result means the table does not exist.
    pub async fn table_columns(
        &self,
        table: &TableRef,
    ) -> Result<Vec<(String, String)>, sqlx::Error> {
        match &self.inner {
            PoolInner::Postgres(pool) => {
                let mut conn = pool.get().await.map_err(map_run_error)?;

                let sql = r#"
                    SELECT column_name::text, data_type::text
                    FROM information_schema.columns
                    WHERE table_name = $1
                    AND table_schema = COALESCE($2, current_schema())
                    ORDER BY ordinal_position
                "#;

                sqlx::query_as::<_, (String, String)>(sql)
                    .bind(table.name.as_str())
                    .bind(table.schema.as_deref())
                    .fetch_all(&mut *conn)
                    .await
            }
            #[cfg(test)]
            PoolInner::Sqlite(pool) => {
                // SQLite has no schemas; PRAGMA returns no rows for a missing table
                let pragma_sql = format!(
                    "PRAGMA table_info({})",
                    super::schema::quote_ident(&table.name)
                );
                let rows: Vec<(i64, String, String, i64, Option<String>, i64)> =
                    sqlx::query_as(&pragma_sql).fetch_all(pool).await?;

                Ok(rows
                    .into_iter()
                    .map(|(_, name, declared_type, _, _, _)| (name, declared_type))
                    .collect())
            }
        }
    }

    /// Largest number of bind parameters one statement may carry
    pub fn max_bind_params(&self) -> usize {
        match &self.inner {
            PoolInner::Postgres(_) => POSTGRES_MAX_BIND_PARAMS,
            #[cfg(test)]
            PoolInner::Sqlite(_) => crate::config::SQLITE_MAX_BIND_PARAMS,
        }
    }

    /// Table name formatted for SQL text on this backend
    pub fn qualified_table_name(&self, table: &TableRef) -> String {
        match &self.inner {
            PoolInner::Postgres(_) => table.qualified(),
            #[cfg(test)]
            PoolInner::Sqlite(_) => super::schema::quote_ident(&table.name),
        }
    }
}

// Own the connect options so that we can implement the bb8::ManageConnection trait.
#[derive(Debug)]
pub struct ConnectionManager {
    connect_options: PgConnectOptions,
}

impl ConnectionManager {
    /// Create a new `ConnectionManager` with the specified connect options.
    pub fn new(connect_options: PgConnectOptions) -> Self {
        Self { connect_options }
    }
}

impl bb8::ManageConnection for ConnectionManager {
    type Connection = PgConnection;
    type Error = sqlx::Error;

    async fn connect(&self) -> Result<Self::Connection, Self::Error> {
        tokio::time::timeout(CONNECT_TIMEOUT, self.connect_options.connect())
            .await
            .map_err(|_| sqlx::Error::PoolTimedOut)?
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        tokio::time::timeout(PING_TIMEOUT, sqlx::Connection::ping(conn))
            .await
            // Convert tokio timeouts into sqlx pool timeouts. bb8 will retry a different connection on ping failure.
            .map_err(|_| sqlx::Error::PoolTimedOut)
            // Make sure that we also look at the actual ping result
            .and_then(|result| result)?;
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        // sqlx::PgConnection provides no non-async way to check for closed/broken connections.
        false
    }
}
