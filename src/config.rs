//! Configuration constants for the ingest tool
//!
//! This module centralizes the tunable parameters that are not exposed in the
//! settings file.

use std::time::Duration;

// ============================================================================
// Connection Pool Configuration
// ============================================================================

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(45);

pub const PING_TIMEOUT: Duration = Duration::from_secs(5);

/// Loads run one batch at a time; at most one connection is checked out.
pub const MAX_POOL_SIZE: u32 = 2;

// ============================================================================
// Loader Configuration
// ============================================================================

/// Rows per append when the settings file does not specify `batch_size`
pub const DEFAULT_BATCH_SIZE: usize = 100_000;

/// Upper bound on bind parameters in a single PostgreSQL statement
///
/// The wire protocol carries the parameter count in 16 bits. Multi-row INSERTs
/// are split into statements of at most this many values.
pub const POSTGRES_MAX_BIND_PARAMS: usize = 65_535;

/// SQLite's default `SQLITE_MAX_VARIABLE_NUMBER` (3.32+)
#[cfg(test)]
pub const SQLITE_MAX_BIND_PARAMS: usize = 32_766;

// ============================================================================
// I/O Configuration
// ============================================================================

/// Size of the write buffer used when streaming a download to disk
pub const CHUNK_SIZE: usize = 8192; // 8 KB

/// Suffix appended to a download target while the body is still streaming
pub const PARTIAL_DOWNLOAD_SUFFIX: &str = "part";
