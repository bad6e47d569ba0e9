//! Database layer - connection pooling, catalog lookups, and type inference

pub mod pool;
pub mod schema;

pub use pool::Pool;
pub use schema::{Column, SchemaInferrer, SqlType, TableRef};
