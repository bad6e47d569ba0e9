//! Sequential manifest processing: download, batch load, clean up

pub mod coordinator;
pub mod loader;
pub mod manifest;

pub use coordinator::{Coordinator, PlannedLoad};
pub use loader::BatchLoader;
pub use manifest::read_manifest;
