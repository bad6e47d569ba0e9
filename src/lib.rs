// Public API - the runner and the settings it consumes
pub mod runner;
pub mod settings;

// Internal modules - organized by subsystem
mod config;
mod coordination;
mod db;
mod formats;
mod io;
mod telemetry;
