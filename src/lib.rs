//! scantrack: filesystem scan history tracking.
//!
//! Ingests scan snapshots produced by an external scanning process, keeps
//! per-file change history in SQLite, aggregates statistics over that history,
//! and schedules the external scanner on an interval.

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod ingest;
pub mod logging;
pub mod scheduler;

pub use config::Config;
pub use db::Database;
pub use error::{Error, Result};
