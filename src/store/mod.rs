//! Persistent checksum index for dupevault.
//!
//! This module stores one [`FileRecord`] per hashed file, keyed by path, and
//! derives duplicate groups from it on demand.
//!
//! # Architecture
//!
//! * [`database`]: SQLite persistence, schema versioning, queries.
//! * [`record`]: The row model and its ordering rules.
//! * [`global`]: The process-wide, initialize-once store handle.
//!
//! # Rebuildability
//!
//! The index is derived data: every row can be recomputed by rescanning.
//! That is why a failed schema migration drops and recreates the table
//! instead of refusing to start.

pub mod database;
pub mod global;
pub mod record;

pub use database::{DuplicateStore, StoreError, StoreResult, SCHEMA_VERSION};
pub use record::FileRecord;
