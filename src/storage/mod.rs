//! Storage Layer - SQLite-backed persistence
//!
//! One [`Database`] per application owns:
//! - the schema registry, materialised on the first writer open
//! - a cached writer connection and a cached read-only connection
//! - the `PRAGMA user_version` migration state
//!
//! [`Repository`] is the per-table CRUD façade on top of it.

pub mod location;
pub mod manager;
pub mod migrate;
pub mod repository;

pub use location::{DirectoryResolver, FsDirectories, Location, Storage, StorageCategory, normalize_name};
pub use manager::{Database, DatabaseBuilder, PrepareOutcome, State};
pub use migrate::{MigratedHook, Migration, UpgradeHook};
pub use repository::Repository;
