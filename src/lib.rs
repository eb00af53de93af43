//! # daostore - embedded relational persistence
//!
//! A small SQLite-backed persistence layer built around registered table
//! descriptors.
//!
//! daostore provides:
//! - Table descriptors, built by hand or derived from an entity's field bindings
//! - A schema registry that is materialised into tables on first open
//! - Versioned migrations (drop-and-recreate by default, or caller hooks)
//! - Lazily opened, cached reader/writer connections
//! - A per-table repository with equality-only CRUD and typed row mapping
//!
//! ```no_run
//! use daostore::{Database, Storage, Sentinel};
//! # use daostore::entity::{Entity, Field, RowMeta};
//! # #[derive(Default)] struct Note { meta: RowMeta, body: String }
//! # impl Entity for Note {
//! #     const TABLE: &'static str = "Note";
//! #     fn fields() -> Vec<Field<Self>> { daostore::entity_fields!(Note { body: String }) }
//! #     fn meta(&self) -> &RowMeta { &self.meta }
//! #     fn meta_mut(&mut self) -> &mut RowMeta { &mut self.meta }
//! # }
//!
//! let db = Database::builder().entity::<Note>().build();
//! db.prepare(Some(Storage::Directory("data".into())), "notes", 1)?;
//!
//! let notes = db.repository_for::<Note>()?;
//! let id = notes.insert(&["body"], &["hello".into()]).or_sentinel();
//! # Ok::<(), daostore::Error>(())
//! ```

pub mod config;
pub mod entity;
pub mod log;
pub mod schema;
pub mod storage;
pub mod text;
pub mod value;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenient access
pub use entity::{Entity, Field, FieldKind, FieldValue, RowMeta};
pub use log::{LogSink, MemorySink, Severity, TracingSink};
pub use schema::{ColumnSpec, SchemaRegistry, TableDescriptor};
pub use config::{StoreConfig, StorageConfig};
pub use storage::{
    Database, DatabaseBuilder, DirectoryResolver, FsDirectories, Migration, PrepareOutcome,
    Repository, State, Storage, StorageCategory,
};
pub use value::{ColumnType, Value};

/// Result type alias for daostore operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for daostore operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Database is not prepared: call prepare() first")]
    NotPrepared,

    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error("Table {table} is already registered by {existing}")]
    TableConflict { table: String, existing: String },

    #[error("Column {column} matches field {entity}.{column} which has no setter")]
    MissingSetter { entity: &'static str, column: String },

    #[error("Cannot coerce column {column}: {reason}")]
    Coercion { column: String, reason: String },

    #[error("Database version {persisted} is newer than requested version {requested}")]
    Downgrade { persisted: u32, requested: u32 },

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Severity this error is reported at: misuse is a warning, engine faults are errors.
    pub fn severity(&self) -> Severity {
        match self {
            Error::InvalidArgument(_)
            | Error::NotPrepared
            | Error::UnknownTable(_)
            | Error::TableConflict { .. } => Severity::Warn,
            Error::MissingSetter { .. }
            | Error::Coercion { .. }
            | Error::Downgrade { .. }
            | Error::Storage(_)
            | Error::Io(_) => Severity::Error,
        }
    }

    /// True for malformed calls and calls made in the wrong state.
    pub fn is_usage(&self) -> bool {
        self.severity() == Severity::Warn
    }
}

/// Collapse a result into the sentinel value of the plain CRUD contract.
///
/// Inserts fall back to `-1`, row counts to `0`, queries to no rows.
pub trait Sentinel {
    type Output;

    fn or_sentinel(self) -> Self::Output;
}

impl Sentinel for Result<i64> {
    type Output = i64;

    fn or_sentinel(self) -> i64 {
        self.unwrap_or(-1)
    }
}

impl Sentinel for Result<usize> {
    type Output = usize;

    fn or_sentinel(self) -> usize {
        self.unwrap_or(0)
    }
}

impl<E> Sentinel for Result<Vec<E>> {
    type Output = Vec<E>;

    fn or_sentinel(self) -> Vec<E> {
        self.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_errors_are_warnings() {
        assert!(Error::NotPrepared.is_usage());
        assert!(Error::InvalidArgument("x".into()).is_usage());
        assert!(!Error::Downgrade { persisted: 3, requested: 2 }.is_usage());
    }

    #[test]
    fn test_sentinels() {
        let failed_insert: Result<i64> = Err(Error::NotPrepared);
        assert_eq!(failed_insert.or_sentinel(), -1);

        let failed_update: Result<usize> = Err(Error::InvalidArgument("empty".into()));
        assert_eq!(failed_update.or_sentinel(), 0);

        let ok: Result<usize> = Ok(3);
        assert_eq!(ok.or_sentinel(), 3);

        let failed_query: Result<Vec<String>> = Err(Error::UnknownTable("t".into()));
        assert!(failed_query.or_sentinel().is_empty());
    }
}
