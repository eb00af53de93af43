//! Where the database file lives
//!
//! Callers describe storage as a [`Storage`] value; `prepare` turns it into a
//! concrete [`Location`], consulting a [`DirectoryResolver`] for categories.

use crate::text::is_blank;
use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// File name used when the caller passes a blank name
pub const DEFAULT_NAME: &str = "database";

/// Extension every database file carries
pub const EXTENSION: &str = ".db";

/// Storage categories a [`DirectoryResolver`] knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageCategory {
    /// Private directory named by the qualifier (required)
    Inner,
    /// Private files directory
    Files,
    /// Private cache; contents may be evicted
    Cache,
    /// Shared files directory, optionally narrowed by the qualifier
    ExternalFiles,
    /// Shared cache directory
    ExternalCache,
}

impl std::fmt::Display for StorageCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StorageCategory::Inner => "inner",
            StorageCategory::Files => "files",
            StorageCategory::Cache => "cache",
            StorageCategory::ExternalFiles => "external_files",
            StorageCategory::ExternalCache => "external_cache",
        };
        f.write_str(s)
    }
}

/// Directory lookup collaborator.
pub trait DirectoryResolver: Send + Sync {
    /// Directory for `category`, or `None` if unavailable.
    fn resolve(&self, category: StorageCategory, qualifier: Option<&str>) -> Option<PathBuf>;
}

/// Resolves categories to sub-directories of one root.
///
/// ```text
/// inner           <root>/app_<qualifier>
/// files           <root>/files
/// cache           <root>/cache
/// external_files  <root>/external/files[/<qualifier>]
/// external_cache  <root>/external/cache
/// ```
#[derive(Debug, Clone)]
pub struct FsDirectories {
    root: PathBuf,
}

impl FsDirectories {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl DirectoryResolver for FsDirectories {
    fn resolve(&self, category: StorageCategory, qualifier: Option<&str>) -> Option<PathBuf> {
        let qualifier = qualifier.filter(|q| !is_blank(q));
        match category {
            StorageCategory::Inner => qualifier.map(|q| self.root.join(format!("app_{}", q))),
            StorageCategory::Files => Some(self.root.join("files")),
            StorageCategory::Cache => Some(self.root.join("cache")),
            StorageCategory::ExternalFiles => {
                let dir = self.root.join("external").join("files");
                Some(match qualifier {
                    Some(q) => dir.join(q),
                    None => dir,
                })
            }
            StorageCategory::ExternalCache => Some(self.root.join("external").join("cache")),
        }
    }
}

/// Caller-side description of where to keep the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Storage {
    /// Memory database, gone once the database closes its connection
    InMemory,
    /// A directory looked up through the configured [`DirectoryResolver`]
    Category {
        category: StorageCategory,
        qualifier: Option<String>,
    },
    /// An explicit directory
    Directory(PathBuf),
}

impl Storage {
    pub fn category(category: StorageCategory) -> Self {
        Storage::Category {
            category,
            qualifier: None,
        }
    }
}

/// Resolved database location
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    File(PathBuf),
    /// Shared-cache URI name, unique per prepared database
    Memory(String),
}

static MEMORY_SEQ: AtomicU64 = AtomicU64::new(0);

impl Location {
    pub(crate) fn memory(name: &str) -> Self {
        let seq = MEMORY_SEQ.fetch_add(1, Ordering::Relaxed);
        Location::Memory(format!("{}-{}-{}", std::process::id(), seq, name))
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Location::File(path) => Some(path),
            Location::Memory(_) => None,
        }
    }

    /// Open a connection; read-only handles never create the file.
    ///
    /// Memory locations always open read-write: the database keeps a single
    /// connection to them.
    pub(crate) fn open(&self, read_only: bool) -> rusqlite::Result<Connection> {
        let base = OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let read_write = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE;
        match self {
            Location::File(path) if read_only => {
                Connection::open_with_flags(path, base | OpenFlags::SQLITE_OPEN_READ_ONLY)
            }
            Location::File(path) => Connection::open_with_flags(path, base | read_write),
            Location::Memory(name) => Connection::open_with_flags(
                format!("file:{}?mode=memory&cache=shared", name),
                base | read_write,
            ),
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Location::File(path) => write!(f, "{}", path.display()),
            Location::Memory(name) => write!(f, "memory:{}", name),
        }
    }
}

/// Create the directory a database file lives in, if missing.
pub(crate) fn ensure_parent_dir(db_path: &Path) -> std::io::Result<()> {
    match db_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

/// Blank names fall back to [`DEFAULT_NAME`]; the extension is appended unless
/// already present.
pub fn normalize_name(name: &str) -> String {
    let name = if is_blank(name) { DEFAULT_NAME } else { name.trim() };
    if name.ends_with(EXTENSION) {
        name.to_string()
    } else {
        format!("{}{}", name, EXTENSION)
    }
}
