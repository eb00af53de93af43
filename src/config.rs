//! TOML configuration for preparing a database
//!
//! ```toml
//! name = "scores"
//! version = 2
//!
//! [storage]
//! category = "inner"
//! qualifier = "store"
//! ```
//!
//! [`Database::prepare_from_file`](crate::Database::prepare_from_file) reads
//! this file; [`Database::prepare_from_config`](crate::Database::prepare_from_config)
//! takes an already-built [`StoreConfig`].

use crate::storage::{Storage, StorageCategory};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File looked up when no config path is given
pub const DEFAULT_CONFIG_FILE: &str = "daostore.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// File name; blank or absent falls back to the default name
    pub name: Option<String>,
    #[serde(default = "default_version")]
    pub version: u32,
    pub storage: Option<StorageConfig>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            name: None,
            version: default_version(),
            storage: None,
        }
    }
}

fn default_version() -> u32 {
    1
}

impl StoreConfig {
    pub fn parse(contents: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Read `path`, or [`DEFAULT_CONFIG_FILE`] in the working directory.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        if !path.is_file() {
            anyhow::bail!("no config file at {}", path.display());
        }
        Self::parse(&std::fs::read_to_string(&path)?)
    }

    /// Storage request described by the `[storage]` table, if any
    pub fn storage(&self) -> Option<Storage> {
        self.storage.as_ref().and_then(StorageConfig::to_storage)
    }
}

/// One of `memory`, `directory` or `category` (checked in that order).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub memory: bool,
    pub category: Option<StorageCategory>,
    pub qualifier: Option<String>,
    pub directory: Option<PathBuf>,
}

impl StorageConfig {
    pub fn to_storage(&self) -> Option<Storage> {
        if self.memory {
            return Some(Storage::InMemory);
        }
        if let Some(dir) = &self.directory {
            return Some(Storage::Directory(dir.clone()));
        }
        self.category.map(|category| Storage::Category {
            category,
            qualifier: self.qualifier.clone(),
        })
    }
}
