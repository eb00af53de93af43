//! Database manager - prepare once, open lazily, migrate on first open

use super::location::{DirectoryResolver, Location, Storage, ensure_parent_dir, normalize_name};
use super::migrate::{self, Hooks, Migration, MigratedHook, UpgradeHook};
use super::repository::Repository;
use crate::config::StoreConfig;
use crate::entity::Entity;
use crate::log::{LogSink, Severity, TracingSink};
use crate::schema::{ColumnSpec, SchemaRegistry, TableDescriptor};
use crate::value::ColumnType;
use crate::{Error, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock, TryLockError};

const TAG: &str = "Database";

/// Lifecycle of a [`Database`]; `Prepared` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Unprepared,
    Preparing,
    Prepared,
}

/// Result of a successful [`Database::prepare`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrepareOutcome {
    /// This call's parameters took effect
    Applied,
    /// An earlier call already prepared the database; nothing changed
    AlreadyPrepared,
}

#[derive(Debug, Clone)]
struct Prepared {
    name: String,
    version: u32,
    location: Location,
}

/// Owns the schema registry and the single database's connection pair.
///
/// Construct one per application with [`Database::builder`], register every
/// table, then call [`prepare`](Self::prepare) once. Connections open on first
/// use; the first writer open creates or upgrades the schema.
///
/// Each cached connection sits behind its own lock and is opened at most
/// once, however many threads race the first access. In-memory databases are
/// served by the writer connection alone.
///
/// Closures passed to [`with_writer`](Self::with_writer) and
/// [`with_reader`](Self::with_reader) must not use the database again: no
/// nested `with_writer`/`with_reader` and no [`Repository`] calls. The
/// connection locks are not re-entrant and such calls deadlock.
pub struct Database {
    registry: RwLock<SchemaRegistry>,
    hooks: Hooks,
    sink: Arc<dyn LogSink>,
    directories: Option<Arc<dyn DirectoryResolver>>,
    prepare_lock: Mutex<()>,
    prepared: OnceLock<Prepared>,
    writer: Mutex<Option<Connection>>,
    reader: Mutex<Option<Connection>>,
    opened: AtomicBool,
}

/// Collects registrations, hooks and collaborators before the database exists.
pub struct DatabaseBuilder {
    registry: SchemaRegistry,
    hooks: Hooks,
    sink: Arc<dyn LogSink>,
    directories: Option<Arc<dyn DirectoryResolver>>,
}

impl Default for DatabaseBuilder {
    fn default() -> Self {
        let sink: Arc<dyn LogSink> = Arc::new(TracingSink);
        Self {
            registry: SchemaRegistry::with_sink(sink.clone()),
            hooks: Hooks::default(),
            sink,
            directories: None,
        }
    }
}

impl DatabaseBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log sink for every warning and error; defaults to [`TracingSink`]
    pub fn sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.registry.set_sink(sink.clone());
        self.sink = sink;
        self
    }

    /// Resolver consulted for [`Storage::Category`] locations
    pub fn directories(mut self, directories: Arc<dyn DirectoryResolver>) -> Self {
        self.directories = Some(directories);
        self
    }

    /// Register the table derived from `E`; conflicts are logged and skipped.
    pub fn entity<E: Entity>(mut self) -> Self {
        let _ = self.registry.register_entity::<E>();
        self
    }

    /// Register a hand-built table
    pub fn table(mut self, descriptor: TableDescriptor) -> Self {
        self.registry.register(descriptor);
        self
    }

    /// Replace the default drop-and-recreate upgrade
    pub fn on_upgrade<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Connection, u32, u32) -> rusqlite::Result<()> + Send + Sync + 'static,
    {
        self.hooks.upgrade = Some(Box::new(hook) as UpgradeHook);
        self
    }

    /// Run after every create or upgrade, inside the migration transaction
    pub fn on_migrated<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Connection, Migration) -> rusqlite::Result<()> + Send + Sync + 'static,
    {
        self.hooks.migrated = Some(Box::new(hook) as MigratedHook);
        self
    }

    pub fn build(self) -> Database {
        Database {
            registry: RwLock::new(self.registry),
            hooks: self.hooks,
            sink: self.sink,
            directories: self.directories,
            prepare_lock: Mutex::new(()),
            prepared: OnceLock::new(),
            writer: Mutex::new(None),
            reader: Mutex::new(None),
            opened: AtomicBool::new(false),
        }
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Database {
    pub fn builder() -> DatabaseBuilder {
        DatabaseBuilder::new()
    }

    /// Log `err` under `op` at its own severity and hand it back.
    pub(crate) fn report(&self, tag: &str, op: &str, err: Error) -> Error {
        self.sink
            .log(err.severity(), tag, &format!("{}() failed: {}", op, err));
        err
    }

    // ========== Registration ==========

    fn warn_if_open(&self, what: &str) {
        if self.opened.load(Ordering::Acquire) {
            self.sink.log(
                Severity::Warn,
                TAG,
                &format!(
                    "{} after the database was opened: existing storage is not altered",
                    what
                ),
            );
        }
    }

    /// Register a hand-built table (no-op if the name is taken)
    pub fn register(&self, descriptor: TableDescriptor) -> bool {
        self.warn_if_open(&format!("register({})", descriptor.name()));
        self.registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .register(descriptor)
    }

    pub fn register_entity<E: Entity>(&self) -> Result<bool> {
        self.warn_if_open(&format!("register_entity({})", E::TABLE));
        self.registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .register_entity::<E>()
    }

    pub fn add_column(
        &self,
        table: &str,
        name: &str,
        column_type: ColumnType,
        nullable: bool,
    ) -> Result<bool> {
        self.add_column_spec(table, ColumnSpec::new(name, column_type, nullable))
    }

    pub fn add_column_spec(&self, table: &str, spec: ColumnSpec) -> Result<bool> {
        self.warn_if_open(&format!("add_column({}.{})", table, spec.name));
        self.registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .add_column_spec(table, spec)
    }

    pub fn derive_from_entity<E: Entity>(&self, table: &str) -> Result<usize> {
        self.warn_if_open(&format!("derive_from_entity({})", table));
        self.registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .derive_from_entity::<E>(table)
    }

    /// Copy of a registered descriptor
    pub fn descriptor(&self, table: &str) -> Option<TableDescriptor> {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(table)
            .cloned()
    }

    /// Snapshot of the whole registry
    pub fn registry(&self) -> SchemaRegistry {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    // ========== Lifecycle ==========

    /// Fix the database's location, name and version. Only the first
    /// successful call has any effect.
    ///
    /// Fails, leaving the database unprepared, when `storage` is absent,
    /// `version` is 0, or the storage directory cannot be resolved or created.
    /// The connection itself is not opened here.
    pub fn prepare(
        &self,
        storage: Option<Storage>,
        name: &str,
        version: u32,
    ) -> Result<PrepareOutcome> {
        if self.prepared.get().is_some() {
            return Ok(PrepareOutcome::AlreadyPrepared);
        }
        let _guard = self.prepare_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if self.prepared.get().is_some() {
            return Ok(PrepareOutcome::AlreadyPrepared);
        }

        if version < 1 {
            return Err(self.report(
                TAG,
                "prepare",
                Error::InvalidArgument("version must be at least 1".to_string()),
            ));
        }
        let Some(storage) = storage else {
            return Err(self.report(
                TAG,
                "prepare",
                Error::InvalidArgument("storage is absent".to_string()),
            ));
        };

        let name = normalize_name(name);
        let location = self
            .resolve(&storage, &name)
            .map_err(|e| self.report(TAG, "prepare", e))?;

        self.sink.log(
            Severity::Info,
            TAG,
            &format!("prepared {} at version {}", location, version),
        );
        let _ = self.prepared.set(Prepared {
            name,
            version,
            location,
        });
        Ok(PrepareOutcome::Applied)
    }

    /// [`prepare`](Self::prepare) with parameters from a [`StoreConfig`]
    pub fn prepare_from_config(&self, config: &StoreConfig) -> Result<PrepareOutcome> {
        self.prepare(config.storage(), config.name.as_deref().unwrap_or(""), config.version)
    }

    /// Load a TOML config (default `daostore.toml`) and prepare from it.
    pub fn prepare_from_file(&self, path: Option<&Path>) -> anyhow::Result<PrepareOutcome> {
        let config = StoreConfig::load(path).inspect_err(|e| {
            self.sink
                .log(Severity::Warn, TAG, &format!("prepare_from_file() failed: {}", e));
        })?;
        Ok(self.prepare_from_config(&config)?)
    }

    fn resolve(&self, storage: &Storage, name: &str) -> Result<Location> {
        let dir = match storage {
            Storage::InMemory => return Ok(Location::memory(name)),
            Storage::Directory(dir) => dir.clone(),
            Storage::Category {
                category,
                qualifier,
            } => {
                let resolver = self.directories.as_ref().ok_or_else(|| {
                    Error::InvalidArgument("no directory resolver configured".to_string())
                })?;
                resolver
                    .resolve(*category, qualifier.as_deref())
                    .ok_or_else(|| {
                        Error::InvalidArgument(format!("no directory for category {}", category))
                    })?
            }
        };
        let path = dir.join(name);
        ensure_parent_dir(&path)?;
        Ok(Location::File(path))
    }

    pub fn state(&self) -> State {
        if self.prepared.get().is_some() {
            return State::Prepared;
        }
        match self.prepare_lock.try_lock() {
            Err(TryLockError::WouldBlock) => State::Preparing,
            _ => State::Unprepared,
        }
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared.get().is_some()
    }

    /// Normalised file name, once prepared
    pub fn name(&self) -> Option<&str> {
        self.prepared.get().map(|p| p.name.as_str())
    }

    /// Requested schema version, once prepared
    pub fn version(&self) -> Option<u32> {
        self.prepared.get().map(|p| p.version)
    }

    pub fn location(&self) -> Option<&Location> {
        self.prepared.get().map(|p| &p.location)
    }

    /// Database file path (`None` for in-memory or unprepared)
    pub fn database_path(&self) -> Option<&Path> {
        self.location().and_then(Location::path)
    }

    fn require_prepared(&self) -> Result<&Prepared> {
        self.prepared.get().ok_or(Error::NotPrepared)
    }

    fn open_writer(&self, prepared: &Prepared) -> Result<Connection> {
        let mut conn = prepared.location.open(false)?;
        self.opened.store(true, Ordering::Release);
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        migrate::run(
            &mut conn,
            &registry,
            &self.hooks,
            self.sink.as_ref(),
            prepared.version,
        )?;
        Ok(conn)
    }

    /// Run `f` on the cached writer connection, opening (and migrating) it first if needed.
    pub fn with_writer<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let prepared = self.require_prepared()?;
        let mut guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let conn = match guard.take() {
            Some(conn) => guard.insert(conn),
            None => {
                let conn = self.open_writer(prepared)?;
                self.sink.log(Severity::Debug, TAG, "writer connection opened");
                guard.insert(conn)
            }
        };
        f(conn)
    }

    /// Run `f` on the cached read-only connection.
    ///
    /// The writer is opened first when needed so the schema exists before
    /// reading. In-memory databases read through the writer: shared-cache
    /// table locks fail at once instead of waiting for the busy timeout.
    pub fn with_reader<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let prepared = self.require_prepared()?;
        if let Location::Memory(_) = prepared.location {
            return self.with_writer(f);
        }
        if self.reader.lock().unwrap_or_else(PoisonError::into_inner).is_none() {
            self.with_writer(|_| Ok(()))?;
        }
        let mut guard = self.reader.lock().unwrap_or_else(PoisonError::into_inner);
        let conn = match guard.take() {
            Some(conn) => guard.insert(conn),
            None => {
                let conn = prepared.location.open(true)?;
                self.sink.log(Severity::Debug, TAG, "reader connection opened");
                guard.insert(conn)
            }
        };
        f(conn)
    }

    /// Close both cached connections. The next access reopens them.
    pub fn close(&self) {
        for (role, slot) in [("reader", &self.reader), ("writer", &self.writer)] {
            let conn = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
            if let Some(conn) = conn {
                match conn.close() {
                    Ok(()) => self.sink.log(Severity::Debug, TAG, &format!("{} connection closed", role)),
                    Err((_, e)) => {
                        self.report(TAG, "close", Error::Storage(e));
                    }
                }
            }
        }
    }

    /// Physical version of the open file (opens the writer if needed)
    pub fn persisted_version(&self) -> Result<u32> {
        self.with_writer(migrate::user_version)
    }

    // ========== Repositories ==========

    /// CRUD façade for a registered table
    pub fn repository(&self, table: &str) -> Result<Repository<'_>> {
        if self.descriptor(table).is_none() {
            return Err(self.report(TAG, "repository", Error::UnknownTable(table.to_string())));
        }
        Ok(Repository::new(self, table))
    }

    /// CRUD façade for `E`'s table
    pub fn repository_for<E: Entity>(&self) -> Result<Repository<'_>> {
        self.repository(E::TABLE)
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        self.close();
    }
}
