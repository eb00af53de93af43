//! Schema registry - table name to descriptor mapping
//!
//! Populated before the database opens; the create/upgrade routine reads it
//! when the file is first materialised. Entries are never removed.

use super::column::ColumnSpec;
use super::table::TableDescriptor;
use crate::entity::Entity;
use crate::log::{LogSink, Severity, TracingSink};
use crate::value::ColumnType;
use crate::{Error, Result};
use std::any::{type_name, TypeId};
use std::sync::Arc;

const TAG: &str = "SchemaRegistry";

/// Entity type a descriptor was derived from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Origin {
    type_id: TypeId,
    type_name: &'static str,
}

#[derive(Debug, Clone)]
struct Entry {
    descriptor: TableDescriptor,
    origin: Option<Origin>,
}

/// Registered table descriptors, in registration order.
#[derive(Clone)]
pub struct SchemaRegistry {
    entries: Vec<Entry>,
    sink: Arc<dyn LogSink>,
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaRegistry")
            .field("entries", &self.entries)
            .finish_non_exhaustive()
    }
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            sink: Arc::new(TracingSink),
        }
    }

    pub fn with_sink(sink: Arc<dyn LogSink>) -> Self {
        Self {
            entries: Vec::new(),
            sink,
        }
    }

    pub(crate) fn set_sink(&mut self, sink: Arc<dyn LogSink>) {
        self.sink = sink;
    }

    fn warn(&self, message: &str) {
        self.sink.log(Severity::Warn, TAG, message);
    }

    fn entry_mut(&mut self, table: &str) -> Option<&mut Entry> {
        self.entries
            .iter_mut()
            .find(|e| e.descriptor.name() == table)
    }

    /// Register a descriptor. A name that is already present is left as is.
    ///
    /// Returns true if the descriptor was added.
    pub fn register(&mut self, descriptor: TableDescriptor) -> bool {
        if self.get(descriptor.name()).is_some() {
            self.warn(&format!("register() ignored: {} is already registered", descriptor.name()));
            return false;
        }
        self.entries.push(Entry {
            descriptor,
            origin: None,
        });
        true
    }

    /// Register the descriptor derived from `E`.
    ///
    /// Registering the same type twice is a no-op. A name already taken by a
    /// different type (or by a hand-built descriptor) is a conflict: the
    /// tables would collide in storage.
    pub fn register_entity<E: Entity>(&mut self) -> Result<bool> {
        let origin = Origin {
            type_id: TypeId::of::<E>(),
            type_name: type_name::<E>(),
        };

        if let Some(existing) = self.entries.iter().find(|e| e.descriptor.name() == E::TABLE) {
            if existing.origin == Some(origin) {
                return Ok(false);
            }
            let err = Error::TableConflict {
                table: E::TABLE.to_string(),
                existing: existing
                    .origin
                    .map(|o| o.type_name.to_string())
                    .unwrap_or_else(|| "a hand-built descriptor".to_string()),
            };
            self.warn(&format!("register_entity() failed: {}", err));
            return Err(err);
        }

        let descriptor = TableDescriptor::for_entity::<E>().inspect_err(|e| {
            self.warn(&format!("register_entity() failed: {}", e));
        })?;
        self.entries.push(Entry {
            descriptor,
            origin: Some(origin),
        });
        Ok(true)
    }

    /// Append a column to a registered table. A duplicate name is ignored.
    pub fn add_column(
        &mut self,
        table: &str,
        name: &str,
        column_type: ColumnType,
        nullable: bool,
    ) -> Result<bool> {
        self.add_column_spec(table, ColumnSpec::new(name, column_type, nullable))
    }

    /// Like [`add_column`](Self::add_column), taking a full spec (with default)
    pub fn add_column_spec(&mut self, table: &str, spec: ColumnSpec) -> Result<bool> {
        let result = match self.entry_mut(table) {
            Some(entry) => entry.descriptor.add_column(spec),
            None => Err(Error::UnknownTable(table.to_string())),
        };
        match &result {
            Ok(false) => self.warn(&format!(
                "add_column() ignored: column already exists in {}",
                table
            )),
            Err(e) => self.warn(&format!("add_column() failed: {}", e)),
            Ok(true) => {}
        }
        result
    }

    /// Derive columns from `E` into a registered table
    pub fn derive_from_entity<E: Entity>(&mut self, table: &str) -> Result<usize> {
        let result = match self.entry_mut(table) {
            Some(entry) => entry.descriptor.derive_from_entity::<E>(),
            None => Err(Error::UnknownTable(table.to_string())),
        };
        if let Err(e) = &result {
            self.warn(&format!("derive_from_entity() failed: {}", e));
        }
        result
    }

    pub fn get(&self, table: &str) -> Option<&TableDescriptor> {
        self.entries
            .iter()
            .find(|e| e.descriptor.name() == table)
            .map(|e| &e.descriptor)
    }

    /// All descriptors in registration order
    pub fn descriptors(&self) -> impl Iterator<Item = &TableDescriptor> {
        self.entries.iter().map(|e| &e.descriptor)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The `CREATE TABLE` statements a fresh database gets; tables without
    /// user columns contribute none.
    pub fn create_statements(&self) -> Vec<String> {
        self.descriptors().filter_map(TableDescriptor::create_sql).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::MemorySink;
    use crate::testing::{Score, ScoreAlias};

    fn registry() -> (SchemaRegistry, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        (SchemaRegistry::with_sink(sink.clone()), sink)
    }

    #[test]
    fn test_register_is_idempotent() {
        let (mut registry, sink) = registry();
        assert!(registry.register(TableDescriptor::new("a").unwrap()));
        assert!(!registry.register(TableDescriptor::new("a").unwrap()));
        assert_eq!(registry.len(), 1);
        assert!(sink.contains(Severity::Warn, "already registered"));
    }

    #[test]
    fn test_add_column_first_wins() {
        let (mut registry, sink) = registry();
        registry.register(TableDescriptor::new("t").unwrap());

        assert!(registry.add_column("t", "a", ColumnType::Text, false).unwrap());
        assert!(!registry.add_column("t", "a", ColumnType::Integer, false).unwrap());

        let table = registry.get("t").unwrap();
        assert_eq!(table.columns().len(), 1);
        assert_eq!(table.column("a").unwrap().column_type, ColumnType::Text);
        assert!(sink.contains(Severity::Warn, "already exists"));
    }

    #[test]
    fn test_add_column_unknown_table() {
        let (mut registry, sink) = registry();
        let err = registry
            .add_column("missing", "a", ColumnType::Text, false)
            .unwrap_err();
        assert!(matches!(err, Error::UnknownTable(_)));
        assert_eq!(sink.count(Severity::Warn), 1);
    }

    #[test]
    fn test_register_entity_twice_is_noop() {
        let (mut registry, _) = registry();
        assert!(registry.register_entity::<Score>().unwrap());
        assert!(!registry.register_entity::<Score>().unwrap());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("Score").unwrap().columns().len(), 5);
    }

    #[test]
    fn test_register_entity_name_conflict() {
        let (mut registry, sink) = registry();
        registry.register_entity::<Score>().unwrap();

        let err = registry.register_entity::<ScoreAlias>().unwrap_err();
        assert!(matches!(err, Error::TableConflict { .. }));
        assert!(sink.contains(Severity::Warn, "Score"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_derive_into_manual_descriptor() {
        let (mut registry, _) = registry();
        let mut manual = TableDescriptor::new("scores").unwrap();
        manual.add("score", ColumnType::Text, true).unwrap();
        registry.register(manual);

        let added = registry.derive_from_entity::<Score>("scores").unwrap();
        assert_eq!(added, 4);
        let table = registry.get("scores").unwrap();
        assert_eq!(table.column("score").unwrap().column_type, ColumnType::Text);
    }

    #[test]
    fn test_zero_column_table_creates_nothing() {
        let (mut registry, _) = registry();
        registry.register(TableDescriptor::new("Empty").unwrap());
        assert!(registry.create_statements().is_empty());

        registry.register_entity::<Score>().unwrap();
        let statements = registry.create_statements();
        assert_eq!(statements.len(), 1);
        assert!(statements[0].starts_with("CREATE TABLE \"Score\""));
    }
}
