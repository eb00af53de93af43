//! Table descriptors

use super::column::ColumnSpec;
use super::{ID_COLUMN, NOW_EXPR, UPDATE_TIME_COLUMN};
use crate::entity::Entity;
use crate::text::{is_identifier, quote_identifier};
use crate::value::ColumnType;
use crate::{Error, Result};

/// Schema of one table: its name plus an ordered set of unique user columns.
///
/// The reserved `_id` and `update_time` columns are implied and never stored
/// in `columns`.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDescriptor {
    name: String,
    columns: Vec<ColumnSpec>,
}

impl TableDescriptor {
    /// Create an empty descriptor; the name must be a plain identifier.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if !is_identifier(&name) {
            return Err(Error::InvalidArgument(format!(
                "table name {:?} is not a valid identifier",
                name
            )));
        }
        Ok(Self {
            name,
            columns: Vec::new(),
        })
    }

    /// Descriptor named after `E::TABLE` with columns derived from its fields
    pub fn for_entity<E: Entity>() -> Result<Self> {
        let mut descriptor = Self::new(E::TABLE)?;
        descriptor.derive_from_entity::<E>()?;
        Ok(descriptor)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// User columns in insertion order
    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// True when there are no user columns (such a table is never created)
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Append a column. Returns `Ok(false)` if a column with that name exists;
    /// the existing column is kept.
    pub fn add_column(&mut self, spec: ColumnSpec) -> Result<bool> {
        spec.validate()?;
        if self.columns.contains(&spec) {
            return Ok(false);
        }
        self.columns.push(spec);
        Ok(true)
    }

    /// Shorthand for [`add_column`](Self::add_column) without a default
    pub fn add(&mut self, name: &str, column_type: ColumnType, nullable: bool) -> Result<bool> {
        self.add_column(ColumnSpec::new(name, column_type, nullable))
    }

    /// Add a column for every field of `E` whose kind maps to a column type.
    ///
    /// Fields of unsupported kinds and reserved names are skipped. Returns the
    /// number of columns actually added.
    pub fn derive_from_entity<E: Entity>(&mut self) -> Result<usize> {
        let mut added = 0;
        for field in E::fields() {
            let Some(column_type) = field.kind().column_type() else {
                continue;
            };
            if super::is_reserved(field.name()) {
                continue;
            }
            if self.add(field.name(), column_type, field.nullable())? {
                added += 1;
            }
        }
        Ok(added)
    }

    /// `CREATE TABLE` statement, or `None` when there are no user columns.
    pub fn create_sql(&self) -> Option<String> {
        if self.columns.is_empty() {
            return None;
        }
        let mut sql = format!(
            "CREATE TABLE {} ({} INTEGER PRIMARY KEY AUTOINCREMENT, {} TIMESTAMP NOT NULL DEFAULT ({})",
            quote_identifier(&self.name),
            ID_COLUMN,
            UPDATE_TIME_COLUMN,
            NOW_EXPR,
        );
        for column in &self.columns {
            sql.push_str(", ");
            sql.push_str(&column.definition());
        }
        sql.push(')');
        Some(sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Flagged, Score};

    #[test]
    fn test_first_registration_wins() {
        let mut table = TableDescriptor::new("t").unwrap();
        assert!(table.add("a", ColumnType::Text, true).unwrap());
        assert!(!table.add("a", ColumnType::Integer, false).unwrap());

        assert_eq!(table.columns().len(), 1);
        let a = table.column("a").unwrap();
        assert_eq!(a.column_type, ColumnType::Text);
        assert!(a.nullable);
    }

    #[test]
    fn test_invalid_names() {
        assert!(TableDescriptor::new("").is_err());
        assert!(TableDescriptor::new("users; DROP TABLE x").is_err());

        let mut table = TableDescriptor::new("t").unwrap();
        assert!(table.add("_id", ColumnType::Integer, false).is_err());
        assert!(table.is_empty());
    }

    #[test]
    fn test_create_sql() {
        let mut table = TableDescriptor::new("Player").unwrap();
        table.add("name", ColumnType::Text, false).unwrap();
        table.add("rating", ColumnType::Real, true).unwrap();

        assert_eq!(
            table.create_sql().unwrap(),
            "CREATE TABLE \"Player\" (_id INTEGER PRIMARY KEY AUTOINCREMENT, \
             update_time TIMESTAMP NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')), \
             \"name\" TEXT NOT NULL, \"rating\" REAL)"
        );
    }

    #[test]
    fn test_zero_columns_has_no_create_sql() {
        let table = TableDescriptor::new("Empty").unwrap();
        assert!(table.create_sql().is_none());
    }

    #[test]
    fn test_derive_from_entity() {
        let table = TableDescriptor::for_entity::<Score>().unwrap();
        assert_eq!(table.name(), "Score");

        let names: Vec<&str> = table.columns().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["score", "name", "ratio", "level", "note"]);

        assert_eq!(table.column("score").unwrap().column_type, ColumnType::Integer);
        assert_eq!(table.column("ratio").unwrap().column_type, ColumnType::Real);
        assert_eq!(table.column("level").unwrap().column_type, ColumnType::Integer);
        assert!(!table.column("name").unwrap().nullable);
        assert!(table.column("note").unwrap().nullable);
    }

    #[test]
    fn test_derive_skips_unsupported_kinds() {
        let table = TableDescriptor::for_entity::<Flagged>().unwrap();
        assert!(table.has_column("label"));
        assert!(!table.has_column("enabled"));
        assert!(!table.has_column("payload"));
    }
}
