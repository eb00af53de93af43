//! Per-table CRUD façade
//!
//! Every filter is a conjunction of `column = ?` terms in the caller's order.
//! Failures come back as typed errors and are also logged through the
//! database's sink; [`Sentinel`](crate::Sentinel) collapses them to `-1`/`0`.

use super::manager::Database;
use crate::entity::{entity_from_row, entity_values, Entity};
use crate::schema::{is_reserved, touch_assignment, TableDescriptor, ID_COLUMN};
use crate::text::{is_identifier, quote_identifier};
use crate::value::Value;
use crate::{Error, Result};
use rusqlite::params_from_iter;

const TAG: &str = "Repository";

/// Handle on one registered table of a [`Database`]
#[derive(Clone)]
pub struct Repository<'db> {
    db: &'db Database,
    table: String,
}

impl std::fmt::Debug for Repository<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository").field("table", &self.table).finish()
    }
}

impl<'db> Repository<'db> {
    pub(crate) fn new(db: &'db Database, table: &str) -> Self {
        Self {
            db,
            table: table.to_string(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Current descriptor of this table
    pub fn descriptor(&self) -> Result<TableDescriptor> {
        self.db
            .descriptor(&self.table)
            .ok_or_else(|| Error::UnknownTable(self.table.clone()))
    }

    fn logged<T>(&self, op: &str, result: Result<T>) -> Result<T> {
        result.map_err(|e| self.db.report(TAG, &format!("{}.{}", self.table, op), e))
    }

    // ========== Writes ==========

    /// Insert one row and return its `_id`.
    pub fn insert(&self, columns: &[&str], values: &[Value]) -> Result<i64> {
        self.logged("insert", self.insert_row(columns, values))
    }

    fn insert_row(&self, columns: &[&str], values: &[Value]) -> Result<i64> {
        check_pairs("insert", columns, values)?;
        let names: Vec<String> = columns.iter().map(|c| quote_identifier(c)).collect();
        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_identifier(&self.table),
            names.join(", "),
            placeholders
        );

        self.db.with_writer(|conn| {
            conn.execute(&sql, params_from_iter(values.iter()))?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Insert every mapped field of `entity`; its id and timestamp are ignored.
    pub fn insert_entity<E: Entity>(&self, entity: &E) -> Result<i64> {
        let result = self.descriptor().and_then(|descriptor| {
            let (columns, values) = split(entity_values(entity, &descriptor));
            if columns.is_empty() {
                return Err(Error::InvalidArgument(format!(
                    "{} has no fields mapped to {}",
                    std::any::type_name::<E>(),
                    self.table
                )));
            }
            let columns: Vec<&str> = columns.iter().map(String::as_str).collect();
            self.insert_row(&columns, &values)
        });
        self.logged("insert_entity", result)
    }

    /// Set `set_columns` on every row matching the filter and stamp `update_time`.
    /// Returns the number of rows changed.
    pub fn update(
        &self,
        where_columns: &[&str],
        where_values: &[Value],
        set_columns: &[&str],
        set_values: &[Value],
    ) -> Result<usize> {
        self.logged(
            "update",
            self.update_rows(where_columns, where_values, set_columns, set_values),
        )
    }

    fn update_rows(
        &self,
        where_columns: &[&str],
        where_values: &[Value],
        set_columns: &[&str],
        set_values: &[Value],
    ) -> Result<usize> {
        check_pairs("where", where_columns, where_values)?;
        check_pairs("set", set_columns, set_values)?;
        if let Some(reserved) = set_columns.iter().find(|c| is_reserved(c)) {
            return Err(Error::InvalidArgument(format!(
                "{} is managed by the database and cannot be set",
                reserved
            )));
        }

        let mut assignments: Vec<String> = set_columns
            .iter()
            .map(|c| format!("{} = ?", quote_identifier(c)))
            .collect();
        assignments.push(touch_assignment());
        let sql = format!(
            "UPDATE {} SET {} WHERE {}",
            quote_identifier(&self.table),
            assignments.join(", "),
            conjunction(where_columns)
        );

        self.db.with_writer(|conn| {
            let params = set_values.iter().chain(where_values.iter());
            Ok(conn.execute(&sql, params_from_iter(params))?)
        })
    }

    /// Write every mapped field of `entity` back to the row with its id.
    pub fn update_entity<E: Entity>(&self, entity: &E) -> Result<usize> {
        let result = self.descriptor().and_then(|descriptor| {
            if entity.id() <= 0 {
                return Err(Error::InvalidArgument(format!(
                    "{} has no row id; insert it first",
                    std::any::type_name::<E>()
                )));
            }
            let (columns, values) = split(entity_values(entity, &descriptor));
            let columns: Vec<&str> = columns.iter().map(String::as_str).collect();
            self.update_rows(&[ID_COLUMN], &[Value::Integer(entity.id())], &columns, &values)
        });
        self.logged("update_entity", result)
    }

    /// Delete every row matching the filter. Returns the number of rows removed.
    pub fn delete(&self, where_columns: &[&str], where_values: &[Value]) -> Result<usize> {
        let result = check_pairs("where", where_columns, where_values).and_then(|()| {
            let sql = format!(
                "DELETE FROM {} WHERE {}",
                quote_identifier(&self.table),
                conjunction(where_columns)
            );
            self.db
                .with_writer(|conn| Ok(conn.execute(&sql, params_from_iter(where_values.iter()))?))
        });
        self.logged("delete", result)
    }

    pub fn delete_all(&self) -> Result<usize> {
        let sql = format!("DELETE FROM {} WHERE 1", quote_identifier(&self.table));
        let result = self.db.with_writer(|conn| Ok(conn.execute(&sql, [])?));
        self.logged("delete_all", result)
    }

    // ========== Reads ==========

    /// Rows matching the filter, mapped to `E`, in the engine's natural order.
    ///
    /// One row that fails to map fails the whole query.
    pub fn query<E: Entity>(&self, where_columns: &[&str], where_values: &[Value]) -> Result<Vec<E>> {
        let result = check_pairs("where", where_columns, where_values).and_then(|()| {
            let sql = format!(
                "SELECT * FROM {} WHERE {}",
                quote_identifier(&self.table),
                conjunction(where_columns)
            );
            self.select(&sql, where_values)
        });
        self.logged("query", result)
    }

    pub fn query_all<E: Entity>(&self) -> Result<Vec<E>> {
        let sql = format!("SELECT * FROM {}", quote_identifier(&self.table));
        self.logged("query_all", self.select(&sql, &[]))
    }

    /// Row with the given `_id`, if any
    pub fn find<E: Entity>(&self, id: i64) -> Result<Option<E>> {
        let rows = self.query::<E>(&[ID_COLUMN], &[Value::Integer(id)])?;
        Ok(rows.into_iter().next())
    }

    pub fn count(&self) -> Result<usize> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_identifier(&self.table));
        let result = self.db.with_reader(|conn| {
            let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
            Ok(count as usize)
        });
        self.logged("count", result)
    }

    fn select<E: Entity>(&self, sql: &str, values: &[Value]) -> Result<Vec<E>> {
        self.db.with_reader(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
            let mut rows = stmt.query(params_from_iter(values.iter()))?;

            let mut entities = Vec::new();
            while let Some(row) = rows.next()? {
                entities.push(entity_from_row::<E>(row, &columns)?);
            }
            Ok(entities)
        })
    }
}

/// Column and value sequences must be non-empty, equally long, and name valid columns.
fn check_pairs(what: &str, columns: &[&str], values: &[Value]) -> Result<()> {
    if columns.is_empty() || values.is_empty() {
        return Err(Error::InvalidArgument(format!("{} columns/values are empty", what)));
    }
    if columns.len() != values.len() {
        return Err(Error::InvalidArgument(format!(
            "{} has {} columns but {} values",
            what,
            columns.len(),
            values.len()
        )));
    }
    if let Some(bad) = columns.iter().find(|c| !is_identifier(c)) {
        return Err(Error::InvalidArgument(format!("invalid column name {:?}", bad)));
    }
    Ok(())
}

/// `"a" = ? AND "b" = ?`
fn conjunction(columns: &[&str]) -> String {
    columns
        .iter()
        .map(|c| format!("{} = ?", quote_identifier(c)))
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn split(pairs: Vec<(String, Value)>) -> (Vec<String>, Vec<Value>) {
    pairs.into_iter().unzip()
}
