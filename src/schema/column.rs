//! Column definitions

use crate::text::{is_identifier, quote_identifier};
use crate::value::{ColumnType, Value};
use crate::{Error, Result};

/// One user column of a table.
///
/// Two specs are the same column when their names match; the type,
/// nullability and default do not take part in equality.
#[derive(Debug, Clone)]
pub struct ColumnSpec {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
    pub default: Option<Value>,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, column_type: ColumnType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable,
            default: None,
        }
    }

    /// Set the `DEFAULT` literal
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Reject names that are not plain identifiers or that collide with a reserved column.
    pub fn validate(&self) -> Result<()> {
        if !is_identifier(&self.name) {
            return Err(Error::InvalidArgument(format!(
                "column name {:?} is not a valid identifier",
                self.name
            )));
        }
        if super::is_reserved(&self.name) {
            return Err(Error::InvalidArgument(format!(
                "column name {} is reserved",
                self.name
            )));
        }
        Ok(())
    }

    /// Column clause for `CREATE TABLE`, e.g. `"score" INTEGER NOT NULL DEFAULT 0`
    pub fn definition(&self) -> String {
        let mut sql = format!("{} {}", quote_identifier(&self.name), self.column_type.as_sql());
        if !self.nullable {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = &self.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(&default.to_sql_literal());
        }
        sql
    }
}

impl PartialEq for ColumnSpec {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for ColumnSpec {}

impl std::hash::Hash for ColumnSpec {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_by_name() {
        let a = ColumnSpec::new("a", ColumnType::Text, true);
        let b = ColumnSpec::new("a", ColumnType::Integer, false);
        assert_eq!(a, b);
        assert_ne!(a, ColumnSpec::new("b", ColumnType::Text, true));
    }

    #[test]
    fn test_definition() {
        let col = ColumnSpec::new("score", ColumnType::Integer, false).with_default(0);
        assert_eq!(col.definition(), "\"score\" INTEGER NOT NULL DEFAULT 0");

        let col = ColumnSpec::new("nickname", ColumnType::Text, true);
        assert_eq!(col.definition(), "\"nickname\" TEXT");

        let col = ColumnSpec::new("title", ColumnType::Text, false).with_default("n/a");
        assert_eq!(col.definition(), "\"title\" TEXT NOT NULL DEFAULT 'n/a'");
    }

    #[test]
    fn test_validate() {
        assert!(ColumnSpec::new("score", ColumnType::Integer, false).validate().is_ok());
        assert!(ColumnSpec::new("", ColumnType::Integer, false).validate().is_err());
        assert!(ColumnSpec::new("a b", ColumnType::Integer, false).validate().is_err());
        assert!(ColumnSpec::new("_id", ColumnType::Integer, false).validate().is_err());
        assert!(ColumnSpec::new("update_time", ColumnType::Text, false).validate().is_err());
    }
}
