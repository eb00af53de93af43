//! Entity <-> column mapping
//!
//! Write path: entity fields with a registered column become `(column, value)`
//! pairs. Read path: a result row populates a fresh `E::default()`, one
//! coercion per field kind. Any failure on the read path is fatal for the row.

use super::{Entity, FieldKind};
use crate::schema::{is_reserved, TableDescriptor, ID_COLUMN, UPDATE_TIME_COLUMN};
use crate::value::Value;
use crate::{Error, Result};
use rusqlite::types::ValueRef;
use rusqlite::Row;

/// Column/value pairs for every supported field of `entity` that has a column
/// in `descriptor`, in binding-table order. Reserved columns are never emitted.
pub fn entity_values<E: Entity>(entity: &E, descriptor: &TableDescriptor) -> Vec<(String, Value)> {
    E::fields()
        .iter()
        .filter(|f| f.kind().is_supported())
        .filter(|f| !is_reserved(f.name()) && descriptor.has_column(f.name()))
        .map(|f| (f.name().to_string(), f.get(entity)))
        .collect()
}

/// Build an `E` from one result row.
///
/// `columns` are the statement's column names, in row order. The reserved
/// columns are read directly into [`RowMeta`](super::RowMeta); every other
/// field whose name matches a column is coerced and set. Columns without a
/// matching field are ignored.
pub fn entity_from_row<E: Entity>(row: &Row<'_>, columns: &[String]) -> Result<E> {
    let mut entity = E::default();

    for (idx, column) in columns.iter().enumerate() {
        if column == ID_COLUMN {
            entity.meta_mut().id = row.get(idx)?;
        } else if column == UPDATE_TIME_COLUMN {
            entity.meta_mut().update_time = row.get(idx)?;
        }
    }

    for field in E::fields() {
        if !field.kind().is_supported() || is_reserved(field.name()) {
            continue;
        }
        let Some(idx) = columns.iter().position(|c| c == field.name()) else {
            continue;
        };

        let coercion_error = |reason: String| Error::Coercion {
            column: field.name().to_string(),
            reason,
        };
        let value = coerce(field.kind(), row.get_ref(idx)?).map_err(coercion_error)?;
        match field.set(&mut entity, value) {
            Some(result) => result.map_err(coercion_error)?,
            None => {
                return Err(Error::MissingSetter {
                    entity: E::TABLE,
                    column: field.name().to_string(),
                })
            }
        }
    }

    Ok(entity)
}

/// Normalise a raw column value for a field of `kind`.
///
/// NULL passes through; whether it is acceptable is up to the field type.
pub fn coerce(kind: FieldKind, raw: ValueRef<'_>) -> std::result::Result<Value, String> {
    if let ValueRef::Null = raw {
        return Ok(Value::Null);
    }
    match kind {
        FieldKind::Byte | FieldKind::Short | FieldKind::Int | FieldKind::Long => coerce_integer(raw),
        FieldKind::Float | FieldKind::Double => coerce_real(raw),
        FieldKind::Text => coerce_text(raw),
        FieldKind::Bool | FieldKind::Bytes => Err(format!("{:?} fields are not mapped", kind)),
    }
}

fn coerce_integer(raw: ValueRef<'_>) -> std::result::Result<Value, String> {
    match raw {
        ValueRef::Integer(i) => Ok(Value::Integer(i)),
        ValueRef::Real(r) if r.fract() == 0.0 && r >= i64::MIN as f64 && r <= i64::MAX as f64 => {
            Ok(Value::Integer(r as i64))
        }
        ValueRef::Text(t) => {
            let s = utf8(t)?;
            s.trim()
                .parse::<i64>()
                .map(Value::Integer)
                .map_err(|_| format!("{:?} is not an integer", s))
        }
        other => Err(format!("cannot read {:?} as an integer", other.data_type())),
    }
}

fn coerce_real(raw: ValueRef<'_>) -> std::result::Result<Value, String> {
    match raw {
        ValueRef::Real(r) => Ok(Value::Real(r)),
        ValueRef::Integer(i) => Ok(Value::Real(i as f64)),
        ValueRef::Text(t) => {
            let s = utf8(t)?;
            s.trim()
                .parse::<f64>()
                .map(Value::Real)
                .map_err(|_| format!("{:?} is not a number", s))
        }
        other => Err(format!("cannot read {:?} as a real", other.data_type())),
    }
}

fn coerce_text(raw: ValueRef<'_>) -> std::result::Result<Value, String> {
    match raw {
        ValueRef::Text(t) | ValueRef::Blob(t) => utf8(t).map(|s| Value::Text(s.to_string())),
        ValueRef::Integer(i) => Ok(Value::Text(i.to_string())),
        ValueRef::Real(r) => Ok(Value::Text(r.to_string())),
        ValueRef::Null => Ok(Value::Null),
    }
}

fn utf8(bytes: &[u8]) -> std::result::Result<&str, String> {
    std::str::from_utf8(bytes).map_err(|e| format!("invalid UTF-8: {}", e))
}
