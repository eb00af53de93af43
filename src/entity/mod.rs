//! Entities - typed records bound to table columns
//!
//! An entity lists its persisted fields once, as a binding table of
//! `(name, kind, getter, setter)` entries. That table drives column
//! derivation ([`TableDescriptor::for_entity`](crate::TableDescriptor::for_entity)),
//! the write path ([`mapping::entity_values`]) and the read path
//! ([`mapping::entity_from_row`]). The [`entity_fields!`](crate::entity_fields)
//! macro builds the table from a field list.

pub mod mapping;

pub use mapping::{entity_from_row, entity_values};

use crate::value::{ColumnType, Value};

/// Declared kind of an entity field.
///
/// Integer and floating kinds of every width, plus text, map onto columns.
/// `Bool` and `Bytes` are unsupported: such fields are never given a column
/// and are ignored by the row mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    Text,
    Bool,
    Bytes,
}

impl FieldKind {
    /// Column type inferred for this kind, `None` if unsupported
    pub fn column_type(&self) -> Option<ColumnType> {
        match self {
            FieldKind::Byte | FieldKind::Short | FieldKind::Int | FieldKind::Long => {
                Some(ColumnType::Integer)
            }
            FieldKind::Float | FieldKind::Double => Some(ColumnType::Real),
            FieldKind::Text => Some(ColumnType::Text),
            FieldKind::Bool | FieldKind::Bytes => None,
        }
    }

    pub fn is_supported(&self) -> bool {
        self.column_type().is_some()
    }
}

/// A Rust type that can back an entity field.
pub trait FieldValue: Sized {
    const KIND: FieldKind;
    const NULLABLE: bool = false;

    fn to_value(&self) -> Value;

    /// Convert an already-coerced column value; fails on NULL, range or type mismatch.
    fn from_value(value: Value) -> std::result::Result<Self, String>;
}

macro_rules! integer_field {
    ($ty:ty, $kind:expr) => {
        impl FieldValue for $ty {
            const KIND: FieldKind = $kind;

            fn to_value(&self) -> Value {
                Value::Integer(i64::from(*self))
            }

            fn from_value(value: Value) -> std::result::Result<Self, String> {
                match value {
                    Value::Integer(i) => <$ty>::try_from(i)
                        .map_err(|_| format!("{} is out of range for {}", i, stringify!($ty))),
                    other => Err(format!("expected an integer, got {:?}", other)),
                }
            }
        }
    };
}

integer_field!(i8, FieldKind::Byte);
integer_field!(i16, FieldKind::Short);
integer_field!(i32, FieldKind::Int);
integer_field!(i64, FieldKind::Long);

impl FieldValue for f32 {
    const KIND: FieldKind = FieldKind::Float;

    fn to_value(&self) -> Value {
        Value::Real(f64::from(*self))
    }

    fn from_value(value: Value) -> std::result::Result<Self, String> {
        match value {
            Value::Real(r) if r.is_finite() && r.abs() > f64::from(f32::MAX) => {
                Err(format!("{} is out of range for f32", r))
            }
            Value::Real(r) => Ok(r as f32),
            other => Err(format!("expected a real, got {:?}", other)),
        }
    }
}

impl FieldValue for f64 {
    const KIND: FieldKind = FieldKind::Double;

    fn to_value(&self) -> Value {
        Value::Real(*self)
    }

    fn from_value(value: Value) -> std::result::Result<Self, String> {
        match value {
            Value::Real(r) => Ok(r),
            other => Err(format!("expected a real, got {:?}", other)),
        }
    }
}

impl FieldValue for String {
    const KIND: FieldKind = FieldKind::Text;

    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }

    fn from_value(value: Value) -> std::result::Result<Self, String> {
        match value {
            Value::Text(s) => Ok(s),
            other => Err(format!("expected text, got {:?}", other)),
        }
    }
}

impl FieldValue for bool {
    const KIND: FieldKind = FieldKind::Bool;

    fn to_value(&self) -> Value {
        Value::Integer(i64::from(*self))
    }

    fn from_value(value: Value) -> std::result::Result<Self, String> {
        match value {
            Value::Integer(i) => Ok(i != 0),
            other => Err(format!("expected an integer, got {:?}", other)),
        }
    }
}

impl FieldValue for Vec<u8> {
    const KIND: FieldKind = FieldKind::Bytes;

    fn to_value(&self) -> Value {
        Value::Text(String::from_utf8_lossy(self).into_owned())
    }

    fn from_value(value: Value) -> std::result::Result<Self, String> {
        match value {
            Value::Text(s) => Ok(s.into_bytes()),
            other => Err(format!("expected text, got {:?}", other)),
        }
    }
}

impl<T: FieldValue> FieldValue for Option<T> {
    const KIND: FieldKind = T::KIND;
    const NULLABLE: bool = true;

    fn to_value(&self) -> Value {
        match self {
            Some(v) => v.to_value(),
            None => Value::Null,
        }
    }

    fn from_value(value: Value) -> std::result::Result<Self, String> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

type Getter<E> = fn(&E) -> Value;
type Setter<E> = fn(&mut E, Value) -> std::result::Result<(), String>;

/// One entry of an entity's binding table.
pub struct Field<E> {
    name: &'static str,
    kind: FieldKind,
    nullable: bool,
    get: Getter<E>,
    set: Option<Setter<E>>,
}

impl<E> Field<E> {
    pub fn new(
        name: &'static str,
        kind: FieldKind,
        nullable: bool,
        get: Getter<E>,
        set: Setter<E>,
    ) -> Self {
        Self {
            name,
            kind,
            nullable,
            get,
            set: Some(set),
        }
    }

    /// A field backed by `T`, taking kind and nullability from the type
    pub fn of<T: FieldValue>(name: &'static str, get: Getter<E>, set: Setter<E>) -> Self {
        Self::new(name, T::KIND, T::NULLABLE, get, set)
    }

    /// A field that is written but cannot be populated from a row.
    ///
    /// Querying a table that has a column with this name fails.
    pub fn read_only<T: FieldValue>(name: &'static str, get: Getter<E>) -> Self {
        Self {
            name,
            kind: T::KIND,
            nullable: T::NULLABLE,
            get,
            set: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    pub fn nullable(&self) -> bool {
        self.nullable
    }

    pub fn has_setter(&self) -> bool {
        self.set.is_some()
    }

    pub fn get(&self, entity: &E) -> Value {
        (self.get)(entity)
    }

    /// Apply the setter; `None` when the field has no setter.
    pub fn set(&self, entity: &mut E, value: Value) -> Option<std::result::Result<(), String>> {
        self.set.map(|set| set(entity, value))
    }
}

impl<E> std::fmt::Debug for Field<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("nullable", &self.nullable)
            .field("has_setter", &self.set.is_some())
            .finish()
    }
}

/// Engine-managed part of every entity: the row id and its last update time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowMeta {
    /// Row identifier, 0 until the entity has been read back
    pub id: i64,
    /// `update_time` as stored by the engine
    pub update_time: Option<String>,
}

/// A typed record mapped to exactly one table.
pub trait Entity: Default + 'static {
    /// Table name; also the registry identity of the derived descriptor
    const TABLE: &'static str;

    /// Binding table for the persisted fields, in column order
    fn fields() -> Vec<Field<Self>>;

    fn meta(&self) -> &RowMeta;

    fn meta_mut(&mut self) -> &mut RowMeta;

    fn id(&self) -> i64 {
        self.meta().id
    }

    fn update_time(&self) -> Option<&str> {
        self.meta().update_time.as_deref()
    }
}

/// Build an entity's binding table from `Type { field: FieldType, ... }`.
///
/// ```
/// use daostore::entity::{Entity, Field, RowMeta};
///
/// #[derive(Default)]
/// struct Player {
///     meta: RowMeta,
///     name: String,
///     rating: Option<f64>,
/// }
///
/// impl Entity for Player {
///     const TABLE: &'static str = "Player";
///
///     fn fields() -> Vec<Field<Self>> {
///         daostore::entity_fields!(Player { name: String, rating: Option<f64> })
///     }
///
///     fn meta(&self) -> &RowMeta { &self.meta }
///     fn meta_mut(&mut self) -> &mut RowMeta { &mut self.meta }
/// }
///
/// assert_eq!(Player::fields().len(), 2);
/// ```
#[macro_export]
macro_rules! entity_fields {
    ($entity:ident { $($field:ident : $ty:ty),* $(,)? }) => {
        vec![$(
            $crate::entity::Field::<$entity>::of::<$ty>(
                stringify!($field),
                |e: &$entity| $crate::entity::FieldValue::to_value(&e.$field),
                |e: &mut $entity, v: $crate::value::Value| {
                    e.$field = <$ty as $crate::entity::FieldValue>::from_value(v)?;
                    Ok(())
                },
            )
        ),*]
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Score;

    #[test]
    fn test_kind_column_types() {
        assert_eq!(FieldKind::Byte.column_type(), Some(ColumnType::Integer));
        assert_eq!(FieldKind::Long.column_type(), Some(ColumnType::Integer));
        assert_eq!(FieldKind::Float.column_type(), Some(ColumnType::Real));
        assert_eq!(FieldKind::Text.column_type(), Some(ColumnType::Text));
        assert!(!FieldKind::Bool.is_supported());
        assert!(!FieldKind::Bytes.is_supported());
    }

    #[test]
    fn test_integer_narrowing() {
        assert_eq!(i8::from_value(Value::Integer(-128)).unwrap(), -128);
        assert!(i8::from_value(Value::Integer(128)).is_err());
        assert!(i16::from_value(Value::Integer(40_000)).is_err());
        assert_eq!(i32::from_value(Value::Integer(7)).unwrap(), 7);
        assert!(i64::from_value(Value::Null).is_err());
    }

    #[test]
    fn test_option_fields() {
        assert!(<Option<String>>::NULLABLE);
        assert_eq!(<Option<i32>>::KIND, FieldKind::Int);
        assert_eq!(<Option<String>>::from_value(Value::Null).unwrap(), None);
        assert_eq!(
            <Option<String>>::from_value(Value::Text("x".into())).unwrap(),
            Some("x".to_string())
        );
    }

    #[test]
    fn test_binding_table_get_and_set() {
        let fields = Score::fields();
        let score = fields.iter().find(|f| f.name() == "score").unwrap();
        assert_eq!(score.kind(), FieldKind::Long);
        assert!(score.has_setter());

        let mut entity = Score::default();
        score.set(&mut entity, Value::Integer(42)).unwrap().unwrap();
        assert_eq!(entity.score, 42);
        assert_eq!(score.get(&entity), Value::Integer(42));

        let err = score.set(&mut entity, Value::Text("x".into())).unwrap();
        assert!(err.is_err());
    }
}
