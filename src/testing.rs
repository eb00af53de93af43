//! Entities shared by the unit tests

use crate::entity::{Entity, Field, FieldValue, RowMeta};
use crate::entity_fields;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Score {
    pub meta: RowMeta,
    pub score: i64,
    pub name: String,
    pub ratio: f64,
    pub level: i16,
    pub note: Option<String>,
}

impl Entity for Score {
    const TABLE: &'static str = "Score";

    fn fields() -> Vec<Field<Self>> {
        entity_fields!(Score {
            score: i64,
            name: String,
            ratio: f64,
            level: i16,
            note: Option<String>,
        })
    }

    fn meta(&self) -> &RowMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RowMeta {
        &mut self.meta
    }
}

/// A second type claiming the `Score` table name
#[derive(Debug, Default)]
pub struct ScoreAlias {
    pub meta: RowMeta,
    pub points: i32,
}

impl Entity for ScoreAlias {
    const TABLE: &'static str = "Score";

    fn fields() -> Vec<Field<Self>> {
        entity_fields!(ScoreAlias { points: i32 })
    }

    fn meta(&self) -> &RowMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RowMeta {
        &mut self.meta
    }
}

/// Mixes mapped and unsupported field kinds
#[derive(Debug, Default)]
pub struct Flagged {
    pub meta: RowMeta,
    pub label: String,
    pub enabled: bool,
    pub payload: Vec<u8>,
}

impl Entity for Flagged {
    const TABLE: &'static str = "Flagged";

    fn fields() -> Vec<Field<Self>> {
        entity_fields!(Flagged {
            label: String,
            enabled: bool,
            payload: Vec<u8>,
        })
    }

    fn meta(&self) -> &RowMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RowMeta {
        &mut self.meta
    }
}

/// Has a field that can be written but never read back
#[derive(Debug, Default)]
pub struct Locked {
    pub meta: RowMeta,
    pub secret: String,
}

impl Entity for Locked {
    const TABLE: &'static str = "Locked";

    fn fields() -> Vec<Field<Self>> {
        vec![Field::read_only::<String>("secret", |e: &Locked| e.secret.to_value())]
    }

    fn meta(&self) -> &RowMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RowMeta {
        &mut self.meta
    }
}
