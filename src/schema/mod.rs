//! Schema layer - engine-independent table definitions
//!
//! Every created table carries two reserved columns ahead of its user columns:
//! - `_id INTEGER PRIMARY KEY AUTOINCREMENT`
//! - `update_time TIMESTAMP NOT NULL`, defaulting to now and restamped on update

pub mod column;
pub mod registry;
pub mod table;

pub use column::ColumnSpec;
pub use registry::SchemaRegistry;
pub use table::TableDescriptor;

use crate::text::quote_identifier;

/// Name of the autoincrementing primary key column
pub const ID_COLUMN: &str = "_id";

/// Name of the update-timestamp column
pub const UPDATE_TIME_COLUMN: &str = "update_time";

/// SQL expression for "now", with millisecond precision
pub const NOW_EXPR: &str = "strftime('%Y-%m-%d %H:%M:%f', 'now')";

/// True for the two engine-managed column names
pub fn is_reserved(name: &str) -> bool {
    name == ID_COLUMN || name == UPDATE_TIME_COLUMN
}

/// `SET` term restamping `update_time` on every update.
///
/// Stamps are strictly increasing per row: when "now" is not later than the
/// stored stamp (two updates within one millisecond), the stamp advances by
/// one millisecond instead.
pub fn touch_assignment() -> String {
    let column = quote_identifier(UPDATE_TIME_COLUMN);
    format!(
        "{col} = CASE WHEN {now} > {col} THEN {now} \
         ELSE strftime('%Y-%m-%d %H:%M:%f', {col}, '+0.001 seconds') END",
        col = column,
        now = NOW_EXPR,
    )
}
