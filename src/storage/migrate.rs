//! Create and upgrade routines, run when the writer connection first opens
//!
//! The schema version lives in `PRAGMA user_version`; 0 means the file has
//! never been materialised.

use crate::log::{LogSink, Severity};
use crate::schema::SchemaRegistry;
use crate::text::quote_identifier;
use crate::{Error, Result};
use rusqlite::Connection;

const TAG: &str = "Migrate";

/// Custom upgrade: replaces the default drop-and-recreate policy.
///
/// Receives `(connection, persisted_version, requested_version)`.
pub type UpgradeHook = Box<dyn Fn(&Connection, u32, u32) -> rusqlite::Result<()> + Send + Sync>;

/// Runs after tables were created or upgraded, e.g. to seed default rows.
pub type MigratedHook = Box<dyn Fn(&Connection, Migration) -> rusqlite::Result<()> + Send + Sync>;

/// Which migration path ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Migration {
    /// Fresh file: every registered table was created
    Created { version: u32 },
    /// Persisted version was older than the requested one
    Upgraded { from: u32, to: u32 },
}

#[derive(Default)]
pub(crate) struct Hooks {
    pub upgrade: Option<UpgradeHook>,
    pub migrated: Option<MigratedHook>,
}

pub(crate) fn user_version(conn: &Connection) -> Result<u32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

/// Bring `conn` to `requested`, in one transaction together with the version bump.
///
/// Returns `None` when the file was already at `requested`.
pub(crate) fn run(
    conn: &mut Connection,
    registry: &SchemaRegistry,
    hooks: &Hooks,
    sink: &dyn LogSink,
    requested: u32,
) -> Result<Option<Migration>> {
    let persisted = user_version(conn)?;
    if persisted == requested {
        return Ok(None);
    }
    if persisted > requested {
        return Err(Error::Downgrade {
            persisted,
            requested,
        });
    }

    let tx = conn.transaction()?;
    let migration = if persisted == 0 {
        create_tables(&tx, registry, sink)?;
        Migration::Created { version: requested }
    } else {
        upgrade(&tx, registry, hooks, sink, persisted, requested)?;
        Migration::Upgraded {
            from: persisted,
            to: requested,
        }
    };
    tx.pragma_update(None, "user_version", requested)?;
    if let Some(hook) = &hooks.migrated {
        hook(&tx, migration)?;
    }
    tx.commit()?;

    sink.log(Severity::Info, TAG, &format!("{:?}", migration));
    Ok(Some(migration))
}

/// Create every registered table that has user columns. Returns how many were created.
pub(crate) fn create_tables(
    conn: &Connection,
    registry: &SchemaRegistry,
    sink: &dyn LogSink,
) -> Result<usize> {
    let mut created = 0;
    for descriptor in registry.descriptors() {
        match descriptor.create_sql() {
            Some(sql) => {
                conn.execute_batch(&sql)?;
                sink.log(Severity::Debug, TAG, &format!("create table: {}", descriptor.name()));
                created += 1;
            }
            None => sink.log(
                Severity::Debug,
                TAG,
                &format!("skip table {}: no columns", descriptor.name()),
            ),
        }
    }
    Ok(created)
}

fn upgrade(
    conn: &Connection,
    registry: &SchemaRegistry,
    hooks: &Hooks,
    sink: &dyn LogSink,
    from: u32,
    to: u32,
) -> Result<()> {
    if let Some(hook) = &hooks.upgrade {
        hook(conn, from, to)?;
        return Ok(());
    }
    drop_all_tables(conn, sink)?;
    create_tables(conn, registry, sink)?;
    Ok(())
}

/// Drop every table except SQLite's own (`sqlite_sequence` and friends).
pub(crate) fn drop_all_tables(conn: &Connection, sink: &dyn LogSink) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\'",
    )?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    for name in &names {
        conn.execute_batch(&format!("DROP TABLE IF EXISTS {}", quote_identifier(name)))?;
        sink.log(Severity::Debug, TAG, &format!("delete table: {}", name));
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::MemorySink;
    use crate::schema::TableDescriptor;
    use crate::testing::Score;

    fn table_names(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap();
        stmt.query_map([], |row| row.get(0))
            .unwrap()
            .collect::<rusqlite::Result<Vec<String>>>()
            .unwrap()
    }

    fn registry() -> SchemaRegistry {
        let mut registry = SchemaRegistry::new();
        registry.register_entity::<Score>().unwrap();
        registry.register(TableDescriptor::new("Empty").unwrap());
        registry
    }

    #[test]
    fn test_fresh_database_is_created() {
        let mut conn = Connection::open_in_memory().unwrap();
        let sink = MemorySink::new();

        let migration = run(&mut conn, &registry(), &Hooks::default(), &sink, 1).unwrap();
        assert_eq!(migration, Some(Migration::Created { version: 1 }));
        assert_eq!(user_version(&conn).unwrap(), 1);

        let names = table_names(&conn);
        assert!(names.contains(&"Score".to_string()));
        assert!(!names.contains(&"Empty".to_string()));
        assert!(sink.contains(Severity::Debug, "skip table Empty"));
    }

    #[test]
    fn test_same_version_is_noop() {
        let mut conn = Connection::open_in_memory().unwrap();
        let sink = MemorySink::new();
        run(&mut conn, &registry(), &Hooks::default(), &sink, 2).unwrap();
        let again = run(&mut conn, &registry(), &Hooks::default(), &sink, 2).unwrap();
        assert_eq!(again, None);
    }

    #[test]
    fn test_downgrade_is_rejected() {
        let mut conn = Connection::open_in_memory().unwrap();
        let sink = MemorySink::new();
        run(&mut conn, &registry(), &Hooks::default(), &sink, 3).unwrap();
        let err = run(&mut conn, &registry(), &Hooks::default(), &sink, 2).unwrap_err();
        assert!(matches!(err, Error::Downgrade { persisted: 3, requested: 2 }));
    }

    #[test]
    fn test_default_upgrade_recreates_tables() {
        let mut conn = Connection::open_in_memory().unwrap();
        let sink = MemorySink::new();
        run(&mut conn, &registry(), &Hooks::default(), &sink, 1).unwrap();
        conn.execute("CREATE TABLE legacy (v INTEGER)", []).unwrap();
        conn.execute("INSERT INTO Score (score, name, ratio, level) VALUES (1, 'a', 0, 0)", [])
            .unwrap();

        let migration = run(&mut conn, &registry(), &Hooks::default(), &sink, 2).unwrap();
        assert_eq!(migration, Some(Migration::Upgraded { from: 1, to: 2 }));

        let names = table_names(&conn);
        assert!(!names.contains(&"legacy".to_string()));
        let rows: i64 = conn.query_row("SELECT COUNT(*) FROM Score", [], |r| r.get(0)).unwrap();
        assert_eq!(rows, 0);
        assert!(sink.contains(Severity::Debug, "delete table: legacy"));
    }

    #[test]
    fn test_upgrade_hook_replaces_default() {
        let mut conn = Connection::open_in_memory().unwrap();
        let sink = MemorySink::new();
        run(&mut conn, &registry(), &Hooks::default(), &sink, 1).unwrap();
        conn.execute("INSERT INTO Score (score, name, ratio, level) VALUES (1, 'a', 0, 0)", [])
            .unwrap();

        let hooks = Hooks {
            upgrade: Some(Box::new(|conn: &Connection, from: u32, to: u32| {
                assert_eq!((from, to), (1, 2));
                conn.execute_batch("ALTER TABLE Score ADD COLUMN extra TEXT")
            })),
            migrated: Some(Box::new(|conn: &Connection, migration: Migration| {
                assert_eq!(migration, Migration::Upgraded { from: 1, to: 2 });
                conn.execute("INSERT INTO Score (score, name, ratio, level) VALUES (2, 'seed', 0, 0)", [])
                    .map(|_| ())
            })),
        };
        run(&mut conn, &registry(), &hooks, &sink, 2).unwrap();

        let rows: i64 = conn.query_row("SELECT COUNT(*) FROM Score", [], |r| r.get(0)).unwrap();
        assert_eq!(rows, 2);
    }

    #[test]
    fn test_failed_hook_rolls_back() {
        let mut conn = Connection::open_in_memory().unwrap();
        let sink = MemorySink::new();
        let hooks = Hooks {
            upgrade: None,
            migrated: Some(Box::new(|conn: &Connection, _: Migration| {
                conn.execute_batch("INSERT INTO missing VALUES (1)")
            })),
        };
        assert!(run(&mut conn, &registry(), &hooks, &sink, 1).is_err());
        assert_eq!(user_version(&conn).unwrap(), 0);
        assert!(!table_names(&conn).contains(&"Score".to_string()));
    }
}
