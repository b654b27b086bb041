//! Embedded schema migrations.
//!
//! Each migration is an SQL file compiled into the binary. The runner
//! records applied names in `_wzrd_migrations` and applies the rest in
//! order, one transaction per migration.

use rusqlite::Connection;
use thiserror::Error;

const TRACKING_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS _wzrd_migrations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);";

struct Migration {
    name: &'static str,
    sql: &'static str,
}

/// Schema history, oldest first. Append only.
const MIGRATIONS: &[Migration] = &[
    Migration {
        name: "000_init",
        sql: include_str!("migrations/000_init.sql"),
    },
    Migration {
        name: "001_digital_twins",
        sql: include_str!("migrations/001_digital_twins.sql"),
    },
    Migration {
        name: "002_conversations",
        sql: include_str!("migrations/002_conversations.sql"),
    },
    Migration {
        name: "003_messages",
        sql: include_str!("migrations/003_messages.sql"),
    },
];

/// Errors that can occur while migrating the schema.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// A migration's SQL or its tracking insert failed.
    #[error("migration '{name}' failed: {source}")]
    ExecutionFailed {
        name: String,
        source: rusqlite::Error,
    },

    /// The tracking table could not be queried.
    #[error("failed to check migration state: {0}")]
    StateQuery(rusqlite::Error),
}

/// Applies every pending migration and returns how many ran.
///
/// # Errors
///
/// Returns `MigrationError` if a migration fails or the tracking table
/// cannot be read. A failed migration leaves no partial schema behind.
pub fn run_migrations(conn: &Connection) -> Result<usize, MigrationError> {
    apply(conn, MIGRATIONS)
}

fn apply(conn: &Connection, migrations: &[Migration]) -> Result<usize, MigrationError> {
    conn.execute_batch(TRACKING_TABLE_SQL)
        .map_err(|source| MigrationError::ExecutionFailed {
            name: "_wzrd_migrations".to_string(),
            source,
        })?;

    let mut applied = 0;

    for migration in migrations {
        let done: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM _wzrd_migrations WHERE name = ?1)",
                [migration.name],
                |row| row.get(0),
            )
            .map_err(MigrationError::StateQuery)?;

        if done {
            tracing::debug!(migration = migration.name, "already applied");
            continue;
        }

        tracing::info!(migration = migration.name, "applying migration");

        let failed = |source| MigrationError::ExecutionFailed {
            name: migration.name.to_string(),
            source,
        };

        let tx = conn.unchecked_transaction().map_err(failed)?;
        tx.execute_batch(migration.sql).map_err(failed)?;
        tx.execute(
            "INSERT INTO _wzrd_migrations (name) VALUES (?1)",
            [migration.name],
        )
        .map_err(failed)?;
        tx.commit().map_err(failed)?;

        applied += 1;
    }

    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
            [name],
            |row| row.get(0),
        )
        .expect("should query sqlite_master")
    }

    #[test]
    fn fresh_database_gets_every_migration() {
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        let applied = run_migrations(&conn).expect("migrations should succeed");
        assert_eq!(applied, MIGRATIONS.len());

        for table in ["digital_twins", "conversations", "messages"] {
            assert!(table_exists(&conn, table), "{table} table should exist");
        }
    }

    #[test]
    fn second_run_is_a_no_op() {
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        run_migrations(&conn).expect("first run should succeed");

        let second = run_migrations(&conn).expect("second run should succeed");
        assert_eq!(second, 0);

        let recorded: i64 = conn
            .query_row("SELECT COUNT(*) FROM _wzrd_migrations", [], |row| row.get(0))
            .expect("should count migrations");
        assert_eq!(recorded, MIGRATIONS.len() as i64);
    }

    #[test]
    fn message_roles_are_constrained() {
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        run_migrations(&conn).expect("migrations should succeed");
        conn.execute("INSERT INTO conversations (id) VALUES ('c1')", [])
            .expect("insert conversation");

        let result = conn.execute(
            "INSERT INTO messages (message_id, conversation_id, role, content_json)
             VALUES ('m1', 'c1', 'narrator', '{}')",
            [],
        );
        assert!(result.is_err(), "unknown roles should be rejected");
    }

    #[test]
    fn failed_migration_rolls_back_its_schema() {
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        let broken = [Migration {
            name: "900_broken",
            sql: "CREATE TABLE half_done (id INTEGER PRIMARY KEY);
                  INSERT INTO missing_table VALUES (1);",
        }];

        let err = apply(&conn, &broken).expect_err("broken migration should fail");
        match err {
            MigrationError::ExecutionFailed { name, .. } => assert_eq!(name, "900_broken"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!table_exists(&conn, "half_done"));
    }
}
