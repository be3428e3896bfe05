//! Version-tracked schema for the libSQL sink.
//!
//! Each step runs in its own transaction together with the row that marks it
//! applied, so a failed step leaves the schema at the previous version.

use libsql::Connection;

use crate::error::SinkError;

struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// Append only; applied versions are never edited.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "labeled_records",
        sql: r#"
            CREATE TABLE IF NOT EXISTS labeled_records (
                window_key TEXT NOT NULL,
                message_id INTEGER NOT NULL,
                partition INTEGER NOT NULL,
                window_start TEXT NOT NULL,
                window_end TEXT NOT NULL,
                text TEXT NOT NULL,
                positive_score REAL NOT NULL,
                negative_score REAL NOT NULL,
                label TEXT NOT NULL,
                written_at TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (window_key, message_id)
            );
            CREATE INDEX IF NOT EXISTS idx_labeled_records_label ON labeled_records(label);
        "#,
    },
    Migration {
        version: 2,
        name: "window_partition_index",
        sql: r#"
            CREATE INDEX IF NOT EXISTS idx_labeled_records_partition_start
                ON labeled_records(partition, window_start);
        "#,
    },
];

fn db_error(context: impl std::fmt::Display) -> impl FnOnce(libsql::Error) -> SinkError {
    move |e| SinkError::Database(format!("{context}: {e}"))
}

pub async fn run_migrations(conn: &Connection) -> Result<(), SinkError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(db_error("Failed to create _migrations table"))?;

    let applied = current_version(conn).await?;
    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > applied).collect();
    if pending.is_empty() {
        tracing::debug!(version = applied, "Schema up to date");
        return Ok(());
    }
    for migration in pending {
        apply(conn, migration).await?;
    }
    Ok(())
}

/// One step and its `_migrations` row commit together.
async fn apply(conn: &Connection, migration: &Migration) -> Result<(), SinkError> {
    let label = format!("Migration V{} ({})", migration.version, migration.name);
    tracing::info!(
        version = migration.version,
        name = migration.name,
        "Applying schema step"
    );

    let tx = conn
        .transaction()
        .await
        .map_err(db_error(format!("{label} could not begin")))?;
    tx.execute_batch(migration.sql)
        .await
        .map_err(db_error(format!("{label} failed")))?;
    tx.execute(
        "INSERT INTO _migrations (version, name) VALUES (?1, ?2)",
        libsql::params![migration.version, migration.name],
    )
    .await
    .map_err(db_error(format!("{label} could not be recorded")))?;
    tx.commit()
        .await
        .map_err(db_error(format!("{label} could not commit")))
}

/// Highest applied migration version, or 0 if none.
pub async fn current_version(conn: &Connection) -> Result<i64, SinkError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(db_error("Failed to query schema version"))?;

    match rows.next().await.map_err(db_error("Failed to read schema version"))? {
        Some(row) => row.get::<i64>(0).map_err(db_error("Bad schema version")),
        None => Ok(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_conn() -> (libsql::Database, Connection) {
        let db = libsql::Builder::new_local(":memory:").build().await.unwrap();
        let conn = db.connect().unwrap();
        (db, conn)
    }

    #[tokio::test]
    async fn applies_all_versions_once() {
        let (_db, conn) = memory_conn().await;
        run_migrations(&conn).await.unwrap();
        run_migrations(&conn).await.unwrap();

        let latest = MIGRATIONS.last().map(|m| m.version).unwrap();
        assert_eq!(current_version(&conn).await.unwrap(), latest);

        let mut rows = conn
            .query("SELECT COUNT(*) FROM _migrations", ())
            .await
            .unwrap();
        let count: i64 = rows.next().await.unwrap().unwrap().get(0).unwrap();
        assert_eq!(count, MIGRATIONS.len() as i64);
    }
}
