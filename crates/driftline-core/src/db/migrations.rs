//! Database migrations

use rusqlite::Connection;

use crate::error::Result;

/// Current schema version
const CURRENT_VERSION: i32 = 1;

/// Run all pending migrations
pub fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn)?;

    if version < 1 {
        migrate_v1(conn)?;
    }

    Ok(())
}

/// Get the current schema version
fn get_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get::<_, i32>(0).map(|flag| flag != 0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    Ok(version)
}

/// Migration to version 1: sync store schema
fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute("BEGIN TRANSACTION", [])?;

    let statements = [
        // Schema version tracking
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )",
        // Generic key/value store, holds the persisted device id
        "CREATE TABLE IF NOT EXISTS app_config (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )",
        // Installation identity
        "CREATE TABLE IF NOT EXISTS devices (
            id TEXT PRIMARY KEY,
            device_name TEXT NOT NULL,
            platform TEXT NOT NULL,
            app_version TEXT,
            last_sync_at INTEGER,
            created_at INTEGER NOT NULL
        )",
        // Durable ordered record of local mutations
        "CREATE TABLE IF NOT EXISTS sync_log (
            id TEXT PRIMARY KEY,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            operation TEXT NOT NULL CHECK (operation IN ('create', 'update', 'delete')),
            payload TEXT NOT NULL,
            timestamp INTEGER NOT NULL,
            device_id TEXT NOT NULL,
            synced INTEGER NOT NULL DEFAULT 0,
            version INTEGER NOT NULL,
            sync_error TEXT,
            retry_count INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_sync_log_entity ON sync_log(entity_type, entity_id)",
        "CREATE INDEX IF NOT EXISTS idx_sync_log_synced ON sync_log(synced)",
        "CREATE INDEX IF NOT EXISTS idx_sync_log_timestamp ON sync_log(timestamp)",
        // Singleton state machine row, seeded idle
        "CREATE TABLE IF NOT EXISTS sync_state (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            current_state TEXT NOT NULL DEFAULT 'idle',
            pending_count INTEGER NOT NULL DEFAULT 0,
            last_sync_version INTEGER NOT NULL DEFAULT 0,
            last_sync_at INTEGER,
            last_error TEXT,
            updated_at INTEGER NOT NULL DEFAULT 0
        )",
        "INSERT OR IGNORE INTO sync_state (id) VALUES (1)",
        // Detected local/remote divergences, kept for manual resolution
        "CREATE TABLE IF NOT EXISTS conflict_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            local_data TEXT NOT NULL,
            server_data TEXT NOT NULL,
            conflicting_fields TEXT NOT NULL,
            resolution TEXT,
            resolved_at INTEGER,
            resolved_by TEXT,
            created_at INTEGER NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_conflict_records_entity
             ON conflict_records(entity_type, entity_id)",
        // Record migration version
        "INSERT INTO schema_version (version) VALUES (1)",
    ];

    for stmt in statements {
        if let Err(e) = conn.execute(stmt, []) {
            conn.execute("ROLLBACK", []).ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn.execute("COMMIT", []) {
        conn.execute("ROLLBACK", []).ok();
        return Err(e.into());
    }

    tracing::info!("Migrated database to version {CURRENT_VERSION}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Connection {
        Connection::open_in_memory().unwrap()
    }

    #[test]
    fn test_migrations() {
        let conn = setup();
        run(&conn).unwrap();

        let version = get_version(&conn).unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn test_migrations_idempotent() {
        let conn = setup();
        run(&conn).unwrap();
        run(&conn).unwrap(); // Should not fail

        let version = get_version(&conn).unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn test_sync_state_row_is_seeded() {
        let conn = setup();
        run(&conn).unwrap();

        let (state, pending): (String, i64) = conn
            .query_row(
                "SELECT current_state, pending_count FROM sync_state WHERE id = 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();

        assert_eq!(state, "idle");
        assert_eq!(pending, 0);
    }

    #[test]
    fn test_sync_log_rejects_unknown_operation() {
        let conn = setup();
        run(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO sync_log (id, entity_type, entity_id, operation, payload,
                                   timestamp, device_id, version, created_at, updated_at)
             VALUES ('x', 'task', 't-1', 'upsert', '{}', 0, 'd', 1, 0, 0)",
            [],
        );

        assert!(result.is_err());
    }
}
