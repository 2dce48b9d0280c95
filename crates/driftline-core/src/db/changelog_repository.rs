//! Change log repository implementation

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT/OFFSET

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;
use crate::models::{ChangeId, ChangeLogEntry, ChangeOperation, ChangePayload};
use crate::util::now_ms;

const MS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// `SQLite` row operations for the `sync_log` table
pub struct ChangeLogRepository<'a> {
    conn: &'a Connection,
}

impl<'a> ChangeLogRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Persist a new entry
    pub fn insert(&self, entry: &ChangeLogEntry) -> Result<()> {
        self.conn.execute(
            "INSERT INTO sync_log (id, entity_type, entity_id, operation, payload,
                                   timestamp, device_id, synced, version, sync_error,
                                   retry_count, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                entry.id.as_str(),
                entry.entity_type,
                entry.entity_id,
                entry.operation.as_str(),
                serde_json::to_string(&entry.payload)?,
                entry.timestamp,
                entry.device_id,
                i32::from(entry.synced),
                entry.version,
                entry.sync_error,
                entry.retry_count,
                entry.created_at,
                entry.updated_at
            ],
        )?;
        Ok(())
    }

    /// Next version for the entity: `max(version) + 1`, or 1 when unseen
    pub fn next_version(&self, entity_type: &str, entity_id: &str) -> Result<i64> {
        Ok(self.latest_version(entity_type, entity_id)? + 1)
    }

    /// Highest version recorded for the entity, 0 when unseen
    pub fn latest_version(&self, entity_type: &str, entity_id: &str) -> Result<i64> {
        let version: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM sync_log
             WHERE entity_type = ? AND entity_id = ?",
            params![entity_type, entity_id],
            |row| row.get(0),
        )?;
        Ok(version)
    }

    /// Most recent entry for the entity by version
    pub fn latest_entry(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Option<ChangeLogEntry>> {
        let entry = self
            .conn
            .query_row(
                &format!(
                    "{SELECT_COLUMNS} WHERE entity_type = ? AND entity_id = ?
                     ORDER BY version DESC LIMIT 1"
                ),
                params![entity_type, entity_id],
                Self::parse_entry,
            )
            .optional()?;
        Ok(entry)
    }

    /// Unsynced entries still eligible for push, oldest first.
    ///
    /// Oldest-first delivery preserves causal ordering on push.
    pub fn pending(&self, limit: usize, max_retries: i64) -> Result<Vec<ChangeLogEntry>> {
        // rowid breaks same-millisecond ties in insertion order
        let mut stmt = self.conn.prepare(&format!(
            "{SELECT_COLUMNS} WHERE synced = 0 AND retry_count < ?
             ORDER BY timestamp ASC, rowid ASC LIMIT ?"
        ))?;

        let entries = stmt
            .query_map(params![max_retries, limit as i64], Self::parse_entry)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    /// Whether any unsynced entry exists for the entity (failed ones included)
    pub fn has_unsynced(&self, entity_type: &str, entity_id: &str) -> Result<bool> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sync_log
                           WHERE entity_type = ? AND entity_id = ? AND synced = 0)",
            params![entity_type, entity_id],
            |row| row.get::<_, i32>(0).map(|flag| flag != 0),
        )?;
        Ok(exists)
    }

    /// Mark entries as acknowledged by the remote authority
    pub fn mark_synced(&self, ids: &[ChangeId]) -> Result<usize> {
        let now = now_ms();
        let mut stmt = self.conn.prepare(
            "UPDATE sync_log SET synced = 1, sync_error = NULL, updated_at = ? WHERE id = ?",
        )?;

        let mut updated = 0;
        for id in ids {
            updated += stmt.execute(params![now, id.as_str()])?;
        }
        Ok(updated)
    }

    /// Record a failed push attempt for entries
    pub fn mark_failed(&self, ids: &[ChangeId], error: Option<&str>) -> Result<usize> {
        let now = now_ms();
        let mut stmt = self.conn.prepare(
            "UPDATE sync_log SET retry_count = retry_count + 1, sync_error = ?, updated_at = ?
             WHERE id = ?",
        )?;

        let mut updated = 0;
        for id in ids {
            updated += stmt.execute(params![error, now, id.as_str()])?;
        }
        Ok(updated)
    }

    /// Entries that exhausted their push retries, newest first
    pub fn failed(&self, limit: usize, max_retries: i64) -> Result<Vec<ChangeLogEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "{SELECT_COLUMNS} WHERE synced = 0 AND retry_count >= ?
             ORDER BY updated_at DESC LIMIT ?"
        ))?;

        let entries = stmt
            .query_map(params![max_retries, limit as i64], Self::parse_entry)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    /// Return exhausted entries to the pending pool
    pub fn reset_failed(&self, max_retries: i64) -> Result<usize> {
        let updated = self.conn.execute(
            "UPDATE sync_log SET retry_count = 0, sync_error = NULL, updated_at = ?
             WHERE synced = 0 AND retry_count >= ?",
            params![now_ms(), max_retries],
        )?;
        Ok(updated)
    }

    /// Delete synced entries older than the retention window
    pub fn cleanup(&self, retention_days: i64) -> Result<usize> {
        let cutoff = now_ms() - retention_days * MS_PER_DAY;
        let deleted = self.conn.execute(
            "DELETE FROM sync_log WHERE synced = 1 AND updated_at < ?",
            params![cutoff],
        )?;
        Ok(deleted)
    }

    /// Number of unsynced entries still eligible for push
    pub fn pending_count(&self, max_retries: i64) -> Result<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sync_log WHERE synced = 0 AND retry_count < ?",
            params![max_retries],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Number of unsynced entries that exhausted their retries
    pub fn failed_count(&self, max_retries: i64) -> Result<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sync_log WHERE synced = 0 AND retry_count >= ?",
            params![max_retries],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Number of unsynced entries (failed ones included)
    pub fn unsynced_count(&self) -> Result<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sync_log WHERE synced = 0",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Total number of entries, synced or not
    pub fn total_count(&self) -> Result<i64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM sync_log", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Backdate an entry's `updated_at`, used by retention tests
    #[cfg(test)]
    pub fn backdate(&self, id: &ChangeId, updated_at: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE sync_log SET updated_at = ? WHERE id = ?",
            params![updated_at, id.as_str()],
        )?;
        Ok(())
    }

    /// Parse an entry from a database row
    fn parse_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChangeLogEntry> {
        let id: String = row.get(0)?;
        let operation: String = row.get(3)?;
        let operation = operation.parse::<ChangeOperation>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, e.into())
        })?;
        let payload: String = row.get(4)?;
        let payload: ChangePayload = serde_json::from_str(&payload).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, e.into())
        })?;

        Ok(ChangeLogEntry {
            id: id.parse().unwrap_or_default(),
            entity_type: row.get(1)?,
            entity_id: row.get(2)?,
            operation,
            payload,
            timestamp: row.get(5)?,
            device_id: row.get(6)?,
            synced: row.get::<_, i32>(7)? != 0,
            version: row.get(8)?,
            sync_error: row.get(9)?,
            retry_count: row.get(10)?,
            created_at: row.get(11)?,
            updated_at: row.get(12)?,
        })
    }
}

const SELECT_COLUMNS: &str = "SELECT id, entity_type, entity_id, operation, payload,
            timestamp, device_id, synced, version, sync_error,
            retry_count, created_at, updated_at FROM sync_log";
