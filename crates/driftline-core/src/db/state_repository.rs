//! Sync state repository implementation

use rusqlite::{params, Connection};

use crate::error::Result;
use crate::models::{SyncStateRecord, SyncStatus};
use crate::util::now_ms;

/// `SQLite` row operations for the singleton `sync_state` row
pub struct SyncStateRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SyncStateRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Load the singleton row (seeded by the initial migration)
    pub fn load(&self) -> Result<SyncStateRecord> {
        let record = self.conn.query_row(
            "SELECT current_state, pending_count, last_sync_version,
                    last_sync_at, last_error, updated_at
             FROM sync_state WHERE id = 1",
            [],
            |row| {
                let status: String = row.get(0)?;
                let status = status.parse::<SyncStatus>().map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        0,
                        rusqlite::types::Type::Text,
                        e.into(),
                    )
                })?;
                Ok(SyncStateRecord {
                    status,
                    pending_count: row.get(1)?,
                    last_sync_version: row.get(2)?,
                    last_sync_at: row.get(3)?,
                    last_error: row.get(4)?,
                    updated_at: row.get(5)?,
                })
            },
        )?;
        Ok(record)
    }

    /// Persist the singleton row, stamping `updated_at`
    pub fn save(&self, record: &SyncStateRecord) -> Result<SyncStateRecord> {
        let mut record = record.clone();
        record.updated_at = now_ms();

        self.conn.execute(
            "UPDATE sync_state
             SET current_state = ?, pending_count = ?, last_sync_version = ?,
                 last_sync_at = ?, last_error = ?, updated_at = ?
             WHERE id = 1",
            params![
                record.status.as_str(),
                record.pending_count,
                record.last_sync_version,
                record.last_sync_at,
                record.last_error,
                record.updated_at
            ],
        )?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use pretty_assertions::assert_eq;

    #[test]
    fn load_returns_seeded_idle_state() {
        let db = Database::open_in_memory().unwrap();
        let repo = SyncStateRepository::new(db.connection());

        let record = repo.load().unwrap();
        assert_eq!(record.status, SyncStatus::Idle);
        assert_eq!(record.pending_count, 0);
        assert_eq!(record.last_sync_version, 0);
        assert!(record.last_error.is_none());
    }

    #[test]
    fn save_and_load_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let repo = SyncStateRepository::new(db.connection());

        let mut record = repo.load().unwrap();
        record.status = SyncStatus::Error;
        record.pending_count = 3;
        record.last_sync_version = 17;
        record.last_error = Some("pull failed".to_string());

        let saved = repo.save(&record).unwrap();
        let loaded = repo.load().unwrap();
        assert_eq!(loaded, saved);
        assert_eq!(loaded.status, SyncStatus::Error);
        assert_eq!(loaded.pending_count, 3);
        assert_eq!(loaded.last_sync_version, 17);
    }
}
