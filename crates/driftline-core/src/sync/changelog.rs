//! Durable, ordered record of local mutations.

use serde_json::Value;

use crate::db::{ChangeLogRepository, SharedDb};
use crate::error::Result;
use crate::models::{ChangeId, ChangeLogEntry, ChangeOperation, ChangePayload};

/// Hard cap on unsynced entries the queue is sized for
pub const MAX_PENDING_CHANGES: i64 = 1000;

/// Unsynced-entry count at which a capacity warning is logged
pub const CAPACITY_WARNING_THRESHOLD: i64 = 800;

/// Default retention window for synced entries, in days
pub const DEFAULT_RETENTION_DAYS: i64 = 7;

/// Pending/failed/total entry counts for status display
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeLogCounts {
    /// Unsynced entries still eligible for push
    pub pending: i64,
    /// Unsynced entries that exhausted their retries
    pub failed: i64,
    /// All entries, synced or not
    pub total: i64,
}

/// Service surface over the `sync_log` table
#[derive(Clone)]
pub struct ChangeLog {
    db: SharedDb,
    max_retries: i64,
}

impl ChangeLog {
    #[must_use]
    pub fn new(db: SharedDb, max_retries: u32) -> Self {
        Self {
            db,
            max_retries: i64::from(max_retries),
        }
    }

    /// Persist an entry with an explicit, caller-assigned version.
    ///
    /// Logs a capacity warning once the unsynced backlog crosses the
    /// warning threshold; the append itself always succeeds.
    pub fn append(
        &self,
        entity_type: &str,
        entity_id: &str,
        operation: ChangeOperation,
        payload: ChangePayload,
        device_id: &str,
        version: i64,
    ) -> Result<ChangeLogEntry> {
        let entry = ChangeLogEntry::new(
            entity_type, entity_id, operation, payload, device_id, version,
        );
        let backlog = {
            let db = self.db.lock();
            let repo = ChangeLogRepository::new(db.connection());
            repo.insert(&entry)?;
            repo.unsynced_count()?
        };

        if backlog >= CAPACITY_WARNING_THRESHOLD {
            tracing::warn!(
                backlog,
                cap = MAX_PENDING_CHANGES,
                "Sync backlog is approaching capacity"
            );
        }
        Ok(entry)
    }

    /// Persist a local mutation, assigning the entity's next version.
    ///
    /// Version computation and the insert happen under a single store lock,
    /// so rapid sequential mutations can never share a version.
    pub fn record(
        &self,
        entity_type: &str,
        entity_id: &str,
        operation: ChangeOperation,
        payload: ChangePayload,
        device_id: &str,
    ) -> Result<ChangeLogEntry> {
        let (entry, backlog) = {
            let db = self.db.lock();
            let repo = ChangeLogRepository::new(db.connection());
            let version = repo.next_version(entity_type, entity_id)?;
            let entry = ChangeLogEntry::new(
                entity_type, entity_id, operation, payload, device_id, version,
            );
            repo.insert(&entry)?;
            (entry, repo.unsynced_count()?)
        };

        if backlog >= CAPACITY_WARNING_THRESHOLD {
            tracing::warn!(
                backlog,
                cap = MAX_PENDING_CHANGES,
                "Sync backlog is approaching capacity"
            );
        }
        Ok(entry)
    }

    /// Record a remote change applied locally, already acknowledged.
    ///
    /// Keeps `latest_version` tracking the highest applied version per
    /// entity, which conflict detection compares against after restarts.
    pub fn record_remote(
        &self,
        entity_type: &str,
        entity_id: &str,
        operation: ChangeOperation,
        data: Option<Value>,
        device_id: &str,
        version: i64,
    ) -> Result<ChangeLogEntry> {
        let mut entry = ChangeLogEntry::new(
            entity_type,
            entity_id,
            operation,
            ChangePayload::new(data, None),
            device_id,
            version,
        );
        entry.synced = true;

        let db = self.db.lock();
        ChangeLogRepository::new(db.connection()).insert(&entry)?;
        Ok(entry)
    }

    /// Next version for the entity: `max(version) + 1`, or 1 when unseen
    pub fn next_version(&self, entity_type: &str, entity_id: &str) -> Result<i64> {
        let db = self.db.lock();
        ChangeLogRepository::new(db.connection()).next_version(entity_type, entity_id)
    }

    /// Highest version recorded for the entity, 0 when unseen
    pub fn latest_version(&self, entity_type: &str, entity_id: &str) -> Result<i64> {
        let db = self.db.lock();
        ChangeLogRepository::new(db.connection()).latest_version(entity_type, entity_id)
    }

    /// Most recent entry for the entity by version
    pub fn latest_entry(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Option<ChangeLogEntry>> {
        let db = self.db.lock();
        ChangeLogRepository::new(db.connection()).latest_entry(entity_type, entity_id)
    }

    /// Unsynced entries still eligible for push, oldest first
    pub fn pending(&self, limit: usize) -> Result<Vec<ChangeLogEntry>> {
        let db = self.db.lock();
        ChangeLogRepository::new(db.connection()).pending(limit, self.max_retries)
    }

    /// Whether any unsynced entry exists for the entity
    pub fn has_unsynced(&self, entity_type: &str, entity_id: &str) -> Result<bool> {
        let db = self.db.lock();
        ChangeLogRepository::new(db.connection()).has_unsynced(entity_type, entity_id)
    }

    /// Mark entries as acknowledged by the remote authority
    pub fn mark_synced(&self, ids: &[ChangeId]) -> Result<usize> {
        let db = self.db.lock();
        ChangeLogRepository::new(db.connection()).mark_synced(ids)
    }

    /// Record a failed push attempt for entries
    pub fn mark_failed(&self, ids: &[ChangeId], error: Option<&str>) -> Result<usize> {
        let db = self.db.lock();
        ChangeLogRepository::new(db.connection()).mark_failed(ids, error)
    }

    /// Entries that exhausted their push retries, newest first
    pub fn failed(&self, limit: usize) -> Result<Vec<ChangeLogEntry>> {
        let db = self.db.lock();
        ChangeLogRepository::new(db.connection()).failed(limit, self.max_retries)
    }

    /// Return exhausted entries to the pending pool
    pub fn reset_failed(&self) -> Result<usize> {
        let db = self.db.lock();
        ChangeLogRepository::new(db.connection()).reset_failed(self.max_retries)
    }

    /// Delete synced entries older than the retention window
    pub fn cleanup(&self, retention_days: i64) -> Result<usize> {
        let deleted = {
            let db = self.db.lock();
            ChangeLogRepository::new(db.connection()).cleanup(retention_days)?
        };
        if deleted > 0 {
            tracing::info!(deleted, retention_days, "Cleaned up synced change log entries");
        }
        Ok(deleted)
    }

    /// Pending/failed/total counts
    pub fn counts(&self) -> Result<ChangeLogCounts> {
        let db = self.db.lock();
        let repo = ChangeLogRepository::new(db.connection());
        Ok(ChangeLogCounts {
            pending: repo.pending_count(self.max_retries)?,
            failed: repo.failed_count(self.max_retries)?,
            total: repo.total_count()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn changelog() -> ChangeLog {
        ChangeLog::new(Database::open_in_memory().unwrap().into_shared(), 5)
    }

    fn payload(value: i64) -> ChangePayload {
        ChangePayload::new(Some(json!({"value": value})), None)
    }

    #[test]
    fn record_assigns_strictly_increasing_versions() {
        let log = changelog();

        for expected in 1..=4 {
            let entry = log
                .record("task", "t-1", ChangeOperation::Update, payload(expected), "dev")
                .unwrap();
            assert_eq!(entry.version, expected);
            assert_eq!(log.latest_version("task", "t-1").unwrap(), expected);
        }

        // A different entity starts over at 1
        let other = log
            .record("task", "t-2", ChangeOperation::Create, payload(0), "dev")
            .unwrap();
        assert_eq!(other.version, 1);
    }

    #[test]
    fn record_remote_is_already_synced() {
        let log = changelog();

        let entry = log
            .record_remote(
                "task",
                "t-1",
                ChangeOperation::Update,
                Some(json!({"value": 9})),
                "other-device",
                3,
            )
            .unwrap();

        assert!(entry.synced);
        assert_eq!(log.latest_version("task", "t-1").unwrap(), 3);
        assert!(log.pending(10).unwrap().is_empty());
        assert!(!log.has_unsynced("task", "t-1").unwrap());
    }

    #[test]
    fn counts_split_pending_and_failed() {
        let log = changelog();

        let healthy = log
            .record("task", "t-1", ChangeOperation::Create, payload(1), "dev")
            .unwrap();
        let stuck = log
            .record("task", "t-2", ChangeOperation::Create, payload(2), "dev")
            .unwrap();
        for _ in 0..5 {
            log.mark_failed(&[stuck.id], Some("boom")).unwrap();
        }

        let counts = log.counts().unwrap();
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.total, 2);

        assert_eq!(log.reset_failed().unwrap(), 1);
        assert_eq!(log.counts().unwrap().pending, 2);

        log.mark_synced(&[healthy.id, stuck.id]).unwrap();
        assert_eq!(log.counts().unwrap().pending, 0);
    }
}
