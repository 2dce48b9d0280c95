//! Conflict record bookkeeping.

use serde_json::Value;

use crate::db::{ConflictRepository, SharedDb};
use crate::error::Result;
use crate::models::{diff_fields, ConflictRecord, ConflictResolution};

/// Service surface over the `conflict_records` table
#[derive(Clone)]
pub struct ConflictStore {
    db: SharedDb,
}

impl ConflictStore {
    #[must_use]
    pub const fn new(db: SharedDb) -> Self {
        Self { db }
    }

    /// Record a detected divergence, diffing the two payloads for the
    /// conflicting field set
    pub fn record(
        &self,
        entity_type: &str,
        entity_id: &str,
        local_data: &Value,
        server_data: &Value,
    ) -> Result<ConflictRecord> {
        let fields = diff_fields(local_data, server_data);
        let record = {
            let db = self.db.lock();
            ConflictRepository::new(db.connection()).insert(
                entity_type,
                entity_id,
                local_data,
                server_data,
                &fields,
            )?
        };

        tracing::warn!(
            entity_type,
            entity_id,
            fields = ?record.conflicting_fields,
            "Sync conflict recorded; local data left untouched"
        );
        Ok(record)
    }

    /// Fetch a conflict by row id
    pub fn get(&self, id: i64) -> Result<Option<ConflictRecord>> {
        let db = self.db.lock();
        ConflictRepository::new(db.connection()).get(id)
    }

    /// List conflicts, newest first
    pub fn list(&self, limit: usize) -> Result<Vec<ConflictRecord>> {
        let db = self.db.lock();
        ConflictRepository::new(db.connection()).list(limit)
    }

    /// Number of conflicts still awaiting resolution
    pub fn unresolved_count(&self) -> Result<i64> {
        let db = self.db.lock();
        ConflictRepository::new(db.connection()).unresolved_count()
    }

    /// Record a resolution decision; the engine never applies it on its own
    pub fn resolve(
        &self,
        id: i64,
        resolution: ConflictResolution,
        resolved_by: Option<&str>,
    ) -> Result<ConflictRecord> {
        let db = self.db.lock();
        ConflictRepository::new(db.connection()).resolve(id, resolution, resolved_by)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn record_computes_conflicting_fields() {
        let store = ConflictStore::new(Database::open_in_memory().unwrap().into_shared());

        let record = store
            .record(
                "task",
                "t-1",
                &json!({"title": "local", "done": true}),
                &json!({"title": "server", "done": true}),
            )
            .unwrap();

        assert_eq!(record.conflicting_fields, vec!["title"]);
        assert_eq!(store.unresolved_count().unwrap(), 1);

        store
            .resolve(record.id, ConflictResolution::Local, Some("alex"))
            .unwrap();
        assert_eq!(store.unresolved_count().unwrap(), 0);
        assert_eq!(
            store.get(record.id).unwrap().unwrap().resolution,
            Some(ConflictResolution::Local)
        );
    }
}
