//! Conflict record repository implementation

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT/OFFSET

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::models::{ConflictRecord, ConflictResolution};
use crate::util::now_ms;

/// `SQLite` row operations for the `conflict_records` table
pub struct ConflictRepository<'a> {
    conn: &'a Connection,
}

impl<'a> ConflictRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Persist a newly detected divergence
    pub fn insert(
        &self,
        entity_type: &str,
        entity_id: &str,
        local_data: &Value,
        server_data: &Value,
        conflicting_fields: &[String],
    ) -> Result<ConflictRecord> {
        let created_at = now_ms();
        self.conn.execute(
            "INSERT INTO conflict_records (entity_type, entity_id, local_data,
                                           server_data, conflicting_fields, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                entity_type,
                entity_id,
                serde_json::to_string(local_data)?,
                serde_json::to_string(server_data)?,
                serde_json::to_string(conflicting_fields)?,
                created_at
            ],
        )?;

        Ok(ConflictRecord {
            id: self.conn.last_insert_rowid(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            local_data: local_data.clone(),
            server_data: server_data.clone(),
            conflicting_fields: conflicting_fields.to_vec(),
            resolution: None,
            resolved_at: None,
            resolved_by: None,
            created_at,
        })
    }

    /// Fetch a conflict by row id
    pub fn get(&self, id: i64) -> Result<Option<ConflictRecord>> {
        let record = self
            .conn
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE id = ?"),
                params![id],
                Self::parse_record,
            )
            .optional()?;
        Ok(record)
    }

    /// List conflicts, newest first
    pub fn list(&self, limit: usize) -> Result<Vec<ConflictRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SELECT_COLUMNS} ORDER BY created_at DESC LIMIT ?"))?;

        let records = stmt
            .query_map(params![limit as i64], Self::parse_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Number of conflicts still awaiting resolution
    pub fn unresolved_count(&self) -> Result<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM conflict_records WHERE resolution IS NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Record a resolution decision
    pub fn resolve(
        &self,
        id: i64,
        resolution: ConflictResolution,
        resolved_by: Option<&str>,
    ) -> Result<ConflictRecord> {
        let rows = self.conn.execute(
            "UPDATE conflict_records SET resolution = ?, resolved_at = ?, resolved_by = ?
             WHERE id = ?",
            params![resolution.as_str(), now_ms(), resolved_by, id],
        )?;
        if rows == 0 {
            return Err(Error::NotFound(format!("conflict {id}")));
        }

        self.get(id)?
            .ok_or_else(|| Error::NotFound(format!("conflict {id}")))
    }

    /// Parse a conflict record from a database row
    fn parse_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConflictRecord> {
        fn json_column<T: serde::de::DeserializeOwned>(
            index: usize,
            text: &str,
        ) -> rusqlite::Result<T> {
            serde_json::from_str(text).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    index,
                    rusqlite::types::Type::Text,
                    e.into(),
                )
            })
        }

        let local_data: Value = json_column(3, &row.get::<_, String>(3)?)?;
        let server_data: Value = json_column(4, &row.get::<_, String>(4)?)?;
        let conflicting_fields: Vec<String> = json_column(5, &row.get::<_, String>(5)?)?;
        let resolution: Option<String> = row.get(6)?;
        let resolution = resolution
            .map(|text| {
                text.parse::<ConflictResolution>().map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        6,
                        rusqlite::types::Type::Text,
                        e.into(),
                    )
                })
            })
            .transpose()?;

        Ok(ConflictRecord {
            id: row.get(0)?,
            entity_type: row.get(1)?,
            entity_id: row.get(2)?,
            local_data,
            server_data,
            conflicting_fields,
            resolution,
            resolved_at: row.get(7)?,
            resolved_by: row.get(8)?,
            created_at: row.get(9)?,
        })
    }
}

const SELECT_COLUMNS: &str = "SELECT id, entity_type, entity_id, local_data, server_data,
            conflicting_fields, resolution, resolved_at, resolved_by, created_at
            FROM conflict_records";
