//! Device and app-config repository implementation

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Error, Result};
use crate::models::DeviceRecord;
use crate::util::now_ms;

/// `SQLite` row operations for the `devices` and `app_config` tables
pub struct DeviceRepository<'a> {
    conn: &'a Connection,
}

impl<'a> DeviceRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Read a config value by key
    pub fn get_config(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM app_config WHERE key = ?",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Write a config value, preserving `created_at` on overwrite
    pub fn set_config(&self, key: &str, value: &str) -> Result<()> {
        let now = now_ms();
        self.conn.execute(
            "INSERT INTO app_config (key, value, created_at, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                                            updated_at = excluded.updated_at",
            params![key, value, now, now],
        )?;
        Ok(())
    }

    /// Persist a new device record
    pub fn insert(&self, record: &DeviceRecord) -> Result<()> {
        self.conn.execute(
            "INSERT INTO devices (id, device_name, platform, app_version,
                                  last_sync_at, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                record.id,
                record.name,
                record.platform,
                record.app_version,
                record.last_sync_at,
                record.created_at
            ],
        )?;
        Ok(())
    }

    /// Fetch a device record by id
    pub fn get(&self, id: &str) -> Result<Option<DeviceRecord>> {
        let record = self
            .conn
            .query_row(
                "SELECT id, device_name, platform, app_version, last_sync_at, created_at
                 FROM devices WHERE id = ?",
                params![id],
                |row| {
                    Ok(DeviceRecord {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        platform: row.get(2)?,
                        app_version: row.get(3)?,
                        last_sync_at: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    /// Rename a device
    pub fn update_name(&self, id: &str, name: &str) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE devices SET device_name = ? WHERE id = ?",
            params![name, id],
        )?;
        if rows == 0 {
            return Err(Error::NotFound(format!("device {id}")));
        }
        Ok(())
    }

    /// Stamp the completion time of a successful sync cycle
    pub fn update_last_sync_at(&self, id: &str, timestamp: i64) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE devices SET last_sync_at = ? WHERE id = ?",
            params![timestamp, id],
        )?;
        if rows == 0 {
            return Err(Error::NotFound(format!("device {id}")));
        }
        Ok(())
    }
}
