//! Change log entry model

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::util::now_ms;

/// A unique identifier for a change log entry, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChangeId(Uuid);

impl ChangeId {
    /// Create a new unique change ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for ChangeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ChangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ChangeId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Kind of local mutation recorded in the change log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOperation {
    Create,
    Update,
    Delete,
}

impl ChangeOperation {
    /// Stable text form stored in the `operation` column
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for ChangeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeOperation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(format!("unknown change operation: {other}")),
        }
    }
}

/// Opaque serialized entity state carried by a change log entry.
///
/// `data` is the state after the mutation (`None` for deletes), `previous`
/// the state before it (`None` for creates). The engine never interprets
/// entity-specific shapes; it only round-trips and diffs them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangePayload {
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub previous: Option<Value>,
}

impl ChangePayload {
    #[must_use]
    pub const fn new(data: Option<Value>, previous: Option<Value>) -> Self {
        Self { data, previous }
    }
}

/// One durable record of a local mutation awaiting (or having completed)
/// remote sync
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    /// Unique identifier
    pub id: ChangeId,
    /// Entity type the mutation applies to (e.g. "task")
    pub entity_type: String,
    /// Identifier of the mutated entity
    pub entity_id: String,
    /// Mutation kind
    pub operation: ChangeOperation,
    /// Serialized new and previous entity state
    pub payload: ChangePayload,
    /// Mutation timestamp (Unix ms), drives push ordering
    pub timestamp: i64,
    /// Device that recorded the mutation
    pub device_id: String,
    /// Whether the remote authority has acknowledged this entry
    pub synced: bool,
    /// Per-entity version, strictly increasing by 1 per accepted write
    pub version: i64,
    /// Last sync error for this entry, if any
    pub sync_error: Option<String>,
    /// Failed push attempts so far
    pub retry_count: i64,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
}

impl ChangeLogEntry {
    /// Create a new unsynced entry for a local mutation
    #[must_use]
    pub fn new(
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        operation: ChangeOperation,
        payload: ChangePayload,
        device_id: impl Into<String>,
        version: i64,
    ) -> Self {
        let now = now_ms();
        Self {
            id: ChangeId::new(),
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            operation,
            payload,
            timestamp: now,
            device_id: device_id.into(),
            synced: false,
            version,
            sync_error: None,
            retry_count: 0,
            created_at: now,
            updated_at: now,
        }
    }
}
