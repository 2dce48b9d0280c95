//! Sync conflict model

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// How a recorded conflict was (or should be) resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictResolution {
    /// Keep the local version
    Local,
    /// Accept the server version
    Server,
}

impl ConflictResolution {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Server => "server",
        }
    }
}

impl fmt::Display for ConflictResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictResolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(Self::Local),
            "server" => Ok(Self::Server),
            other => Err(format!("unknown conflict resolution: {other}")),
        }
    }
}

/// A detected divergence between local and remote state for one entity.
///
/// Recorded instead of overwriting local data; never auto-deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictRecord {
    /// Conflict row identifier
    pub id: i64,
    pub entity_type: String,
    pub entity_id: String,
    /// Local entity state at detection time
    pub local_data: Value,
    /// Remote entity state that diverged from it
    pub server_data: Value,
    /// Top-level fields whose values differ between the two states
    pub conflicting_fields: Vec<String>,
    pub resolution: Option<ConflictResolution>,
    /// Resolution timestamp (Unix ms)
    pub resolved_at: Option<i64>,
    /// Who resolved it (user name or policy identifier)
    pub resolved_by: Option<String>,
    /// Detection timestamp (Unix ms)
    pub created_at: i64,
}

/// Compute the set of top-level fields whose values differ between two
/// serialized entity states.
///
/// Non-object payloads (including `null` for deletes) are compared as a
/// whole under the `"*"` pseudo-field.
#[must_use]
pub fn diff_fields(local: &Value, server: &Value) -> Vec<String> {
    match (local.as_object(), server.as_object()) {
        (Some(local_map), Some(server_map)) => {
            let mut fields: Vec<String> = local_map
                .iter()
                .filter(|(key, value)| server_map.get(*key) != Some(value))
                .map(|(key, _)| key.clone())
                .collect();
            for key in server_map.keys() {
                if !local_map.contains_key(key) {
                    fields.push(key.clone());
                }
            }
            fields.sort();
            fields.dedup();
            fields
        }
        _ => {
            if local == server {
                Vec::new()
            } else {
                vec!["*".to_string()]
            }
        }
    }
}
