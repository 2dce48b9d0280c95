//! Device record model

use serde::{Deserialize, Serialize};

use crate::util::now_ms;

/// Identity of the running installation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Stable opaque identifier (hardware-derived or random)
    pub id: String,
    /// Display name, defaults to the hostname
    pub name: String,
    /// Operating system the installation runs on
    pub platform: String,
    /// Application version that created the record
    pub app_version: Option<String>,
    /// Completion time of the last successful sync cycle (Unix ms)
    pub last_sync_at: Option<i64>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
}

impl DeviceRecord {
    /// Create a new record for this installation
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            platform: std::env::consts::OS.to_string(),
            app_version: Some(env!("CARGO_PKG_VERSION").to_string()),
            last_sync_at: None,
            created_at: now_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_captures_platform() {
        let record = DeviceRecord::new("dev-1", "laptop");
        assert_eq!(record.platform, std::env::consts::OS);
        assert!(record.last_sync_at.is_none());
        assert!(record.created_at > 0);
    }
}
