//! Sync state model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Current phase of the sync state machine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    #[default]
    Idle,
    Syncing,
    Error,
    Offline,
}

impl SyncStatus {
    /// Stable text form stored in the `current_state` column
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Syncing => "syncing",
            Self::Error => "error",
            Self::Offline => "offline",
        }
    }

    /// Whether a new sync cycle may start from this state.
    ///
    /// `Syncing` is exclusive: this guard is the single-flight mechanism.
    #[must_use]
    pub const fn can_start_sync(&self) -> bool {
        !matches!(self, Self::Syncing)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(Self::Idle),
            "syncing" => Ok(Self::Syncing),
            "error" => Ok(Self::Error),
            "offline" => Ok(Self::Offline),
            other => Err(format!("unknown sync status: {other}")),
        }
    }
}

/// The singleton sync state row (exactly one logical row per local store)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStateRecord {
    pub status: SyncStatus,
    /// Number of local changes awaiting push
    pub pending_count: i64,
    /// Highest remote version applied locally
    pub last_sync_version: i64,
    /// Completion time of the last successful cycle (Unix ms)
    pub last_sync_at: Option<i64>,
    /// Message from the last failed cycle, cleared on the next start
    pub last_error: Option<String>,
    /// Last mutation timestamp (Unix ms)
    pub updated_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            SyncStatus::Idle,
            SyncStatus::Syncing,
            SyncStatus::Error,
            SyncStatus::Offline,
        ] {
            assert_eq!(status.as_str().parse::<SyncStatus>().unwrap(), status);
        }
    }

    #[test]
    fn only_syncing_blocks_a_new_cycle() {
        assert!(SyncStatus::Idle.can_start_sync());
        assert!(SyncStatus::Error.can_start_sync());
        assert!(SyncStatus::Offline.can_start_sync());
        assert!(!SyncStatus::Syncing.can_start_sync());
    }
}
