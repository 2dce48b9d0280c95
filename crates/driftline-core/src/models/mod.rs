//! Data models for the sync engine

mod change;
mod conflict;
mod device;
mod state;

pub use change::{ChangeId, ChangeLogEntry, ChangeOperation, ChangePayload};
pub use conflict::{diff_fields, ConflictRecord, ConflictResolution};
pub use device::DeviceRecord;
pub use state::{SyncStateRecord, SyncStatus};
