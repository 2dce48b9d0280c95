//! Database layer for Driftline

mod changelog_repository;
mod conflict_repository;
mod connection;
mod device_repository;
mod migrations;
mod state_repository;

pub use changelog_repository::ChangeLogRepository;
pub use conflict_repository::ConflictRepository;
pub use connection::{Database, SharedDb};
pub use device_repository::DeviceRepository;
pub use state_repository::SyncStateRepository;
