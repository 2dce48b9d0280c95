//! Singleton sync state machine.
//!
//! States: idle, syncing, error, offline. `Syncing` is exclusive — the
//! `can_start_sync` guard is the single-flight mechanism preventing
//! concurrent sync cycles. Every mutation is persisted to the singleton
//! `sync_state` row and broadcast to subscribers.

use std::sync::Arc;

use crate::db::{SharedDb, SyncStateRepository};
use crate::error::{Error, Result};
use crate::models::{SyncStateRecord, SyncStatus};
use crate::util::now_ms;

use super::observe::{Listeners, Subscription};

/// Observable, persisted sync state machine
#[derive(Clone)]
pub struct SyncStateMachine {
    db: SharedDb,
    listeners: Arc<Listeners<SyncStateRecord>>,
}

impl SyncStateMachine {
    #[must_use]
    pub fn new(db: SharedDb) -> Self {
        Self {
            db,
            listeners: Arc::new(Listeners::new()),
        }
    }

    /// Current state record
    pub fn current(&self) -> Result<SyncStateRecord> {
        let db = self.db.lock();
        SyncStateRepository::new(db.connection()).load()
    }

    /// Whether a new sync cycle may start
    pub fn can_start_sync(&self) -> Result<bool> {
        Ok(self.current()?.status.can_start_sync())
    }

    /// Enter `syncing`, clearing the last error.
    ///
    /// Fails when a cycle is already in flight.
    pub fn start_sync(&self) -> Result<SyncStateRecord> {
        self.mutate(|record| {
            if !record.status.can_start_sync() {
                return Err(Error::InvalidTransition(
                    "a sync cycle is already in progress".to_string(),
                ));
            }
            record.status = SyncStatus::Syncing;
            record.last_error = None;
            Ok(())
        })
    }

    /// Finish the cycle successfully: back to `idle`, version and time
    /// recorded, pending counter reset
    pub fn complete_sync(&self, version: i64) -> Result<SyncStateRecord> {
        self.mutate(|record| {
            record.status = SyncStatus::Idle;
            record.last_sync_version = version;
            record.last_sync_at = Some(now_ms());
            record.pending_count = 0;
            Ok(())
        })
    }

    /// Finish the cycle with an unrecoverable error
    pub fn fail_sync(&self, message: &str) -> Result<SyncStateRecord> {
        self.mutate(|record| {
            record.status = SyncStatus::Error;
            record.last_error = Some(message.to_string());
            Ok(())
        })
    }

    /// Enter `offline` (reachability lost); allowed from any state
    pub fn set_offline(&self) -> Result<SyncStateRecord> {
        self.mutate(|record| {
            record.status = SyncStatus::Offline;
            Ok(())
        })
    }

    /// Overwrite the pending-change counter
    pub fn update_pending_count(&self, count: i64) -> Result<SyncStateRecord> {
        self.mutate(|record| {
            record.pending_count = count.max(0);
            Ok(())
        })
    }

    /// Bump the pending-change counter
    pub fn increment_pending_count(&self) -> Result<SyncStateRecord> {
        self.mutate(|record| {
            record.pending_count += 1;
            Ok(())
        })
    }

    /// Lower the pending-change counter, flooring at zero
    pub fn decrement_pending_count(&self) -> Result<SyncStateRecord> {
        self.mutate(|record| {
            record.pending_count = (record.pending_count - 1).max(0);
            Ok(())
        })
    }

    /// Register a state listener.
    ///
    /// The listener is invoked synchronously with the current record before
    /// this call returns, then on every subsequent mutation.
    pub fn subscribe(
        &self,
        listener: impl Fn(&SyncStateRecord) + Send + Sync + 'static,
    ) -> Result<Subscription> {
        let current = self.current()?;
        Ok(self.listeners.subscribe_and_replay(listener, &current))
    }

    fn mutate(
        &self,
        apply: impl FnOnce(&mut SyncStateRecord) -> Result<()>,
    ) -> Result<SyncStateRecord> {
        let record = {
            let db = self.db.lock();
            let repo = SyncStateRepository::new(db.connection());
            let mut record = repo.load()?;
            let previous = record.status;
            apply(&mut record)?;
            if previous != record.status {
                tracing::debug!(from = previous.as_str(), to = record.status.as_str(),
                    "Sync state transition");
            }
            repo.save(&record)?
        };

        self.listeners.notify(&record);
        Ok(record)
    }
}
