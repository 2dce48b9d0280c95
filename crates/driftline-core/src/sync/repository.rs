//! Sync-aware repository decorator.

use serde::Serialize;
use serde_json::Value;

use crate::error::Result;
use crate::models::{ChangeOperation, ChangePayload};

use super::changelog::ChangeLog;
use super::device::DeviceIdentity;
use super::state::SyncStateMachine;

/// Contract an entity repository must expose to be wrapped.
///
/// The repository needs no sync awareness of its own; the decorator only
/// requires that entities serialize and expose their id.
pub trait EntityRepository: Send + Sync {
    type Entity: Serialize + Clone + Send + Sync;

    /// Identifier of an entity, used as the change log `entity_id`
    fn entity_id(entity: &Self::Entity) -> String;

    fn create(&self, entity: &Self::Entity) -> Result<Self::Entity>;
    fn update(&self, id: &str, entity: &Self::Entity) -> Result<Self::Entity>;
    fn delete(&self, id: &str) -> Result<()>;
    fn find_by_id(&self, id: &str) -> Result<Option<Self::Entity>>;
    fn find_all(&self) -> Result<Vec<Self::Entity>>;
}

/// Decorator that records every mutation in the change log.
///
/// `create`/`update`/`delete` delegate to the inner repository, then append
/// a change log entry with the entity's next version and bump the pending
/// counter. `find_by_id`/`find_all` pass through unmodified.
pub struct SyncAwareRepository<R: EntityRepository> {
    inner: R,
    entity_type: String,
    changelog: ChangeLog,
    state: SyncStateMachine,
    device: DeviceIdentity,
}

impl<R: EntityRepository> SyncAwareRepository<R> {
    pub fn new(
        inner: R,
        entity_type: impl Into<String>,
        changelog: ChangeLog,
        state: SyncStateMachine,
        device: DeviceIdentity,
    ) -> Self {
        Self {
            inner,
            entity_type: entity_type.into(),
            changelog,
            state,
            device,
        }
    }

    /// The wrapped repository
    pub fn inner(&self) -> &R {
        &self.inner
    }

    pub fn create(&self, entity: &R::Entity) -> Result<R::Entity> {
        let created = self.inner.create(entity)?;
        let data = serde_json::to_value(&created)?;
        self.log_change(
            &R::entity_id(&created),
            ChangeOperation::Create,
            ChangePayload::new(Some(data), None),
        )?;
        Ok(created)
    }

    pub fn update(&self, id: &str, entity: &R::Entity) -> Result<R::Entity> {
        // Capture prior state before delegating; it feeds conflict diffing
        let previous = self.previous_state(id)?;
        let updated = self.inner.update(id, entity)?;
        let data = serde_json::to_value(&updated)?;
        self.log_change(
            id,
            ChangeOperation::Update,
            ChangePayload::new(Some(data), previous),
        )?;
        Ok(updated)
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        let previous = self.previous_state(id)?;
        self.inner.delete(id)?;
        self.log_change(
            id,
            ChangeOperation::Delete,
            ChangePayload::new(None, previous),
        )?;
        Ok(())
    }

    pub fn find_by_id(&self, id: &str) -> Result<Option<R::Entity>> {
        self.inner.find_by_id(id)
    }

    pub fn find_all(&self) -> Result<Vec<R::Entity>> {
        self.inner.find_all()
    }

    fn previous_state(&self, id: &str) -> Result<Option<Value>> {
        self.inner
            .find_by_id(id)?
            .map(|entity| serde_json::to_value(&entity))
            .transpose()
            .map_err(Into::into)
    }

    fn log_change(
        &self,
        entity_id: &str,
        operation: ChangeOperation,
        payload: ChangePayload,
    ) -> Result<()> {
        self.changelog.record(
            &self.entity_type,
            entity_id,
            operation,
            payload,
            &self.device.id()?,
        )?;
        self.state.increment_pending_count()?;
        Ok(())
    }
}
