//! Composition root for the sync engine.
//!
//! Components are built once and passed by reference — no singletons, no
//! hidden global state. Host applications keep one `SyncRuntime` per local
//! store and hand its components to repositories and the engine.

use std::path::Path;
use std::sync::Arc;

use crate::config::SyncSettings;
use crate::db::{Database, SharedDb};
use crate::error::Result;
use crate::sync::api::HttpSyncTransport;
use crate::sync::changelog::ChangeLog;
use crate::sync::conflicts::ConflictStore;
use crate::sync::device::DeviceIdentity;
use crate::sync::engine::{RemoteChangeApplier, SyncEngine};
use crate::sync::monitor::NetworkMonitor;
use crate::sync::repository::{EntityRepository, SyncAwareRepository};
use crate::sync::state::SyncStateMachine;

/// One fully wired sync subsystem over a local store
pub struct SyncRuntime {
    db: SharedDb,
    settings: SyncSettings,
    device: DeviceIdentity,
    changelog: ChangeLog,
    state: SyncStateMachine,
    conflicts: ConflictStore,
}

impl SyncRuntime {
    /// Open (or create) the store at `path` and wire all components
    pub fn bootstrap(path: impl AsRef<Path>, settings: SyncSettings) -> Result<Self> {
        Self::with_database(Database::open(path)?, settings)
    }

    /// In-memory runtime, primarily for tests
    pub fn bootstrap_in_memory(settings: SyncSettings) -> Result<Self> {
        Self::with_database(Database::open_in_memory()?, settings)
    }

    fn with_database(database: Database, settings: SyncSettings) -> Result<Self> {
        let db = database.into_shared();
        let device = DeviceIdentity::new(Arc::clone(&db));
        device.initialize()?;

        if !settings.is_configured() {
            tracing::info!("Running in local-only mode (no sync endpoint configured)");
        }

        Ok(Self {
            changelog: ChangeLog::new(Arc::clone(&db), settings.max_entry_retries),
            state: SyncStateMachine::new(Arc::clone(&db)),
            conflicts: ConflictStore::new(Arc::clone(&db)),
            device,
            db,
            settings,
        })
    }

    #[must_use]
    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    #[must_use]
    pub fn device(&self) -> &DeviceIdentity {
        &self.device
    }

    #[must_use]
    pub fn changelog(&self) -> &ChangeLog {
        &self.changelog
    }

    #[must_use]
    pub fn state(&self) -> &SyncStateMachine {
        &self.state
    }

    #[must_use]
    pub fn conflicts(&self) -> &ConflictStore {
        &self.conflicts
    }

    #[must_use]
    pub fn db(&self) -> &SharedDb {
        &self.db
    }

    /// Whether a remote sync endpoint is configured
    #[must_use]
    pub const fn is_sync_configured(&self) -> bool {
        self.settings.is_configured()
    }

    /// Wrap an entity repository so its mutations feed the change log
    pub fn sync_aware<R: EntityRepository>(
        &self,
        inner: R,
        entity_type: impl Into<String>,
    ) -> SyncAwareRepository<R> {
        SyncAwareRepository::new(
            inner,
            entity_type,
            self.changelog.clone(),
            self.state.clone(),
            self.device.clone(),
        )
    }

    /// Build the engine and monitor for the configured remote endpoint.
    ///
    /// Returns `None` in local-only mode: the installation then runs
    /// permanently without a sync engine.
    pub fn build_engine(
        &self,
        applier: Arc<dyn RemoteChangeApplier>,
    ) -> Result<Option<(SyncEngine<HttpSyncTransport>, NetworkMonitor)>> {
        let (Some(url), Some(token)) = (&self.settings.remote_url, &self.settings.auth_token)
        else {
            return Ok(None);
        };

        let transport = HttpSyncTransport::new(
            url.as_str(),
            Some(token.clone()),
            self.settings.request_timeout,
        )?;
        let monitor = NetworkMonitor::new(
            self.settings.health_url(),
            self.settings.probe_interval,
            self.settings.probe_timeout,
        )?;
        let engine = SyncEngine::new(
            transport,
            self.changelog.clone(),
            self.state.clone(),
            self.device.clone(),
            self.conflicts.clone(),
            applier,
            &self.settings,
        );
        engine.attach_monitor(&monitor);

        Ok(Some((engine, monitor)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::sync::api::RemoteChange;
    use pretty_assertions::assert_eq;

    struct NoopApplier;

    impl RemoteChangeApplier for NoopApplier {
        fn apply(&self, _change: &RemoteChange) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn local_only_runtime_has_no_engine() {
        let runtime = SyncRuntime::bootstrap_in_memory(SyncSettings::new()).unwrap();

        assert!(!runtime.is_sync_configured());
        assert!(runtime.device().id().is_ok());
        assert_eq!(runtime.changelog().counts().unwrap().total, 0);
        assert!(runtime.build_engine(Arc::new(NoopApplier)).unwrap().is_none());
    }

    #[test]
    fn configured_runtime_builds_engine_and_monitor() {
        let settings = SyncSettings::new().with_remote("https://api.example.com", "token");
        let runtime = SyncRuntime::bootstrap_in_memory(settings).unwrap();

        let built = runtime.build_engine(Arc::new(NoopApplier)).unwrap();
        assert!(built.is_some());
    }

    #[test]
    fn bad_endpoint_is_rejected_at_engine_build() {
        let settings = SyncSettings::new().with_remote("api.example.com", "token");
        let runtime = SyncRuntime::bootstrap_in_memory(settings).unwrap();

        assert!(matches!(
            runtime.build_engine(Arc::new(NoopApplier)),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn sync_aware_wrapping_uses_shared_components() {
        use crate::sync::repository::EntityRepository;
        use serde::Serialize;

        #[derive(Clone, Serialize)]
        struct Row {
            id: String,
        }

        struct TrivialRepo;

        impl EntityRepository for TrivialRepo {
            type Entity = Row;

            fn entity_id(entity: &Row) -> String {
                entity.id.clone()
            }

            fn create(&self, entity: &Row) -> Result<Row> {
                Ok(entity.clone())
            }

            fn update(&self, _id: &str, entity: &Row) -> Result<Row> {
                Ok(entity.clone())
            }

            fn delete(&self, _id: &str) -> Result<()> {
                Ok(())
            }

            fn find_by_id(&self, _id: &str) -> Result<Option<Row>> {
                Ok(None)
            }

            fn find_all(&self) -> Result<Vec<Row>> {
                Ok(Vec::new())
            }
        }

        let runtime = SyncRuntime::bootstrap_in_memory(SyncSettings::new()).unwrap();
        let repo = runtime.sync_aware(TrivialRepo, "row");

        repo.create(&Row {
            id: "r-1".to_string(),
        })
        .unwrap();

        assert_eq!(runtime.changelog().counts().unwrap().pending, 1);
        assert_eq!(runtime.state().current().unwrap().pending_count, 1);
    }
}
