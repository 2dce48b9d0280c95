//! Sync cycle orchestration.
//!
//! One cycle is push → pull → apply: pending change log entries are pushed
//! in batches through the retry queue, remote changes newer than the last
//! synced version are pulled, and each is applied locally unless histories
//! diverged, in which case a conflict record is written instead.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::config::{RetryGranularity, SyncSettings};
use crate::error::Result;
use crate::models::ChangeId;
use crate::util::now_ms;

use super::api::{PushRequest, PushedChange, RemoteChange, SyncTransport};
use super::changelog::ChangeLog;
use super::conflicts::ConflictStore;
use super::device::DeviceIdentity;
use super::monitor::{ConnectionStatus, NetworkMonitor};
use super::observe::Subscription;
use super::retry::RetryQueue;
use super::state::SyncStateMachine;

/// Applies remote changes to local entity storage.
///
/// Supplied by the composition root; the engine itself never interprets
/// entity payloads.
pub trait RemoteChangeApplier: Send + Sync {
    fn apply(&self, change: &RemoteChange) -> Result<()>;
}

/// Result of one attempted sync cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// A cycle ran to completion
    Completed(SyncReport),
    /// Another cycle was in flight; nothing was done
    Skipped,
}

/// Counters for one completed sync cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Entries acknowledged by the remote authority
    pub pushed: usize,
    /// Entries whose push failed after exhausting retries
    pub push_failed: usize,
    /// Remote changes delivered by the pull
    pub pulled: usize,
    /// Remote changes applied to local storage
    pub applied: usize,
    /// Divergences recorded instead of applied
    pub conflicts: usize,
    /// Wall-clock duration of the cycle
    pub duration_ms: u64,
}

/// Orchestrates sync cycles over a transport, triggered by timer,
/// reconnection events, or `sync_now()`
pub struct SyncEngine<T: SyncTransport + 'static> {
    inner: Arc<EngineInner<T>>,
}

struct EngineInner<T> {
    transport: T,
    changelog: ChangeLog,
    state: SyncStateMachine,
    device: DeviceIdentity,
    conflicts: ConflictStore,
    retry: RetryQueue,
    applier: Arc<dyn RemoteChangeApplier>,
    batch_size: usize,
    retry_granularity: RetryGranularity,
    retention_days: i64,
    sync_interval: std::time::Duration,
    timer: Mutex<Option<JoinHandle<()>>>,
    monitor_sub: Mutex<Option<Subscription>>,
}

impl<T: SyncTransport + 'static> Clone for SyncEngine<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: SyncTransport + 'static> SyncEngine<T> {
    pub fn new(
        transport: T,
        changelog: ChangeLog,
        state: SyncStateMachine,
        device: DeviceIdentity,
        conflicts: ConflictStore,
        applier: Arc<dyn RemoteChangeApplier>,
        settings: &SyncSettings,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                transport,
                changelog,
                state,
                device,
                conflicts,
                retry: RetryQueue::new(settings.retry.clone()),
                applier,
                batch_size: settings.push_batch_size.max(1),
                retry_granularity: settings.retry_granularity,
                retention_days: settings.retention_days,
                sync_interval: settings.sync_interval,
                timer: Mutex::new(None),
                monitor_sub: Mutex::new(None),
            }),
        }
    }

    /// Run one sync cycle unless another is already in flight.
    ///
    /// Unrecoverable errors are recorded via `fail_sync` and returned; they
    /// never panic or poison the state machine.
    pub async fn sync_now(&self) -> Result<SyncOutcome> {
        if !self.inner.state.can_start_sync()? {
            tracing::debug!("Sync cycle already in progress; skipping");
            return Ok(SyncOutcome::Skipped);
        }
        self.inner.state.start_sync()?;

        let started = Instant::now();
        match self.run_cycle().await {
            Ok((mut report, max_version)) => {
                report.duration_ms = started.elapsed().as_millis() as u64;
                self.inner.state.complete_sync(max_version)?;
                self.inner.device.update_last_sync_at(now_ms())?;
                self.inner.changelog.cleanup(self.inner.retention_days)?;
                tracing::info!(
                    pushed = report.pushed,
                    pulled = report.pulled,
                    applied = report.applied,
                    conflicts = report.conflicts,
                    duration_ms = report.duration_ms,
                    "Sync cycle completed"
                );
                Ok(SyncOutcome::Completed(report))
            }
            Err(error) => {
                tracing::warn!(%error, "Sync cycle failed");
                self.inner.state.fail_sync(&error.to_string())?;
                Err(error)
            }
        }
    }

    /// Start the periodic sync timer; the first cycle runs immediately
    pub fn start(&self) {
        let mut timer = self.inner.timer.lock();
        if timer.is_some() {
            return;
        }

        let engine = self.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(engine.inner.sync_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if let Err(error) = engine.sync_now().await {
                    tracing::warn!(%error, "Scheduled sync failed");
                }
            }
        });
        *timer = Some(handle);
    }

    /// Wire reconnection events: going online triggers a cycle, going
    /// offline flips the state machine
    pub fn attach_monitor(&self, monitor: &NetworkMonitor) {
        let engine = self.clone();
        let subscription = monitor.subscribe(move |status| match status {
            ConnectionStatus::Online => {
                let engine = engine.clone();
                tokio::spawn(async move {
                    if let Err(error) = engine.sync_now().await {
                        tracing::warn!(%error, "Reconnect sync failed");
                    }
                });
            }
            ConnectionStatus::Offline => {
                if let Err(error) = engine.inner.state.set_offline() {
                    tracing::warn!(%error, "Failed to record offline state");
                }
            }
        });
        *self.inner.monitor_sub.lock() = Some(subscription);
    }

    /// Stop future timers and cancel outstanding retry chains.
    ///
    /// An in-progress push/pull HTTP call runs to completion; there is no
    /// mid-flight cancellation beyond process shutdown.
    pub fn destroy(&self) {
        if let Some(handle) = self.inner.timer.lock().take() {
            handle.abort();
        }
        if let Some(subscription) = self.inner.monitor_sub.lock().take() {
            subscription.unsubscribe();
        }
        self.inner.retry.clear();
    }

    async fn run_cycle(&self) -> Result<(SyncReport, i64)> {
        let mut report = SyncReport::default();
        self.push_phase(&mut report).await?;
        let max_version = self.pull_phase(&mut report).await?;
        Ok((report, max_version))
    }

    /// Push pending entries in batches through the retry queue.
    ///
    /// An exhausted batch is marked failed and stops the push loop (later
    /// writes for the same entity must not overtake it), but the pull phase
    /// still runs.
    async fn push_phase(&self, report: &mut SyncReport) -> Result<()> {
        let device_id = self.inner.device.id()?;
        let unit = match self.inner.retry_granularity {
            RetryGranularity::Batch => self.inner.batch_size,
            RetryGranularity::PerEntry => 1,
        };

        let mut batch_no = 0usize;
        loop {
            let batch = self.inner.changelog.pending(unit)?;
            if batch.is_empty() {
                break;
            }
            batch_no += 1;

            let ids: Vec<ChangeId> = batch.iter().map(|entry| entry.id).collect();
            let id_by_wire: HashMap<String, ChangeId> =
                batch.iter().map(|entry| (entry.id.as_str(), entry.id)).collect();

            let request = PushRequest {
                device_id: device_id.clone(),
                changes: batch.iter().map(PushedChange::from).collect(),
            };
            let inner = Arc::clone(&self.inner);
            let outcome = self
                .inner
                .retry
                .run(format!("push-batch-{batch_no}"), move || {
                    let inner = Arc::clone(&inner);
                    let request = request.clone();
                    async move { inner.transport.push(request).await }
                })
                .await;

            match outcome {
                Ok(response) => {
                    let mut accepted = Vec::new();
                    let mut progressed = false;
                    for result in &response.results {
                        let Some(id) = id_by_wire.get(&result.id) else {
                            continue;
                        };
                        if result.accepted {
                            accepted.push(*id);
                        } else {
                            let reason = result.error.as_deref().unwrap_or("rejected by server");
                            self.inner.changelog.mark_failed(&[*id], Some(reason))?;
                            report.push_failed += 1;
                            progressed = true;
                        }
                    }

                    if !accepted.is_empty() {
                        self.inner.changelog.mark_synced(&accepted)?;
                        report.pushed += accepted.len();
                        progressed = true;
                    }

                    if !progressed {
                        tracing::warn!(
                            batch = batch_no,
                            "Push response matched no batch entries; stopping push phase"
                        );
                        break;
                    }

                    let counts = self.inner.changelog.counts()?;
                    self.inner.state.update_pending_count(counts.pending)?;
                }
                Err(error) => {
                    tracing::warn!(batch = batch_no, %error,
                        "Push batch failed after retries; deferring to next cycle");
                    self.inner
                        .changelog
                        .mark_failed(&ids, Some(&error.to_string()))?;
                    report.push_failed += ids.len();
                    break;
                }
            }
        }

        Ok(())
    }

    /// Pull remote changes since the last synced version and apply them,
    /// recording conflicts for divergent histories
    async fn pull_phase(&self, report: &mut SyncReport) -> Result<i64> {
        let since = self.inner.state.current()?.last_sync_version;
        let response = self.inner.transport.pull(since).await?;
        let device_id = self.inner.device.id()?;

        report.pulled = response.changes.len();
        let mut max_version = since.max(response.latest_version);

        for change in &response.changes {
            max_version = max_version.max(change.version);

            // Our own pushes come back tagged with this device id
            if change.device_id.as_deref() == Some(device_id.as_str()) {
                continue;
            }

            let local_version = self
                .inner
                .changelog
                .latest_version(&change.entity_type, &change.entity_id)?;
            let local_pending = self
                .inner
                .changelog
                .has_unsynced(&change.entity_type, &change.entity_id)?;

            if local_version >= change.version || local_pending {
                // Both histories advanced past the common base; record and
                // leave local data untouched
                let local_data = self
                    .inner
                    .changelog
                    .latest_entry(&change.entity_type, &change.entity_id)?
                    .and_then(|entry| entry.payload.data)
                    .unwrap_or(serde_json::Value::Null);
                let server_data = change.payload.clone().unwrap_or(serde_json::Value::Null);

                self.inner.conflicts.record(
                    &change.entity_type,
                    &change.entity_id,
                    &local_data,
                    &server_data,
                )?;
                report.conflicts += 1;
                continue;
            }

            self.inner.applier.apply(change)?;
            self.inner.changelog.record_remote(
                &change.entity_type,
                &change.entity_id,
                change.operation,
                change.payload.clone(),
                change.device_id.as_deref().unwrap_or("remote"),
                change.version,
            )?;
            report.applied += 1;
        }

        Ok(max_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::error::Error;
    use crate::models::{ChangeOperation, ChangePayload, SyncStatus};
    use crate::sync::api::mock::MockTransport;
    use crate::sync::api::{PullResponse, PushResponse, PushResult};
    use crate::sync::retry::RetryPolicy;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingApplier {
        applied: Mutex<Vec<RemoteChange>>,
    }

    impl RemoteChangeApplier for RecordingApplier {
        fn apply(&self, change: &RemoteChange) -> Result<()> {
            self.applied.lock().push(change.clone());
            Ok(())
        }
    }

    struct Harness {
        engine: SyncEngine<MockTransport>,
        changelog: ChangeLog,
        state: SyncStateMachine,
        device: DeviceIdentity,
        conflicts: ConflictStore,
        applier: Arc<RecordingApplier>,
    }

    impl Harness {
        fn transport(&self) -> &MockTransport {
            &self.engine.inner.transport
        }

        fn record_local(&self, entity_id: &str, value: i64) -> crate::models::ChangeLogEntry {
            self.changelog
                .record(
                    "task",
                    entity_id,
                    ChangeOperation::Update,
                    ChangePayload::new(Some(json!({"value": value})), None),
                    &self.device.id().unwrap(),
                )
                .unwrap()
        }
    }

    fn harness() -> Harness {
        let db = Database::open_in_memory().unwrap().into_shared();
        let changelog = ChangeLog::new(Arc::clone(&db), 5);
        let state = SyncStateMachine::new(Arc::clone(&db));
        let conflicts = ConflictStore::new(Arc::clone(&db));
        let device = DeviceIdentity::new(db);
        device.initialize().unwrap();

        let applier = Arc::new(RecordingApplier::default());
        let settings = SyncSettings::new()
            .with_push_batch_size(2)
            .with_retry(
                RetryPolicy::new(2)
                    .with_base_delay(Duration::from_millis(1))
                    .with_max_delay(Duration::from_millis(2)),
            );

        let engine = SyncEngine::new(
            MockTransport::new(),
            changelog.clone(),
            state.clone(),
            device.clone(),
            conflicts.clone(),
            Arc::clone(&applier) as Arc<dyn RemoteChangeApplier>,
            &settings,
        );

        Harness {
            engine,
            changelog,
            state,
            device,
            conflicts,
            applier,
        }
    }

    fn remote_change(entity_id: &str, version: i64, device: &str) -> RemoteChange {
        RemoteChange {
            entity_type: "task".to_string(),
            entity_id: entity_id.to_string(),
            operation: ChangeOperation::Update,
            version,
            payload: Some(json!({"value": version * 10})),
            device_id: Some(device.to_string()),
            timestamp: 0,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cycle_pushes_pending_entries_in_batches() {
        let h = harness();
        for index in 0..3 {
            h.record_local(&format!("t-{index}"), index);
        }
        assert_eq!(h.changelog.counts().unwrap().pending, 3);

        let outcome = h.engine.sync_now().await.unwrap();
        let SyncOutcome::Completed(report) = outcome else {
            panic!("expected completed cycle");
        };

        assert_eq!(report.pushed, 3);
        assert_eq!(report.push_failed, 0);
        // Batch size 2 splits three entries over two requests
        assert_eq!(h.transport().pushed().len(), 2);
        assert_eq!(h.changelog.counts().unwrap().pending, 0);

        let record = h.state.current().unwrap();
        assert_eq!(record.status, SyncStatus::Idle);
        assert_eq!(record.pending_count, 0);
        assert!(h.device.info().unwrap().last_sync_at.is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cycle_is_single_flight() {
        let h = harness();
        h.state.start_sync().unwrap();

        let outcome = h.engine.sync_now().await.unwrap();
        assert_eq!(outcome, SyncOutcome::Skipped);
        assert!(h.transport().pushed().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn exhausted_push_marks_failed_but_pull_still_runs() {
        let h = harness();
        let entry = h.record_local("t-1", 1);

        for _ in 0..2 {
            h.transport().queue_push(Err(Error::Api {
                status: 503,
                message: "unavailable".to_string(),
            }));
        }

        let outcome = h.engine.sync_now().await.unwrap();
        let SyncOutcome::Completed(report) = outcome else {
            panic!("expected completed cycle");
        };

        assert_eq!(report.pushed, 0);
        assert_eq!(report.push_failed, 1);
        assert_eq!(h.transport().pull_calls().len(), 1);

        // Entry stays unsynced with the final error recorded
        let failed = h.changelog.pending(10).unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, entry.id);
        assert_eq!(failed[0].retry_count, 1);
        assert!(failed[0].sync_error.as_deref().unwrap().contains("unavailable"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn per_entry_rejects_are_marked_failed_individually() {
        let h = harness();
        let ok = h.record_local("t-1", 1);
        let bad = h.record_local("t-2", 2);

        h.transport().queue_push(Ok(PushResponse {
            results: vec![
                PushResult {
                    id: ok.id.as_str(),
                    accepted: true,
                    version: Some(1),
                    error: None,
                },
                PushResult {
                    id: bad.id.as_str(),
                    accepted: false,
                    version: None,
                    error: Some("validation failed".to_string()),
                },
            ],
        }));

        let SyncOutcome::Completed(report) = h.engine.sync_now().await.unwrap() else {
            panic!("expected completed cycle");
        };

        assert_eq!(report.pushed, 1);
        assert_eq!(report.push_failed, 1);

        let remaining = h.changelog.pending(10).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, bad.id);
        assert_eq!(
            remaining[0].sync_error.as_deref(),
            Some("validation failed")
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn pull_applies_newer_remote_changes() {
        let h = harness();
        h.transport().queue_pull(Ok(PullResponse {
            changes: vec![remote_change("t-9", 3, "other-device")],
            latest_version: 3,
        }));

        let SyncOutcome::Completed(report) = h.engine.sync_now().await.unwrap() else {
            panic!("expected completed cycle");
        };

        assert_eq!(report.pulled, 1);
        assert_eq!(report.applied, 1);
        assert_eq!(report.conflicts, 0);
        assert_eq!(h.applier.applied.lock().len(), 1);

        // Applied version is tracked for future divergence checks
        assert_eq!(h.changelog.latest_version("task", "t-9").unwrap(), 3);
        assert_eq!(h.state.current().unwrap().last_sync_version, 3);

        // The next pull asks for changes after the applied version
        h.engine.sync_now().await.unwrap();
        assert_eq!(h.transport().pull_calls(), vec![0, 3]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn own_device_echoes_are_skipped() {
        let h = harness();
        let device_id = h.device.id().unwrap();
        h.transport().queue_pull(Ok(PullResponse {
            changes: vec![remote_change("t-1", 4, &device_id)],
            latest_version: 4,
        }));

        let SyncOutcome::Completed(report) = h.engine.sync_now().await.unwrap() else {
            panic!("expected completed cycle");
        };

        assert_eq!(report.applied, 0);
        assert_eq!(report.conflicts, 0);
        assert!(h.applier.applied.lock().is_empty());
        // The echoed version still advances the cursor
        assert_eq!(h.state.current().unwrap().last_sync_version, 4);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn divergent_histories_record_a_conflict() {
        let h = harness();

        // Common base: versions 1 and 2 synced; version 3 advanced locally
        let base = h.record_local("t-1", 1);
        let second = h.record_local("t-1", 2);
        h.changelog.mark_synced(&[base.id, second.id]).unwrap();
        h.record_local("t-1", 3);

        // The remote history also advanced to version 3 on another device
        h.transport().queue_push(Ok(PushResponse { results: vec![] }));
        h.transport().queue_pull(Ok(PullResponse {
            changes: vec![remote_change("t-1", 3, "other-device")],
            latest_version: 3,
        }));

        // The unmatched push response stops the push phase; pull continues
        let SyncOutcome::Completed(report) = h.engine.sync_now().await.unwrap() else {
            panic!("expected completed cycle");
        };

        assert_eq!(report.conflicts, 1);
        assert_eq!(report.applied, 0);
        assert!(h.applier.applied.lock().is_empty());

        let recorded = h.conflicts.list(10).unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].entity_id, "t-1");
        assert_eq!(recorded[0].local_data, json!({"value": 3}));
        assert_eq!(recorded[0].server_data, json!({"value": 30}));
        assert_eq!(recorded[0].conflicting_fields, vec!["value"]);

        // Local history is untouched
        assert_eq!(h.changelog.latest_version("task", "t-1").unwrap(), 3);
        assert!(h.changelog.has_unsynced("task", "t-1").unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unrecoverable_pull_error_fails_the_cycle() {
        let h = harness();
        h.transport().queue_pull(Err(Error::Api {
            status: 401,
            message: "token expired".to_string(),
        }));

        let error = h.engine.sync_now().await.unwrap_err();
        assert!(error.to_string().contains("token expired"));

        let record = h.state.current().unwrap();
        assert_eq!(record.status, SyncStatus::Error);
        assert!(record.last_error.as_deref().unwrap().contains("token expired"));

        // The guard opens again for the next cycle
        assert!(h.state.can_start_sync().unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn monitor_offline_transition_flips_state() {
        let h = harness();
        let monitor = NetworkMonitor::new(
            Some("http://192.0.2.1:9/health".to_string()),
            Duration::from_secs(30),
            Duration::from_millis(200),
        )
        .unwrap();

        h.engine.attach_monitor(&monitor);
        assert!(!monitor.check_connection().await);

        assert_eq!(h.state.current().unwrap().status, SyncStatus::Offline);
        h.engine.destroy();
        monitor.destroy();
    }
}
