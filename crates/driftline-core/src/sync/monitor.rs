//! Periodic reachability probing.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::error::Result;

use super::observe::{Listeners, Subscription};

/// Default interval between reachability probes
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(30);

/// Default timeout for a single probe request
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Reachability of the remote sync endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Online,
    Offline,
}

impl ConnectionStatus {
    #[must_use]
    pub const fn is_online(&self) -> bool {
        matches!(self, Self::Online)
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
        }
    }
}

/// Probes a health endpoint on a timer and reports online/offline
/// transitions.
///
/// Without a configured endpoint the monitor assumes online permanently
/// (local-only mode). Listeners are notified only on actual transitions.
#[derive(Clone)]
pub struct NetworkMonitor {
    inner: Arc<MonitorInner>,
}

struct MonitorInner {
    client: reqwest::Client,
    health_url: Option<String>,
    probe_interval: Duration,
    status: Mutex<ConnectionStatus>,
    listeners: Listeners<ConnectionStatus>,
    probe_task: Mutex<Option<JoinHandle<()>>>,
}

impl NetworkMonitor {
    /// Create a monitor for the given health endpoint.
    ///
    /// The probe timeout is independent of the probe interval.
    pub fn new(
        health_url: Option<String>,
        probe_interval: Duration,
        probe_timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(probe_timeout).build()?;

        Ok(Self {
            inner: Arc::new(MonitorInner {
                client,
                health_url,
                probe_interval,
                status: Mutex::new(ConnectionStatus::Online),
                listeners: Listeners::new(),
                probe_task: Mutex::new(None),
            }),
        })
    }

    /// Monitor with the default interval and timeout
    pub fn with_defaults(health_url: Option<String>) -> Result<Self> {
        Self::new(health_url, DEFAULT_PROBE_INTERVAL, DEFAULT_PROBE_TIMEOUT)
    }

    /// Start the periodic probe task (no-op in local-only mode)
    pub fn initialize(&self) {
        if self.inner.health_url.is_none() {
            tracing::debug!("No health endpoint configured; assuming online");
            return;
        }

        let mut probe_task = self.inner.probe_task.lock();
        if probe_task.is_some() {
            return;
        }

        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(inner.probe_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                inner.probe().await;
            }
        });
        *probe_task = Some(handle);
    }

    /// Perform one probe now and update the status
    pub async fn check_connection(&self) -> bool {
        self.inner.probe().await
    }

    /// Force an immediate probe, independent of the timer
    pub async fn refresh(&self) -> bool {
        self.check_connection().await
    }

    /// Last observed status
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        *self.inner.status.lock()
    }

    /// Register a transition listener; no replay, transitions only
    pub fn subscribe(
        &self,
        listener: impl Fn(&ConnectionStatus) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.listeners.subscribe(listener)
    }

    /// Stop the probe timer and release all listeners
    pub fn destroy(&self) {
        if let Some(handle) = self.inner.probe_task.lock().take() {
            handle.abort();
        }
        self.inner.listeners.clear();
    }
}

impl MonitorInner {
    async fn probe(&self) -> bool {
        let online = match &self.health_url {
            None => true,
            Some(url) => match self.client.head(url).send().await {
                Ok(response) => response.status().is_success(),
                Err(error) => {
                    tracing::debug!(%error, "Health probe failed");
                    false
                }
            },
        };

        self.set_status(online);
        online
    }

    fn set_status(&self, online: bool) {
        let next = if online {
            ConnectionStatus::Online
        } else {
            ConnectionStatus::Offline
        };

        let changed = {
            let mut status = self.status.lock();
            if *status == next {
                false
            } else {
                *status = next;
                true
            }
        };

        if changed {
            tracing::info!(status = next.as_str(), "Connectivity changed");
            self.listeners.notify(&next);
        }
    }
}
