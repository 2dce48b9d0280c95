//! Engine configuration.

use std::time::Duration;

use crate::sync::monitor::{DEFAULT_PROBE_INTERVAL, DEFAULT_PROBE_TIMEOUT};
use crate::sync::retry::RetryPolicy;

/// Unit a failed push is retried at.
///
/// The remote protocol acks per entry, so a batch can partially fail; this
/// switch decides whether the backoff chain wraps whole batches or single
/// entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RetryGranularity {
    /// Retry a whole push batch as one unit
    #[default]
    Batch,
    /// Give each entry its own retry chain
    PerEntry,
}

/// Configuration for the sync engine and its collaborators
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Remote sync API base URL (e.g. `https://api.example.com`)
    pub remote_url: Option<String>,
    /// Bearer token for the remote sync API
    pub auth_token: Option<String>,
    /// Interval between scheduled sync cycles
    pub sync_interval: Duration,
    /// Entries per push batch
    pub push_batch_size: usize,
    /// Backoff schedule for failed pushes
    pub retry: RetryPolicy,
    /// Batch-vs-per-entry retry unit
    pub retry_granularity: RetryGranularity,
    /// Interval between reachability probes
    pub probe_interval: Duration,
    /// Timeout for a single probe
    pub probe_timeout: Duration,
    /// Timeout for push/pull requests
    pub request_timeout: Duration,
    /// Retention window for synced change log entries, in days
    pub retention_days: i64,
    /// Failed push attempts before an entry leaves the pending pool
    pub max_entry_retries: u32,
}

impl SyncSettings {
    /// Settings for local-only mode (no remote endpoint)
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Point the engine at a remote sync endpoint
    #[must_use]
    pub fn with_remote(mut self, url: impl Into<String>, auth_token: impl Into<String>) -> Self {
        self.remote_url = Some(url.into());
        self.auth_token = Some(auth_token.into());
        self
    }

    /// Set the scheduled sync interval
    #[must_use]
    pub const fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Set the push batch size
    #[must_use]
    pub const fn with_push_batch_size(mut self, size: usize) -> Self {
        self.push_batch_size = size;
        self
    }

    /// Set the push retry policy
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the batch-vs-per-entry retry unit
    #[must_use]
    pub const fn with_retry_granularity(mut self, granularity: RetryGranularity) -> Self {
        self.retry_granularity = granularity;
        self
    }

    /// Set the probe interval and timeout
    #[must_use]
    pub const fn with_probe(mut self, interval: Duration, timeout: Duration) -> Self {
        self.probe_interval = interval;
        self.probe_timeout = timeout;
        self
    }

    /// Set the retention window for synced entries
    #[must_use]
    pub const fn with_retention_days(mut self, days: i64) -> Self {
        self.retention_days = days;
        self
    }

    /// Check if a remote endpoint is configured
    #[must_use]
    pub const fn is_configured(&self) -> bool {
        self.remote_url.is_some() && self.auth_token.is_some()
    }

    /// Health endpoint probed by the network monitor
    #[must_use]
    pub fn health_url(&self) -> Option<String> {
        self.remote_url
            .as_ref()
            .map(|url| format!("{}/health", url.trim_end_matches('/')))
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            remote_url: None,
            auth_token: None,
            sync_interval: Duration::from_secs(60),
            push_batch_size: 50,
            retry: RetryPolicy::default(),
            retry_granularity: RetryGranularity::default(),
            probe_interval: DEFAULT_PROBE_INTERVAL,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            request_timeout: Duration::from_secs(30),
            retention_days: crate::sync::changelog::DEFAULT_RETENTION_DAYS,
            max_entry_retries: 5,
        }
    }
}
