//! Exponential-backoff retry scheduling for asynchronous operations.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};

/// Backoff schedule for failed operations.
///
/// `delay_for_attempt(n)` is the wait after the n-th failure:
/// `min(base_delay * backoff_multiplier^(n-1), max_delay)`, which with the
/// defaults yields 1s, 2s, 4s, 8s, 16s and caps at 32s.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts before the operation is abandoned
    pub max_retries: u32,
    /// Delay after the first failure
    pub base_delay: Duration,
    /// Exponential growth factor
    pub backoff_multiplier: f64,
    /// Ceiling for the computed delay
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Create a policy with the default schedule and the given attempt cap
    #[must_use]
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Set the delay after the first failure
    #[must_use]
    pub const fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the exponential growth factor
    #[must_use]
    pub const fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Set the delay ceiling
    #[must_use]
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Delay to wait after the given failure count (1-based)
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return self.base_delay.min(self.max_delay);
        }

        #[allow(clippy::cast_possible_wrap)]
        let exponent = attempt.saturating_sub(1).min(1024) as i32;
        let delay_ms =
            self.base_delay.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Duration::from_millis(capped_ms.max(0.0) as u64)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_millis(1000),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_millis(32_000),
        }
    }
}

/// Generic retry scheduler for asynchronous operations.
///
/// Tasks are keyed by id: at most one retry chain per id is in flight, and
/// chains are in-memory only. Restart-safety belongs to the change log,
/// which re-discovers unsynced entries on the next cycle.
#[derive(Clone)]
pub struct RetryQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    policy: RetryPolicy,
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl RetryQueue {
    #[must_use]
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                policy,
                tasks: Mutex::new(HashMap::new()),
            }),
        }
    }

    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.inner.policy
    }

    /// Schedule `task`, invoking `completion` with the final outcome.
    ///
    /// The first attempt runs immediately. Failed attempts are repeated
    /// after the policy's backoff while the error stays transient; permanent
    /// errors abandon the chain at once. A second enqueue for an id already
    /// in flight is a no-op (its completion callback is dropped unseen).
    pub fn enqueue<T, F, Fut, C>(&self, id: impl Into<String>, task: F, completion: C)
    where
        T: Send + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        C: FnOnce(Result<T>) + Send + 'static,
    {
        let id = id.into();
        let mut tasks = self.inner.tasks.lock();
        if tasks.contains_key(&id) {
            tracing::debug!(id, "Retry chain already in flight; ignoring enqueue");
            return;
        }

        let inner = Arc::clone(&self.inner);
        let task_id = id.clone();
        let handle = tokio::spawn(async move {
            let result = run_attempts(&inner.policy, &task_id, task).await;
            inner.tasks.lock().remove(&task_id);
            completion(result);
        });
        tasks.insert(id, handle);
    }

    /// Schedule `task` and await its final outcome.
    ///
    /// Same bookkeeping as `enqueue`; cancelling the chain via `remove` or
    /// `clear` resolves the future with `Error::Cancelled`.
    pub async fn run<T, F, Fut>(&self, id: impl Into<String>, task: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let id = id.into();
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.enqueue(id.clone(), task, move |result| {
            let _ = tx.send(result);
        });

        match rx.await {
            Ok(result) => result,
            Err(_) => Err(Error::Cancelled(format!("retry chain {id}"))),
        }
    }

    /// Cancel the retry chain for `id`, if any
    pub fn remove(&self, id: &str) -> bool {
        if let Some(handle) = self.inner.tasks.lock().remove(id) {
            handle.abort();
            true
        } else {
            false
        }
    }

    /// Cancel every pending retry chain
    pub fn clear(&self) {
        let mut tasks = self.inner.tasks.lock();
        for (_, handle) in tasks.drain() {
            handle.abort();
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.tasks.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.tasks.lock().is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.inner.tasks.lock().contains_key(id)
    }
}

async fn run_attempts<T, F, Fut>(policy: &RetryPolicy, id: &str, mut task: F) -> Result<T>
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Result<T>> + Send,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match task().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(id, attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) => {
                if attempt >= policy.max_retries || !error.is_transient() {
                    tracing::warn!(id, attempt, %error, "Giving up on operation");
                    return Err(error);
                }

                let delay = policy.delay_for_attempt(attempt);
                tracing::debug!(id, attempt, delay_ms = delay.as_millis() as u64, %error,
                    "Transient error, retrying after backoff");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn transient_error() -> Error {
        Error::Api {
            status: 503,
            message: "unavailable".to_string(),
        }
    }

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(max_retries)
            .with_base_delay(Duration::from_millis(1))
            .with_max_delay(Duration::from_millis(4))
    }

    #[test]
    fn backoff_schedule_matches_defaults() {
        let policy = RetryPolicy::default();

        let delays: Vec<u64> = (1..=5)
            .map(|attempt| policy.delay_for_attempt(attempt).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16000]);

        assert_eq!(policy.delay_for_attempt(6), Duration::from_millis(32_000));
        assert_eq!(policy.delay_for_attempt(7), Duration::from_millis(32_000));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn first_attempt_runs_immediately_and_succeeds() {
        let queue = RetryQueue::new(fast_policy(5));
        let attempts = Arc::new(AtomicU32::new(0));

        let attempts_clone = Arc::clone(&attempts);
        let result = queue
            .run("op", move || {
                let attempts = Arc::clone(&attempts_clone);
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Ok(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert!(queue.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn exhaustion_after_exactly_max_retries() {
        let queue = RetryQueue::new(fast_policy(3));
        let attempts = Arc::new(AtomicU32::new(0));

        let attempts_clone = Arc::clone(&attempts);
        let result: Result<()> = queue
            .run("always-fails", move || {
                let attempts = Arc::clone(&attempts_clone);
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err(transient_error())
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert!(queue.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn succeeds_after_transient_failures() {
        let queue = RetryQueue::new(fast_policy(5));
        let attempts = Arc::new(AtomicU32::new(0));

        let attempts_clone = Arc::clone(&attempts);
        let result = queue
            .run("flaky", move || {
                let attempts = Arc::clone(&attempts_clone);
                async move {
                    if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(transient_error())
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn permanent_errors_are_not_retried() {
        let queue = RetryQueue::new(fast_policy(5));
        let attempts = Arc::new(AtomicU32::new(0));

        let attempts_clone = Arc::clone(&attempts);
        let result: Result<()> = queue
            .run("unauthorized", move || {
                let attempts = Arc::clone(&attempts_clone);
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err(Error::Api {
                        status: 401,
                        message: "unauthorized".to_string(),
                    })
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn duplicate_enqueue_is_a_noop() {
        let queue = RetryQueue::new(
            RetryPolicy::new(5).with_base_delay(Duration::from_millis(50)),
        );
        let attempts = Arc::new(AtomicU32::new(0));

        let attempts_a = Arc::clone(&attempts);
        queue.enqueue(
            "same-id",
            move || {
                let attempts = Arc::clone(&attempts_a);
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    Ok(())
                }
            },
            |_| {},
        );

        let attempts_b = Arc::clone(&attempts);
        queue.enqueue(
            "same-id",
            move || {
                let attempts = Arc::clone(&attempts_b);
                async move {
                    attempts.fetch_add(100, Ordering::SeqCst);
                    Ok(())
                }
            },
            |_| {},
        );

        assert_eq!(queue.len(), 1);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn remove_cancels_a_pending_chain() {
        let queue = RetryQueue::new(
            RetryPolicy::new(5).with_base_delay(Duration::from_secs(30)),
        );
        let attempts = Arc::new(AtomicU32::new(0));

        let attempts_clone = Arc::clone(&attempts);
        queue.enqueue(
            "slow",
            move || {
                let attempts = Arc::clone(&attempts_clone);
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(transient_error())
                }
            },
            |_| {},
        );

        // Let the first attempt fail and the 30s backoff timer start
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(queue.contains("slow"));

        assert!(queue.remove("slow"));
        assert!(queue.is_empty());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn clear_cancels_everything() {
        let queue = RetryQueue::new(
            RetryPolicy::new(5).with_base_delay(Duration::from_secs(30)),
        );

        for index in 0..3 {
            queue.enqueue(
                format!("chain-{index}"),
                || async { Err::<(), _>(transient_error()) },
                |_| {},
            );
        }

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(queue.len(), 3);

        queue.clear();
        assert!(queue.is_empty());
    }
}
