use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, instrument, warn};

use shepherd_core::ItemKey;

use crate::error::TaskError;
use crate::notifier::{FailureKind, FailureNotifier, FailureReport, LogNotifier};
use crate::policy::{ErrorClass, RetryPolicy};

/// Default upper bound on a single notification delivery.
const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of running a task under the retry policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Succeeded { attempts: u32 },
    Failed(FailureReport),
}

impl ExecutionOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    /// Invocations made.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Succeeded { attempts } => *attempts,
            Self::Failed(report) => report.attempts,
        }
    }
}

/// Runs task bodies with a bounded number of attempts.
///
/// A panic inside the task is caught and treated as a retryable failure, so
/// the caller always gets an outcome back.
pub struct RetryExecutor {
    policy: RetryPolicy,
    notifier: Arc<dyn FailureNotifier>,
    notify_timeout: Duration,
    notifications: TaskTracker,
}

impl RetryExecutor {
    /// Executor that logs failures through [`LogNotifier`].
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            notifier: Arc::new(LogNotifier),
            notify_timeout: DEFAULT_NOTIFY_TIMEOUT,
            notifications: TaskTracker::new(),
        }
    }

    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn FailureNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    #[must_use]
    pub fn with_notify_timeout(mut self, timeout: Duration) -> Self {
        self.notify_timeout = timeout;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `task` until it succeeds, fails terminally, or runs out of attempts.
    ///
    /// `task` is called once per attempt and must produce a fresh future each
    /// time.
    #[instrument(skip(self, key, task), fields(item.key = %key, attempt))]
    pub async fn execute<F, Fut>(&self, key: &ItemKey, mut task: F) -> ExecutionOutcome
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<(), TaskError>> + Send,
    {
        let max_attempts = self.policy.attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;
            tracing::Span::current().record("attempt", attempt);
            debug!(item.key = %key, attempt, max_attempts, "running task");

            let err = match AssertUnwindSafe(task()).catch_unwind().await {
                Ok(Ok(())) => {
                    debug!(item.key = %key, attempt, "task succeeded");
                    return ExecutionOutcome::Succeeded { attempts: attempt };
                }
                Ok(Err(err)) => err,
                Err(panic) => TaskError::new(format!("task panicked: {}", panic_message(&*panic))),
            };

            if let ErrorClass::Terminal { matched } = self.policy.classify(&err) {
                error!(item.key = %key, attempt, error = %err, matched = %matched, "terminal error, not retrying");
                return self.fail(key, err, FailureKind::Terminal { matched }, attempt);
            }

            if attempt >= max_attempts {
                error!(item.key = %key, attempt, error = %err, "retries exhausted");
                return self.fail(key, err, FailureKind::Exhausted, attempt);
            }

            warn!(
                item.key = %key,
                attempt,
                error = %err,
                delay_ms = %self.policy.delay.as_millis(),
                "retryable error, will retry"
            );
            tokio::time::sleep(self.policy.delay).await;
        }
    }

    fn fail(&self, key: &ItemKey, err: TaskError, kind: FailureKind, attempts: u32) -> ExecutionOutcome {
        let report = FailureReport {
            item_key: key.clone(),
            error: err.to_string(),
            kind,
            attempts,
            failed_at: Utc::now(),
        };
        self.notify(report.clone());
        ExecutionOutcome::Failed(report)
    }

    /// Deliver `report` in the background, bounded by the notify timeout.
    fn notify(&self, report: FailureReport) {
        let notifier = Arc::clone(&self.notifier);
        let timeout = self.notify_timeout;
        self.notifications.spawn(async move {
            match tokio::time::timeout(timeout, notifier.send_failure(&report)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(item.key = %report.item_key, error = %e, "failed to deliver failure notification");
                }
                Err(_) => {
                    warn!(item.key = %report.item_key, timeout_ms = %timeout.as_millis(), "failure notification timed out");
                }
            }
        });
    }

    /// Wait until every notification spawned so far has finished.
    pub async fn wait_for_notifications(&self) {
        self.notifications.close();
        self.notifications.wait().await;
        self.notifications.reopen();
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        *s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
