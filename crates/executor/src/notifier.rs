use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::error;

use shepherd_core::ItemKey;

use crate::error::NotifyError;

/// Why the executor gave up on an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureKind {
    /// The error matched a terminal substring; no retry was attempted.
    Terminal { matched: String },
    /// Every attempt failed with a retryable error.
    Exhausted,
}

/// A final failure, as delivered to a [`FailureNotifier`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReport {
    pub item_key: ItemKey,
    /// Message of the last error.
    pub error: String,
    #[serde(flatten)]
    pub kind: FailureKind,
    /// Invocations made, including the one that failed last.
    pub attempts: u32,
    pub failed_at: DateTime<Utc>,
}

/// Receiver of terminal and exhausted failures.
///
/// Called off the caller's path by the executor, with a timeout.
#[async_trait]
pub trait FailureNotifier: Send + Sync {
    async fn send_failure(&self, report: &FailureReport) -> Result<(), NotifyError>;
}

/// Writes failures to the log at `error` level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl FailureNotifier for LogNotifier {
    async fn send_failure(&self, report: &FailureReport) -> Result<(), NotifyError> {
        match &report.kind {
            FailureKind::Terminal { matched } => error!(
                item.key = %report.item_key,
                error = %report.error,
                matched = %matched,
                attempts = report.attempts,
                "task failed with terminal error"
            ),
            FailureKind::Exhausted => error!(
                item.key = %report.item_key,
                error = %report.error,
                attempts = report.attempts,
                "task failed after exhausting retries"
            ),
        }
        Ok(())
    }
}

/// Keeps every report in memory.
///
/// For tests and for hosts that want to inspect recent failures.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    reports: Mutex<Vec<FailureReport>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the reports received so far.
    pub fn reports(&self) -> Vec<FailureReport> {
        self.reports.lock().clone()
    }

    /// Remove and return all reports.
    pub fn drain(&self) -> Vec<FailureReport> {
        std::mem::take(&mut *self.reports.lock())
    }

    pub fn len(&self) -> usize {
        self.reports.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.lock().is_empty()
    }
}

#[async_trait]
impl FailureNotifier for RecordingNotifier {
    async fn send_failure(&self, report: &FailureReport) -> Result<(), NotifyError> {
        self.reports.lock().push(report.clone());
        Ok(())
    }
}
