use std::sync::atomic::{AtomicU64, Ordering};

/// Per-work-class counters, updated by every worker in the pool.
///
/// Relaxed ordering throughout. Use [`snapshot`](Self::snapshot) for a
/// point-in-time view.
#[derive(Debug, Default)]
pub struct WorkerMetrics {
    /// Items taken off the channel.
    pub received: AtomicU64,
    /// Items whose task body eventually succeeded.
    pub completed: AtomicU64,
    /// Items that failed terminally or ran out of attempts.
    pub failed: AtomicU64,
    /// Items skipped because another worker held their scope.
    pub already_running: AtomicU64,
    /// Items skipped because the gate was taken or at capacity.
    pub not_acquired: AtomicU64,
    /// Items skipped because the state store could not be reached.
    pub gate_errors: AtomicU64,
    /// Items whose lock or tracker slot was taken away while running.
    pub exclusion_lost: AtomicU64,
    /// Items abandoned because processing panicked outside the task body.
    pub panicked: AtomicU64,
}

impl WorkerMetrics {
    pub fn increment_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_already_running(&self) {
        self.already_running.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_not_acquired(&self) {
        self.not_acquired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_gate_errors(&self) {
        self.gate_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_exclusion_lost(&self) {
        self.exclusion_lost.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_panicked(&self) {
        self.panicked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            already_running: self.already_running.load(Ordering::Relaxed),
            not_acquired: self.not_acquired.load(Ordering::Relaxed),
            gate_errors: self.gate_errors.load(Ordering::Relaxed),
            exclusion_lost: self.exclusion_lost.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of [`WorkerMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub received: u64,
    pub completed: u64,
    pub failed: u64,
    pub already_running: u64,
    pub not_acquired: u64,
    pub gate_errors: u64,
    pub exclusion_lost: u64,
    pub panicked: u64,
}

impl MetricsSnapshot {
    /// Items that reached a final outcome of any kind.
    ///
    /// `exclusion_lost` is not an outcome; those items still complete or fail.
    #[must_use]
    pub fn finished(&self) -> u64 {
        self.completed
            + self.failed
            + self.already_running
            + self.not_acquired
            + self.gate_errors
            + self.panicked
    }
}
