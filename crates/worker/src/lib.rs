//! Producer/consumer pipeline for shepherd work classes.
//!
//! A [`Poller`] asks a [`DueWorkSource`] for due items on a fixed interval,
//! drops keys already held in the process-local [`DedupSet`], and pushes the
//! rest onto a bounded channel. A [`WorkerPool`] drains the channel: each
//! item passes the cross-process [`Gate`] (exclusion lock or tracker
//! semaphore), runs its [`TaskBody`] under the retry executor, then releases
//! the gate and leaves the dedup set on every exit path.
//!
//! [`WorkClass`] wires one source, one body and one gate together.

pub mod class;
pub mod dedup;
pub mod error;
pub mod gate;
pub mod metrics;
pub mod poller;
pub mod pool;
pub mod source;

pub use class::{RunningWorkClass, WorkClass};
pub use dedup::{DEFAULT_DEDUP_CAPACITY, DedupSet};
pub use error::WorkerError;
pub use gate::{Gate, GateGuard};
pub use metrics::{MetricsSnapshot, WorkerMetrics};
pub use poller::{PollStats, Poller, PollerConfig, ProducerCriticality};
pub use pool::{ItemOutcome, ItemProcessor, PoolConfig, WorkerPool};
pub use source::{DueWorkSource, TaskBody};
