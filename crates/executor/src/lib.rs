//! Bounded retry around task bodies.
//!
//! [`RetryExecutor`] runs a task up to [`RetryPolicy::max_attempts`] times
//! with a fixed delay in between. An error whose message contains one of the
//! policy's terminal substrings stops the loop at once. Terminal and
//! exhausted failures are reported to a [`FailureNotifier`] in the
//! background; a slow or failing notifier never delays the caller.

pub mod error;
pub mod notifier;
pub mod policy;
pub mod retry;
pub mod webhook;

pub use error::{NotifyError, TaskError};
pub use notifier::{FailureKind, FailureNotifier, FailureReport, LogNotifier, RecordingNotifier};
pub use policy::{ErrorClass, RetryPolicy};
pub use retry::{ExecutionOutcome, RetryExecutor};
pub use webhook::WebhookNotifier;
