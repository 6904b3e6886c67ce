use async_trait::async_trait;

use shepherd_core::WorkItem;
use shepherd_executor::TaskError;

use crate::error::WorkerError;

/// Supplies the items that are due now.
///
/// Typically a query against the relational store. Returning the same key
/// on consecutive polls is expected; the poller filters duplicates.
#[async_trait]
pub trait DueWorkSource<P>: Send + Sync {
    async fn due_items(&self) -> Result<Vec<WorkItem<P>>, WorkerError>;
}

/// The domain work performed for one item.
///
/// Called once per attempt by the retry executor. Before every outbound side
/// effect the body consults its rate limiter or quota counter and skips the
/// effect on denial.
#[async_trait]
pub trait TaskBody<P>: Send + Sync {
    async fn run(&self, item: &WorkItem<P>) -> Result<(), TaskError>;
}
