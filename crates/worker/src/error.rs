use thiserror::Error;

/// Errors from the polling and worker pipeline.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The due-work query failed.
    #[error("due-work source failed: {0}")]
    Source(String),

    #[error("work channel closed")]
    ChannelClosed,

    #[error("task join error: {0}")]
    Join(String),
}
