use thiserror::Error;

use shepherd_coordination::CoordinationError;
use shepherd_executor::NotifyError;
use shepherd_state::StateError;
use shepherd_worker::WorkerError;

/// Errors that can occur when starting or running shepherd.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// An I/O error (e.g. reading the config file).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The shared store could not be created or reached.
    #[error("state error: {0}")]
    State(#[from] StateError),

    #[error("coordination error: {0}")]
    Coordination(#[from] CoordinationError),

    /// The failure notifier could not be built.
    #[error("notifier error: {0}")]
    Notifier(#[from] NotifyError),

    #[error("worker error: {0}")]
    Worker(#[from] WorkerError),
}
