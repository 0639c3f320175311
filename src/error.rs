//! # Structured Error Handling
//!
//! Crate-wide error taxonomy for the worker control plane. Lifecycle,
//! configuration, and pool errors are separate variants so callers can react
//! to the recoverable ones (an invalid reschedule request) without conflating
//! them with the fatal ones (a failed capacity computation).

use std::time::Duration;

/// Errors produced by the worker control plane.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// A second worker process was constructed while one already exists.
    #[error("a worker process has already been created in this runtime")]
    AlreadyRegistered,

    /// Required configuration is missing or unparsable.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A lifecycle operation was invoked in a status that does not allow it.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A caller-supplied argument violates an invariant.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The executor sizing formula produced an unusable pool size.
    #[error("executor capacity computation failed: {0}")]
    CapacityComputation(String),

    /// A task slot was submitted after the pool began draining.
    #[error("executor pool is draining and no longer accepts task slots")]
    PoolDraining,

    /// The executor pool did not terminate within the drain timeout.
    #[error("executor pool failed to terminate within {0:?}")]
    DrainTimeout(Duration),

    /// An error surfaced by one of the coordinator-side collaborators.
    #[error("coordinator collaborator error: {0}")]
    Collaborator(String),

    /// Creating a task slot through the factory failed.
    #[error("task slot creation failed: {0}")]
    SlotCreation(String),
}

pub type Result<T> = std::result::Result<T, WorkerError>;
