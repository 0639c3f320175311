#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Range Worker
//!
//! Worker-side control plane for a distributed range-partitioned batch
//! processing platform: a long-lived process that registers with a central
//! coordinator, runs a bounded, resource-sized set of concurrent task slots
//! against partitions of work, tracks their completion, reports progress,
//! and terminates cleanly on completion, error, or external signal.
//!
//! ## Architecture
//!
//! The crate owns the two pieces of the worker with real coordination logic:
//!
//! - [`process::WorkerProcess`] - the lifecycle state machine. Drives
//!   start-up, blocks until every slot has finished, and performs shutdown
//!   exactly once regardless of trigger (normal completion, start-up error,
//!   or termination signal).
//! - [`executor::ExecutorPool`] - the bounded slot pool. Sized once from
//!   host CPU count, available memory, and the configured per-worker memory
//!   budget; tracks slots in submission order, supports cooperative
//!   rescheduling of a subset, and drains gracefully.
//!
//! Everything else the worker touches is an external collaborator behind a
//! narrow trait in [`coordinator`]: the coordinator channel, presence
//! registration, progress reporting, and persistent resource handles. The
//! per-partition work itself implements [`executor::TaskSlot`].
//!
//! ## Module Organization
//!
//! - [`config`] - typed configuration, loaded once from `WORKER_*`
//!   environment variables
//! - [`coordinator`] - collaborator trait interfaces
//! - [`error`] - structured error handling
//! - [`executor`] - task slots, completion tracking, the executor pool
//! - [`logging`] - structured logging initialization
//! - [`process`] - the worker lifecycle state machine
//! - [`resources`] - host resource probing for pool sizing
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use range_worker::config::WorkerConfig;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     range_worker::logging::init_logging();
//!
//!     let config = WorkerConfig::from_env()?;
//!     println!(
//!         "worker for task {} with thread-number factor {}",
//!         config.task_id, config.thread_num_factor
//!     );
//!     Ok(())
//! }
//! ```
//!
//! Wiring a full worker additionally needs the collaborator implementations
//! (channel, announcer, reporter, resource manager) and a
//! [`executor::TaskSlotFactory`] for the partition logic; those live in the
//! embedding system, not in this crate.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod executor;
pub mod logging;
pub mod process;
pub mod resources;

pub use config::WorkerConfig;
pub use coordinator::{
    CoordinatorChannel, CoordinatorServices, PersistentResourceManager, PresenceAnnouncer,
    ProgressReporter,
};
pub use error::{Result, WorkerError};
pub use executor::{CompletionBarrier, CompletionGuard, ExecutorPool, TaskSlot, TaskSlotFactory};
pub use process::{TerminationHandle, WorkerProcess, WorkerStatus};
pub use resources::{FixedProbe, ResourceProbe, SystemProbe, SystemResources};
