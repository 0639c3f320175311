//! # Executor Pool Module
//!
//! The bounded, resource-sized pool of concurrent task slots a worker process
//! owns, together with the slot interface and the completion barrier that
//! lets the lifecycle state machine wait for every slot to finish.
//!
//! ## Key Components
//!
//! - [`TaskSlot`] / [`TaskSlotFactory`] - the interface per-partition work
//!   implements; the pool never sees partition logic
//! - [`CompletionBarrier`] / [`CompletionGuard`] - one-shot countdown released
//!   exactly once per slot on every exit path
//! - [`ExecutorPool`] - sizing, submission, pruning, rescheduling, drain

pub mod pool;
pub mod slot;

pub use pool::ExecutorPool;
pub use slot::{CompletionBarrier, CompletionGuard, TaskSlot, TaskSlotFactory};
