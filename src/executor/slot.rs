//! # Task Slots and Completion Tracking
//!
//! A task slot is one concurrently-executing unit of work drawn from the
//! executor pool. The pool knows nothing about the work itself; it needs a
//! slot to be runnable, to answer whether it is free, and to exit promptly
//! when its reschedule token is cancelled.
//!
//! Completion is tracked with a one-shot countdown barrier. Each slot's
//! supervising task holds a [`CompletionGuard`]; the guard releases its count
//! when dropped, so the barrier is decremented exactly once per slot whether
//! the slot completed, failed, was rescheduled away, or panicked.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::Result;

/// One concurrently-executing unit of work.
#[async_trait]
pub trait TaskSlot: Send + Sync {
    /// The slot's work loop.
    ///
    /// Implementations must observe `reschedule` between work units and
    /// return promptly once it is cancelled; the pool never forcibly
    /// terminates a slot. An `Err` return is isolated to this slot - it is
    /// logged by the supervising task and does not affect its peers.
    async fn run(&self, reschedule: CancellationToken) -> Result<()>;

    /// True once the slot has finished or been rescheduled away.
    fn is_free(&self) -> bool;
}

/// Produces the slots submitted when the worker process starts.
pub trait TaskSlotFactory: Send + Sync {
    fn create_slot(&self, index: usize) -> Result<Arc<dyn TaskSlot>>;
}

/// One-shot countdown barrier sized to the pool capacity.
///
/// The worker's `start()` suspends on [`wait`](Self::wait) until every slot
/// has released its count. Monotonic: once zero, it stays zero.
#[derive(Debug)]
pub struct CompletionBarrier {
    remaining: AtomicUsize,
    notify: Notify,
}

impl CompletionBarrier {
    pub fn new(count: usize) -> Self {
        Self {
            remaining: AtomicUsize::new(count),
            notify: Notify::new(),
        }
    }

    /// Counts not yet released.
    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }

    /// Suspend until every count has been released.
    pub async fn wait(&self) {
        loop {
            if self.remaining.load(Ordering::Acquire) == 0 {
                return;
            }
            let notified = self.notify.notified();
            // Re-check after registering the waiter: a release between the
            // first load and `notified()` would otherwise be missed.
            if self.remaining.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }

    fn release_one(&self) {
        match self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
        {
            Ok(1) => self.notify.notify_waiters(),
            Ok(_) => {}
            Err(_) => warn!("completion barrier released more times than its size"),
        }
    }
}

/// Releases one barrier count on drop, whatever the exit path.
#[derive(Debug)]
pub struct CompletionGuard {
    barrier: Arc<CompletionBarrier>,
}

impl CompletionGuard {
    /// Take a guard that releases one of `barrier`'s counts when dropped.
    pub fn new(barrier: Arc<CompletionBarrier>) -> Self {
        Self { barrier }
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.barrier.release_one();
    }
}
