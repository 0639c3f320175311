//! # Executor Pool
//!
//! Owns the worker's concurrent task slots: computes how many slots this
//! worker deserves from host resources, dispatches submitted slots onto the
//! runtime, tracks them in submission order, supports cooperative
//! rescheduling of a subset, and drains on shutdown.
//!
//! ## Sizing
//!
//! The pool is sized to the CPU share one worker deserves on a host that may
//! run several identical workers, not to the host's full CPU count:
//!
//! ```text
//! coresident_workers = max(1, available_memory / memory_budget)
//! cores_per_worker   = round(cpu_count / coresident_workers, 1 decimal, half-down)
//! capacity           = floor(cores_per_worker * thread_num_factor)
//! ```
//!
//! A capacity of zero can never satisfy the completion barrier, so it is
//! rejected at construction.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::WorkerConfig;
use crate::error::{Result, WorkerError};
use crate::executor::slot::{CompletionGuard, TaskSlot};
use crate::resources::{ResourceProbe, SystemResources};

/// The figures the sizing formula produced, kept for logging and inspection.
#[derive(Debug, Clone, Copy)]
pub struct CapacityPlan {
    /// Logical CPU count at sizing time.
    pub cpu_count: usize,
    /// Available memory at sizing time, in bytes.
    pub available_memory_bytes: u64,
    /// How many workers of this memory budget the host could run at once.
    pub coresident_workers: u64,
    /// This worker's rough CPU share, one decimal, ties rounded down.
    pub cores_per_worker: f64,
    /// Final slot count.
    pub capacity: usize,
}

/// Compute the slot capacity for one worker from a resource sample.
pub fn plan_capacity(
    resources: &SystemResources,
    memory_budget_bytes: u64,
    thread_num_factor: u32,
) -> Result<CapacityPlan> {
    if memory_budget_bytes == 0 {
        return Err(WorkerError::CapacityComputation(
            "memory budget must be non-zero".to_string(),
        ));
    }

    let coresident_workers = (resources.available_memory_bytes / memory_budget_bytes).max(1);
    let cores_per_worker =
        round_half_down(resources.cpu_count as f64 / coresident_workers as f64, 1);
    let capacity = (cores_per_worker * f64::from(thread_num_factor)).floor() as usize;

    if capacity == 0 {
        return Err(WorkerError::CapacityComputation(format!(
            "formula yielded zero slots (cpus: {}, coresident workers: {}, cores per worker: {}, factor: {})",
            resources.cpu_count, coresident_workers, cores_per_worker, thread_num_factor
        )));
    }

    Ok(CapacityPlan {
        cpu_count: resources.cpu_count,
        available_memory_bytes: resources.available_memory_bytes,
        coresident_workers,
        cores_per_worker,
        capacity,
    })
}

/// Round to `scale` decimal places with ties rounded toward zero.
fn round_half_down(value: f64, scale: u32) -> f64 {
    let factor = 10f64.powi(scale as i32);
    let scaled = value * factor;
    let floor = scaled.floor();
    if scaled - floor > 0.5 {
        (floor + 1.0) / factor
    } else {
        floor / factor
    }
}

/// A tracked slot: the slot itself plus its reschedule token.
struct SlotHandle {
    slot: Arc<dyn TaskSlot>,
    reschedule: CancellationToken,
}

/// Bounded pool of concurrent task slots.
///
/// Capacity is computed once at construction and never changes. Submission
/// order is preserved in the tracked set and is the order consulted when
/// rescheduling.
pub struct ExecutorPool {
    capacity: usize,
    active: Mutex<Vec<SlotHandle>>,
    supervisors: Mutex<Vec<JoinHandle<()>>>,
    accepting: AtomicBool,
}

impl ExecutorPool {
    /// Create a pool sized from a fresh resource sample.
    pub fn new(config: &WorkerConfig, probe: &dyn ResourceProbe) -> Result<Self> {
        let resources = probe.snapshot();
        let plan = plan_capacity(
            &resources,
            config.memory_budget_bytes(),
            config.thread_num_factor,
        )?;

        info!(
            "creating executor pool with {} task slots (cpus: {}, available memory: {} MB, coresident workers: {}, cores per worker: {})",
            plan.capacity,
            plan.cpu_count,
            plan.available_memory_bytes / (1024 * 1024),
            plan.coresident_workers,
            plan.cores_per_worker
        );

        Ok(Self {
            capacity: plan.capacity,
            active: Mutex::new(Vec::with_capacity(plan.capacity)),
            supervisors: Mutex::new(Vec::with_capacity(plan.capacity)),
            accepting: AtomicBool::new(true),
        })
    }

    /// Fixed slot capacity of this pool.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether the pool still accepts submissions.
    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    /// Submit a slot for concurrent execution.
    ///
    /// The slot is tracked in submission order and dispatched onto the
    /// runtime under a supervising task that logs a failing slot and releases
    /// `guard` on every exit path.
    pub fn submit(&self, slot: Arc<dyn TaskSlot>, guard: CompletionGuard) -> Result<()> {
        if !self.is_accepting() {
            return Err(WorkerError::PoolDraining);
        }

        let reschedule = CancellationToken::new();
        {
            let mut active = self.active.lock();
            if active.len() >= self.capacity {
                return Err(WorkerError::InvalidArgument(format!(
                    "executor pool is at capacity ({})",
                    self.capacity
                )));
            }
            active.push(SlotHandle {
                slot: Arc::clone(&slot),
                reschedule: reschedule.clone(),
            });
        }

        let supervisor = tokio::spawn(async move {
            let _guard = guard;
            if let Err(e) = slot.run(reschedule).await {
                error!("task slot failed: {e}");
            }
        });
        self.supervisors.lock().push(supervisor);

        Ok(())
    }

    /// Prune every tracked slot that reports free and return the new count.
    ///
    /// This is a query with a side effect: the pruned slots are no longer
    /// tracked and can no longer be rescheduled.
    pub fn remaining_executor_size(&self) -> usize {
        let mut active = self.active.lock();
        active.retain(|handle| !handle.slot.is_free());
        active.len()
    }

    /// Ask the first `count` slots, in submission order, to reschedule away.
    ///
    /// Cooperative only: each selected slot's token is cancelled and the slot
    /// is removed from tracking; the slot itself is trusted to observe the
    /// token, exit promptly, and release its completion count.
    pub fn reschedule_executors(&self, count: usize) -> Result<()> {
        let mut active = self.active.lock();
        if count > active.len() {
            return Err(WorkerError::InvalidArgument(format!(
                "cannot reschedule {} slots, only {} are tracked",
                count,
                active.len()
            )));
        }

        for handle in active.drain(..count) {
            handle.reschedule.cancel();
        }

        info!("requested reschedule of {count} task slots");
        Ok(())
    }

    /// Stop accepting submissions and wait for every supervising task to end.
    ///
    /// In-flight slots are not interrupted; the wait is bounded by `timeout`.
    /// A slot that panicked is logged here and counts as terminated.
    pub async fn drain(&self, timeout: Duration) -> Result<()> {
        self.accepting.store(false, Ordering::Release);

        let supervisors: Vec<JoinHandle<()>> = std::mem::take(&mut *self.supervisors.lock());
        if supervisors.is_empty() {
            info!("executor pool drained, no supervising tasks were running");
            return Ok(());
        }

        info!(
            "draining executor pool, waiting for {} supervising tasks",
            supervisors.len()
        );

        match tokio::time::timeout(timeout, join_all(supervisors)).await {
            Ok(results) => {
                for result in results {
                    if let Err(e) = result {
                        if e.is_panic() {
                            error!("task slot panicked during execution: {e}");
                        } else {
                            warn!("task slot supervisor was aborted: {e}");
                        }
                    }
                }
                info!("executor pool fully terminated");
                Ok(())
            }
            Err(_) => {
                warn!("executor pool did not terminate within {timeout:?}");
                Err(WorkerError::DrainTimeout(timeout))
            }
        }
    }
}
