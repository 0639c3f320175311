//! # Worker Process Lifecycle
//!
//! The singleton lifecycle state machine of the worker: it owns one executor
//! pool and the coordinator-side collaborators, drives start-up, blocks until
//! every task slot has finished, and performs shutdown exactly once no matter
//! which trigger fires first - normal completion, a start-up failure, or an
//! external termination signal.
//!
//! ## Shutdown reachability
//!
//! `shutdown()` is reachable from two independent triggers: the cleanup path
//! of `start()` and the termination hook installed for SIGTERM/ctrl-c. The
//! status cell's compare-and-swap makes the sequence exactly-once; the losing
//! caller returns successfully with no side effects.

pub mod status;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::WorkerConfig;
use crate::coordinator::CoordinatorServices;
use crate::error::{Result, WorkerError};
use crate::executor::slot::{CompletionBarrier, CompletionGuard};
use crate::executor::{ExecutorPool, TaskSlotFactory};
use crate::resources::ResourceProbe;

pub use status::WorkerStatus;

use status::StatusCell;

/// Occupancy flag enforcing at most one worker process per runtime.
static PROCESS_ACTIVE: AtomicBool = AtomicBool::new(false);

/// Held by a live [`WorkerProcess`]; released when it drops.
#[derive(Debug)]
struct ProcessRegistration(());

impl ProcessRegistration {
    fn acquire() -> Result<Self> {
        if PROCESS_ACTIVE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            Ok(Self(()))
        } else {
            Err(WorkerError::AlreadyRegistered)
        }
    }
}

impl Drop for ProcessRegistration {
    fn drop(&mut self) {
        PROCESS_ACTIVE.store(false, Ordering::Release);
    }
}

/// Handle for requesting worker termination from outside the process, the
/// same path a SIGTERM takes.
#[derive(Debug, Clone)]
pub struct TerminationHandle {
    token: CancellationToken,
}

impl TerminationHandle {
    /// Ask the worker to shut down. Safe to call any number of times and
    /// safe to race with a shutdown already in progress.
    pub fn terminate(&self) {
        self.token.cancel();
    }
}

/// The worker process lifecycle state machine.
///
/// Construct once per runtime, call [`start`](Self::start), and the process
/// runs its slots to completion and cleans up behind itself. See the module
/// docs for the shutdown semantics.
pub struct WorkerProcess {
    id: Uuid,
    // Handed to the termination hook so the hook never extends the
    // process lifetime on its own.
    self_ref: Weak<WorkerProcess>,
    config: WorkerConfig,
    status: StatusCell,
    pool: Arc<ExecutorPool>,
    barrier: Arc<CompletionBarrier>,
    services: CoordinatorServices,
    slot_factory: Arc<dyn TaskSlotFactory>,
    terminate: CancellationToken,
    closed: CancellationToken,
    _registration: ProcessRegistration,
}

impl std::fmt::Debug for WorkerProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerProcess")
            .field("id", &self.id)
            .field("status", &self.status.load())
            .finish_non_exhaustive()
    }
}

impl WorkerProcess {
    /// Create the worker process.
    ///
    /// Fails if a worker process already exists in this runtime, if the
    /// configuration is invalid, or if the capacity formula yields a pool of
    /// zero slots.
    pub fn new(
        config: WorkerConfig,
        services: CoordinatorServices,
        slot_factory: Arc<dyn TaskSlotFactory>,
        probe: &dyn ResourceProbe,
    ) -> Result<Arc<Self>> {
        let registration = ProcessRegistration::acquire()?;
        config.validate()?;

        let pool = Arc::new(ExecutorPool::new(&config, probe)?);
        let barrier = Arc::new(CompletionBarrier::new(pool.capacity()));
        let id = Uuid::new_v4();

        info!(
            worker_id = %id,
            task_id = %config.task_id,
            capacity = pool.capacity(),
            "created worker process"
        );

        Ok(Arc::new_cyclic(|self_ref| Self {
            id,
            self_ref: self_ref.clone(),
            config,
            status: StatusCell::new(),
            pool,
            barrier,
            services,
            slot_factory,
            terminate: CancellationToken::new(),
            closed: CancellationToken::new(),
            _registration: registration,
        }))
    }

    /// Instance id of this worker process.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current lifecycle status.
    pub fn status(&self) -> WorkerStatus {
        self.status.load()
    }

    pub fn is_running(&self) -> bool {
        self.status.load() == WorkerStatus::Running
    }

    /// The executor pool this process owns. Exposed so the channel layer can
    /// answer coordinator queries about remaining slots and carry out
    /// reschedule requests.
    pub fn executor_pool(&self) -> &ExecutorPool {
        &self.pool
    }

    /// Handle that triggers the same shutdown path as a termination signal.
    pub fn termination_handle(&self) -> TerminationHandle {
        TerminationHandle {
            token: self.terminate.clone(),
        }
    }

    /// Run the worker: connect, announce, submit every slot, report
    /// progress, and block until all slots have finished.
    ///
    /// Fails without side effects when the process is not in NotStarted.
    /// Whatever happens after the transition - normal completion or an error
    /// in any start-up step - `shutdown()` runs exactly once before this
    /// returns.
    pub async fn start(&self) -> Result<()> {
        if !self
            .status
            .transition(WorkerStatus::NotStarted, WorkerStatus::Running)
        {
            return Err(WorkerError::InvalidState(format!(
                "worker process already started or shut down (status: {})",
                self.status.load()
            )));
        }

        info!(worker_id = %self.id, "🚀 WORKER: starting worker process");

        let outcome = self.run_until_complete().await;
        if let Err(e) = &outcome {
            error!(worker_id = %self.id, "worker start-up failed: {e}");
        }

        // Shutdown runs on every exit path; its own errors are logged, the
        // caller sees the start-up outcome.
        if let Err(e) = self.shutdown().await {
            error!(worker_id = %self.id, "shutdown after start reported: {e}");
        }

        outcome
    }

    async fn run_until_complete(&self) -> Result<()> {
        self.services
            .channel
            .connect(
                &self.config.coordinator_addresses,
                self.config.coordinator_port,
            )
            .await?;

        self.services.announcer.increase().await?;

        self.install_termination_hook();

        self.submit_all_slots()?;

        self.services.reporter.start().await?;

        self.await_termination().await;
        Ok(())
    }

    /// Create and submit exactly `capacity` task slots.
    fn submit_all_slots(&self) -> Result<()> {
        for index in 0..self.pool.capacity() {
            let slot = self.slot_factory.create_slot(index)?;
            self.pool
                .submit(slot, CompletionGuard::new(Arc::clone(&self.barrier)))?;
        }
        info!("submitted {} task slots", self.pool.capacity());
        Ok(())
    }

    /// Suspend until every submitted slot has released its completion count.
    pub async fn await_termination(&self) {
        self.barrier.wait().await;
        info!(worker_id = %self.id, "all task slots finished");
    }

    /// Shut the worker down: drain the pool, stop reporting, de-announce,
    /// release persistent resources, wait the grace period, close the
    /// channel.
    ///
    /// Idempotent and safe under concurrent invocation: only the caller that
    /// wins the Running -> Shutdown transition performs the sequence; every
    /// other caller returns immediately with no side effects. Failing steps
    /// are logged and never abort the remaining steps.
    #[instrument(skip(self), fields(worker_id = %self.id))]
    pub async fn shutdown(&self) -> Result<()> {
        if !self
            .status
            .transition(WorkerStatus::Running, WorkerStatus::Shutdown)
        {
            debug!("shutdown requested but worker is not running, nothing to do");
            return Ok(());
        }

        info!("🛑 WORKER: shutting down worker process");

        if let Err(e) = self.pool.drain(self.config.drain_timeout).await {
            error!("failed to drain executor pool: {e}");
        }

        if let Err(e) = self.services.reporter.shutdown().await {
            error!("failed to stop progress reporter: {e}");
        }

        if let Err(e) = self.services.announcer.decrease().await {
            error!("failed to decrement worker presence: {e}");
        }

        if let Err(e) = self.services.resources.destroy().await {
            error!("failed to release persistent resources: {e}");
        }

        // Give in-flight progress and persistence traffic a moment to flush
        // before the channel goes away.
        tokio::time::sleep(self.config.shutdown_grace).await;

        if let Err(e) = self.services.channel.shutdown().await {
            error!("failed to close coordinator channel: {e}");
        }

        self.closed.cancel();
        info!("✅ WORKER: worker process shut down");
        Ok(())
    }

    /// Install the termination hook: a background task that waits for an OS
    /// termination signal or a [`TerminationHandle`] request and invokes
    /// `shutdown()`. The task holds only a weak reference and exits once the
    /// worker has shut down, so it never outlives the process it serves.
    fn install_termination_hook(&self) {
        let process = self.self_ref.clone();
        let terminate = self.terminate.clone();
        let closed = self.closed.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = termination_signal() => {
                    warn!("termination signal received, shutting down worker process");
                }
                _ = terminate.cancelled() => {
                    warn!("termination requested, shutting down worker process");
                }
                _ = closed.cancelled() => {
                    return;
                }
            }

            let Some(process) = process.upgrade() else {
                return;
            };
            if let Err(e) = process.shutdown().await {
                error!("shutdown triggered by termination signal failed: {e}");
            }
        });
    }
}

/// Wait for an OS termination signal (ctrl-c, and SIGTERM on unix).
async fn termination_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install interrupt handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => {}
        _ = terminate => {}
    }
}
