//! End-to-end lifecycle tests for the worker process: start-up ordering,
//! completion-barrier blocking, exactly-once shutdown under competing
//! triggers, cooperative rescheduling, and slot failure isolation.
//!
//! All coordinator-side collaborators are mocks that record their calls into
//! a shared log, so the tests can assert both the order and the cardinality
//! of every side effect.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use range_worker::{
    CoordinatorChannel, CoordinatorServices, FixedProbe, PersistentResourceManager,
    PresenceAnnouncer, ProgressReporter, TaskSlot, TaskSlotFactory, WorkerConfig, WorkerError,
    WorkerProcess, WorkerStatus,
};

const MB: u64 = 1024 * 1024;

// The worker process is at-most-one per runtime, so the tests in this binary
// must not overlap.
static TEST_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

fn lock_test() -> std::sync::MutexGuard<'static, ()> {
    TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Default)]
struct CallLog {
    entries: Mutex<Vec<String>>,
}

impl CallLog {
    fn record(&self, entry: &str) {
        self.entries.lock().push(entry.to_string());
    }

    fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    fn count(&self, entry: &str) -> usize {
        self.entries.lock().iter().filter(|e| *e == entry).count()
    }

    fn first_position(&self, entry: &str) -> Option<usize> {
        self.entries.lock().iter().position(|e| e == entry)
    }

    fn last_position(&self, entry: &str) -> Option<usize> {
        self.entries.lock().iter().rposition(|e| e == entry)
    }
}

struct MockChannel {
    log: Arc<CallLog>,
    fail_connect: bool,
}

#[async_trait]
impl CoordinatorChannel for MockChannel {
    async fn connect(&self, addresses: &[String], port: u16) -> range_worker::Result<()> {
        assert!(!addresses.is_empty());
        assert_ne!(port, 0);
        self.log.record("channel.connect");
        if self.fail_connect {
            return Err(WorkerError::Collaborator("connection refused".to_string()));
        }
        Ok(())
    }

    async fn shutdown(&self) -> range_worker::Result<()> {
        self.log.record("channel.shutdown");
        Ok(())
    }
}

struct MockAnnouncer {
    log: Arc<CallLog>,
}

#[async_trait]
impl PresenceAnnouncer for MockAnnouncer {
    async fn increase(&self) -> range_worker::Result<()> {
        self.log.record("announcer.increase");
        Ok(())
    }

    async fn decrease(&self) -> range_worker::Result<()> {
        self.log.record("announcer.decrease");
        Ok(())
    }
}

struct MockReporter {
    log: Arc<CallLog>,
}

#[async_trait]
impl ProgressReporter for MockReporter {
    async fn start(&self) -> range_worker::Result<()> {
        self.log.record("reporter.start");
        Ok(())
    }

    async fn shutdown(&self) -> range_worker::Result<()> {
        self.log.record("reporter.shutdown");
        Ok(())
    }
}

struct MockResources {
    log: Arc<CallLog>,
}

#[async_trait]
impl PersistentResourceManager for MockResources {
    async fn destroy(&self) -> range_worker::Result<()> {
        self.log.record("resources.destroy");
        Ok(())
    }
}

fn mock_services(log: &Arc<CallLog>, fail_connect: bool) -> CoordinatorServices {
    CoordinatorServices::new(
        Arc::new(MockChannel {
            log: Arc::clone(log),
            fail_connect,
        }),
        Arc::new(MockAnnouncer {
            log: Arc::clone(log),
        }),
        Arc::new(MockReporter {
            log: Arc::clone(log),
        }),
        Arc::new(MockResources {
            log: Arc::clone(log),
        }),
    )
}

#[derive(Clone, Copy)]
enum SlotMode {
    /// Finish on their own after a short delay.
    CompleteQuickly,
    /// Run until the reschedule token fires.
    RunUntilRescheduled,
    /// Panic in the slot with this index, others finish on their own.
    PanicAtIndex(usize),
}

struct TestSlot {
    index: usize,
    mode: SlotMode,
    log: Arc<CallLog>,
    free: AtomicBool,
    rescheduled: AtomicBool,
}

#[async_trait]
impl TaskSlot for TestSlot {
    async fn run(&self, reschedule: CancellationToken) -> range_worker::Result<()> {
        match self.mode {
            SlotMode::CompleteQuickly => {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            SlotMode::RunUntilRescheduled => {
                reschedule.cancelled().await;
                self.rescheduled.store(true, Ordering::SeqCst);
            }
            SlotMode::PanicAtIndex(target) => {
                if self.index == target {
                    panic!("slot {} failed hard", self.index);
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }
        self.free.store(true, Ordering::SeqCst);
        self.log.record("slot.finished");
        Ok(())
    }

    fn is_free(&self) -> bool {
        self.free.load(Ordering::SeqCst)
    }
}

struct TestSlotFactory {
    mode: SlotMode,
    log: Arc<CallLog>,
    created: Mutex<Vec<Arc<TestSlot>>>,
}

impl TestSlotFactory {
    fn new(mode: SlotMode, log: &Arc<CallLog>) -> Arc<Self> {
        Arc::new(Self {
            mode,
            log: Arc::clone(log),
            created: Mutex::new(Vec::new()),
        })
    }

    fn created_count(&self) -> usize {
        self.created.lock().len()
    }

    fn slot(&self, index: usize) -> Arc<TestSlot> {
        Arc::clone(&self.created.lock()[index])
    }
}

impl TaskSlotFactory for TestSlotFactory {
    fn create_slot(&self, index: usize) -> range_worker::Result<Arc<dyn TaskSlot>> {
        let slot = Arc::new(TestSlot {
            index,
            mode: self.mode,
            log: Arc::clone(&self.log),
            free: AtomicBool::new(false),
            rescheduled: AtomicBool::new(false),
        });
        self.created.lock().push(Arc::clone(&slot));
        Ok(slot)
    }
}

fn test_config(capacity_hint: &str) -> WorkerConfig {
    WorkerConfig {
        coordinator_addresses: vec!["127.0.0.1".to_string()],
        coordinator_port: 7700,
        worker_address: "127.0.0.1".to_string(),
        task_id: format!("task-{capacity_hint}"),
        partition_page_size: 100,
        thread_num_factor: 1,
        memory_budget_mb: 1024,
        shutdown_grace: Duration::ZERO,
        drain_timeout: Duration::from_secs(5),
    }
}

/// Construct a worker with the given slot capacity, retrying briefly while a
/// previous test's registration is still being released.
async fn build_process(
    capacity: usize,
    services: CoordinatorServices,
    factory: Arc<dyn TaskSlotFactory>,
) -> Arc<WorkerProcess> {
    // cpu = capacity, available memory = one budget, factor = 1.
    let probe = FixedProbe::new(capacity, 1024 * MB);
    let config = test_config(&capacity.to_string());

    for _ in 0..200 {
        match WorkerProcess::new(
            config.clone(),
            services.clone(),
            Arc::clone(&factory),
            &probe,
        ) {
            Ok(process) => return process,
            Err(WorkerError::AlreadyRegistered) => {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            Err(e) => panic!("unexpected construction failure: {e}"),
        }
    }
    panic!("worker registration never released");
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn test_end_to_end_lifecycle_runs_shutdown_steps_in_order() {
    let _guard = lock_test();
    let log = Arc::new(CallLog::default());
    let factory = TestSlotFactory::new(SlotMode::CompleteQuickly, &log);
    let process = build_process(2, mock_services(&log, false), factory.clone()).await;

    process.start().await.unwrap();

    assert_eq!(process.status(), WorkerStatus::Shutdown);
    assert!(!process.is_running());
    assert_eq!(factory.created_count(), 2);
    assert_eq!(log.count("slot.finished"), 2);

    for entry in [
        "channel.connect",
        "announcer.increase",
        "reporter.start",
        "reporter.shutdown",
        "announcer.decrease",
        "resources.destroy",
        "channel.shutdown",
    ] {
        assert_eq!(log.count(entry), 1, "expected exactly one {entry}");
    }

    // Start-up order: connect, announce, then reporting.
    let connect = log.first_position("channel.connect").unwrap();
    let increase = log.first_position("announcer.increase").unwrap();
    let reporter_start = log.first_position("reporter.start").unwrap();
    assert!(connect < increase && increase < reporter_start);

    // Every slot finished before the drain completed and the shutdown
    // sequence moved on to the reporter.
    let last_slot = log.last_position("slot.finished").unwrap();
    let reporter_stop = log.first_position("reporter.shutdown").unwrap();
    let decrease = log.first_position("announcer.decrease").unwrap();
    let destroy = log.first_position("resources.destroy").unwrap();
    let channel_stop = log.first_position("channel.shutdown").unwrap();
    assert!(last_slot < reporter_stop);
    assert!(reporter_stop < decrease && decrease < destroy && destroy < channel_stop);
}

#[tokio::test]
async fn test_start_while_running_or_after_shutdown_fails() {
    let _guard = lock_test();
    let log = Arc::new(CallLog::default());
    let factory = TestSlotFactory::new(SlotMode::RunUntilRescheduled, &log);
    let process = build_process(3, mock_services(&log, false), factory.clone()).await;

    let runner = {
        let process = Arc::clone(&process);
        tokio::spawn(async move { process.start().await })
    };

    wait_until(|| log.count("reporter.start") == 1).await;
    assert_eq!(process.status(), WorkerStatus::Running);

    // Second start on a running process fails without disturbing it.
    let err = process.start().await.unwrap_err();
    assert!(matches!(err, WorkerError::InvalidState(_)));
    assert_eq!(process.status(), WorkerStatus::Running);

    // Asking for more slots than are tracked is rejected and changes nothing.
    let err = process.executor_pool().reschedule_executors(4).unwrap_err();
    assert!(matches!(err, WorkerError::InvalidArgument(_)));
    assert_eq!(process.executor_pool().remaining_executor_size(), 3);

    // Reschedule everything away; the completion barrier unblocks start().
    process.executor_pool().reschedule_executors(3).unwrap();
    runner.await.unwrap().unwrap();
    assert_eq!(process.status(), WorkerStatus::Shutdown);
    assert!(factory.slot(0).rescheduled.load(Ordering::SeqCst));

    // Start after shutdown fails as well.
    let err = process.start().await.unwrap_err();
    assert!(matches!(err, WorkerError::InvalidState(_)));
    assert_eq!(process.status(), WorkerStatus::Shutdown);
}

#[tokio::test]
async fn test_fifo_reschedule_selection() {
    let _guard = lock_test();
    let log = Arc::new(CallLog::default());
    let factory = TestSlotFactory::new(SlotMode::RunUntilRescheduled, &log);
    let process = build_process(3, mock_services(&log, false), factory.clone()).await;

    let runner = {
        let process = Arc::clone(&process);
        tokio::spawn(async move { process.start().await })
    };
    wait_until(|| factory.created_count() == 3).await;

    process.executor_pool().reschedule_executors(2).unwrap();
    wait_until(|| log.count("slot.finished") == 2).await;

    // First two submitted slots got the signal, the third did not.
    assert!(factory.slot(0).rescheduled.load(Ordering::SeqCst));
    assert!(factory.slot(1).rescheduled.load(Ordering::SeqCst));
    assert!(!factory.slot(2).rescheduled.load(Ordering::SeqCst));
    assert_eq!(process.executor_pool().remaining_executor_size(), 1);

    process.executor_pool().reschedule_executors(1).unwrap();
    runner.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_shutdown_before_start_is_a_noop() {
    let _guard = lock_test();
    let log = Arc::new(CallLog::default());
    let factory = TestSlotFactory::new(SlotMode::CompleteQuickly, &log);
    let process = build_process(1, mock_services(&log, false), factory.clone()).await;

    process.shutdown().await.unwrap();
    assert!(log.entries().is_empty(), "no-op shutdown had side effects");
    assert_eq!(process.status(), WorkerStatus::NotStarted);

    // The no-op did not consume the lifecycle; the worker still starts.
    process.start().await.unwrap();
    assert_eq!(process.status(), WorkerStatus::Shutdown);
    assert_eq!(log.count("channel.shutdown"), 1);
}

#[tokio::test]
async fn test_repeated_shutdown_after_completion_is_a_noop() {
    let _guard = lock_test();
    let log = Arc::new(CallLog::default());
    let factory = TestSlotFactory::new(SlotMode::CompleteQuickly, &log);
    let process = build_process(1, mock_services(&log, false), factory).await;

    process.start().await.unwrap();
    let entries_after_start = log.entries().len();

    process.shutdown().await.unwrap();
    assert_eq!(log.entries().len(), entries_after_start);
}

#[tokio::test]
async fn test_startup_failure_still_runs_shutdown_sequence() {
    let _guard = lock_test();
    let log = Arc::new(CallLog::default());
    let factory = TestSlotFactory::new(SlotMode::CompleteQuickly, &log);
    let process = build_process(1, mock_services(&log, true), factory.clone()).await;

    let err = process.start().await.unwrap_err();
    assert!(matches!(err, WorkerError::Collaborator(_)));
    assert_eq!(process.status(), WorkerStatus::Shutdown);

    // Nothing past the failing connect ran on the way up.
    assert_eq!(factory.created_count(), 0);
    assert_eq!(log.count("announcer.increase"), 0);
    assert_eq!(log.count("reporter.start"), 0);

    // The shutdown sequence still ran in full, best-effort.
    assert_eq!(log.count("reporter.shutdown"), 1);
    assert_eq!(log.count("announcer.decrease"), 1);
    assert_eq!(log.count("resources.destroy"), 1);
    assert_eq!(log.count("channel.shutdown"), 1);
}

#[tokio::test]
async fn test_concurrent_termination_and_completion_shut_down_once() {
    let _guard = lock_test();
    let log = Arc::new(CallLog::default());
    let factory = TestSlotFactory::new(SlotMode::CompleteQuickly, &log);
    let process = build_process(2, mock_services(&log, false), factory).await;

    // Race an external termination request against normal completion.
    let handle = process.termination_handle();
    let terminator = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1)).await;
        handle.terminate();
    });

    process.start().await.unwrap();
    terminator.await.unwrap();

    // Whichever trigger won, the sequence ran exactly once.
    wait_until(|| log.count("channel.shutdown") == 1).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(log.count("reporter.shutdown"), 1);
    assert_eq!(log.count("announcer.decrease"), 1);
    assert_eq!(log.count("resources.destroy"), 1);
    assert_eq!(log.count("channel.shutdown"), 1);
    assert_eq!(process.status(), WorkerStatus::Shutdown);
}

#[tokio::test]
async fn test_second_construction_fails_while_first_exists() {
    let _guard = lock_test();
    let log = Arc::new(CallLog::default());
    let factory = TestSlotFactory::new(SlotMode::CompleteQuickly, &log);
    let process = build_process(1, mock_services(&log, false), factory.clone()).await;

    let probe = FixedProbe::new(1, 1024 * MB);
    let err = WorkerProcess::new(
        test_config("second"),
        mock_services(&log, false),
        factory.clone(),
        &probe,
    )
    .unwrap_err();
    assert!(matches!(err, WorkerError::AlreadyRegistered));

    // The first instance is unaffected and fully usable.
    assert_eq!(process.status(), WorkerStatus::NotStarted);
    process.start().await.unwrap();
    assert_eq!(process.status(), WorkerStatus::Shutdown);

    // Dropping it releases the registration for a fresh instance.
    drop(process);
    let process = build_process(1, mock_services(&log, false), factory).await;
    assert_eq!(process.status(), WorkerStatus::NotStarted);
}

#[tokio::test]
async fn test_slot_panic_is_isolated_and_releases_the_barrier() {
    let _guard = lock_test();
    let log = Arc::new(CallLog::default());
    let factory = TestSlotFactory::new(SlotMode::PanicAtIndex(0), &log);
    let process = build_process(2, mock_services(&log, false), factory).await;

    // The panicking slot must not wedge the barrier or the drain.
    process.start().await.unwrap();

    assert_eq!(process.status(), WorkerStatus::Shutdown);
    assert_eq!(log.count("slot.finished"), 1);
    assert_eq!(log.count("channel.shutdown"), 1);
}
