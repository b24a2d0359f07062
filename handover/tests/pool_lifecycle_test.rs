// Lifecycle tests for DefaultThreadPool: start preconditions, worker
// convergence, job execution and failure isolation.


use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use handover::{
    DefaultThreadFactory, DefaultThreadPool, ExceptionHandler, PoolError, PoolState, ThreadFactory,
    ThreadPool, ThreadPoolConfig, WorkerJob,
};
use test_helpers::{wait_until, CollectingHandler, QueueJob, WorkItem};

fn pool_with_job(name: &str, size: usize) -> (DefaultThreadPool<QueueJob>, QueueJob) {
    let job = QueueJob::new();
    let pool = DefaultThreadPool::new(ThreadPoolConfig::new(name).with_desired_pool_size(size));
    (pool, job)
}

#[test]
fn test_start_requires_a_configured_job() {
    let (pool, _job) = pool_with_job("no-job", 1);
    assert!(matches!(pool.start(), Err(PoolError::NoWorkerJob)));
    assert_eq!(pool.state(), PoolState::Unstarted);
}

#[test]
fn test_start_is_idempotent() {
    let (pool, job) = pool_with_job("idempotent-start", 2);
    pool.set_worker_job(job).unwrap();
    pool.start().unwrap();
    pool.start().unwrap();
    assert_eq!(pool.state(), PoolState::Started);
    assert!(wait_until(Duration::from_secs(2), || {
        pool.actual_pool_size() == 2
    }));
    pool.shutdown_now();
    pool.await_shutdown().unwrap();
}

#[test]
fn test_pool_converges_to_desired_size() {
    let (pool, job) = pool_with_job("converge", 3);
    pool.set_worker_job(job).unwrap();
    pool.start().unwrap();
    assert!(wait_until(Duration::from_secs(2), || {
        pool.actual_pool_size() == 3
    }));
    assert_eq!(pool.desired_pool_size(), 3);
    pool.shutdown_now();
    pool.await_shutdown().unwrap();
}

#[test]
fn test_configuration_is_rejected_after_start() {
    let (pool, job) = pool_with_job("late-config", 1);
    pool.set_worker_job(job).unwrap();
    pool.start().unwrap();
    let late = QueueJob::new();
    assert!(matches!(
        pool.set_worker_job(late),
        Err(PoolError::InvalidState { state: PoolState::Started, .. })
    ));
    assert!(matches!(
        pool.set_exception_handler(CollectingHandler::new()),
        Err(PoolError::InvalidState { .. })
    ));
    pool.shutdown_now();
    pool.await_shutdown().unwrap();
}

#[test]
fn test_queued_work_is_executed() {
    let (pool, job) = pool_with_job("execute", 2);
    let queue = job.queue();
    let executed = job.executed();
    pool.set_worker_job(job).unwrap();
    pool.start().unwrap();
    for _ in 0..10 {
        queue.push(WorkItem::Count);
    }
    assert!(wait_until(Duration::from_secs(2), || {
        executed.load(Ordering::SeqCst) == 10
    }));
    pool.shutdown();
    pool.await_shutdown().unwrap();
}

#[test]
fn test_job_failures_reach_the_handler_and_workers_survive() {
    let (pool, job) = pool_with_job("failures", 1);
    let queue = job.queue();
    let executed = job.executed();
    let handler = CollectingHandler::new();
    pool.set_worker_job(job).unwrap();
    pool.set_exception_handler(handler.clone()).unwrap();
    pool.start().unwrap();

    queue.push(WorkItem::Fail("bad unit".to_string()));
    queue.push(WorkItem::Panic("exploding unit".to_string()));
    queue.push(WorkItem::Count);

    // The same worker keeps going after both failures
    assert!(wait_until(Duration::from_secs(2), || {
        executed.load(Ordering::SeqCst) == 1
    }));
    assert_eq!(pool.actual_pool_size(), 1);
    let messages = handler.messages();
    assert_eq!(messages.len(), 2);
    assert!(messages[0].contains("bad unit"));
    assert!(messages[1].contains("exploding unit"));
    pool.shutdown();
    pool.await_shutdown().unwrap();
}

#[test]
fn test_work_outcome_stop_removes_the_worker() {
    let (pool, job) = pool_with_job("stop-outcome", 1);
    let queue = job.queue();
    pool.set_worker_job(job).unwrap();
    pool.start().unwrap();
    queue.push(WorkItem::Stop);
    assert!(wait_until(Duration::from_secs(2), || {
        pool.actual_pool_size() == 0
    }));
    // The pool itself is still running; only the worker left
    assert_eq!(pool.state(), PoolState::Started);
    pool.shutdown();
    pool.await_shutdown().unwrap();
}

#[test]
fn test_shutdown_of_unstarted_pool_is_immediate() {
    let (pool, job) = pool_with_job("unstarted-shutdown", 2);
    pool.set_worker_job(job).unwrap();
    pool.shutdown();
    assert_eq!(pool.state(), PoolState::Shutdown);
    pool.await_shutdown().unwrap();
    assert!(matches!(
        pool.start(),
        Err(PoolError::InvalidState { state: PoolState::Shutdown, .. })
    ));
}

#[test]
fn test_jobs_can_block_on_the_shared_queue_without_executing() {
    // An empty backing queue keeps workers idle but alive
    let (pool, job) = pool_with_job("idle", 2);
    let executed = job.executed();
    pool.set_worker_job(job).unwrap();
    pool.start().unwrap();
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(executed.load(Ordering::SeqCst), 0);
    assert_eq!(pool.actual_pool_size(), 2);
    pool.shutdown();
    pool.await_shutdown().unwrap();
}

/// A handler that panics on every delivery. Injected code, so its
/// failure must not corrupt the pool's worker accounting.
struct PanickingHandler;

impl ExceptionHandler for PanickingHandler {
    fn handle(&self, error: Box<dyn std::error::Error + Send + Sync>) {
        panic!("handler rejected: {}", error);
    }
}

#[test]
fn test_panicking_handler_does_not_strand_the_pool() {
    let (pool, job) = pool_with_job("panicking-handler", 1);
    let queue = job.queue();
    pool.set_worker_job(job).unwrap();
    pool.set_exception_handler(Arc::new(PanickingHandler)).unwrap();
    pool.start().unwrap();

    // The failing unit reaches the handler, whose panic kills the worker
    // thread; the worker must still leave the pool's set on the way out.
    queue.push(WorkItem::Fail("bad unit".to_string()));
    assert!(wait_until(Duration::from_secs(2), || {
        pool.actual_pool_size() == 0
    }));
    assert_eq!(pool.state(), PoolState::Started);

    // With the set consistent, shutdown still reaches the terminal state.
    pool.shutdown();
    pool.try_await_shutdown(Duration::from_secs(2)).unwrap();
    assert_eq!(pool.state(), PoolState::Shutdown);
}

/// Delegates the first spawn and fails every one after it.
struct FlakyFactory {
    inner: DefaultThreadFactory,
    spawned: AtomicUsize,
}

impl FlakyFactory {
    fn new() -> Self {
        Self {
            inner: DefaultThreadFactory::new("flaky"),
            spawned: AtomicUsize::new(0),
        }
    }
}

impl ThreadFactory for FlakyFactory {
    fn spawn_worker(&self, body: Box<dyn FnOnce() + Send + 'static>) -> io::Result<JoinHandle<()>> {
        if self.spawned.fetch_add(1, Ordering::SeqCst) >= 1 {
            return Err(io::Error::new(io::ErrorKind::Other, "thread limit reached"));
        }
        self.inner.spawn_worker(body)
    }
}

#[test]
fn test_failed_start_rolls_back_to_unstarted() {
    let job = QueueJob::new();
    let pool = DefaultThreadPool::with_factory(
        ThreadPoolConfig::new("flaky-start").with_desired_pool_size(2),
        Arc::new(FlakyFactory::new()),
    );
    pool.set_worker_job(job).unwrap();

    let err = pool.start().unwrap_err();
    assert!(matches!(err, PoolError::ThreadSetup(_)));
    // The pool never claims to be started, and the worker spawned before
    // the failure drains away.
    assert_eq!(pool.state(), PoolState::Unstarted);
    assert!(wait_until(Duration::from_secs(2), || {
        pool.actual_pool_size() == 0
    }));
    pool.shutdown();
    pool.await_shutdown().unwrap();
}

// Trait-level smoke check that QueueJob is a well-behaved WorkerJob
#[test]
fn test_queue_job_drain_fetch_reports_empty() {
    let job = QueueJob::new();
    assert!(job.get_work_while_shutting_down().is_none());
    job.queue().push(WorkItem::Count);
    assert!(job.get_work_while_shutting_down().is_some());
}
