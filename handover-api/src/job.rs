use std::io;
use std::thread::JoinHandle;

use crate::errors::JobError;

/// What a worker should do after executing a unit of work.
///
/// This is the explicit contract for job-requested worker termination:
/// returning [`Stop`](WorkOutcome::Stop) makes the executing worker remove
/// itself from its pool, exactly as if the pool had been shrunk past it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkOutcome {
    /// Keep the worker looping.
    Continue,
    /// The worker should exit after this unit.
    Stop,
}

/// The pluggable unit of work a thread pool repeatedly executes.
///
/// The contract is two-phase: fetch then execute. [`get_work`] may block
/// indefinitely while the pool is healthy and must be interruptible:
/// idle-worker interruption is how the pool wakes a blocked worker to
/// re-evaluate its loop, so jobs should block on this library's
/// primitives (or otherwise observe the interrupt handle) rather than on
/// raw OS waits.
///
/// [`get_work_while_shutting_down`] is used instead once a worker has
/// observed shutdown. It must not block indefinitely; returning `None`
/// means "drained, nothing left" and lets the worker exit. The split
/// exists so a worker forced out of a blocked `get_work` by interruption
/// still knows what "no more work" means during a drain.
///
/// [`get_work`]: Self::get_work
/// [`get_work_while_shutting_down`]: Self::get_work_while_shutting_down
pub trait WorkerJob: Send + Sync + 'static {
    /// The unit of work this job produces.
    type Work: Send;

    /// Fetches the next unit, blocking until one is available.
    fn get_work(&self) -> Result<Self::Work, JobError>;

    /// Fetches a remaining unit during shutdown, or `None` if drained.
    /// Must return promptly.
    fn get_work_while_shutting_down(&self) -> Option<Self::Work>;

    /// Executes one unit. Errors do not stop the worker; they are
    /// delivered to the pool's exception handler.
    fn run_work(&self, work: Self::Work)
        -> Result<WorkOutcome, Box<dyn std::error::Error + Send + Sync>>;
}

/// Receives failures from inside pool workers.
///
/// Job errors and caught panics never propagate to the pool's public API
/// and never kill the worker thread; they are handed here and the worker
/// resumes its loop.
pub trait ExceptionHandler: Send + Sync {
    fn handle(&self, error: Box<dyn std::error::Error + Send + Sync>);
}

/// The default handler: failures are swallowed unless one is supplied.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullExceptionHandler;

impl ExceptionHandler for NullExceptionHandler {
    fn handle(&self, _error: Box<dyn std::error::Error + Send + Sync>) {}
}

/// Creates the OS threads a pool runs its workers on.
///
/// The seam exists so embedders can control naming, stack size or spawn
/// bookkeeping. The default implementation names threads sequentially
/// within a pool. The pool never joins the returned handle; workers
/// remove themselves from the pool's accounting before exiting.
pub trait ThreadFactory: Send + Sync {
    fn spawn_worker(
        &self,
        body: Box<dyn FnOnce() + Send + 'static>,
    ) -> io::Result<JoinHandle<()>>;
}
