use std::time::Duration;

use crate::errors::{AwaitShutdownError, Interrupted, PoolError};

/// Lifecycle states of a thread pool.
///
/// `Unstarted` is initial, `Shutdown` is terminal and irreversible. The
/// transition to `Shutdown` happens exactly once: either immediately when
/// shutdown is requested with no live workers, or performed by whichever
/// worker removes the last entry from the worker set while the pool is
/// `ShuttingDown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    /// Created, not yet started. The worker job may still be configured.
    Unstarted,
    /// Workers are running (or being spawned/shed towards the desired
    /// count).
    Started,
    /// Shutdown requested; remaining workers are draining.
    ShuttingDown,
    /// Terminal. The shutdown latch is open.
    Shutdown,
}

/// A dynamically resizable pool of worker threads, each repeatedly
/// fetching and executing units from a configured worker job.
///
/// The worker-set size trends toward the desired count but may transiently
/// differ while workers spawn or drain. Once shutting down, neither the
/// desired count nor the worker set ever grows again, even if work is
/// still outstanding and every worker has already left. That graceful-path
/// limitation is part of the contract; pools must not spawn replacement
/// workers during shutdown.
pub trait ThreadPool: Send + Sync {
    /// Starts the pool, spawning the desired number of workers. Requires
    /// a configured job. Idempotent on an already-started pool; fails
    /// with an invalid-state error once shutdown has begun.
    fn start(&self) -> Result<(), PoolError>;

    /// Graceful shutdown: interrupts idle workers only, lets busy workers
    /// finish their current unit and drain. No-op if already requested.
    fn shutdown(&self);

    /// Forced shutdown: interrupts every worker, idle or busy. May be
    /// called after `shutdown` to escalate.
    fn shutdown_now(&self);

    /// Blocks until the pool reaches `Shutdown`. Returns immediately if
    /// it already has.
    fn await_shutdown(&self) -> Result<(), Interrupted>;

    /// Bounded [`await_shutdown`](Self::await_shutdown).
    fn try_await_shutdown(&self, timeout: Duration) -> Result<(), AwaitShutdownError>;

    /// Lock-free probe of the current lifecycle state.
    fn state(&self) -> PoolState;

    /// Number of live workers right now (may differ transiently from the
    /// desired count).
    fn actual_pool_size(&self) -> usize;

    /// The worker count the pool is converging towards.
    fn desired_pool_size(&self) -> usize;

    /// Changes the desired worker count. Growth spawns the delta; shrink
    /// interrupts up to the delta of idle workers and lets busy ones
    /// remove themselves after their current unit. Fails with an
    /// invalid-state error once shutdown has begun.
    fn set_desired_pool_size(&self, size: usize) -> Result<(), PoolError>;
}
