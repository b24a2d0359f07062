//! The dynamic worker-pool engine.
//!
//! A pool owns a set of worker threads that each loop over: directive
//! check, fetch, execute. The lifecycle is the four-state machine
//! Unstarted -> Started -> ShuttingDown -> Shutdown, with the last two
//! transitions irreversible. All mutable pool state lives behind one
//! mutex; an atomic mirror of the state answers probes without it.

pub mod factory;
pub mod latch;
mod worker;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, info, trace};

use handover_api::errors::{AwaitShutdownError, Interrupted, PoolError, WaitError};
use handover_api::job::{ExceptionHandler, NullExceptionHandler, ThreadFactory, WorkerJob};
use handover_api::pool::{PoolState, ThreadPool};

use crate::interrupt::{self, InterruptHandle};

pub use factory::DefaultThreadFactory;
pub use latch::ShutdownLatch;

/// Pool construction parameters.
#[derive(Debug, Clone)]
pub struct ThreadPoolConfig {
    /// Pool name, used as the worker thread-name prefix and in logs.
    pub name: String,
    /// Worker count the pool converges towards once started.
    pub desired_pool_size: usize,
}

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        Self {
            name: "handover".to_string(),
            desired_pool_size: num_cpus::get(),
        }
    }
}

impl ThreadPoolConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_desired_pool_size(mut self, size: usize) -> Self {
        self.desired_pool_size = size;
        self
    }
}

/// What a worker should do next, decided under the pool lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Directive {
    /// Fetch and execute normally.
    Work,
    /// Shutdown observed: pull remaining units via the bounded fetch
    /// until the job reports drained, then exit.
    Drain,
    /// Leave the loop now. The pool has already dropped this worker from
    /// its accounting.
    Exit,
}

/// Per-worker bookkeeping the pool keeps while the worker lives.
struct WorkerHandle {
    interrupt: InterruptHandle,
    /// Held by the worker for exactly the duration of one unit. A
    /// successful `try_lock` from the pool means the worker is idle and
    /// safe to interrupt.
    busy: Arc<Mutex<()>>,
}

struct PoolCore {
    state: PoolState,
    desired_size: usize,
    workers: HashMap<usize, WorkerHandle>,
}

pub(crate) struct PoolShared<J: WorkerJob> {
    name: String,
    core: Mutex<PoolCore>,
    /// Mirror of `core.state`, written only under the core lock.
    state_probe: AtomicU8,
    latch: ShutdownLatch,
    job: Mutex<Option<Arc<J>>>,
    handler: Mutex<Arc<dyn ExceptionHandler>>,
    factory: Arc<dyn ThreadFactory>,
    next_worker_id: AtomicUsize,
}

fn state_to_u8(state: PoolState) -> u8 {
    match state {
        PoolState::Unstarted => 0,
        PoolState::Started => 1,
        PoolState::ShuttingDown => 2,
        PoolState::Shutdown => 3,
    }
}

fn state_from_u8(raw: u8) -> PoolState {
    match raw {
        0 => PoolState::Unstarted,
        1 => PoolState::Started,
        2 => PoolState::ShuttingDown,
        _ => PoolState::Shutdown,
    }
}

impl<J: WorkerJob> PoolShared<J> {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_state(&self, core: &mut PoolCore, state: PoolState) {
        core.state = state;
        self.state_probe.store(state_to_u8(state), Ordering::Release);
    }

    /// Terminal transition. Must be called with the core lock held; the
    /// latch is opened after releasing it so woken waiters never contend
    /// with us.
    fn finish_shutdown(&self, mut core: MutexGuard<'_, PoolCore>) {
        self.set_state(&mut core, PoolState::Shutdown);
        drop(core);
        if self.latch.open() {
            info!(pool = %self.name, "Pool shut down");
        }
    }

    fn directive(&self, id: usize) -> Directive {
        let mut core = self.core.lock();
        match core.state {
            PoolState::Started => {
                if core.workers.len() > core.desired_size {
                    // Removal and the over-size decision are atomic so
                    // two workers cannot both shed for the same delta.
                    core.workers.remove(&id);
                    trace!(pool = %self.name, worker = id, "Worker shed on shrink");
                    Directive::Exit
                } else {
                    Directive::Work
                }
            }
            PoolState::ShuttingDown => Directive::Drain,
            PoolState::Unstarted | PoolState::Shutdown => {
                core.workers.remove(&id);
                Directive::Exit
            }
        }
    }

    /// Drops a worker from the set. Whichever worker removes the last
    /// entry while shutting down performs the terminal transition.
    fn remove_worker(&self, id: usize) {
        let mut core = self.core.lock();
        core.workers.remove(&id);
        if core.state == PoolState::ShuttingDown && core.workers.is_empty() {
            self.finish_shutdown(core);
        }
    }

    /// Interrupts up to `limit` idle workers. A worker is idle when its
    /// busy lock can be grabbed; busy workers are left alone and will
    /// observe the state change after their current unit.
    fn interrupt_idle_workers(&self, core: &PoolCore, limit: usize) -> usize {
        let mut interrupted = 0;
        for (id, handle) in &core.workers {
            if interrupted == limit {
                break;
            }
            if let Some(_idle) = handle.busy.try_lock() {
                trace!(pool = %self.name, worker = id, "Interrupting idle worker");
                handle.interrupt.interrupt();
                interrupted += 1;
            }
        }
        interrupted
    }

    fn interrupt_all_workers(&self, core: &PoolCore) {
        for (id, handle) in &core.workers {
            trace!(pool = %self.name, worker = id, "Interrupting worker");
            handle.interrupt.interrupt();
        }
    }

    fn spawn_worker(self: &Arc<Self>, core: &mut PoolCore) -> Result<(), PoolError> {
        let job = self
            .job
            .lock()
            .clone()
            .ok_or(PoolError::NoWorkerJob)?;
        let handler = self.handler.lock().clone();
        let id = self.next_worker_id.fetch_add(1, Ordering::Relaxed);
        let handle = InterruptHandle::new();
        let busy = Arc::new(Mutex::new(()));
        core.workers.insert(
            id,
            WorkerHandle {
                interrupt: handle.clone(),
                busy: Arc::clone(&busy),
            },
        );

        let shared = Arc::clone(self);
        let body = Box::new(move || {
            interrupt::with_handle(handle, || worker::run(shared, id, job, handler, busy));
        });
        match self.factory.spawn_worker(body) {
            Ok(_detached) => Ok(()),
            Err(error) => {
                core.workers.remove(&id);
                Err(PoolError::ThreadSetup(error.to_string()))
            }
        }
    }
}

/// The standard [`ThreadPool`] implementation.
///
/// Cheap to clone; clones share the same pool. Dropping all clones does
/// not stop the workers; request a shutdown for that. The worker job and
/// exception handler are configured while the pool is still `Unstarted`
/// and are fixed from `start` onwards.
pub struct DefaultThreadPool<J: WorkerJob> {
    shared: Arc<PoolShared<J>>,
}

impl<J: WorkerJob> Clone for DefaultThreadPool<J> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<J: WorkerJob> std::fmt::Debug for DefaultThreadPool<J> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultThreadPool")
            .field("name", &self.shared.name)
            .field("state", &self.state())
            .field("desired_pool_size", &self.desired_pool_size())
            .finish()
    }
}

impl<J: WorkerJob> DefaultThreadPool<J> {
    pub fn new(config: ThreadPoolConfig) -> Self {
        let factory = Arc::new(DefaultThreadFactory::new(config.name.clone()));
        Self::with_factory(config, factory)
    }

    /// As [`new`](Self::new), with a caller-supplied thread factory.
    pub fn with_factory(config: ThreadPoolConfig, factory: Arc<dyn ThreadFactory>) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                name: config.name,
                core: Mutex::new(PoolCore {
                    state: PoolState::Unstarted,
                    desired_size: config.desired_pool_size,
                    workers: HashMap::new(),
                }),
                state_probe: AtomicU8::new(state_to_u8(PoolState::Unstarted)),
                latch: ShutdownLatch::new(),
                job: Mutex::new(None),
                handler: Mutex::new(Arc::new(NullExceptionHandler)),
                factory,
                next_worker_id: AtomicUsize::new(0),
            }),
        }
    }

    /// Configures the job workers will run. Only legal before `start`.
    pub fn set_worker_job(&self, job: J) -> Result<(), PoolError> {
        let core = self.shared.core.lock();
        if core.state != PoolState::Unstarted {
            return Err(PoolError::InvalidState {
                operation: "configure the worker job",
                state: core.state,
            });
        }
        *self.shared.job.lock() = Some(Arc::new(job));
        Ok(())
    }

    /// Replaces the no-op default handler. Only legal before `start`.
    pub fn set_exception_handler(
        &self,
        handler: Arc<dyn ExceptionHandler>,
    ) -> Result<(), PoolError> {
        let core = self.shared.core.lock();
        if core.state != PoolState::Unstarted {
            return Err(PoolError::InvalidState {
                operation: "configure the exception handler",
                state: core.state,
            });
        }
        *self.shared.handler.lock() = handler;
        Ok(())
    }

    fn request_shutdown(&self, forced: bool) {
        let mut core = self.shared.core.lock();
        match core.state {
            PoolState::Unstarted => {
                debug!(pool = %self.shared.name, "Shutdown of unstarted pool");
                self.shared.finish_shutdown(core);
            }
            PoolState::Started => {
                if core.workers.is_empty() {
                    self.shared.finish_shutdown(core);
                    return;
                }
                self.shared.set_state(&mut core, PoolState::ShuttingDown);
                info!(pool = %self.shared.name, forced, "Shutdown requested");
                if forced {
                    self.shared.interrupt_all_workers(&core);
                } else {
                    self.shared.interrupt_idle_workers(&core, usize::MAX);
                }
            }
            PoolState::ShuttingDown => {
                // Escalation: a forced request after a graceful one also
                // reaches the still-busy workers.
                if forced {
                    self.shared.interrupt_all_workers(&core);
                }
            }
            PoolState::Shutdown => {}
        }
    }
}

impl<J: WorkerJob> ThreadPool for DefaultThreadPool<J> {
    fn start(&self) -> Result<(), PoolError> {
        let mut core = self.shared.core.lock();
        match core.state {
            PoolState::Unstarted => {
                if self.shared.job.lock().is_none() {
                    return Err(PoolError::NoWorkerJob);
                }
                self.shared.set_state(&mut core, PoolState::Started);
                let desired = core.desired_size;
                for _ in 0..desired {
                    if let Err(error) = self.shared.spawn_worker(&mut core) {
                        // Roll back so the caller observes Unstarted and
                        // can retry. Workers spawned before the failure
                        // see the rollback in their directive check and
                        // exit; interrupting reaches any already parked
                        // in a fetch.
                        self.shared.set_state(&mut core, PoolState::Unstarted);
                        self.shared.interrupt_all_workers(&core);
                        return Err(error);
                    }
                }
                info!(pool = %self.shared.name, workers = desired, "Pool started");
                Ok(())
            }
            PoolState::Started => Ok(()),
            state => Err(PoolError::InvalidState {
                operation: "start",
                state,
            }),
        }
    }

    fn shutdown(&self) {
        self.request_shutdown(false);
    }

    fn shutdown_now(&self) {
        self.request_shutdown(true);
    }

    fn await_shutdown(&self) -> Result<(), Interrupted> {
        self.shared.latch.await_open()
    }

    fn try_await_shutdown(&self, timeout: Duration) -> Result<(), AwaitShutdownError> {
        self.shared
            .latch
            .try_await_open(timeout)
            .map_err(|error| match error {
                WaitError::Interrupted(interrupted) => AwaitShutdownError::Interrupted(interrupted),
                WaitError::TimedOut => AwaitShutdownError::TimedOut(timeout),
            })
    }

    fn state(&self) -> PoolState {
        state_from_u8(self.shared.state_probe.load(Ordering::Acquire))
    }

    fn actual_pool_size(&self) -> usize {
        self.shared.core.lock().workers.len()
    }

    fn desired_pool_size(&self) -> usize {
        self.shared.core.lock().desired_size
    }

    fn set_desired_pool_size(&self, size: usize) -> Result<(), PoolError> {
        let mut core = self.shared.core.lock();
        match core.state {
            PoolState::Unstarted => {
                core.desired_size = size;
                Ok(())
            }
            PoolState::Started => {
                core.desired_size = size;
                let actual = core.workers.len();
                if size > actual {
                    debug!(pool = %self.shared.name, from = actual, to = size, "Growing pool");
                    for _ in 0..(size - actual) {
                        self.shared.spawn_worker(&mut core)?;
                    }
                } else if size < actual {
                    // Wake up to the delta of idle workers so they can
                    // shed; busy workers observe the over-size after
                    // their current unit.
                    debug!(pool = %self.shared.name, from = actual, to = size, "Shrinking pool");
                    self.shared.interrupt_idle_workers(&core, actual - size);
                }
                Ok(())
            }
            state => Err(PoolError::InvalidState {
                operation: "resize",
                state,
            }),
        }
    }
}
