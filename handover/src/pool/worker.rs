//! The worker loop.
//!
//! Each worker repeatedly: asks the pool for a directive, fetches a unit,
//! executes it while holding its busy lock, and reports failures to the
//! exception handler. Interrupts received while fetching are swallowed:
//! idle-worker interruption is the pool's normal mechanism for making a
//! worker re-evaluate its directive, not an error.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use handover_api::errors::{JobError, WorkerPanic};
use handover_api::job::{ExceptionHandler, WorkOutcome, WorkerJob};

use crate::interrupt::InterruptHandle;

use super::{Directive, PoolShared};

/// Deregisters the worker from the pool when its loop ends for any
/// reason, including a panic unwinding out of an injected exception
/// handler. A dead worker must never stay in the pool's set, or the
/// terminal shutdown transition could never happen. `remove_worker` is
/// idempotent, so the loop's own exit paths need no special casing.
struct Deregister<'a, J: WorkerJob> {
    shared: &'a Arc<PoolShared<J>>,
    id: usize,
}

impl<J: WorkerJob> Drop for Deregister<'_, J> {
    fn drop(&mut self) {
        self.shared.remove_worker(self.id);
    }
}

pub(super) fn run<J: WorkerJob>(
    shared: Arc<PoolShared<J>>,
    id: usize,
    job: Arc<J>,
    handler: Arc<dyn ExceptionHandler>,
    busy: Arc<Mutex<()>>,
) {
    debug!(pool = %shared.name(), worker = id, "Worker started");
    let _deregister = Deregister { shared: &shared, id };
    loop {
        match shared.directive(id) {
            Directive::Exit => break,
            Directive::Drain => match fetch_draining(&job, &handler) {
                Some(work) => {
                    if execute(&job, work, &handler, &busy) == WorkOutcome::Stop {
                        debug!(pool = %shared.name(), worker = id, "Job requested worker stop");
                        break;
                    }
                }
                None => {
                    trace!(pool = %shared.name(), worker = id, "Drained, exiting");
                    break;
                }
            },
            Directive::Work => {
                let Some(work) = fetch(&job, &handler) else {
                    continue;
                };
                if execute(&job, work, &handler, &busy) == WorkOutcome::Stop {
                    debug!(pool = %shared.name(), worker = id, "Job requested worker stop");
                    break;
                }
            }
        }
    }
    debug!(pool = %shared.name(), worker = id, "Worker exited");
}

/// Blocking fetch. `None` means "nothing obtained, go back to the
/// directive check", either a swallowed interrupt or a job failure that
/// went to the handler.
fn fetch<J: WorkerJob>(job: &Arc<J>, handler: &Arc<dyn ExceptionHandler>) -> Option<J::Work> {
    let fetched = panic::catch_unwind(AssertUnwindSafe(|| job.get_work()));
    match fetched {
        Ok(Ok(work)) => Some(work),
        Ok(Err(JobError::Interrupted(_))) => None,
        Ok(Err(JobError::Failed(error))) => {
            warn!(error = %error, "Work fetch failed");
            handler.handle(error);
            None
        }
        Err(payload) => {
            let panic = WorkerPanic::new(payload);
            warn!(message = panic.message(), "Work fetch panicked");
            handler.handle(Box::new(panic));
            None
        }
    }
}

/// Bounded fetch used once shutdown has been observed. Failures still go
/// to the handler; a failure during drain is treated as drained.
fn fetch_draining<J: WorkerJob>(
    job: &Arc<J>,
    handler: &Arc<dyn ExceptionHandler>,
) -> Option<J::Work> {
    match panic::catch_unwind(AssertUnwindSafe(|| job.get_work_while_shutting_down())) {
        Ok(work) => work,
        Err(payload) => {
            let panic = WorkerPanic::new(payload);
            warn!(message = panic.message(), "Drain fetch panicked");
            handler.handle(Box::new(panic));
            None
        }
    }
}

/// Runs one unit while holding the busy lock; the pool's `try_lock` on it
/// is the idle probe, so the lock is held for exactly the duration of the
/// unit and nothing else.
fn execute<J: WorkerJob>(
    job: &Arc<J>,
    work: J::Work,
    handler: &Arc<dyn ExceptionHandler>,
    busy: &Arc<Mutex<()>>,
) -> WorkOutcome {
    let outcome = {
        let _busy = busy.lock();
        match panic::catch_unwind(AssertUnwindSafe(|| job.run_work(work))) {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(error)) => {
                warn!(error = %error, "Work unit failed");
                handler.handle(error);
                WorkOutcome::Continue
            }
            Err(payload) => {
                let panic = WorkerPanic::new(payload);
                warn!(message = panic.message(), "Work unit panicked");
                handler.handle(Box::new(panic));
                WorkOutcome::Continue
            }
        }
    };
    // An interrupt delivered mid-unit (forced shutdown, resize) must not
    // leak into the next fetch; the directive check picks up the actual
    // state change.
    InterruptHandle::current().take_interrupted();
    outcome
}
