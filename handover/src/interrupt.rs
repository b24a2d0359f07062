//! Cooperative interruption and the shared wait helpers.
//!
//! There is no OS-level way to interrupt a thread parked on a condition
//! variable, so every blocking structure in this crate waits through the
//! helpers here: a waiter registers the structure it is about to park on
//! with its own [`InterruptHandle`], and an interrupter wakes that
//! structure through [`WaitSite::wake`]. `wake` takes the structure's
//! mutex before notifying, which closes the window between a waiter's
//! predicate check and its park: an interrupt posted in that window
//! blocks on the mutex until the waiter is actually parked, then wakes it.
//!
//! Interrupt semantics follow the usual cooperative model: surfacing
//! [`Interrupted`] from a blocked operation clears the request flag, and
//! the uninterruptible wrappers re-apply it after running an operation to
//! completion.

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

pub use handover_api::errors::Interrupted;
use handover_api::errors::WaitError;

/// A parking place an interrupt can wake.
///
/// Implementations must acquire the mutex their waiters park with before
/// notifying; see the module docs for why.
pub trait WaitSite: Send + Sync {
    fn wake(&self);
}

/// Per-thread cooperative interrupt handle.
///
/// Cloneable and shareable; the thread pool keeps one per worker so it can
/// wake idle workers out of a blocked fetch. Any thread can obtain its own
/// via [`InterruptHandle::current`].
#[derive(Clone)]
pub struct InterruptHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    requested: AtomicBool,
    /// The site the owning thread is currently parked on, if any.
    site: Mutex<Option<Arc<dyn WaitSite>>>,
}

thread_local! {
    static CURRENT: RefCell<Option<InterruptHandle>> = const { RefCell::new(None) };
}

impl InterruptHandle {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HandleInner {
                requested: AtomicBool::new(false),
                site: Mutex::new(None),
            }),
        }
    }

    /// The calling thread's handle, created on first use.
    pub fn current() -> Self {
        CURRENT.with(|current| {
            current
                .borrow_mut()
                .get_or_insert_with(InterruptHandle::new)
                .clone()
        })
    }

    /// Requests interruption of the owning thread and wakes it if it is
    /// parked on a wait site.
    pub fn interrupt(&self) {
        self.inner.requested.store(true, Ordering::SeqCst);
        // Clone out of the slot before waking: wake() takes the target
        // structure's mutex and must not run under the slot lock.
        let site = self.inner.site.lock().clone();
        if let Some(site) = site {
            site.wake();
        }
    }

    /// Whether an interrupt is pending, without clearing it.
    pub fn is_interrupted(&self) -> bool {
        self.inner.requested.load(Ordering::SeqCst)
    }

    /// Clears a pending interrupt and reports whether one was pending.
    pub fn take_interrupted(&self) -> bool {
        self.inner.requested.swap(false, Ordering::SeqCst)
    }

    /// Re-applies the interrupt flag without waking anything. Used by the
    /// uninterruptible wrappers to restore a swallowed request.
    pub fn set_interrupted(&self) {
        self.inner.requested.store(true, Ordering::SeqCst);
    }

    /// Registers `site` as the place this thread is about to park.
    /// Fails (clearing the flag) if an interrupt is already pending.
    fn begin_wait(&self, site: &Arc<dyn WaitSite>) -> Result<(), Interrupted> {
        let mut slot = self.inner.site.lock();
        if self.inner.requested.swap(false, Ordering::SeqCst) {
            return Err(Interrupted);
        }
        *slot = Some(Arc::clone(site));
        Ok(())
    }

    fn end_wait(&self) {
        *self.inner.site.lock() = None;
    }
}

impl Default for InterruptHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InterruptHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterruptHandle")
            .field("requested", &self.is_interrupted())
            .finish()
    }
}

/// Installs `handle` as the calling thread's interrupt handle for the
/// duration of `f`. The pool uses this so a worker's handle exists (and is
/// interruptible) before its thread has even started running.
pub fn with_handle<R>(handle: InterruptHandle, f: impl FnOnce() -> R) -> R {
    struct Restore(Option<InterruptHandle>);
    impl Drop for Restore {
        fn drop(&mut self) {
            let previous = self.0.take();
            CURRENT.with(|current| *current.borrow_mut() = previous);
        }
    }
    let previous = CURRENT.with(|current| current.borrow_mut().replace(handle));
    let _restore = Restore(previous);
    f()
}

/// One interruptible park on `cond`. The caller must hold `guard` (the
/// mutex of `site`) and re-check its predicate afterwards; wakeups are
/// shared and may be spurious.
pub(crate) fn wait<T: ?Sized>(
    site: &Arc<dyn WaitSite>,
    cond: &Condvar,
    guard: &mut MutexGuard<'_, T>,
) -> Result<(), Interrupted> {
    let handle = InterruptHandle::current();
    handle.begin_wait(site)?;
    cond.wait(guard);
    handle.end_wait();
    if handle.take_interrupted() {
        return Err(Interrupted);
    }
    Ok(())
}

/// As [`wait`], bounded. Returns whether the park timed out; callers
/// normally ignore it and let their deadline budget decide.
pub(crate) fn wait_for<T: ?Sized>(
    site: &Arc<dyn WaitSite>,
    cond: &Condvar,
    guard: &mut MutexGuard<'_, T>,
    timeout: Duration,
) -> Result<bool, Interrupted> {
    let handle = InterruptHandle::current();
    handle.begin_wait(site)?;
    let result = cond.wait_for(guard, timeout);
    handle.end_wait();
    if handle.take_interrupted() {
        return Err(Interrupted);
    }
    Ok(result.timed_out())
}

/// Deadline-based remaining-time tracking for bounded waits. All timeouts
/// are normalized through this so retried waits never stretch the budget;
/// `Duration` keeps the remainder non-negative by construction.
#[derive(Debug, Clone, Copy)]
pub struct WaitBudget {
    deadline: Instant,
}

impl WaitBudget {
    pub fn new(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now()
                .checked_add(timeout)
                .unwrap_or_else(|| Instant::now() + Duration::from_secs(u32::MAX as u64)),
        }
    }

    /// Time left, or `None` once the budget is exhausted.
    pub fn remaining(&self) -> Option<Duration> {
        let now = Instant::now();
        if now >= self.deadline {
            None
        } else {
            Some(self.deadline - now)
        }
    }
}

/// Runs `op` to completion, retrying while it fails with [`Interrupted`].
/// A swallowed interrupt is re-applied to the calling thread's flag once
/// the operation finally succeeds, so the caller's cancellation request is
/// delayed, not lost.
pub fn uninterruptibly<R>(mut op: impl FnMut() -> Result<R, Interrupted>) -> R {
    let mut interrupted = false;
    let result = loop {
        match op() {
            Ok(value) => break value,
            Err(Interrupted) => interrupted = true,
        }
    };
    if interrupted {
        InterruptHandle::current().set_interrupted();
    }
    result
}

/// Bounded [`uninterruptibly`]: each retry is handed the remaining budget,
/// and an exhausted budget surfaces as [`WaitError::TimedOut`].
pub fn uninterruptibly_for<R>(
    timeout: Duration,
    mut op: impl FnMut(Duration) -> Result<R, WaitError>,
) -> Result<R, WaitError> {
    let budget = WaitBudget::new(timeout);
    let mut interrupted = false;
    let result = loop {
        let Some(remaining) = budget.remaining() else {
            break Err(WaitError::TimedOut);
        };
        match op(remaining) {
            Ok(value) => break Ok(value),
            Err(WaitError::Interrupted(_)) => interrupted = true,
            Err(WaitError::TimedOut) => break Err(WaitError::TimedOut),
        }
    };
    if interrupted {
        InterruptHandle::current().set_interrupted();
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    struct Gate {
        open: Mutex<bool>,
        cond: Condvar,
    }

    impl Gate {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                open: Mutex::new(false),
                cond: Condvar::new(),
            })
        }

        fn pass(self: &Arc<Self>) -> Result<(), Interrupted> {
            let site: Arc<dyn WaitSite> = Arc::clone(self) as Arc<dyn WaitSite>;
            let mut guard = self.open.lock();
            while !*guard {
                wait(&site, &self.cond, &mut guard)?;
            }
            Ok(())
        }
    }

    impl WaitSite for Gate {
        fn wake(&self) {
            let _guard = self.open.lock();
            self.cond.notify_all();
        }
    }

    #[test]
    fn test_interrupt_wakes_blocked_waiter() {
        let gate = Gate::new();
        let handle = InterruptHandle::new();
        let waiter = {
            let gate = Arc::clone(&gate);
            let handle = handle.clone();
            thread::spawn(move || with_handle(handle, || gate.pass()))
        };
        thread::sleep(Duration::from_millis(50));
        handle.interrupt();
        let result = waiter.join().unwrap();
        assert_eq!(result, Err(Interrupted));
        // Surfacing the interrupt cleared the flag
        assert!(!handle.is_interrupted());
    }

    #[test]
    fn test_pending_interrupt_fails_wait_immediately() {
        let gate = Gate::new();
        let handle = InterruptHandle::current();
        handle.set_interrupted();
        assert_eq!(gate.pass(), Err(Interrupted));
        assert!(!handle.is_interrupted());
    }

    #[test]
    fn test_take_interrupted_clears_flag() {
        let handle = InterruptHandle::new();
        handle.interrupt();
        assert!(handle.take_interrupted());
        assert!(!handle.take_interrupted());
    }

    #[test]
    fn test_uninterruptibly_restores_flag() {
        let mut attempts = 0;
        let value = uninterruptibly(|| {
            attempts += 1;
            if attempts < 3 {
                Err(Interrupted)
            } else {
                Ok(42)
            }
        });
        assert_eq!(value, 42);
        assert_eq!(attempts, 3);
        // The swallowed interrupts were re-applied to this thread
        assert!(InterruptHandle::current().take_interrupted());
    }

    #[test]
    fn test_uninterruptibly_for_times_out() {
        let result: Result<(), WaitError> =
            uninterruptibly_for(Duration::from_millis(20), |remaining| {
                thread::sleep(remaining);
                Err(WaitError::Interrupted(Interrupted))
            });
        assert_eq!(result, Err(WaitError::TimedOut));
        InterruptHandle::current().take_interrupted();
    }

    #[test]
    fn test_wait_budget_expires() {
        let budget = WaitBudget::new(Duration::from_millis(10));
        assert!(budget.remaining().is_some());
        thread::sleep(Duration::from_millis(20));
        assert!(budget.remaining().is_none());
    }
}
