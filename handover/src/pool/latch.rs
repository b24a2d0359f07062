//! One-shot shutdown latch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use handover_api::errors::{Interrupted, WaitError};

use crate::interrupt::{self, WaitBudget, WaitSite};

struct LatchInner {
    open: Mutex<bool>,
    cond: Condvar,
    opened: AtomicBool,
}

impl WaitSite for LatchInner {
    fn wake(&self) {
        let _guard = self.open.lock();
        self.cond.notify_all();
    }
}

/// A gate that opens exactly once and never closes again. Backs the
/// pool's terminal-shutdown signal: waiting after the open returns
/// immediately, forever.
#[derive(Clone)]
pub struct ShutdownLatch {
    inner: Arc<LatchInner>,
}

impl ShutdownLatch {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(LatchInner {
                open: Mutex::new(false),
                cond: Condvar::new(),
                opened: AtomicBool::new(false),
            }),
        }
    }

    /// Opens the latch, waking all waiters. Returns whether this call was
    /// the one that opened it.
    pub fn open(&self) -> bool {
        let mut guard = self.inner.open.lock();
        if *guard {
            return false;
        }
        *guard = true;
        self.inner.opened.store(true, Ordering::Release);
        self.inner.cond.notify_all();
        true
    }

    /// Lock-free probe.
    pub fn is_open(&self) -> bool {
        self.inner.opened.load(Ordering::Acquire)
    }

    /// Blocks until the latch opens.
    pub fn await_open(&self) -> Result<(), Interrupted> {
        if self.is_open() {
            return Ok(());
        }
        let site: Arc<dyn WaitSite> = Arc::clone(&self.inner) as Arc<dyn WaitSite>;
        let mut guard = self.inner.open.lock();
        while !*guard {
            interrupt::wait(&site, &self.inner.cond, &mut guard)?;
        }
        Ok(())
    }

    /// Bounded [`await_open`](Self::await_open).
    pub fn try_await_open(&self, timeout: Duration) -> Result<(), WaitError> {
        if self.is_open() {
            return Ok(());
        }
        if timeout.is_zero() {
            return Err(WaitError::TimedOut);
        }
        let budget = WaitBudget::new(timeout);
        let site: Arc<dyn WaitSite> = Arc::clone(&self.inner) as Arc<dyn WaitSite>;
        let mut guard = self.inner.open.lock();
        while !*guard {
            let Some(remaining) = budget.remaining() else {
                return Err(WaitError::TimedOut);
            };
            interrupt::wait_for(&site, &self.inner.cond, &mut guard, remaining)?;
        }
        Ok(())
    }
}

impl Default for ShutdownLatch {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ShutdownLatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownLatch")
            .field("open", &self.is_open())
            .finish()
    }
}
