//! The plain single-slot exchange.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use handover_api::errors::{Interrupted, WaitError};
use handover_api::reference::AwaitableReference;

use crate::interrupt::{self, WaitBudget, WaitSite};

/// Shared slot state. Mutation only ever happens under `value`'s lock;
/// `occupied` mirrors `value.is_some()` (written under the lock, read
/// lock-free) so probes and the take fast path never touch the condvar.
struct Slot<T> {
    value: Mutex<Option<T>>,
    available: Condvar,
    occupied: AtomicBool,
}

impl<T: Send> WaitSite for Slot<T> {
    fn wake(&self) {
        // Taking the lock first means a waiter between its predicate
        // check and its park cannot miss this notification.
        let _guard = self.value.lock();
        self.available.notify_all();
    }
}

/// The standard [`AwaitableReference`]: one mutex, one "value available"
/// condvar, and an atomic occupancy flag backing the non-blocking probes.
///
/// Cheap to clone; clones share the same slot.
pub struct DefaultAwaitableReference<T> {
    slot: Arc<Slot<T>>,
}

impl<T> Clone for DefaultAwaitableReference<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> std::fmt::Debug for DefaultAwaitableReference<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultAwaitableReference")
            .field("occupied", &self.slot.occupied.load(Ordering::Acquire))
            .finish()
    }
}

impl<T> DefaultAwaitableReference<T>
where
    T: Clone + PartialEq + Send + 'static,
{
    /// Creates an empty exchange.
    pub fn new() -> Self {
        Self::with_initial(None)
    }

    /// Creates an exchange already holding `value`.
    pub fn with_value(value: T) -> Self {
        Self::with_initial(Some(value))
    }

    fn with_initial(value: Option<T>) -> Self {
        let occupied = value.is_some();
        Self {
            slot: Arc::new(Slot {
                value: Mutex::new(value),
                available: Condvar::new(),
                occupied: AtomicBool::new(occupied),
            }),
        }
    }

    fn site(&self) -> Arc<dyn WaitSite> {
        Arc::clone(&self.slot) as Arc<dyn WaitSite>
    }

    /// Clears the slot only if it still holds a value equal to
    /// `expected`. Backs the relaxed lending variant's reset.
    pub(crate) fn compare_and_clear(&self, expected: &T) -> bool {
        let mut guard = self.slot.value.lock();
        if guard.as_ref() == Some(expected) {
            *guard = None;
            self.slot.occupied.store(false, Ordering::Release);
            true
        } else {
            false
        }
    }
}

impl<T> Default for DefaultAwaitableReference<T>
where
    T: Clone + PartialEq + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> AwaitableReference<T> for DefaultAwaitableReference<T>
where
    T: Clone + PartialEq + Send + 'static,
{
    fn take(&self) -> Result<T, Interrupted> {
        // Fast path: the occupancy probe skips the wait path entirely.
        // Safe against a racing put because the slow path re-checks
        // emptiness under the lock before every park.
        if let Some(value) = self.try_take() {
            return Ok(value);
        }
        let site = self.site();
        let mut guard = self.slot.value.lock();
        loop {
            if let Some(value) = &*guard {
                return Ok(value.clone());
            }
            interrupt::wait(&site, &self.slot.available, &mut guard)?;
        }
    }

    fn try_take_for(&self, timeout: Duration) -> Result<T, WaitError> {
        if let Some(value) = self.try_take() {
            return Ok(value);
        }
        if timeout.is_zero() {
            // Expired budget: fail without acquiring the lock.
            return Err(WaitError::TimedOut);
        }
        let budget = WaitBudget::new(timeout);
        let site = self.site();
        let mut guard = self.slot.value.lock();
        loop {
            if let Some(value) = &*guard {
                return Ok(value.clone());
            }
            let Some(remaining) = budget.remaining() else {
                return Err(WaitError::TimedOut);
            };
            interrupt::wait_for(&site, &self.slot.available, &mut guard, remaining)?;
        }
    }

    fn try_take(&self) -> Option<T> {
        if !self.slot.occupied.load(Ordering::Acquire) {
            return None;
        }
        self.slot.value.lock().clone()
    }

    fn put(&self, value: Option<T>) -> Result<Option<T>, Interrupted> {
        let mut guard = self.slot.value.lock();
        let previous = std::mem::replace(&mut *guard, value);
        self.slot.occupied.store(guard.is_some(), Ordering::Release);
        if guard.is_some() {
            self.slot.available.notify_all();
        }
        Ok(previous)
    }

    fn try_put_for(&self, value: Option<T>, _timeout: Duration) -> Result<Option<T>, WaitError> {
        // The plain exchange never has to wait to install a value.
        self.put(value).map_err(WaitError::from)
    }

    fn peek(&self) -> Option<T> {
        self.try_take()
    }

    fn is_take_possible(&self) -> bool {
        self.slot.occupied.load(Ordering::Acquire)
    }
}
