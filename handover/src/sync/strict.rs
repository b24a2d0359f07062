//! Borrow-counting lendable reference.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use handover_api::errors::{Interrupted, TakebackError, WaitError};
use handover_api::reference::{AwaitableReference, LendableReference};

use crate::interrupt::{self, WaitBudget, WaitSite};

/// Lending state. `takeback_value` equals `value` whenever `lend_count`
/// is non-zero; it is deliberately left in place by a reset so borrows
/// still outstanding at that point can be returned and matched.
struct LendState<T> {
    value: Option<T>,
    takeback_value: Option<T>,
    lend_count: usize,
}

struct Inner<T> {
    state: Mutex<LendState<T>>,
    /// Signalled when a non-empty value is installed.
    available: Condvar,
    /// Signalled when the lend count drops to zero.
    returned: Condvar,
    occupied: AtomicBool,
}

impl<T: Send> WaitSite for Inner<T> {
    fn wake(&self) {
        let _guard = self.state.lock();
        self.available.notify_all();
        self.returned.notify_all();
    }
}

/// The strict [`LendableReference`]: every `take` is counted and a new
/// value can be installed only once every borrow of the old one has been
/// returned, so at most one distinct value is ever lent out at a time.
///
/// Backed by a parking_lot mutex, whose eventual fairness keeps
/// long-waiting putters and takers from starving when lending and
/// replacement interleave.
///
/// Cheap to clone; clones share the same state.
pub struct StrictLendableReference<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for StrictLendableReference<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for StrictLendableReference<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("StrictLendableReference")
            .field("occupied", &state.value.is_some())
            .field("lend_count", &state.lend_count)
            .finish()
    }
}

impl<T> StrictLendableReference<T>
where
    T: Clone + PartialEq + Send + 'static,
{
    pub fn new() -> Self {
        Self::with_initial(None)
    }

    pub fn with_value(value: T) -> Self {
        Self::with_initial(Some(value))
    }

    fn with_initial(value: Option<T>) -> Self {
        let occupied = value.is_some();
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(LendState {
                    takeback_value: value.clone(),
                    value,
                    lend_count: 0,
                }),
                available: Condvar::new(),
                returned: Condvar::new(),
                occupied: AtomicBool::new(occupied),
            }),
        }
    }

    fn site(&self) -> Arc<dyn WaitSite> {
        Arc::clone(&self.inner) as Arc<dyn WaitSite>
    }

    /// Outstanding un-returned takes. Snapshot for diagnostics and tests.
    pub fn lend_count(&self) -> usize {
        self.inner.state.lock().lend_count
    }

    fn accept_takeback(
        &self,
        value: &T,
        reset: bool,
    ) -> Result<(), TakebackError> {
        let mut state = self.inner.state.lock();
        if state.lend_count == 0 {
            return Err(TakebackError::NotLent);
        }
        if state.takeback_value.as_ref() != Some(value) {
            return Err(TakebackError::Mismatch);
        }
        state.lend_count -= 1;
        if reset {
            // Clear the lent value so takers block until the next put.
            // takeback_value stays: other borrows of the same value may
            // still be outstanding and must match on their return.
            state.value = None;
            self.inner.occupied.store(false, Ordering::Release);
        }
        if state.lend_count == 0 {
            self.inner.returned.notify_all();
        }
        Ok(())
    }

    fn install(&self, state: &mut LendState<T>, value: Option<T>) -> Option<T> {
        let previous = std::mem::replace(&mut state.value, value);
        state.takeback_value = state.value.clone();
        self.inner
            .occupied
            .store(state.value.is_some(), Ordering::Release);
        if state.value.is_some() {
            self.inner.available.notify_all();
        }
        previous
    }
}

impl<T> Default for StrictLendableReference<T>
where
    T: Clone + PartialEq + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> AwaitableReference<T> for StrictLendableReference<T>
where
    T: Clone + PartialEq + Send + 'static,
{
    fn take(&self) -> Result<T, Interrupted> {
        let site = self.site();
        let mut state = self.inner.state.lock();
        loop {
            if let Some(value) = &state.value {
                let value = value.clone();
                state.lend_count += 1;
                return Ok(value);
            }
            interrupt::wait(&site, &self.inner.available, &mut state)?;
        }
    }

    fn try_take_for(&self, timeout: Duration) -> Result<T, WaitError> {
        if timeout.is_zero() && !self.is_take_possible() {
            return Err(WaitError::TimedOut);
        }
        let budget = WaitBudget::new(timeout);
        let site = self.site();
        let mut state = self.inner.state.lock();
        loop {
            if let Some(value) = &state.value {
                let value = value.clone();
                state.lend_count += 1;
                return Ok(value);
            }
            let Some(remaining) = budget.remaining() else {
                return Err(WaitError::TimedOut);
            };
            interrupt::wait_for(&site, &self.inner.available, &mut state, remaining)?;
        }
    }

    fn try_take(&self) -> Option<T> {
        if !self.inner.occupied.load(Ordering::Acquire) {
            return None;
        }
        let mut state = self.inner.state.lock();
        let value = state.value.clone()?;
        state.lend_count += 1;
        Some(value)
    }

    /// Blocks until every borrow of the current value has been returned,
    /// then installs `value` as both the lent and the expected-return
    /// value. This is the defining strictness property.
    fn put(&self, value: Option<T>) -> Result<Option<T>, Interrupted> {
        let site = self.site();
        let mut state = self.inner.state.lock();
        while state.lend_count > 0 {
            interrupt::wait(&site, &self.inner.returned, &mut state)?;
        }
        Ok(self.install(&mut state, value))
    }

    fn try_put_for(&self, value: Option<T>, timeout: Duration) -> Result<Option<T>, WaitError> {
        let budget = WaitBudget::new(timeout);
        let site = self.site();
        let mut state = self.inner.state.lock();
        while state.lend_count > 0 {
            let Some(remaining) = budget.remaining() else {
                return Err(WaitError::TimedOut);
            };
            interrupt::wait_for(&site, &self.inner.returned, &mut state, remaining)?;
        }
        Ok(self.install(&mut state, value))
    }

    fn peek(&self) -> Option<T> {
        if !self.inner.occupied.load(Ordering::Acquire) {
            return None;
        }
        self.inner.state.lock().value.clone()
    }

    fn is_take_possible(&self) -> bool {
        self.inner.occupied.load(Ordering::Acquire)
    }
}

impl<T> LendableReference<T> for StrictLendableReference<T>
where
    T: Clone + PartialEq + Send + 'static,
{
    fn takeback(&self, value: &T) -> Result<(), TakebackError> {
        self.accept_takeback(value, false)
    }

    fn takeback_and_reset(&self, value: &T) -> Result<(), TakebackError> {
        self.accept_takeback(value, true)
    }
}
