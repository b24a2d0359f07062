use std::time::Duration;

use crate::errors::{Interrupted, TakebackError, WaitError};

/// Single-slot value exchange between threads.
///
/// The slot holds at most one value. Producers install values with
/// [`put`](Self::put); consumers block in [`take`](Self::take) while the
/// slot is empty. A `take` does not remove the value: every consumer sees
/// the most recent value until the next `put` overwrites it. This is a
/// hand-off cell, not a queue.
///
/// Implementors must guarantee that no blocked caller can miss a wakeup
/// for a state change it is waiting on, and that spurious wakeups are
/// absorbed by re-checking the predicate under the lock.
pub trait AwaitableReference<T>: Send + Sync
where
    T: Clone + PartialEq + Send + 'static,
{
    /// Blocks until the slot is non-empty, then returns a copy of the
    /// value. Interruptible; an interrupt while blocked surfaces as
    /// [`Interrupted`] and clears the thread's interrupt flag.
    fn take(&self) -> Result<T, Interrupted>;

    /// As [`take`](Self::take), but gives up with
    /// [`WaitError::TimedOut`] if no value arrives within `timeout`.
    /// A zero budget fails immediately without blocking.
    fn try_take_for(&self, timeout: Duration) -> Result<T, WaitError>;

    /// Zero-wait take: the current value, or `None`. Never blocks.
    fn try_take(&self) -> Option<T>;

    /// Replaces the slot content (possibly with `None`) and returns the
    /// previous content. Wakes all blocked takers when installing a
    /// non-empty value.
    ///
    /// Whether this call can block depends on the implementation: the
    /// plain exchange never blocks, the strict lending variant waits for
    /// all outstanding borrows to be returned first.
    fn put(&self, value: Option<T>) -> Result<Option<T>, Interrupted>;

    /// Bounded-wait [`put`](Self::put).
    fn try_put_for(&self, value: Option<T>, timeout: Duration) -> Result<Option<T>, WaitError>;

    /// Non-blocking read of the current value, without take semantics.
    fn peek(&self) -> Option<T>;

    /// Whether a `take` at this instant would return without waiting.
    /// Lock-free probe; the answer may be stale by the time it is used.
    fn is_take_possible(&self) -> bool;
}

/// A single-slot exchange whose values are borrowed and returned.
///
/// Every successful [`take`](AwaitableReference::take) is expected to be
/// matched by a [`takeback`](Self::takeback) of an equal value. How much
/// the implementation enforces this is the strict/relaxed split:
///
/// - *strict*: outstanding borrows are counted and a new value can only be
///   installed once every borrow of the old one has been returned;
/// - *relaxed*: returns are advisory bookkeeping and `put` never blocks,
///   so borrows of several distinct values may be in flight at once.
///
/// Takeback matching uses value equality (`PartialEq`), never identity: a
/// structurally-equal but distinct instance is accepted.
pub trait LendableReference<T>: AwaitableReference<T>
where
    T: Clone + PartialEq + Send + 'static,
{
    /// Returns a previously taken value.
    fn takeback(&self, value: &T) -> Result<(), TakebackError>;

    /// Returns a previously taken value and clears the slot, so takers
    /// block until the next `put` installs a fresh value.
    fn takeback_and_reset(&self, value: &T) -> Result<(), TakebackError>;
}
