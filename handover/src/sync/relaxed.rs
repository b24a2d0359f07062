//! Advisory (uncounted) lendable reference.

use std::time::Duration;

use handover_api::errors::{Interrupted, TakebackError, WaitError};
use handover_api::reference::{AwaitableReference, LendableReference};

use crate::sync::awaitable::DefaultAwaitableReference;

/// The relaxed [`LendableReference`]: built directly on the plain
/// single-slot exchange, with no lend accounting at all.
///
/// `put` never blocks and may overwrite a value while earlier copies are
/// still held, so borrows of several distinct values can be in flight at
/// once. That is the deliberate trade: much lower lock contention than
/// the strict variant, in exchange for replacement not being serialized
/// behind returns.
///
/// Cheap to clone; clones share the same slot.
pub struct RelaxedLendableReference<T> {
    slot: DefaultAwaitableReference<T>,
}

impl<T> Clone for RelaxedLendableReference<T> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
        }
    }
}

impl<T> std::fmt::Debug for RelaxedLendableReference<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelaxedLendableReference").finish()
    }
}

impl<T> RelaxedLendableReference<T>
where
    T: Clone + PartialEq + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            slot: DefaultAwaitableReference::new(),
        }
    }

    pub fn with_value(value: T) -> Self {
        Self {
            slot: DefaultAwaitableReference::with_value(value),
        }
    }
}

impl<T> Default for RelaxedLendableReference<T>
where
    T: Clone + PartialEq + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> AwaitableReference<T> for RelaxedLendableReference<T>
where
    T: Clone + PartialEq + Send + 'static,
{
    fn take(&self) -> Result<T, Interrupted> {
        self.slot.take()
    }

    fn try_take_for(&self, timeout: Duration) -> Result<T, WaitError> {
        self.slot.try_take_for(timeout)
    }

    fn try_take(&self) -> Option<T> {
        self.slot.try_take()
    }

    fn put(&self, value: Option<T>) -> Result<Option<T>, Interrupted> {
        self.slot.put(value)
    }

    fn try_put_for(&self, value: Option<T>, timeout: Duration) -> Result<Option<T>, WaitError> {
        self.slot.try_put_for(value, timeout)
    }

    fn peek(&self) -> Option<T> {
        self.slot.peek()
    }

    fn is_take_possible(&self) -> bool {
        self.slot.is_take_possible()
    }
}

impl<T> LendableReference<T> for RelaxedLendableReference<T>
where
    T: Clone + PartialEq + Send + 'static,
{
    /// Advisory only: there is no count to decrement, so any return of a
    /// (necessarily non-empty) value is accepted.
    fn takeback(&self, _value: &T) -> Result<(), TakebackError> {
        Ok(())
    }

    /// Compare-and-reset: the slot is cleared only if it still holds a
    /// value equal to the one being returned. An unconditional clear
    /// would race with a concurrent `put` and silently discard the newer
    /// value; this is a deliberate design choice, not a reproduction of
    /// either historical behavior.
    fn takeback_and_reset(&self, value: &T) -> Result<(), TakebackError> {
        self.slot.compare_and_clear(value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_put_never_blocks_while_value_is_held() {
        // Scenario: T1 takes A; put(B) completes immediately and peek
        // sees B even though A was never returned.
        let lent = RelaxedLendableReference::with_value('A');
        let a = lent.take().unwrap();
        assert_eq!(a, 'A');
        lent.put(Some('B')).unwrap();
        assert_eq!(lent.peek(), Some('B'));
        // The stale return is still accepted, and does not disturb B
        lent.takeback(&a).unwrap();
        assert_eq!(lent.peek(), Some('B'));
    }

    #[test]
    fn test_takeback_and_reset_clears_only_if_unchanged() {
        let lent = RelaxedLendableReference::with_value(1);
        let v = lent.take().unwrap();
        lent.put(Some(2)).unwrap();
        // Slot moved on; the stale reset must not clear it
        lent.takeback_and_reset(&v).unwrap();
        assert_eq!(lent.peek(), Some(2));
        // A current reset does clear
        let v2 = lent.take().unwrap();
        lent.takeback_and_reset(&v2).unwrap();
        assert_eq!(lent.peek(), None);
    }

    #[test]
    fn test_take_blocks_until_put() {
        let lent = RelaxedLendableReference::<u8>::new();
        let taker = {
            let lent = lent.clone();
            thread::spawn(move || lent.take())
        };
        thread::sleep(Duration::from_millis(50));
        assert!(!taker.is_finished());
        lent.put(Some(3)).unwrap();
        assert_eq!(taker.join().unwrap().unwrap(), 3);
    }
}
