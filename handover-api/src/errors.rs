use std::time::Duration;
use thiserror::Error;

use crate::pool::PoolState;

/// A blocked operation was woken by a cooperative interrupt request.
///
/// Surfacing this error clears the calling thread's interrupt flag, the
/// same way a Java `InterruptedException` does. Callers that must run an
/// operation to completion can use the uninterruptible wrappers in the
/// implementation crate, which retry and re-apply the flag afterwards.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Operation was interrupted")]
pub struct Interrupted;

/// Failure of a bounded blocking operation.
///
/// Timeout and interruption are distinct outcomes: a timed-out caller may
/// simply retry later, an interrupted caller was asked to stop.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitError {
    #[error(transparent)]
    Interrupted(#[from] Interrupted),
    #[error("Timed out before the operation could complete")]
    TimedOut,
}

/// Failure of a `takeback` / `takeback_and_reset` call on a strict
/// lendable reference. Both variants indicate caller misuse of the borrow
/// protocol and leave the reference's state untouched.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TakebackError {
    /// The returned value is not equal to the currently-lent value.
    #[error("Returned value does not match the currently lent value")]
    Mismatch,
    /// No take is outstanding, so there is nothing to return.
    #[error("No value is currently lent out")]
    NotLent,
}

/// Failure of a `WorkerJob::get_work` call.
#[derive(Error, Debug)]
pub enum JobError {
    /// The fetching thread was interrupted while blocked. Pool workers
    /// swallow this and re-evaluate their loop directive; it is not an
    /// error condition for them.
    #[error(transparent)]
    Interrupted(#[from] Interrupted),
    /// The job itself failed to produce work. Routed to the pool's
    /// exception handler.
    #[error("Failed to fetch work: {0}")]
    Failed(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Errors surfaced by the public thread-pool API.
#[derive(Error, Debug)]
pub enum PoolError {
    /// The operation is not legal in the pool's current lifecycle state,
    /// e.g. starting or resizing a pool that is already shutting down.
    #[error("Cannot {operation} while the pool is {state:?}")]
    InvalidState {
        operation: &'static str,
        state: PoolState,
    },
    /// `start` was called before a worker job was configured.
    #[error("No worker job has been configured")]
    NoWorkerJob,
    /// Spawning a worker thread failed at the OS level.
    #[error("Worker thread setup failed: {0}")]
    ThreadSetup(String),
    #[error("Internal pool error: {0}")]
    Other(#[from] anyhow::Error),
}

/// Failure of a bounded `try_await_shutdown` call.
#[derive(Error, Debug)]
pub enum AwaitShutdownError {
    #[error(transparent)]
    Interrupted(#[from] Interrupted),
    #[error("Pool did not shut down within {0:?}")]
    TimedOut(Duration),
}

/// A worker job panicked while fetching or executing work. The panic is
/// caught inside the worker thread and delivered to the pool's exception
/// handler wrapped in this type.
#[derive(Error, Debug)]
#[error("Worker job panicked: {message}")]
pub struct WorkerPanic {
    message: String,
}

impl WorkerPanic {
    pub fn new(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self { message }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_error_display() {
        assert_eq!(
            WaitError::from(Interrupted).to_string(),
            "Operation was interrupted"
        );
        assert_eq!(
            WaitError::TimedOut.to_string(),
            "Timed out before the operation could complete"
        );
    }

    #[test]
    fn test_takeback_error_display() {
        assert_eq!(
            TakebackError::Mismatch.to_string(),
            "Returned value does not match the currently lent value"
        );
        assert_eq!(
            TakebackError::NotLent.to_string(),
            "No value is currently lent out"
        );
    }

    #[test]
    fn test_pool_error_display() {
        let err = PoolError::InvalidState {
            operation: "start",
            state: PoolState::Shutdown,
        };
        assert_eq!(err.to_string(), "Cannot start while the pool is Shutdown");
        assert_eq!(
            PoolError::NoWorkerJob.to_string(),
            "No worker job has been configured"
        );
        let other = PoolError::Other(anyhow::anyhow!("worker map corrupted"));
        assert!(other.to_string().contains("worker map corrupted"));
    }

    #[test]
    fn test_worker_panic_extracts_str_payloads() {
        let panic = WorkerPanic::new(Box::new("boom"));
        assert_eq!(panic.message(), "boom");
        let panic = WorkerPanic::new(Box::new("boom".to_string()));
        assert_eq!(panic.message(), "boom");
        let panic = WorkerPanic::new(Box::new(42_u32));
        assert_eq!(panic.message(), "non-string panic payload");
    }
}
