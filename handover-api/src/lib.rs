// Trait surface for the handover thread-coordination primitives.
//
// This crate defines the contracts: the single-slot exchange and lending
// reference traits, the worker-job contract a pool consumes, the pool
// lifecycle trait, and the error taxonomy. Implementations live in the
// `handover` crate.

pub mod errors;
pub mod job;
pub mod pool;
pub mod reference;

// Re-export the full surface at the crate root for easier usage
pub use errors::{
    AwaitShutdownError, Interrupted, JobError, PoolError, TakebackError, WaitError, WorkerPanic,
};
pub use job::{ExceptionHandler, NullExceptionHandler, ThreadFactory, WorkOutcome, WorkerJob};
pub use pool::{PoolState, ThreadPool};
pub use reference::{AwaitableReference, LendableReference};
