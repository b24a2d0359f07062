//! Thread-coordination primitives for server-side concurrent programs.
//!
//! Two families live here, plus the glue they share:
//!
//! - the single-slot exchange and its lending variants
//!   ([`DefaultAwaitableReference`], [`StrictLendableReference`],
//!   [`RelaxedLendableReference`]): one or more consumer threads borrow
//!   the current value and return it, with strict mode serializing value
//!   replacement behind the return of every outstanding borrow;
//! - the resizable worker pool ([`DefaultThreadPool`]): a set of worker
//!   threads repeatedly fetching and executing units from a pluggable
//!   [`WorkerJob`], with live resizing and a graceful/forced two-tier
//!   shutdown protocol;
//! - cooperative interruption and bounded-wait helpers ([`interrupt`]),
//!   which every blocking operation in the crate goes through.
//!
//! Trait definitions and the error taxonomy come from the `handover-api`
//! crate and are re-exported here.
//!
//! ```no_run
//! use std::time::Duration;
//! use handover::{
//!     AwaitableReference, DefaultThreadPool, JobError, LendableReference,
//!     StrictLendableReference, ThreadPool, ThreadPoolConfig, WorkOutcome, WorkerJob,
//! };
//!
//! struct PrintJob {
//!     source: StrictLendableReference<String>,
//! }
//!
//! impl WorkerJob for PrintJob {
//!     type Work = String;
//!
//!     fn get_work(&self) -> Result<String, JobError> {
//!         Ok(self.source.take()?)
//!     }
//!
//!     fn get_work_while_shutting_down(&self) -> Option<String> {
//!         self.source.try_take()
//!     }
//!
//!     fn run_work(&self, work: String) -> Result<WorkOutcome, Box<dyn std::error::Error + Send + Sync>> {
//!         println!("{work}");
//!         self.source.takeback_and_reset(&work)?;
//!         Ok(WorkOutcome::Continue)
//!     }
//! }
//!
//! let source = StrictLendableReference::new();
//! let pool = DefaultThreadPool::new(ThreadPoolConfig::new("demo").with_desired_pool_size(4));
//! pool.set_worker_job(PrintJob { source: source.clone() })?;
//! pool.start()?;
//! source.put(Some("hello".to_string()))?;
//! pool.shutdown();
//! pool.try_await_shutdown(Duration::from_secs(5))?;
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod interrupt;
pub mod logging;
pub mod pool;
pub mod sync;

// Re-export the trait surface alongside the implementations
pub use handover_api::errors::{
    AwaitShutdownError, Interrupted, JobError, PoolError, TakebackError, WaitError, WorkerPanic,
};
pub use handover_api::job::{
    ExceptionHandler, NullExceptionHandler, ThreadFactory, WorkOutcome, WorkerJob,
};
pub use handover_api::pool::{PoolState, ThreadPool};
pub use handover_api::reference::{AwaitableReference, LendableReference};

pub use interrupt::InterruptHandle;
pub use pool::{DefaultThreadFactory, DefaultThreadPool, ShutdownLatch, ThreadPoolConfig};
pub use sync::{DefaultAwaitableReference, RelaxedLendableReference, StrictLendableReference};
