//! Default worker-thread factory.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::JoinHandle;

use handover_api::job::ThreadFactory;

/// Spawns workers via `std::thread::Builder`, naming them sequentially
/// within the pool: `"{pool}-worker-{n}"`.
#[derive(Debug)]
pub struct DefaultThreadFactory {
    prefix: String,
    sequence: AtomicUsize,
}

impl DefaultThreadFactory {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            sequence: AtomicUsize::new(0),
        }
    }
}

impl ThreadFactory for DefaultThreadFactory {
    fn spawn_worker(&self, body: Box<dyn FnOnce() + Send + 'static>) -> io::Result<JoinHandle<()>> {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        std::thread::Builder::new()
            .name(format!("{}-worker-{}", self.prefix, seq))
            .spawn(body)
    }
}
