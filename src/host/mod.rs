/*!
 * Host Runtime
 * Background task scheduling consumed as a collaborator interface
 *
 * All compilation and deferred-continuation work runs on a host-managed
 * pool behind [`HostRuntime`]. The runtime observes nothing back from an
 * enqueued task beyond the slot resolutions the task performs.
 */

use std::num::NonZeroUsize;
use tracing::debug;

/// A unit of background work.
pub type HostTask = Box<dyn FnOnce() + Send + 'static>;

/// Fire-and-forget background execution.
pub trait HostRuntime: Send + Sync + 'static {
    /// Schedule `task` for execution; never blocks the caller.
    fn enqueue(&self, task: HostTask);

    /// Worker threads available for compilation and kernel work.
    fn worker_count(&self) -> usize;
}

/// Host runtime backed by the tokio blocking pool.
///
/// Compilation is CPU-bound, so tasks go through `spawn_blocking` rather
/// than onto the async worker threads.
pub struct TokioHost {
    handle: tokio::runtime::Handle,
    workers: usize,
}

impl TokioHost {
    /// Capture the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime; use
    /// [`TokioHost::on_handle`] to wire an explicit one.
    pub fn new() -> Self {
        Self::with_worker_count(default_worker_count())
    }

    /// Capture the current tokio runtime with an explicit worker count.
    pub fn with_worker_count(workers: usize) -> Self {
        Self::on_handle(tokio::runtime::Handle::current(), workers)
    }

    pub fn on_handle(handle: tokio::runtime::Handle, workers: usize) -> Self {
        debug!(workers = workers, "tokio host runtime attached");
        Self { handle, workers }
    }
}

impl HostRuntime for TokioHost {
    fn enqueue(&self, task: HostTask) {
        self.handle.spawn_blocking(task);
    }

    fn worker_count(&self) -> usize {
        self.workers
    }
}

/// Host runtime that runs tasks inline on the calling thread.
///
/// Turns every enqueue into a synchronous call, which makes compilation
/// resolve before `enqueue` returns. Useful for tests and synchronous
/// embeddings.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineHost;

impl HostRuntime for InlineHost {
    fn enqueue(&self, task: HostTask) {
        task();
    }

    fn worker_count(&self) -> usize {
        1
    }
}

fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tokio::time::{sleep, Duration};

    #[test]
    fn test_inline_host_runs_immediately() {
        let ran = Arc::new(AtomicBool::new(false));
        let ran_clone = Arc::clone(&ran);

        InlineHost.enqueue(Box::new(move || {
            ran_clone.store(true, Ordering::SeqCst);
        }));

        assert!(ran.load(Ordering::SeqCst));
        assert_eq!(InlineHost.worker_count(), 1);
    }

    #[tokio::test]
    async fn test_tokio_host_runs_in_background() {
        let ran = Arc::new(AtomicBool::new(false));
        let ran_clone = Arc::clone(&ran);

        let host = TokioHost::new();
        host.enqueue(Box::new(move || {
            ran_clone.store(true, Ordering::SeqCst);
        }));

        // The blocking pool picks the task up shortly after.
        for _ in 0..100 {
            if ran.load(Ordering::SeqCst) {
                return;
            }
            sleep(Duration::from_millis(5)).await;
        }
        panic!("enqueued task never ran");
    }

    #[test]
    fn test_default_worker_count_is_positive() {
        assert!(default_worker_count() >= 1);
    }
}
