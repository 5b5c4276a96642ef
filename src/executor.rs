//! Shared background executor for fire-and-forget operations.
//!
//! One process-wide runtime, built lazily on first use and shared by every
//! DAO instance. Submitting work returns an [`FfHandle`] the caller may
//! await, cancel, or drop; a dropped handle does not stop the work.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;
use tracing::info;

use crate::error::{DaoError, DaoResult};

/// Floor for the background worker count.
pub const MIN_WORKERS: usize = 4;

static GLOBAL_EXECUTOR: OnceLock<Arc<BackgroundExecutor>> = OnceLock::new();

/// Default worker count: available parallelism, but never below
/// [`MIN_WORKERS`].
pub fn default_worker_count() -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    cpus.max(MIN_WORKERS)
}

/// A dedicated multi-threaded runtime for background writes.
///
/// Independent from any runtime the caller's synchronous path runs on, so
/// deferred work cannot starve foreground operations.
pub struct BackgroundExecutor {
    runtime: Runtime,
    workers: usize,
}

impl BackgroundExecutor {
    /// Build an executor with an explicit worker count.
    pub fn new(workers: usize) -> std::io::Result<Self> {
        let workers = workers.max(1);
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(workers)
            .thread_name("dao-bg")
            .enable_all()
            .build()?;
        Ok(Self { runtime, workers })
    }

    /// The process-wide shared executor, built on first call.
    ///
    /// Initialization happens at most once even under concurrent first use;
    /// later callers get the same instance.
    pub fn global() -> Arc<BackgroundExecutor> {
        GLOBAL_EXECUTOR
            .get_or_init(|| {
                let workers = default_worker_count();
                info!(workers, "Initializing shared background executor");
                let executor = BackgroundExecutor::new(workers)
                    .unwrap_or_else(|e| panic!("failed to build background runtime: {}", e));
                Arc::new(executor)
            })
            .clone()
    }

    /// Number of worker threads backing this executor.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Schedule `future` on the background runtime.
    ///
    /// Returns immediately; the work proceeds whether or not the handle is
    /// retained.
    pub fn submit<F, T>(&self, future: F) -> FfHandle<T>
    where
        F: Future<Output = DaoResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        FfHandle {
            inner: self.runtime.spawn(future),
        }
    }
}

impl std::fmt::Debug for BackgroundExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundExecutor")
            .field("workers", &self.workers)
            .finish()
    }
}

/// Handle to a deferred operation.
///
/// Awaiting it yields the operation's result exactly as the synchronous
/// variant would have returned it. Dropping it detaches: the operation still
/// runs to completion.
#[derive(Debug)]
pub struct FfHandle<T> {
    inner: JoinHandle<DaoResult<T>>,
}

impl<T> FfHandle<T> {
    /// Whether the deferred operation has finished (in any way).
    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }

    /// Abort the deferred operation if it has not completed yet.
    ///
    /// Awaiting a cancelled handle yields [`DaoError::Cancelled`].
    pub fn cancel(&self) {
        self.inner.abort();
    }
}

impl<T> Future for FfHandle<T> {
    type Output = DaoResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.inner).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(join_err)) => {
                let err = if join_err.is_cancelled() {
                    DaoError::Cancelled
                } else {
                    DaoError::internal(format!("background task panicked: {}", join_err))
                };
                Poll::Ready(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_worker_count_floor() {
        assert!(default_worker_count() >= MIN_WORKERS);
    }

    #[test]
    fn test_global_is_a_singleton() {
        let first = BackgroundExecutor::global();

        let handles: Vec<_> = (0..8)
            .map(|_| std::thread::spawn(BackgroundExecutor::global))
            .collect();
        for handle in handles {
            let executor = handle.join().unwrap();
            assert!(Arc::ptr_eq(&first, &executor));
        }
    }

    // These tests drive handles with the executor's own runtime via
    // `block_on` instead of `#[tokio::test]`: the executor owns a tokio
    // `Runtime`, and tokio panics if a runtime is dropped from within
    // another runtime's async context.

    #[test]
    fn test_submit_delivers_result() {
        let executor = BackgroundExecutor::new(2).unwrap();
        let handle = executor.submit(async { Ok(21 * 2) });
        assert_eq!(executor.runtime.block_on(handle).unwrap(), 42);
    }

    #[test]
    fn test_submit_delivers_error() {
        let executor = BackgroundExecutor::new(2).unwrap();
        let handle = executor.submit(async {
            Err::<(), _>(DaoError::invalid_input("bad field"))
        });
        assert!(matches!(
            executor.runtime.block_on(handle).unwrap_err(),
            DaoError::InvalidInput { .. }
        ));
    }

    #[test]
    fn test_cancel_yields_cancelled() {
        let executor = BackgroundExecutor::new(2).unwrap();
        let handle = executor.submit(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        });
        handle.cancel();
        assert!(matches!(
            executor.runtime.block_on(handle).unwrap_err(),
            DaoError::Cancelled
        ));
    }

    #[test]
    fn test_dropped_handle_still_runs() {
        let executor = BackgroundExecutor::new(2).unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel();
        let handle = executor.submit(async move {
            let _ = tx.send(7_i32);
            Ok(())
        });
        drop(handle);
        let value = executor
            .runtime
            .block_on(async { tokio::time::timeout(Duration::from_secs(5), rx).await })
            .unwrap()
            .unwrap();
        assert_eq!(value, 7);
    }
}
