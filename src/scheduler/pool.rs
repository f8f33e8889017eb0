use std::{
    any::Any,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
};

use crate::error::{PipelineResult, SystemError};

/// Fixed-size pool for CPU-bound work, shared by every stage.
///
/// `submit` hands a closure to a rayon thread and suspends only the calling task
/// until the result is back. Panics inside the closure surface as
/// [`SystemError::WorkerPanicked`].
#[derive(Debug, Clone)]
pub struct WorkerPool {
    inner: Arc<rayon::ThreadPool>,
}

impl WorkerPool {
    pub fn new(threads: usize) -> PipelineResult<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|i| format!("feature-worker-{i}"))
            .build()
            .map_err(|e| SystemError::WorkerPool(e.to_string()))?;
        tracing::debug!(threads = pool.current_num_threads(), "Built worker pool");
        Ok(Self {
            inner: Arc::new(pool),
        })
    }

    pub fn threads(&self) -> usize {
        self.inner.current_num_threads()
    }

    pub async fn submit<T, F>(&self, f: F) -> PipelineResult<T>
    where
        T: Send + 'static,
        F: FnOnce() -> PipelineResult<T> + Send + 'static,
    {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.inner.spawn(move || {
            let result = catch_unwind(AssertUnwindSafe(f));
            let _ = tx.send(result);
        });

        match rx.await {
            Ok(Ok(result)) => result,
            Ok(Err(panic)) => Err(SystemError::WorkerPanicked(panic_message(panic.as_ref())).into()),
            Err(_) => Err(SystemError::WorkerPanicked(
                "worker dropped its result channel".to_string(),
            )
            .into()),
        }
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;

    #[tokio::test]
    async fn submit_returns_the_result() {
        let pool = WorkerPool::new(2).unwrap();
        assert_eq!(pool.threads(), 2);
        let v = pool.submit(|| Ok(21 * 2)).await.unwrap();
        assert_eq!(v, 42);
    }

    #[tokio::test]
    async fn panics_become_errors() {
        let pool = WorkerPool::new(1).unwrap();
        let err = pool
            .submit(|| -> PipelineResult<()> { panic!("boom") })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::System(SystemError::WorkerPanicked(msg)) if msg == "boom"
        ));
        // The pool survives.
        assert_eq!(pool.submit(|| Ok(1)).await.unwrap(), 1);
    }
}
