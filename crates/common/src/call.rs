//! Cancellable wrapper for synchronous calls.
//!
//! Registry and repository backends are plain blocking calls that know
//! nothing about cancellation. [`BlockingCaller`] runs such a call on the
//! blocking pool and races it against a [`CancellationToken`] and a deadline.
//!
//! When cancellation or the deadline wins, the worker is abandoned, not
//! stopped: it runs to completion unobserved. Every worker holds a permit
//! from a fixed-size pool for its whole lifetime, so the number of abandoned
//! workers can never exceed the pool size.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Errors returned by [`BlockingCaller::call`].
#[derive(Debug, Error)]
pub enum CallError<E> {
    /// The token was cancelled before the call finished.
    #[error("call cancelled")]
    Cancelled,

    /// The call did not finish within the deadline.
    #[error("call exceeded deadline of {0:?}")]
    DeadlineExceeded(Duration),

    /// The worker panicked or the pool was shut down.
    #[error("blocking worker failed: {0}")]
    Worker(String),

    /// The call itself returned an error.
    #[error("{0}")]
    Failed(E),
}

impl<E> CallError<E> {
    /// Returns true if the call gave up before the worker finished.
    pub fn is_abandoned(&self) -> bool {
        matches!(self, CallError::Cancelled | CallError::DeadlineExceeded(_))
    }
}

/// Runs blocking calls under a deadline with a bounded worker pool.
#[derive(Debug, Clone)]
pub struct BlockingCaller {
    permits: Arc<Semaphore>,
    timeout: Duration,
}

impl BlockingCaller {
    /// Default deadline applied to each call.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Default number of workers that may be in flight at once.
    pub const DEFAULT_WORKERS: usize = 16;

    /// Creates a caller allowing at most `max_workers` concurrent workers.
    pub fn new(max_workers: usize, timeout: Duration) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_workers.max(1))),
            timeout,
        }
    }

    /// Returns the deadline applied to each call.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns how many workers could start right now.
    pub fn available_workers(&self) -> usize {
        self.permits.available_permits()
    }

    /// Runs `f` on the blocking pool.
    ///
    /// Returns [`CallError::Cancelled`] if `cancel` fires first, even when the
    /// call would have succeeded. Waiting for a free worker counts against
    /// the same deadline.
    pub async fn call<F, T, E>(&self, cancel: &CancellationToken, f: F) -> Result<T, CallError<E>>
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        if cancel.is_cancelled() {
            return Err(CallError::Cancelled);
        }
        let deadline = Instant::now() + self.timeout;

        let permit = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(CallError::Cancelled),
            () = tokio::time::sleep_until(deadline) => {
                return Err(CallError::DeadlineExceeded(self.timeout));
            }
            permit = Arc::clone(&self.permits).acquire_owned() => {
                permit.map_err(|e| CallError::Worker(e.to_string()))?
            }
        };

        let worker = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            f()
        });

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::warn!("blocking call cancelled, worker left running");
                Err(CallError::Cancelled)
            }
            () = tokio::time::sleep_until(deadline) => {
                tracing::warn!(timeout = ?self.timeout, "blocking call timed out, worker left running");
                Err(CallError::DeadlineExceeded(self.timeout))
            }
            joined = worker => match joined {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(CallError::Failed(e)),
                Err(e) => Err(CallError::Worker(e.to_string())),
            },
        }
    }
}

impl Default for BlockingCaller {
    fn default() -> Self {
        Self::new(Self::DEFAULT_WORKERS, Self::DEFAULT_TIMEOUT)
    }
}
