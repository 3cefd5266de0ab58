//! Bounded retry with a fixed delay between attempts.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Outcome of a [`RetryExecutor::run`] call that did not succeed.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Every attempt failed; carries the last error.
    #[error("failed after {attempts} attempt(s): {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: E,
    },

    /// The token was cancelled before the attempts ran out.
    #[error("cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32, last: Option<E> },

    /// The operation failed with an error that retrying cannot fix.
    #[error("gave up after {attempts} attempt(s): {source}")]
    Aborted {
        attempts: u32,
        #[source]
        source: E,
    },
}

impl<E> RetryError<E> {
    /// Number of times the operation was invoked.
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. }
            | RetryError::Cancelled { attempts, .. }
            | RetryError::Aborted { attempts, .. } => *attempts,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RetryError::Cancelled { .. })
    }

    /// The last error produced by the operation, if it ran at all.
    pub fn into_last_error(self) -> Option<E> {
        match self {
            RetryError::Exhausted { source, .. } | RetryError::Aborted { source, .. } => Some(source),
            RetryError::Cancelled { last, .. } => last,
        }
    }
}

/// Runs a fallible operation up to `attempts` times, sleeping `delay` between
/// attempts. No backoff, no jitter.
///
/// Cancellation is checked before every attempt and during every delay; an
/// attempt that is already running is allowed to finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryExecutor {
    attempts: u32,
    delay: Duration,
}

impl RetryExecutor {
    /// `attempts` is clamped to at least one.
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub async fn run<T, E, F, Fut>(
        &self,
        cancel: &CancellationToken,
        operation: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        self.run_while(cancel, operation, |_| true).await
    }

    /// Like [`RetryExecutor::run`], but stops with [`RetryError::Aborted`] as
    /// soon as `retryable` rejects an error.
    pub async fn run_while<T, E, F, Fut, R>(
        &self,
        cancel: &CancellationToken,
        mut operation: F,
        retryable: R,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
        R: Fn(&E) -> bool,
    {
        let mut attempt = 0;
        let mut last = None;

        loop {
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled {
                    attempts: attempt,
                    last,
                });
            }

            attempt += 1;
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if !retryable(&error) {
                return Err(RetryError::Aborted {
                    attempts: attempt,
                    source: error,
                });
            }

            if attempt >= self.attempts {
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    source: error,
                });
            }

            debug!(
                attempt,
                max_attempts = self.attempts,
                delay_ms = self.delay.as_millis() as u64,
                error = %error,
                "Attempt failed, retrying"
            );
            last = Some(error);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(RetryError::Cancelled { attempts: attempt, last });
                }
                _ = tokio::time::sleep(self.delay) => {}
            }
        }
    }
}

impl Default for RetryExecutor {
    /// 3 attempts, 1s apart.
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_deterministic_failure_invokes_exactly_attempts_times() {
        let executor = RetryExecutor::new(3, Duration::from_secs(1));
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = executor
            .run(&CancellationToken::new(), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>("smtp unavailable")
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let err = result.unwrap_err();
        assert_eq!(err.attempts(), 3);
        assert!(!err.is_cancelled());
        assert_eq!(err.into_last_error(), Some("smtp unavailable"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_first_success() {
        let executor = RetryExecutor::new(5, Duration::from_millis(100));
        let calls = AtomicU32::new(0);

        let value = executor
            .run(&CancellationToken::new(), || async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 2 {
                    Err("not yet")
                } else {
                    Ok(n)
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_delay_between_attempts() {
        let executor = RetryExecutor::new(3, Duration::from_secs(1));
        let start = Instant::now();

        let _ = executor
            .run(&CancellationToken::new(), || async { Err::<(), _>("down") })
            .await;

        // Two gaps between three attempts, no sleep after the last one
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_within_one_delay() {
        let executor = RetryExecutor::new(10, Duration::from_secs(1));
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            canceller.cancel();
        });

        let start = Instant::now();
        let counter = calls.clone();
        let result = executor
            .run(&cancel, || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>("db down")
                }
            })
            .await;

        let err = result.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(start.elapsed() <= Duration::from_secs(2));
        assert_eq!(err.into_last_error(), Some("db down"));
    }

    #[tokio::test]
    async fn test_already_cancelled_never_invokes() {
        let executor = RetryExecutor::default();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let calls = AtomicU32::new(0);
        let result = executor
            .run(&cancel, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(())
            })
            .await;

        assert!(matches!(
            result,
            Err(RetryError::Cancelled { attempts: 0, last: None })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_stops_immediately() {
        let executor = RetryExecutor::new(5, Duration::from_secs(1));
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result: Result<(), _> = executor
            .run_while(
                &CancellationToken::new(),
                || async {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    if n == 1 {
                        Err("timeout")
                    } else {
                        Err("bad address")
                    }
                },
                |e| *e != "bad address",
            )
            .await;

        let err = result.unwrap_err();
        assert!(matches!(err, RetryError::Aborted { attempts: 2, source: "bad address" }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        // Only the one delay after the retryable failure
        assert_eq!(start.elapsed(), Duration::from_secs(1));
    }

    #[test]
    fn test_attempts_clamped() {
        assert_eq!(RetryExecutor::new(0, Duration::ZERO).attempts(), 1);
        assert_eq!(RetryExecutor::default().delay(), Duration::from_secs(1));
    }
}
