//! Retry policy shared by every call site that talks to the network

use std::fmt::Display;
use std::future::Future;

use thiserror::Error;
use tracing::warn;

use crate::config::DelayRange;

/// Classifies an error as worth retrying
pub trait Transient {
    fn is_transient(&self) -> bool;
}

/// Why a retried operation gave up
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Every attempt failed with a transient error
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },
    /// An attempt failed with an error retrying cannot fix
    #[error("permanent failure on attempt {attempt}: {error}")]
    Permanent { attempt: u32, error: E },
}

impl<E> RetryError<E> {
    pub fn error(&self) -> &E {
        match self {
            Self::Exhausted { last, .. } => last,
            Self::Permanent { error, .. } => error,
        }
    }

    pub fn into_error(self) -> E {
        match self {
            Self::Exhausted { last, .. } => last,
            Self::Permanent { error, .. } => error,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. } => *attempts,
            Self::Permanent { attempt, .. } => *attempt,
        }
    }
}

/// Bounded attempts with a jittered sleep between them
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: DelayRange,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: DelayRange::new(1000, 2000),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: DelayRange) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Run `op` until it succeeds, fails permanently, or runs out of attempts.
    /// `op` receives the 1-based attempt number.
    pub async fn run<T, E, F, Fut>(&self, op: F) -> Result<T, RetryError<E>>
    where
        E: Transient + Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run_classified(op, |e: &E| e.is_transient()).await
    }

    /// Like [`run`](Self::run) with an explicit transient classifier
    pub async fn run_classified<T, E, F, Fut, C>(&self, mut op: F, classify: C) -> Result<T, RetryError<E>>
    where
        E: Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Fn(&E) -> bool,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) if !classify(&error) => {
                    return Err(RetryError::Permanent { attempt, error });
                }
                Err(error) if attempt >= max_attempts => {
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last: error,
                    });
                }
                Err(error) => {
                    let delay = self.backoff.sample();
                    warn!(
                        "Attempt {}/{} failed: {}; retrying in {:?}",
                        attempt, max_attempts, error, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct TestError(bool);

    impl Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "test error (transient: {})", self.0)
        }
    }

    impl Transient for TestError {
        fn is_transient(&self) -> bool {
            self.0
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::new(3, DelayRange::none())
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = policy()
            .run(|attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(TestError(true))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausts_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = policy()
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(TestError(true)) }
            })
            .await;
        let err = result.unwrap_err();
        assert!(matches!(err, RetryError::Exhausted { attempts: 3, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_stops_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = policy()
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(TestError(false)) }
            })
            .await;
        let err = result.unwrap_err();
        assert!(matches!(err, RetryError::Permanent { attempt: 1, .. }));
        assert_eq!(err.attempts(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_custom_classifier_retries_everything() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = policy()
            .run_classified(
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(TestError(false)) }
                },
                |_| true,
            )
            .await;
        assert!(matches!(result, Err(RetryError::Exhausted { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
