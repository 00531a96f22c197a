// Retry with exponential backoff for transient upstream failures.
// Handles 429 rate limiting (Retry-After aware) and 5xx/network errors;
// anything else fails fast.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::error::ApiError;

/// Outcome of a single upstream attempt, classified for the retry decision.
#[derive(Error, Debug)]
pub enum AttemptError {
    /// Connection refused, DNS failure, timeout: transient by assumption.
    #[error("Network error: {0}")]
    Network(String),

    /// HTTP 429; `retry_after` carries the Retry-After header when present.
    #[error("Rate limit exceeded")]
    RateLimited { retry_after: Option<Duration> },

    /// Any other non-2xx response. 5xx is transient, the rest is not.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },
}

impl AttemptError {
    fn into_upstream(self) -> ApiError {
        match self {
            AttemptError::Network(message) => ApiError::Upstream {
                status: None,
                message,
            },
            AttemptError::RateLimited { .. } => ApiError::Upstream {
                status: Some(429),
                message: "rate limit exceeded".to_string(),
            },
            AttemptError::Http { status, message } => ApiError::Upstream {
                status: Some(status),
                message,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff: Duration::from_secs(1),
        }
    }
}

/// Wraps one logical upstream call. Holds no state across calls; all retry
/// bookkeeping lives on the stack of `execute`.
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Run `call` until it succeeds, fails terminally, or attempts run out.
    ///
    /// Backoff doubles per attempt (1s, 2s, 4s, ... with defaults); a 429
    /// with Retry-After sleeps exactly that long instead. Each sleep suspends
    /// only the calling task.
    pub async fn execute<T, F, Fut>(&self, mut call: F) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AttemptError>>,
    {
        if self.policy.max_attempts == 0 {
            return Err(ApiError::InvalidArgument(
                "retry attempts must be at least 1".to_string(),
            ));
        }

        let mut backoff = self.policy.initial_backoff;
        for attempt in 1..=self.policy.max_attempts {
            let err = match call().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            let last = attempt == self.policy.max_attempts;

            // (sleep duration, whether the backoff schedule advances);
            // None means the error is terminal here
            let next = match &err {
                AttemptError::Network(message) if !last => {
                    warn!(attempt, %message, "network error; backing off {:?}", backoff);
                    Some((backoff, true))
                }
                AttemptError::RateLimited { retry_after } if !last => {
                    let wait = (*retry_after).unwrap_or(backoff);
                    warn!(attempt, "rate limited (429); sleeping {:?}", wait);
                    Some((wait, retry_after.is_none()))
                }
                AttemptError::Http { status, .. } if (500..600).contains(status) && !last => {
                    warn!(attempt, status = *status, "server error; backing off {:?}", backoff);
                    Some((backoff, true))
                }
                // 4xx other than 429 is not transient; attempts may also be exhausted
                _ => None,
            };

            match next {
                Some((wait, advance)) => {
                    tokio::time::sleep(wait).await;
                    if advance {
                        backoff *= 2;
                    }
                }
                None => return Err(err.into_upstream()),
            }
        }
        unreachable!("loop returns on the final attempt")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn executor() -> RetryExecutor {
        RetryExecutor::new(RetryPolicy::default())
    }

    #[tokio::test(start_paused = true)]
    async fn network_errors_retry_with_doubling_backoff() {
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let result = executor()
            .execute(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(AttemptError::Network("connection refused".to_string()))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // two delays: 1s then 2s
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_after_header_overrides_backoff() {
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let result = executor()
            .execute(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(AttemptError::RateLimited {
                            retry_after: Some(Duration::from_secs(5)),
                        })
                    } else {
                        Ok("ok")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "ok");
        assert!(started.elapsed() >= Duration::from_secs(5));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_without_header_uses_backoff_schedule() {
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let result = executor()
            .execute(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(AttemptError::RateLimited { retry_after: None })
                    } else {
                        Ok(())
                    }
                }
            })
            .await;

        assert!(result.is_ok());
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn server_errors_retry_until_exhausted() {
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let result: Result<(), _> = executor()
            .execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(AttemptError::Http {
                        status: 503,
                        message: "service unavailable".to_string(),
                    })
                }
            })
            .await;

        let err = result.unwrap_err();
        assert_eq!(err.status(), Some(503));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        // three delays: 1s + 2s + 4s
        assert_eq!(started.elapsed(), Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn client_errors_fail_immediately() {
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let result: Result<(), _> = executor()
            .execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(AttemptError::Http {
                        status: 400,
                        message: "bad request".to_string(),
                    })
                }
            })
            .await;

        let err = result.unwrap_err();
        assert_eq!(err.status(), Some(400));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_network_errors_surface_last_error() {
        let result: Result<(), _> = executor()
            .execute(|| async { Err(AttemptError::Network("dns failure".to_string())) })
            .await;

        match result.unwrap_err() {
            ApiError::Upstream { status, message } => {
                assert_eq!(status, None);
                assert_eq!(message, "dns failure");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn zero_attempts_is_invalid() {
        let executor = RetryExecutor::new(RetryPolicy {
            max_attempts: 0,
            initial_backoff: Duration::from_secs(1),
        });
        let result: Result<(), _> = executor.execute(|| async { Ok(()) }).await;
        assert!(matches!(result, Err(ApiError::InvalidArgument(_))));
    }
}
