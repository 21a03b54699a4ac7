//! Bounded retry with exponential backoff
//!
//! [`ResilientCaller`] wraps exactly one upstream invocation. It retries only
//! failures the caller-supplied classifier marks [`ErrorClass::Transient`],
//! waiting `base_delay * 2^(k-2) + jitter` before attempt `k`. Permanent
//! failures return on the spot.
//!
//! Sleeping is delegated to a [`Sleeper`] so tests can observe the schedule
//! without waiting for it.

use async_trait::async_trait;
use rand::Rng;
use sdk::errors::EngineError;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::upstream::ErrorClass;

/// Waits between attempts
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, delay: Duration);
}

/// Production sleeper backed by the tokio timer
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

/// Sleeper that records requested delays and returns immediately
#[derive(Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.delays
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, delay: Duration) {
        if let Ok(mut delays) = self.delays.lock() {
            delays.push(delay);
        }
    }
}

/// Attempt budget and backoff timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_jitter: Duration,
}

impl RetryPolicy {
    /// Delay before attempt `attempt` (1-based), without jitter.
    /// The first attempt is never delayed.
    pub fn base_delay_before(&self, attempt: u32) -> Duration {
        if attempt < 2 {
            return Duration::ZERO;
        }
        let factor = 1u32 << (attempt - 2).min(16);
        self.base_delay.saturating_mul(factor)
    }

    fn jitter(&self) -> Duration {
        let max = self.max_jitter.as_millis() as u64;
        if max == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_jitter: Duration::from_millis(config.max_jitter_ms),
        }
    }
}

/// Failure of a wrapped call
#[derive(Debug, thiserror::Error)]
pub enum CallError<E: fmt::Display> {
    /// Permanent failure; no retry was attempted
    #[error("{operation} rejected: {error}")]
    Rejected { operation: String, error: E },

    /// Every attempt failed with a transient error
    #[error("{operation} exhausted after {attempts} attempts: {last_error}")]
    Exhausted {
        operation: String,
        attempts: u32,
        last_error: E,
    },
}

impl<E: fmt::Display> CallError<E> {
    /// The underlying upstream error
    pub fn error(&self) -> &E {
        match self {
            CallError::Rejected { error, .. } => error,
            CallError::Exhausted { last_error, .. } => last_error,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, CallError::Exhausted { .. })
    }

    pub fn into_engine_error(self) -> EngineError {
        match self {
            CallError::Rejected { operation, error } => EngineError::UpstreamRejected {
                operation,
                error: error.to_string(),
            },
            CallError::Exhausted {
                operation,
                attempts,
                last_error,
            } => EngineError::UpstreamExhausted {
                operation,
                attempts,
                last_error: last_error.to_string(),
            },
        }
    }
}

/// Generic retry wrapper shared by every upstream integration point
#[derive(Clone)]
pub struct ResilientCaller {
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl ResilientCaller {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_sleeper(policy: RetryPolicy, sleeper: Arc<dyn Sleeper>) -> Self {
        Self { policy, sleeper }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Wait out the backoff before `attempt` of a sequence driven outside
    /// [`call`](Self::call), such as a fresh register/upload pair.
    pub async fn backoff(&self, operation: &str, attempt: u32) {
        let delay = self.policy.base_delay_before(attempt) + self.policy.jitter();
        if delay.is_zero() {
            return;
        }
        debug!(
            operation,
            next_attempt = attempt,
            delay_ms = delay.as_millis() as u64,
            "Backing off before next attempt"
        );
        self.sleeper.sleep(delay).await;
    }

    /// Run `op` until it succeeds, fails permanently, or the attempt budget
    /// is spent.
    pub async fn call<T, E, F, Fut, C>(
        &self,
        operation: &str,
        mut op: F,
        classify: C,
    ) -> Result<T, CallError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Fn(&E) -> ErrorClass,
        E: fmt::Display,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation, attempt, "Upstream call recovered");
                    }
                    return Ok(value);
                }
                Err(error) => {
                    if classify(&error) == ErrorClass::Permanent {
                        warn!(operation, attempt, error = %error, "Permanent upstream failure");
                        return Err(CallError::Rejected {
                            operation: operation.to_string(),
                            error,
                        });
                    }

                    if attempt >= max_attempts {
                        warn!(
                            operation,
                            attempts = attempt,
                            error = %error,
                            "Upstream call exhausted retries"
                        );
                        return Err(CallError::Exhausted {
                            operation: operation.to_string(),
                            attempts: attempt,
                            last_error: error,
                        });
                    }

                    attempt += 1;
                    let delay = self.policy.base_delay_before(attempt) + self.policy.jitter();
                    warn!(
                        operation,
                        next_attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Transient upstream failure, backing off"
                    );
                    self.sleeper.sleep(delay).await;
                }
            }
        }
    }
}
