//! Retry logic with exponential backoff
//!
//! Failures are sorted into three retry classes: transport errors, rate limiting
//! (HTTP 429) and server errors (HTTP 5xx). Anything else is terminal. Waiting is
//! delegated to a [`Sleeper`] so callers can substitute a clock that records delays
//! instead of blocking.
//!
//! # Example
//!
//! ```no_run
//! use slack_export_enrich::config::RetryConfig;
//! use slack_export_enrich::error::Error;
//! use slack_export_enrich::retry::{RetryPolicy, TokioSleeper, with_retry};
//!
//! # async fn example() -> Result<(), Error> {
//! let policy = RetryPolicy::new(RetryConfig::default());
//! let body = with_retry(&policy, &TokioSleeper, |_attempt| async {
//!     Ok::<_, Error>("page".to_string())
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::Error;
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

/// Why a failed attempt may be retried
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryClass {
    /// Connection reset, timeout, truncated body
    Network,
    /// HTTP 429, optionally with the server's requested delay
    RateLimited {
        /// Parsed `Retry-After` value
        retry_after: Option<Duration>,
    },
    /// HTTP 5xx
    ServerError,
}

/// Errors that know whether they are worth retrying
pub trait RetryClassify {
    /// Retry class for this failure, or `None` if it is terminal
    fn retry_class(&self) -> Option<RetryClass>;
}

impl RetryClassify for Error {
    fn retry_class(&self) -> Option<RetryClass> {
        match self {
            // A request that could not even be built will fail the same way again
            Error::Network(e) if e.is_builder() => None,
            Error::Network(_) => Some(RetryClass::Network),
            Error::RateLimited { retry_after } => Some(RetryClass::RateLimited {
                retry_after: *retry_after,
            }),
            Error::ServerError { .. } => Some(RetryClass::ServerError),
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::UnexpectedEof
            )
            .then_some(RetryClass::Network),
            Error::Config { .. }
            | Error::Archive(_)
            | Error::ArchiveFile { .. }
            | Error::MalformedInput { .. }
            | Error::Authentication(_)
            | Error::ApiProtocol(_)
            | Error::Serialization(_) => None,
        }
    }
}

/// Clock used for backoff and pacing waits
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Wait for `duration`
    async fn sleep(&self, duration: Duration);
}

/// Real clock backed by `tokio::time::sleep`
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Delay computation and retry budget
#[derive(Clone, Debug, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Build a policy from configuration
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Exponential backoff for the given zero-based attempt
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(self.config.max_backoff_exponent).min(31);
        self.config.backoff_base.saturating_mul(1u32 << exponent)
    }

    /// How long to wait before retrying after `class` failed on `attempt`
    pub fn delay_for(&self, class: RetryClass, attempt: u32) -> Duration {
        match class {
            RetryClass::Network | RetryClass::ServerError => self.backoff(attempt),
            RetryClass::RateLimited { retry_after } => {
                retry_after.unwrap_or(self.config.default_retry_after)
            }
        }
    }

    /// Whether another retry is allowed after `retries` retries already happened
    pub fn allows_retry(&self, retries: u32) -> bool {
        self.config.max_retries.is_none_or(|max| retries < max)
    }
}

/// Run `operation` until it succeeds, fails terminally, or the retry budget runs out
///
/// `operation` receives the zero-based attempt number. Each retryable failure is
/// followed by a wait chosen by [`RetryPolicy::delay_for`].
pub async fn with_retry<F, Fut, T, E>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RetryClassify + std::fmt::Display,
{
    let mut attempt = 0;

    loop {
        match operation(attempt).await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::debug!(attempts = attempt + 1, "request succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) => {
                let Some(class) = e.retry_class() else {
                    tracing::debug!(error = %e, "request failed with non-retryable error");
                    return Err(e);
                };

                if !policy.allows_retry(attempt) {
                    tracing::error!(
                        error = %e,
                        attempts = attempt + 1,
                        "request failed after all retry attempts exhausted"
                    );
                    return Err(e);
                }

                let delay = policy.delay_for(class, attempt);
                tracing::warn!(
                    error = %e,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis(),
                    "request failed, retrying"
                );
                sleeper.sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
