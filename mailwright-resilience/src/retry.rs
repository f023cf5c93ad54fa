//! Bounded retry of a unit of work.

use std::{future::Future, time::Duration};

use mailwright_common::MailError;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::backoff::compute_delay;

/// Retry configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,

    /// Maximum number of retry attempts.
    ///
    /// Default: 3
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (in milliseconds).
    ///
    /// Default: 100
    #[serde(default = "defaults::initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Upper bound on any computed delay (in milliseconds).
    ///
    /// Default: 5000
    #[serde(default = "defaults::max_delay_ms")]
    pub max_delay_ms: u64,

    /// Growth factor between consecutive delays.
    ///
    /// Default: 2.0
    #[serde(default = "defaults::multiplier")]
    pub multiplier: f64,

    /// Add up to 10% random extra delay.
    ///
    /// Default: true
    #[serde(default = "defaults::jitter")]
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            enabled: defaults::enabled(),
            max_attempts: defaults::max_attempts(),
            initial_delay_ms: defaults::initial_delay_ms(),
            max_delay_ms: defaults::max_delay_ms(),
            multiplier: defaults::multiplier(),
            jitter: defaults::jitter(),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub const fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    #[must_use]
    pub const fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Checks the policy's invariants.
    ///
    /// # Errors
    ///
    /// [`MailError::Configuration`] naming the first offending field.
    pub fn validate(&self) -> Result<(), MailError> {
        if self.max_attempts == 0 {
            return Err(MailError::Configuration(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }

        if self.initial_delay_ms == 0 {
            return Err(MailError::Configuration(
                "retry.initial_delay_ms must be greater than 0".to_string(),
            ));
        }

        if self.max_delay_ms < self.initial_delay_ms {
            return Err(MailError::Configuration(format!(
                "retry.max_delay_ms ({}) must not be less than retry.initial_delay_ms ({})",
                self.max_delay_ms, self.initial_delay_ms
            )));
        }

        if !self.multiplier.is_finite() || self.multiplier <= 1.0 {
            return Err(MailError::Configuration(format!(
                "retry.multiplier must be greater than 1.0, got {}",
                self.multiplier
            )));
        }

        Ok(())
    }
}

mod defaults {
    pub const fn enabled() -> bool {
        true
    }

    pub const fn max_attempts() -> u32 {
        3
    }

    pub const fn initial_delay_ms() -> u64 {
        100
    }

    pub const fn max_delay_ms() -> u64 {
        5_000
    }

    pub const fn multiplier() -> f64 {
        2.0
    }

    pub const fn jitter() -> bool {
        true
    }
}

/// Drives repeated invocation of a unit of work according to a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryController {
    policy: RetryPolicy,
}

impl RetryController {
    #[must_use]
    pub const fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Runs `operation` until it succeeds, fails non-retryably, or the
    /// attempts run out.
    ///
    /// Between attempts the controller sleeps for the backoff delay, or for
    /// the failure's own retry-after hint when it carries one. Cancelling
    /// `cancel` during that sleep ends the loop with [`MailError::Cancelled`];
    /// an attempt already in flight is never interrupted.
    ///
    /// # Errors
    ///
    /// The last failure seen, or [`MailError::Cancelled`].
    pub async fn retry<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<T, MailError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, MailError>>,
    {
        if !self.policy.enabled {
            return operation().await;
        }

        let mut attempt = 1;
        loop {
            let error = match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::debug!(attempt, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            if !error.is_retryable() {
                return Err(error);
            }

            if attempt >= self.policy.max_attempts {
                tracing::warn!(
                    attempts = attempt,
                    error = %error,
                    "All retry attempts exhausted"
                );
                return Err(error);
            }

            let delay = error
                .retry_after()
                .unwrap_or_else(|| compute_delay(&self.policy, attempt));

            tracing::debug!(
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %error,
                "Scheduling retry"
            );

            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    tracing::debug!(attempt, "Retry cancelled while waiting");
                    return Err(MailError::Cancelled);
                }
                () = tokio::time::sleep(delay) => {}
            }

            attempt += 1;
        }
    }
}
