//! Token bucket rate limiting
//!
//! The bucket starts full with `burst` tokens. A background task adds one
//! token every `period / rate`, never exceeding `burst`. Callers consume
//! tokens without waiting: when too few are available the call fails
//! immediately with [`MailError::RateLimited`] and nothing is consumed.
//!
//! # Example
//!
//! ```text
//! Rate limit: 100 per 60s, burst: 10
//! - Bucket starts with 10 tokens
//! - One token is added every 600ms
//! - 10 sends succeed immediately, the 11th is rejected with retry_after = 600ms
//! ```

use std::{sync::Arc, time::Duration};

use mailwright_common::MailError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::{
    runtime::Handle,
    time::{Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

/// Configuration for rate limiting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    #[serde(default)]
    pub enabled: bool,

    /// Tokens added per period
    #[serde(default = "defaults::rate")]
    pub rate: u32,

    /// Length of the period (seconds)
    #[serde(default = "defaults::period_secs")]
    pub period_secs: u64,

    /// Maximum tokens held by the bucket
    #[serde(default = "defaults::burst")]
    pub burst: u32,

    /// Charge one token per recipient instead of one per message
    #[serde(default)]
    pub per_recipient: bool,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            rate: defaults::rate(),
            period_secs: defaults::period_secs(),
            burst: defaults::burst(),
            per_recipient: false,
        }
    }
}

mod defaults {
    pub const fn rate() -> u32 {
        100
    }

    pub const fn period_secs() -> u64 {
        60
    }

    pub const fn burst() -> u32 {
        10
    }
}

impl RateLimitPolicy {
    #[must_use]
    pub const fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }

    /// Time between two refills, `period / rate`.
    #[must_use]
    pub fn refill_interval(&self) -> Duration {
        self.period() / self.rate.max(1)
    }

    /// Checks the policy's invariants.
    ///
    /// # Errors
    ///
    /// [`MailError::Configuration`] naming the first offending field.
    pub fn validate(&self) -> Result<(), MailError> {
        if self.rate == 0 {
            return Err(MailError::Configuration(
                "rate_limit.rate must be greater than 0".to_string(),
            ));
        }

        if self.period_secs == 0 {
            return Err(MailError::Configuration(
                "rate_limit.period_secs must be greater than 0".to_string(),
            ));
        }

        if self.burst == 0 {
            return Err(MailError::Configuration(
                "rate_limit.burst must be greater than 0".to_string(),
            ));
        }

        if self.refill_interval().is_zero() {
            return Err(MailError::Configuration(format!(
                "rate_limit.rate of {} per {}s exceeds the nanosecond refill resolution",
                self.rate, self.period_secs
            )));
        }

        Ok(())
    }
}

#[derive(Debug)]
struct TokenBucket {
    tokens: u32,
    capacity: u32,
    last_refill: Instant,
}

impl TokenBucket {
    fn full(capacity: u32) -> Self {
        Self {
            tokens: capacity,
            capacity,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        if self.tokens < self.capacity {
            self.tokens += 1;
        }
        self.last_refill = Instant::now();
    }

    /// Takes `weight` tokens, or none at all.
    const fn try_consume(&mut self, weight: u32) -> bool {
        if self.tokens >= weight {
            self.tokens -= weight;
            true
        } else {
            false
        }
    }
}

/// Snapshot of a limiter's bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimiterStats {
    pub available_tokens: u32,
    pub capacity: u32,
    pub refill_interval: Duration,
    /// Time since the refill task last ran
    pub since_last_refill: Duration,
}

/// Fail-fast token bucket with a background refill task.
///
/// The refill task is stopped by [`RateLimiter::shutdown`] or when the
/// limiter is dropped.
#[derive(Debug)]
pub struct RateLimiter {
    policy: RateLimitPolicy,
    bucket: Arc<Mutex<TokenBucket>>,
    shutdown: CancellationToken,
}

impl RateLimiter {
    /// Creates the limiter and, when enabled, starts its refill task.
    ///
    /// # Errors
    ///
    /// [`MailError::Configuration`] if the policy is invalid, or if it is
    /// enabled and no tokio runtime is available to run the refill task.
    pub fn new(policy: RateLimitPolicy) -> Result<Self, MailError> {
        let shutdown = CancellationToken::new();
        let bucket = Arc::new(Mutex::new(TokenBucket::full(policy.burst)));

        if policy.enabled {
            policy.validate()?;

            let handle = Handle::try_current().map_err(|err| {
                MailError::Configuration(format!(
                    "rate limiter requires a tokio runtime to refill tokens: {err}"
                ))
            })?;

            spawn_refill(
                &handle,
                Arc::clone(&bucket),
                policy.refill_interval(),
                shutdown.clone(),
            );
        }

        Ok(Self {
            policy,
            bucket,
            shutdown,
        })
    }

    #[must_use]
    pub const fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    /// Tokens charged for a message with `recipients` recipients.
    #[must_use]
    pub fn weight_for(&self, recipients: usize) -> u32 {
        if self.policy.per_recipient {
            u32::try_from(recipients).unwrap_or(u32::MAX)
        } else {
            1
        }
    }

    /// Consumes `weight` tokens without waiting.
    ///
    /// A weight above the bucket's capacity can never be satisfied.
    ///
    /// # Errors
    ///
    /// [`MailError::Cancelled`] if `cancel` has fired, otherwise
    /// [`MailError::RateLimited`] carrying one refill interval when fewer than
    /// `weight` tokens are available.
    pub fn acquire(&self, cancel: &CancellationToken, weight: u32) -> Result<(), MailError> {
        if !self.policy.enabled {
            return Ok(());
        }

        if cancel.is_cancelled() {
            return Err(MailError::Cancelled);
        }

        let mut bucket = self.bucket.lock();
        if bucket.try_consume(weight) {
            return Ok(());
        }

        let available = bucket.tokens;
        drop(bucket);

        let retry_after = self.policy.refill_interval();
        tracing::debug!(
            weight,
            available,
            retry_after_ms = u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX),
            "Rate limit exceeded"
        );

        Err(MailError::RateLimited { retry_after })
    }

    /// Stops the refill task. Idempotent.
    pub fn shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            tracing::debug!("Stopping rate limiter refill task");
            self.shutdown.cancel();
        }
    }

    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    #[must_use]
    pub fn stats(&self) -> RateLimiterStats {
        let bucket = self.bucket.lock();
        RateLimiterStats {
            available_tokens: bucket.tokens,
            capacity: bucket.capacity,
            refill_interval: self.policy.refill_interval(),
            since_last_refill: bucket.last_refill.elapsed(),
        }
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn spawn_refill(
    handle: &Handle,
    bucket: Arc<Mutex<TokenBucket>>,
    every: Duration,
    shutdown: CancellationToken,
) {
    handle.spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => bucket.lock().refill(),
            }
        }
        tracing::trace!("Rate limiter refill task stopped");
    });
}
