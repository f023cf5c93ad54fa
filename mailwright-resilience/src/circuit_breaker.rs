//! Circuit breaker guarding the provider call
//!
//! # State Transitions
//!
//! ```text
//! ┌─────────┐  failure_threshold failures   ┌──────┐
//! │ Closed  │ ───────────────────────────>  │ Open │ <──────────┐
//! └─────────┘                               └──────┘            │
//!     ^                                        │                │
//!     │                                        │ open_timeout   │ probe
//!     │                                        v elapsed        │ failed
//!     │  success_threshold    ┌───────────────┐                 │
//!     └───────────────────────│  Half-Open    │ ────────────────┘
//!        probe successes      └───────────────┘
//! ```
//!
//! While Closed, failures accumulate until a success arrives at least
//! `reset_timeout` after the last failure, which clears them.

use std::{fmt, future::Future, time::Duration};

use mailwright_common::MailError;
use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerPolicy {
    #[serde(default)]
    pub enabled: bool,

    /// Failures (while Closed) required to open the circuit
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Consecutive probe successes (while Half-Open) required to close it
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,

    /// How long the circuit stays open before probing (seconds)
    #[serde(default = "default_open_timeout_secs")]
    pub open_timeout_secs: u64,

    /// Quiet time after which accumulated failures are forgotten (seconds)
    #[serde(default = "default_reset_timeout_secs")]
    pub reset_timeout_secs: u64,
}

impl Default for CircuitBreakerPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            failure_threshold: default_failure_threshold(),
            success_threshold: default_success_threshold(),
            open_timeout_secs: default_open_timeout_secs(),
            reset_timeout_secs: default_reset_timeout_secs(),
        }
    }
}

const fn default_failure_threshold() -> u32 {
    5
}

const fn default_success_threshold() -> u32 {
    3
}

const fn default_open_timeout_secs() -> u64 {
    60
}

const fn default_reset_timeout_secs() -> u64 {
    300 // 5 minutes
}

impl CircuitBreakerPolicy {
    #[must_use]
    pub const fn open_timeout(&self) -> Duration {
        Duration::from_secs(self.open_timeout_secs)
    }

    #[must_use]
    pub const fn reset_timeout(&self) -> Duration {
        Duration::from_secs(self.reset_timeout_secs)
    }

    /// Checks the policy's invariants.
    ///
    /// # Errors
    ///
    /// [`MailError::Configuration`] naming the first offending field.
    pub fn validate(&self) -> Result<(), MailError> {
        if self.failure_threshold == 0 {
            return Err(MailError::Configuration(
                "circuit_breaker.failure_threshold must be at least 1".to_string(),
            ));
        }

        if self.success_threshold == 0 {
            return Err(MailError::Configuration(
                "circuit_breaker.success_threshold must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    /// Normal operation, calls pass through
    Closed,
    /// Tripped, calls are rejected without running
    Open,
    /// Probing recovery
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half-open",
        })
    }
}

#[derive(Debug)]
struct BreakerData {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure: Option<Instant>,
}

impl BreakerData {
    const fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure: None,
        }
    }

    fn open_timeout_elapsed(&self, timeout: Duration) -> bool {
        self.last_failure
            .is_none_or(|last_failure| last_failure.elapsed() >= timeout)
    }

    fn record_success(&mut self, policy: &CircuitBreakerPolicy) {
        match self.state {
            CircuitState::Closed => {
                self.success_count = self.success_count.saturating_add(1);
                let stale = self
                    .last_failure
                    .is_none_or(|last_failure| last_failure.elapsed() >= policy.reset_timeout());
                if stale {
                    self.failure_count = 0;
                }
            }
            CircuitState::HalfOpen => {
                self.success_count = self.success_count.saturating_add(1);
                if self.success_count >= policy.success_threshold {
                    self.state = CircuitState::Closed;
                    self.failure_count = 0;
                    self.success_count = 0;
                    tracing::info!(
                        success_threshold = policy.success_threshold,
                        "Circuit breaker CLOSED - normal operation resumed"
                    );
                }
            }
            CircuitState::Open => {
                // Admitted before another call opened the circuit.
                tracing::debug!("Success recorded while circuit is open");
            }
        }
    }

    fn record_failure(&mut self, policy: &CircuitBreakerPolicy) {
        match self.state {
            CircuitState::Closed => {
                self.failure_count = self.failure_count.saturating_add(1);
                self.last_failure = Some(Instant::now());

                if self.failure_count >= policy.failure_threshold {
                    self.state = CircuitState::Open;
                    tracing::warn!(
                        failure_count = self.failure_count,
                        threshold = policy.failure_threshold,
                        open_timeout_secs = policy.open_timeout_secs,
                        "Circuit breaker OPENED - rejecting sends"
                    );
                }
            }
            CircuitState::HalfOpen => {
                self.state = CircuitState::Open;
                self.failure_count = self.failure_count.saturating_add(1);
                self.success_count = 0;
                self.last_failure = Some(Instant::now());
                tracing::warn!("Circuit breaker probe failed - reopening circuit");
            }
            CircuitState::Open => {
                // A concurrent probe already reopened the circuit; restart the timer.
                self.last_failure = Some(Instant::now());
            }
        }
    }
}

/// Circuit breaker statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerStats {
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    /// Time since the last recorded failure
    pub since_last_failure: Option<Duration>,
}

/// Three-state circuit breaker.
///
/// State is read on every admission and written only on outcomes and
/// transitions, so it sits behind a read-write lock.
#[derive(Debug)]
pub struct CircuitBreaker {
    policy: CircuitBreakerPolicy,
    data: RwLock<BreakerData>,
}

impl CircuitBreaker {
    #[must_use]
    pub const fn new(policy: CircuitBreakerPolicy) -> Self {
        Self {
            policy,
            data: RwLock::new(BreakerData::new()),
        }
    }

    #[must_use]
    pub const fn policy(&self) -> &CircuitBreakerPolicy {
        &self.policy
    }

    /// Decides whether a call may run, moving Open to Half-Open once the open
    /// timeout has elapsed.
    ///
    /// The Open check and the Half-Open transition happen under one
    /// upgradable lock, so concurrent callers cannot both see the expired
    /// Open state.
    pub fn admit(&self) -> bool {
        if !self.policy.enabled {
            return true;
        }

        {
            let data = self.data.read();
            match data.state {
                CircuitState::Closed | CircuitState::HalfOpen => return true,
                CircuitState::Open if !data.open_timeout_elapsed(self.policy.open_timeout()) => {
                    return false;
                }
                CircuitState::Open => {}
            }
        }

        let data = self.data.upgradable_read();
        match data.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open if data.open_timeout_elapsed(self.policy.open_timeout()) => {
                let mut data = RwLockUpgradableReadGuard::upgrade(data);
                data.state = CircuitState::HalfOpen;
                data.success_count = 0;
                tracing::info!("Circuit breaker entering HALF-OPEN state - probing recovery");
                true
            }
            CircuitState::Open => false,
        }
    }

    pub fn record_success(&self) {
        self.data.write().record_success(&self.policy);
    }

    pub fn record_failure(&self) {
        self.data.write().record_failure(&self.policy);
    }

    /// Runs `operation` if the breaker admits it and records the outcome.
    ///
    /// # Errors
    ///
    /// [`MailError::CircuitOpen`] without running `operation` when the circuit
    /// is open, otherwise whatever `operation` returns.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T, MailError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, MailError>>,
    {
        if !self.policy.enabled {
            return operation().await;
        }

        if !self.admit() {
            tracing::debug!("Circuit breaker rejected call");
            return Err(MailError::CircuitOpen);
        }

        let outcome = operation().await;
        match &outcome {
            Ok(_) => self.record_success(),
            Err(_) => self.record_failure(),
        }

        outcome
    }

    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.data.read().state
    }

    #[must_use]
    pub fn stats(&self) -> CircuitBreakerStats {
        let data = self.data.read();
        CircuitBreakerStats {
            state: data.state,
            failure_count: data.failure_count,
            success_count: data.success_count,
            since_last_failure: data.last_failure.map(|last_failure| last_failure.elapsed()),
        }
    }
}
