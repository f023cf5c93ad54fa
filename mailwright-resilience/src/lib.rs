//! Fault-tolerance primitives for the mailwright mailer
//!
//! Three independent mechanisms, each owning its own state:
//! - [`RetryController`]: bounded retry with exponential backoff and jitter
//! - [`RateLimiter`]: fail-fast token bucket refilled by a background task
//! - [`CircuitBreaker`]: closed/open/half-open guard around a unit of work
//!
//! None of them know about each other; the client composes them per call.

pub mod backoff;
pub mod circuit_breaker;
pub mod rate_limiter;
pub mod retry;

pub use backoff::compute_delay;
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerPolicy, CircuitBreakerStats, CircuitState};
pub use rate_limiter::{RateLimitPolicy, RateLimiter, RateLimiterStats};
pub use retry::{RetryController, RetryPolicy};
pub use tokio_util::sync::CancellationToken;
