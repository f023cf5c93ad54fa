//! Exponential backoff calculation

use std::time::Duration;

use rand::Rng;

use crate::retry::RetryPolicy;

/// Delay before retry number `attempt` (1-indexed), without jitter.
///
/// `min(initial_delay * multiplier^(attempt - 1), max_delay)`, computed in
/// nanoseconds so that integral inputs give exact results.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn base_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
    let initial = policy.initial_delay().as_nanos() as f64;
    let max = policy.max_delay().as_nanos() as f64;

    let nanos = (initial * policy.multiplier.powi(exponent)).min(max);
    Duration::from_nanos(nanos as u64)
}

/// Delay before retry number `attempt` (1-indexed).
///
/// With jitter enabled a uniformly distributed extra of up to 10% of the
/// base delay is added, drawn from the thread-local CSPRNG so that callers
/// failing together do not retry together.
#[must_use]
pub fn compute_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let delay = base_delay(policy, attempt);
    if !policy.jitter {
        return delay;
    }

    let ceiling = u64::try_from(delay.as_nanos() / 10).unwrap_or(u64::MAX);
    let extra = rand::rng().random_range(0..=ceiling);
    delay.saturating_add(Duration::from_nanos(extra))
}
