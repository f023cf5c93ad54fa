//! Resilient email sending
//!
//! [`Client`] sends messages through a pluggable [`Provider`], wrapping every
//! call in the fault-tolerance primitives from `mailwright-resilience`:
//!
//! ```text
//! send ──> validate ──> rate limiter ──> circuit breaker ──> primary ──(retryable)──> fallback
//!                                              ^                                        │
//!                                              └──────────── retry controller <─────────┘
//! ```
//!
//! ```ignore
//! let client = ClientBuilder::new(Config::load("mailwright.config.ron")?)
//!     .provider(Arc::new(MemoryProvider::new("primary")))
//!     .build()?;
//!
//! client.send(&email, &CancellationToken::new()).await?;
//! ```

pub mod client;
pub mod config;
pub mod provider;
pub mod template;

pub use client::{Client, ClientBuilder};
pub use config::{Config, TemplateConfig};
pub use mailwright_common::{
    Address, BatchError, BatchFailure, BatchResult, Email, ErrorKind, MailError, Priority,
    Provider, ProviderError, SendResult, TemplateEngine, TemplateError, TemplateRequest,
    ValidationError,
};
pub use mailwright_resilience::{
    CancellationToken, CircuitBreakerPolicy, CircuitState, RateLimitPolicy, RetryPolicy,
};
pub use provider::MemoryProvider;
pub use template::MemoryTemplateEngine;
