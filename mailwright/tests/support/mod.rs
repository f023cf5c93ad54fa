//! Shared fixtures for client integration tests
#![allow(dead_code, clippy::expect_used)]

use std::sync::Arc;

use mailwright::{
    Address, Client, ClientBuilder, Config, Email, MailError, MemoryProvider, ProviderError,
    RetryPolicy,
};

pub fn email(to: &str) -> Email {
    Email::new(Address::named("Sender", "sender@example.com"))
        .to(Address::new(to))
        .subject("Hello")
        .text_body("Hello there")
}

/// Retryable, temporary provider failure
pub fn transient(provider: &str) -> MailError {
    ProviderError::retryable(provider, "503", "service unavailable")
        .with_status(503)
        .into()
}

/// Non-retryable provider failure
pub fn permanent(provider: &str) -> MailError {
    ProviderError::new(provider, "550", "mailbox unavailable")
        .with_status(550)
        .into()
}

/// Defaults with deterministic backoff (100ms, 200ms, 400ms, ...)
pub fn config() -> Config {
    Config {
        retry: RetryPolicy {
            jitter: false,
            ..RetryPolicy::default()
        },
        ..Config::default()
    }
}

pub fn client(config: Config, primary: &Arc<MemoryProvider>) -> Client {
    ClientBuilder::new(config)
        .provider(Arc::clone(primary) as _)
        .build()
        .expect("client should build")
}

pub fn client_with_fallback(
    config: Config,
    primary: &Arc<MemoryProvider>,
    fallback: &Arc<MemoryProvider>,
) -> Client {
    ClientBuilder::new(config)
        .provider(Arc::clone(primary) as _)
        .fallback(Arc::clone(fallback) as _)
        .build()
        .expect("client should build")
}
