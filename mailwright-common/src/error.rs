//! Classified failures for send operations.
//!
//! Every failure the mailer can produce is a [`MailError`]. The orchestrator
//! and callers make retry decisions from the classification alone:
//! - [`MailError::is_retryable`] - may the same call be attempted again right away
//! - [`MailError::is_temporary`] - is the condition expected to clear on its own
//! - [`MailError::retry_after`] - how long the failing party asked us to wait

use std::{fmt, time::Duration};

use thiserror::Error;

use crate::outcome::{BatchFailure, BatchResult, SendResult};

/// Discriminant of a [`MailError`], for matching without destructuring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Provider,
    RateLimited,
    CircuitOpen,
    Cancelled,
    Closed,
    Template,
    Batch,
    Configuration,
}

/// Top-level mailer error.
#[derive(Debug, Clone, Error)]
pub enum MailError {
    /// The message is structurally invalid. Never retried.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// A provider rejected or failed the call.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// The rate limiter had too few tokens.
    #[error("Rate limit exceeded, retry after {}ms", .retry_after.as_millis())]
    RateLimited { retry_after: Duration },

    /// The circuit breaker is open and rejected the call without running it.
    #[error("Circuit breaker is open")]
    CircuitOpen,

    /// The caller cancelled the operation.
    #[error("Operation cancelled")]
    Cancelled,

    /// The client has been closed.
    #[error("Client is closed")]
    Closed,

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    /// One or more messages in a batch failed.
    #[error("Batch failed: {0}")]
    Batch(#[from] BatchError),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl MailError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Provider(_) => ErrorKind::Provider,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::CircuitOpen => ErrorKind::CircuitOpen,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Closed => ErrorKind::Closed,
            Self::Template(_) => ErrorKind::Template,
            Self::Batch(_) => ErrorKind::Batch,
            Self::Configuration(_) => ErrorKind::Configuration,
        }
    }

    /// Returns `true` if the same call may be attempted again immediately.
    ///
    /// Only provider failures flagged retryable by their adapter qualify.
    /// Rate limiting and an open circuit are temporary, but retrying them
    /// inside the same call would defeat their purpose.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Provider(error) => error.retryable,
            _ => false,
        }
    }

    /// Returns `true` if the condition is expected to clear over time.
    #[must_use]
    pub const fn is_temporary(&self) -> bool {
        match self {
            Self::Provider(error) => error.temporary,
            Self::RateLimited { .. } | Self::CircuitOpen => true,
            _ => false,
        }
    }

    /// Wait hint supplied by whoever produced the failure.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Provider(error) => error.retry_after,
            Self::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}

/// A message field failed structural validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct ValidationError {
    /// Offending field, e.g. `to` or `messages[2].subject`
    pub field: String,
    pub message: String,
    /// The rejected value, if there was one
    pub value: Option<String>,
}

impl ValidationError {
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            value: None,
        }
    }

    #[must_use]
    pub fn with_value(
        field: impl Into<String>,
        message: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            value: Some(value.into()),
        }
    }

    /// Scopes the error to one message of a batch.
    #[must_use]
    pub fn at_index(mut self, index: usize) -> Self {
        self.field = format!("messages[{index}].{}", self.field);
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{}: {} (got {value:?})", self.field, self.message),
            None => write!(f, "{}: {}", self.field, self.message),
        }
    }
}

/// A failure reported by a provider adapter, classified by that adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("[{provider}] {code}: {message}")]
pub struct ProviderError {
    pub provider: String,
    /// Provider-specific error code
    pub code: String,
    pub message: String,
    /// HTTP status, for HTTP based providers
    pub status: Option<u16>,
    pub retryable: bool,
    pub temporary: bool,
    pub retry_after: Option<Duration>,
}

impl ProviderError {
    /// A permanent, non-retryable failure.
    #[must_use]
    pub fn new(
        provider: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            code: code.into(),
            message: message.into(),
            status: None,
            retryable: false,
            temporary: false,
            retry_after: None,
        }
    }

    /// A transient failure worth retrying immediately.
    #[must_use]
    pub fn retryable(
        provider: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            retryable: true,
            temporary: true,
            ..Self::new(provider, code, message)
        }
    }

    /// A failure that should clear over time but is not worth retrying within
    /// the same call.
    #[must_use]
    pub fn temporary(
        provider: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            temporary: true,
            ..Self::new(provider, code, message)
        }
    }

    #[must_use]
    pub const fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub const fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("Template not found: {0}")]
    NotFound(String),

    #[error("Failed to parse template {template}: {message}")]
    Parse { template: String, message: String },

    #[error("Failed to render template {template}: {message}")]
    Render { template: String, message: String },

    /// No template engine is configured.
    #[error("Templates are disabled")]
    Disabled,

    #[error("Failed to load template from {path}: {message}")]
    Io { path: String, message: String },
}

impl TemplateError {
    /// Returns `true` if the template simply does not exist, which callers
    /// may treat as an intentionally absent field.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Aggregate failure of a batch send.
///
/// Indices in [`BatchError::errors`] refer to the caller's input order.
#[derive(Debug, Clone, Error)]
#[error("{failed}/{total} emails failed")]
pub struct BatchError {
    pub total: usize,
    pub failed: usize,
    pub errors: Vec<BatchFailure>,
    /// Results for the messages that were sent
    pub successful: Vec<SendResult>,
    /// Whether the native batch call failed and messages were sent one by one
    pub degraded: bool,
}

impl BatchError {
    /// Builds the aggregate from a batch outcome with at least one failure.
    #[must_use]
    pub fn from_result(result: BatchResult, degraded: bool) -> Self {
        Self {
            total: result.total,
            failed: result.failed.len(),
            errors: result.failed,
            successful: result.successful,
            degraded,
        }
    }

    /// Indices of the failed messages, ascending.
    #[must_use]
    pub fn failed_indices(&self) -> Vec<usize> {
        self.errors.iter().map(|failure| failure.index).collect()
    }
}
