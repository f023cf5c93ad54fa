//! The mail client and its builder
//!
//! # Single sends
//!
//! ```text
//! closed? ──> validate ──> rate limit ──> breaker( primary ──retryable──> fallback )
//!                                              │
//!                                              └── retryable failure ──> retry( breaker(...) )
//! ```
//!
//! Fallback substitution happens inside a single attempt, so the fallback
//! never adds attempts of its own. The first attempt runs before the retry
//! controller is consulted; if it fails retryably the same guarded attempt is
//! handed to the controller.
//!
//! # Batches
//!
//! Every message is validated before anything is sent. The primary's native
//! batch call is tried first; if it fails as a whole and a fallback is
//! configured the batch degrades to one [`Client::send`] per message. Failure
//! indices always refer to the caller's input order.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use mailwright_common::{
    BatchError, BatchResult, Email, MailError, Provider, SendResult, TemplateEngine, TemplateError,
    TemplateRequest,
};
use mailwright_resilience::{
    CircuitBreaker, CircuitBreakerStats, RateLimiter, RateLimiterStats, RetryController,
};
use mailwright_tracing::traced;
use tokio_util::sync::CancellationToken;

use crate::{config::Config, template::MemoryTemplateEngine};

/// Sends email through a primary provider, with optional fallback, retry,
/// rate limiting and circuit breaking.
///
/// All methods take `&self`; a client is meant to be shared (e.g. in an
/// `Arc`) between concurrent callers.
pub struct Client {
    provider: Arc<dyn Provider>,
    fallback: Option<Arc<dyn Provider>>,
    templates: Option<Arc<dyn TemplateEngine>>,
    retry: Option<RetryController>,
    rate_limiter: Option<RateLimiter>,
    circuit_breaker: Option<CircuitBreaker>,
    closed: AtomicBool,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("provider", &self.provider.name())
            .field("fallback", &self.fallback.as_ref().map(|fallback| fallback.name()))
            .field("templates", &self.templates.is_some())
            .field("retry", &self.retry)
            .field("rate_limiter", &self.rate_limiter)
            .field("circuit_breaker", &self.circuit_breaker)
            .field("closed", &self.closed)
            .finish()
    }
}

impl Client {
    #[must_use]
    pub fn builder(config: Config) -> ClientBuilder {
        ClientBuilder::new(config)
    }

    /// Sends one message.
    ///
    /// # Errors
    ///
    /// - [`MailError::Closed`] once [`Client::close`] has been called
    /// - [`MailError::Validation`] if the message is malformed; never retried
    /// - [`MailError::RateLimited`] if the rate limiter has too few tokens
    /// - [`MailError::CircuitOpen`] if the breaker rejected the final attempt
    /// - [`MailError::Cancelled`] if `cancel` fired while waiting to retry
    /// - otherwise the last provider failure seen
    #[traced(
        instrument(
            level = tracing::Level::DEBUG,
            skip_all,
            fields(provider = self.provider.name(), recipients = email.total_recipients())
        ),
        timing(precision = "ms")
    )]
    pub async fn send(
        &self,
        email: &Email,
        cancel: &CancellationToken,
    ) -> Result<SendResult, MailError> {
        self.ensure_open()?;
        email.validate()?;

        if let Some(limiter) = &self.rate_limiter {
            limiter.acquire(cancel, limiter.weight_for(email.total_recipients()))?;
        }

        let outcome = match self.guarded_attempt(email).await {
            Err(error) if error.is_retryable() => match &self.retry {
                Some(retry) => {
                    tracing::debug!(%error, "First attempt failed, retrying");
                    retry.retry(cancel, || self.guarded_attempt(email)).await
                }
                None => Err(error),
            },
            outcome => outcome,
        };

        match &outcome {
            Ok(result) => tracing::debug!(
                message_id = %result.message_id,
                provider = %result.provider,
                "Email sent"
            ),
            Err(error) => tracing::warn!(kind = ?error.kind(), %error, "Email send failed"),
        }

        outcome
    }

    /// One attempt, guarded by the circuit breaker when one is configured.
    async fn guarded_attempt(&self, email: &Email) -> Result<SendResult, MailError> {
        match &self.circuit_breaker {
            Some(breaker) => breaker.execute(|| self.attempt(email)).await,
            None => self.attempt(email).await,
        }
    }

    /// The primary provider, substituted by the fallback on a retryable failure.
    async fn attempt(&self, email: &Email) -> Result<SendResult, MailError> {
        let error = match self.provider.send(email).await {
            Ok(result) => return Ok(result),
            Err(error) => error,
        };

        match &self.fallback {
            Some(fallback) if error.is_retryable() => {
                tracing::debug!(
                    primary = self.provider.name(),
                    fallback = fallback.name(),
                    %error,
                    "Primary provider failed, using fallback"
                );
                fallback.send(email).await
            }
            _ => Err(error),
        }
    }

    /// Sends several messages.
    ///
    /// On success every message was accepted. The failure indices of a
    /// returned [`MailError::Batch`] refer to positions in `emails`, so the
    /// caller can resubmit exactly the failed subset.
    ///
    /// # Errors
    ///
    /// - [`MailError::Closed`] once [`Client::close`] has been called
    /// - [`MailError::Validation`] with the field prefixed by `messages[i].` if
    ///   any message is malformed; nothing is sent
    /// - [`MailError::Batch`] if at least one message failed
    /// - the native batch failure itself when no fallback is configured
    #[traced(
        instrument(
            level = tracing::Level::DEBUG,
            skip_all,
            fields(provider = self.provider.name(), batch_size = emails.len())
        ),
        timing(precision = "ms")
    )]
    pub async fn send_batch(
        &self,
        emails: &[Email],
        cancel: &CancellationToken,
    ) -> Result<BatchResult, MailError> {
        self.ensure_open()?;

        if emails.is_empty() {
            return Ok(BatchResult::new(0, self.provider.name()));
        }

        for (index, email) in emails.iter().enumerate() {
            email.validate().map_err(|err| err.at_index(index))?;
        }

        match self.provider.send_batch(emails).await {
            Ok(result) => Self::finish_batch(result, false),
            Err(error) => match &self.fallback {
                Some(fallback) => {
                    tracing::warn!(
                        %error,
                        fallback = fallback.name(),
                        "Batch send failed, degrading to individual sends"
                    );
                    let result = self.send_individually(emails, cancel).await;
                    Self::finish_batch(result, true)
                }
                None => Err(error),
            },
        }
    }

    /// Sends each message through [`Client::send`].
    ///
    /// The result names the provider that accepted every successful message,
    /// or the primary when none succeeded or several providers were involved.
    async fn send_individually(&self, emails: &[Email], cancel: &CancellationToken) -> BatchResult {
        let mut result = BatchResult::new(emails.len(), self.provider.name());

        for (index, email) in emails.iter().enumerate() {
            if cancel.is_cancelled() {
                result.record(index, Err(MailError::Cancelled));
                continue;
            }

            let outcome = self.send(email, cancel).await;
            if let Err(error) = &outcome {
                tracing::debug!(index, %error, "Individual send failed");
            }
            result.record(index, outcome);
        }

        if let Some((first, rest)) = result.successful.split_first()
            && rest.iter().all(|sent| sent.provider == first.provider)
        {
            result.provider = first.provider.clone();
        }

        result
    }

    fn finish_batch(mut result: BatchResult, degraded: bool) -> Result<BatchResult, MailError> {
        if result.is_complete_success() {
            tracing::debug!(total = result.total, degraded, "Batch sent");
            return Ok(result);
        }

        result.failed.sort_by_key(|failure| failure.index);
        let error = BatchError::from_result(result, degraded);
        tracing::warn!(
            total = error.total,
            failed = error.failed,
            degraded,
            "Batch partially failed"
        );

        Err(MailError::Batch(error))
    }

    /// Renders `request`'s templates and sends the result.
    ///
    /// `<template>.subject` (unless the request carries a non-blank subject),
    /// `<template>.html` and `<template>.text` are rendered with the request's
    /// data. A template that does not exist leaves its field empty.
    ///
    /// # Errors
    ///
    /// [`TemplateError::Disabled`] without a template engine, any other
    /// [`TemplateError`] raised while rendering, then anything
    /// [`Client::send`] returns.
    #[traced(
        instrument(
            level = tracing::Level::DEBUG,
            skip_all,
            fields(template = %request.template)
        ),
        timing(precision = "ms")
    )]
    pub async fn send_template(
        &self,
        request: &TemplateRequest,
        cancel: &CancellationToken,
    ) -> Result<SendResult, MailError> {
        self.ensure_open()?;

        let engine = self
            .templates
            .as_deref()
            .ok_or(MailError::Template(TemplateError::Disabled))?;

        let subject = match &request.subject {
            Some(subject) if !subject.trim().is_empty() => subject.clone(),
            _ => render_optional(engine, &request.part("subject"), &request.data)?,
        };
        let html_body = render_optional(engine, &request.part("html"), &request.data)?;
        let text_body = render_optional(engine, &request.part("text"), &request.data)?;

        let email = Email {
            from: request.from.clone(),
            to: request.to.clone(),
            cc: request.cc.clone(),
            bcc: request.bcc.clone(),
            subject,
            html_body,
            text_body,
            headers: request.headers.clone(),
            priority: request.priority,
            metadata: request
                .metadata
                .iter()
                .map(|(key, value)| (key.clone(), crate::template::stringify(value)))
                .collect(),
        };

        self.send(&email, cancel).await
    }

    /// Closes the client. Idempotent.
    ///
    /// Further calls fail with [`MailError::Closed`] and the rate limiter's
    /// refill task is stopped.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Some(limiter) = &self.rate_limiter {
            limiter.shutdown();
        }

        mailwright_common::internal!(level = INFO, "Mail client closed");
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Circuit breaker statistics, if a breaker is configured.
    #[must_use]
    pub fn circuit_breaker_stats(&self) -> Option<CircuitBreakerStats> {
        self.circuit_breaker.as_ref().map(CircuitBreaker::stats)
    }

    /// Rate limiter statistics, if a limiter is configured.
    #[must_use]
    pub fn rate_limiter_stats(&self) -> Option<RateLimiterStats> {
        self.rate_limiter.as_ref().map(RateLimiter::stats)
    }

    fn ensure_open(&self) -> Result<(), MailError> {
        if self.is_closed() {
            Err(MailError::Closed)
        } else {
            Ok(())
        }
    }
}

/// Renders `name`, treating a missing template as an empty field.
fn render_optional(
    engine: &dyn TemplateEngine,
    name: &str,
    data: &serde_json::Value,
) -> Result<String, MailError> {
    match engine.render(name, data) {
        Ok(rendered) => Ok(rendered),
        Err(error) if error.is_not_found() => {
            tracing::trace!(template = name, "Template not found, leaving field empty");
            Ok(String::new())
        }
        Err(error) => Err(error.into()),
    }
}

/// Assembles a [`Client`] from a [`Config`] and its collaborators.
pub struct ClientBuilder {
    config: Config,
    provider: Option<Arc<dyn Provider>>,
    fallback: Option<Arc<dyn Provider>>,
    templates: Option<Arc<dyn TemplateEngine>>,
}

impl ClientBuilder {
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self {
            config,
            provider: None,
            fallback: None,
            templates: None,
        }
    }

    /// The provider every send goes to first. Required.
    #[must_use]
    pub fn provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// The provider substituted when the primary fails retryably.
    #[must_use]
    pub fn fallback(mut self, fallback: Arc<dyn Provider>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Uses `engine` for [`Client::send_template`] instead of building a
    /// [`MemoryTemplateEngine`] from the configuration.
    #[must_use]
    pub fn template_engine(mut self, engine: Arc<dyn TemplateEngine>) -> Self {
        self.templates = Some(engine);
        self
    }

    /// Validates everything and builds the client.
    ///
    /// Only the primitives enabled in the configuration are constructed.
    ///
    /// # Errors
    ///
    /// [`MailError::Configuration`] if no provider was given, the
    /// configuration or a provider's own settings are invalid, or rate
    /// limiting is enabled outside a tokio runtime. [`MailError::Template`]
    /// if configured templates fail to load.
    pub fn build(self) -> Result<Client, MailError> {
        let Self {
            config,
            provider,
            fallback,
            templates,
        } = self;

        let provider = provider.ok_or_else(|| {
            MailError::Configuration("a primary provider is required".to_string())
        })?;

        config.validate()?;
        provider.validate_config()?;
        if let Some(fallback) = &fallback {
            fallback.validate_config()?;
        }

        let templates = match templates {
            Some(engine) => Some(engine),
            None if config.templates.enabled => Some(Arc::new(MemoryTemplateEngine::from_config(
                &config.templates,
            )?) as Arc<dyn TemplateEngine>),
            None => None,
        };

        let retry = config
            .retry
            .enabled
            .then(|| RetryController::new(config.retry.clone()));

        let rate_limiter = if config.rate_limit.enabled {
            Some(RateLimiter::new(config.rate_limit.clone())?)
        } else {
            None
        };

        let circuit_breaker = config
            .circuit_breaker
            .enabled
            .then(|| CircuitBreaker::new(config.circuit_breaker.clone()));

        tracing::info!(
            provider = provider.name(),
            fallback = fallback.as_ref().map(|fallback| fallback.name()),
            retry = retry.is_some(),
            rate_limit = rate_limiter.is_some(),
            circuit_breaker = circuit_breaker.is_some(),
            templates = templates.is_some(),
            "Mail client ready"
        );

        Ok(Client {
            provider,
            fallback,
            templates,
            retry,
            rate_limiter,
            circuit_breaker,
            closed: AtomicBool::new(false),
        })
    }
}
