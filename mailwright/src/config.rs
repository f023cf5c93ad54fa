//! Client configuration, loaded from RON.
//!
//! ```ron
//! (
//!     retry: (max_attempts: 5, initial_delay_ms: 200),
//!     rate_limit: (enabled: true, rate: 10, period_secs: 1, burst: 20),
//!     circuit_breaker: (enabled: true, failure_threshold: 3),
//!     templates: (enabled: true, directory: "/etc/mailwright/templates"),
//! )
//! ```
//!
//! Every field is optional and falls back to its default.

use std::path::{Path, PathBuf};

use ahash::AHashMap;
use mailwright_common::MailError;
use mailwright_resilience::{CircuitBreakerPolicy, RateLimitPolicy, RetryPolicy};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub rate_limit: RateLimitPolicy,

    #[serde(default)]
    pub circuit_breaker: CircuitBreakerPolicy,

    #[serde(default)]
    pub templates: TemplateConfig,
}

/// Where the built-in template engine finds its templates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Directory of template files, e.g. `welcome.html`, `welcome.subject.txt`
    #[serde(default)]
    pub directory: Option<PathBuf>,

    /// Templates given directly in the configuration, keyed by name
    #[serde(default)]
    pub inline: AHashMap<String, String>,
}

impl Config {
    /// Parses a RON document. Fields left out take their defaults.
    ///
    /// # Errors
    ///
    /// [`MailError::Configuration`] if the document is malformed.
    pub fn from_ron_str(content: &str) -> Result<Self, MailError> {
        ron::Options::default()
            .with_default_extension(ron::extensions::Extensions::IMPLICIT_SOME)
            .from_str(content)
            .map_err(|err| MailError::Configuration(format!("Invalid configuration: {err}")))
    }

    /// Reads, parses and validates the configuration at `path`.
    ///
    /// # Errors
    ///
    /// [`MailError::Configuration`] if the file cannot be read, parsed or
    /// fails validation.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MailError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|err| {
            MailError::Configuration(format!(
                "Failed to read config from {}: {err}",
                path.display()
            ))
        })?;

        let config = Self::from_ron_str(&content)?;
        config.validate()?;

        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Checks every enabled policy.
    ///
    /// # Errors
    ///
    /// [`MailError::Configuration`] naming the first offending field.
    pub fn validate(&self) -> Result<(), MailError> {
        if self.retry.enabled {
            self.retry.validate()?;
        }

        if self.rate_limit.enabled {
            self.rate_limit.validate()?;
        }

        if self.circuit_breaker.enabled {
            self.circuit_breaker.validate()?;
        }

        if self.templates.enabled
            && self.templates.directory.is_none()
            && self.templates.inline.is_empty()
        {
            return Err(MailError::Configuration(
                "templates.enabled requires templates.directory or templates.inline".to_string(),
            ));
        }

        Ok(())
    }
}
