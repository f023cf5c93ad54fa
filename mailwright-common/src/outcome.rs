//! Results of send operations

use ahash::AHashMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MailError;

/// A message accepted by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendResult {
    /// Identifier assigned by the provider
    pub message_id: String,
    /// Name of the provider that accepted the message
    pub provider: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: AHashMap<String, String>,
}

impl SendResult {
    /// A result stamped with the current time.
    #[must_use]
    pub fn new(message_id: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            provider: provider.into(),
            timestamp: Utc::now(),
            metadata: AHashMap::new(),
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// One failed message of a batch, keyed by its position in the caller's input.
#[derive(Debug, Clone)]
pub struct BatchFailure {
    pub index: usize,
    pub error: MailError,
}

impl BatchFailure {
    #[must_use]
    pub const fn new(index: usize, error: MailError) -> Self {
        Self { index, error }
    }
}

/// Outcome of a batch send.
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    pub total: usize,
    /// Accepted messages, in input order
    pub successful: Vec<SendResult>,
    /// Failed messages, in input order
    pub failed: Vec<BatchFailure>,
    pub provider: String,
}

impl BatchResult {
    #[must_use]
    pub fn new(total: usize, provider: impl Into<String>) -> Self {
        Self {
            total,
            successful: Vec::with_capacity(total),
            failed: Vec::new(),
            provider: provider.into(),
        }
    }

    /// Records the outcome of the message at `index`.
    pub fn record(&mut self, index: usize, outcome: Result<SendResult, MailError>) {
        match outcome {
            Ok(result) => self.successful.push(result),
            Err(error) => self.failed.push(BatchFailure::new(index, error)),
        }
    }

    #[must_use]
    pub const fn is_complete_success(&self) -> bool {
        self.failed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;

    #[test]
    fn test_record_keeps_input_order() {
        let mut result = BatchResult::new(3, "memory");
        result.record(0, Ok(SendResult::new("a", "memory")));
        result.record(
            1,
            Err(ProviderError::new("memory", "rejected", "no").into()),
        );
        result.record(2, Ok(SendResult::new("c", "memory")));

        assert!(!result.is_complete_success());
        assert_eq!(result.successful.len(), 2);
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].index, 1);
        assert_eq!(result.successful[1].message_id, "c");
    }
}
