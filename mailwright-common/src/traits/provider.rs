use std::fmt::Debug;

use async_trait::async_trait;

use crate::{
    error::MailError,
    message::Email,
    outcome::{BatchResult, SendResult},
};

/// An email delivery backend.
///
/// Implementations own the wire protocol and classify their own failures by
/// returning [`MailError::Provider`] with the `retryable`/`temporary` flags
/// and any retry-after hint set. The client treats every provider uniformly.
#[async_trait]
pub trait Provider: Send + Sync + Debug {
    /// Sends a single message.
    async fn send(&self, email: &Email) -> Result<SendResult, MailError>;

    /// Sends several messages in one call.
    ///
    /// Per-message failures are reported in [`BatchResult::failed`] keyed by
    /// input index. An `Err` means the batch call failed as a whole.
    async fn send_batch(&self, emails: &[Email]) -> Result<BatchResult, MailError>;

    /// Checks the provider's own settings.
    fn validate_config(&self) -> Result<(), MailError> {
        Ok(())
    }

    fn name(&self) -> &str;
}
