use std::sync::atomic::{AtomicUsize, Ordering};

use ahash::AHashMap;
use async_trait::async_trait;
use mailwright_common::{BatchResult, Email, MailError, Provider, SendResult};
use parking_lot::RwLock;

#[derive(Debug, Default)]
struct Script {
    always: Option<MailError>,
    next: Option<(usize, MailError)>,
    rejected: AHashMap<String, MailError>,
    batch: Option<MailError>,
}

/// In-process provider that records what it is asked to send.
///
/// Intended for tests and dry runs. Failures can be scripted:
/// - [`MemoryProvider::always_failing`]: every send fails
/// - [`MemoryProvider::failing_next`]: the next `n` sends fail
/// - [`MemoryProvider::rejecting`]: sends addressed to one recipient fail
/// - [`MemoryProvider::failing_batch`]: the native batch call fails outright
///
/// # Concurrency
/// The script and the sent messages sit behind `RwLock`s, so a provider can
/// be shared between a client and the test inspecting it.
#[derive(Debug)]
pub struct MemoryProvider {
    name: String,
    sent: RwLock<Vec<Email>>,
    script: RwLock<Script>,
    send_calls: AtomicUsize,
    batch_calls: AtomicUsize,
}

impl MemoryProvider {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sent: RwLock::default(),
            script: RwLock::default(),
            send_calls: AtomicUsize::new(0),
            batch_calls: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn always_failing(self, error: MailError) -> Self {
        self.script.write().always = Some(error);
        self
    }

    #[must_use]
    pub fn failing_next(self, count: usize, error: MailError) -> Self {
        self.script.write().next = (count > 0).then_some((count, error));
        self
    }

    #[must_use]
    pub fn rejecting(self, recipient: impl Into<String>, error: MailError) -> Self {
        self.script.write().rejected.insert(recipient.into(), error);
        self
    }

    #[must_use]
    pub fn failing_batch(self, error: MailError) -> Self {
        self.script.write().batch = Some(error);
        self
    }

    /// Clears the `always_failing` script, e.g. to simulate a provider coming
    /// back after an outage.
    pub fn recover(&self) {
        self.script.write().always = None;
    }

    /// Messages accepted so far, in order.
    #[must_use]
    pub fn sent(&self) -> Vec<Email> {
        self.sent.read().clone()
    }

    #[must_use]
    pub fn sent_count(&self) -> usize {
        self.sent.read().len()
    }

    /// Number of single-message send calls, failed ones included.
    #[must_use]
    pub fn send_calls(&self) -> usize {
        self.send_calls.load(Ordering::SeqCst)
    }

    /// Number of native batch calls, failed ones included.
    #[must_use]
    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    fn scripted_failure(&self, email: &Email) -> Option<MailError> {
        let mut script = self.script.write();

        if let Some(error) = &script.always {
            return Some(error.clone());
        }

        if let Some((remaining, error)) = &mut script.next {
            let error = error.clone();
            *remaining -= 1;
            if *remaining == 0 {
                script.next = None;
            }
            return Some(error);
        }

        email
            .recipients()
            .find_map(|recipient| script.rejected.get(recipient.email.trim()))
            .cloned()
    }
}

#[async_trait]
impl Provider for MemoryProvider {
    async fn send(&self, email: &Email) -> Result<SendResult, MailError> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(error) = self.scripted_failure(email) {
            tracing::debug!(provider = %self.name, %error, "Scripted send failure");
            return Err(error);
        }

        self.sent.write().push(email.clone());

        Ok(
            SendResult::new(ulid::Ulid::new().to_string(), self.name.as_str())
                .with_metadata("recipients", email.total_recipients().to_string()),
        )
    }

    async fn send_batch(&self, emails: &[Email]) -> Result<BatchResult, MailError> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(error) = self.script.read().batch.clone() {
            tracing::debug!(provider = %self.name, %error, "Scripted batch failure");
            return Err(error);
        }

        let mut result = BatchResult::new(emails.len(), self.name.as_str());
        for (index, email) in emails.iter().enumerate() {
            result.record(index, self.send(email).await);
        }

        Ok(result)
    }

    fn validate_config(&self) -> Result<(), MailError> {
        if self.name.trim().is_empty() {
            return Err(MailError::Configuration(
                "memory provider requires a name".to_string(),
            ));
        }

        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
