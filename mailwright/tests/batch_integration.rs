//! Integration tests for batch sends, including degradation to individual sends
#![allow(clippy::expect_used, clippy::unwrap_used)]

mod support;

use std::sync::Arc;

use mailwright::{
    Address, CancellationToken, Email, ErrorKind, MailError, MemoryProvider, ValidationError,
};
use pretty_assertions::assert_eq;
use support::{client, client_with_fallback, config, email, permanent, transient};

fn batch() -> Vec<Email> {
    vec![
        email("a@example.com"),
        email("b@example.com"),
        email("c@example.com"),
    ]
}

#[tokio::test(start_paused = true)]
async fn test_empty_batch_is_trivially_successful() {
    let primary = Arc::new(MemoryProvider::new("primary"));
    let client = client(config(), &primary);

    let result = client
        .send_batch(&[], &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.total, 0);
    assert!(result.is_complete_success());
    assert_eq!(primary.batch_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_all_messages_accepted() {
    let primary = Arc::new(MemoryProvider::new("primary"));
    let client = client(config(), &primary);

    let result = client
        .send_batch(&batch(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.total, 3);
    assert_eq!(result.successful.len(), 3);
    assert_eq!(result.provider, "primary");
    assert_eq!(primary.batch_calls(), 1);
    assert_eq!(primary.sent_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_message_rejects_whole_batch() {
    let primary = Arc::new(MemoryProvider::new("primary"));
    let client = client(config(), &primary);

    let mut emails = batch();
    emails[1] = Email::new(Address::new("sender@example.com"))
        .subject("Hello")
        .text_body("No recipients");

    let err = client
        .send_batch(&emails, &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        MailError::Validation(ValidationError { field, .. }) => {
            assert_eq!(field, "messages[1].to");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(primary.batch_calls(), 0);
    assert_eq!(primary.send_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_degrades_to_individual_sends_through_fallback() {
    let primary = Arc::new(
        MemoryProvider::new("primary")
            .failing_batch(transient("primary"))
            .always_failing(transient("primary")),
    );
    let fallback = Arc::new(MemoryProvider::new("fallback").rejecting(
        "b@example.com",
        ValidationError::new("to", "recipient rejected").into(),
    ));
    let client = client_with_fallback(config(), &primary, &fallback);

    let err = client
        .send_batch(&batch(), &CancellationToken::new())
        .await
        .unwrap_err();

    let MailError::Batch(error) = err else {
        panic!("expected a batch error, got {err:?}");
    };
    assert_eq!(error.total, 3);
    assert_eq!(error.failed, 1);
    assert_eq!(error.failed_indices(), vec![1]);
    assert_eq!(error.errors[0].error.kind(), ErrorKind::Validation);
    assert_eq!(error.successful.len(), 2);
    assert!(error.successful.iter().all(|result| result.provider == "fallback"));
    assert!(error.degraded);

    assert_eq!(primary.batch_calls(), 1);
    assert_eq!(primary.send_calls(), 3);
    assert_eq!(fallback.send_calls(), 3);
    assert_eq!(fallback.sent_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_degraded_batch_accepted_by_primary_reports_primary() {
    let primary = Arc::new(MemoryProvider::new("primary").failing_batch(permanent("primary")));
    let fallback = Arc::new(MemoryProvider::new("fallback"));
    let client = client_with_fallback(config(), &primary, &fallback);

    let result = client
        .send_batch(&batch(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.provider, "primary");
    assert_eq!(result.successful.len(), 3);
    assert!(result.successful.iter().all(|sent| sent.provider == "primary"));
    assert_eq!(primary.sent_count(), 3);
    assert_eq!(fallback.send_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_degraded_batch_accepted_by_fallback_reports_fallback() {
    let primary = Arc::new(
        MemoryProvider::new("primary")
            .failing_batch(transient("primary"))
            .always_failing(transient("primary")),
    );
    let fallback = Arc::new(MemoryProvider::new("fallback"));
    let client = client_with_fallback(config(), &primary, &fallback);

    let result = client
        .send_batch(&batch(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.provider, "fallback");
    assert_eq!(fallback.sent_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_degraded_batch_with_mixed_providers_reports_primary() {
    let primary = Arc::new(
        MemoryProvider::new("primary")
            .failing_batch(transient("primary"))
            .rejecting("b@example.com", transient("primary")),
    );
    let fallback = Arc::new(MemoryProvider::new("fallback"));
    let client = client_with_fallback(config(), &primary, &fallback);

    let result = client
        .send_batch(&batch(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.provider, "primary");
    let providers: Vec<_> = result
        .successful
        .iter()
        .map(|sent| sent.provider.as_str())
        .collect();
    assert_eq!(providers, vec!["primary", "fallback", "primary"]);
}

#[tokio::test(start_paused = true)]
async fn test_native_partial_failure_is_not_retried() {
    let primary = Arc::new(
        MemoryProvider::new("primary").rejecting("c@example.com", transient("primary")),
    );
    let fallback = Arc::new(MemoryProvider::new("fallback"));
    let client = client_with_fallback(config(), &primary, &fallback);

    let err = client
        .send_batch(&batch(), &CancellationToken::new())
        .await
        .unwrap_err();

    let MailError::Batch(error) = err else {
        panic!("expected a batch error, got {err:?}");
    };
    assert_eq!(error.failed_indices(), vec![2]);
    assert_eq!(error.successful.len(), 2);
    assert!(!error.degraded);
    assert_eq!(primary.batch_calls(), 1);
    assert_eq!(primary.send_calls(), 3);
    assert_eq!(fallback.send_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_batch_failure_without_fallback_is_returned() {
    let primary = Arc::new(MemoryProvider::new("primary").failing_batch(permanent("primary")));
    let client = client(config(), &primary);

    let err = client
        .send_batch(&batch(), &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        MailError::Provider(error) => assert_eq!(error.code, "550"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(primary.send_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_degraded_batch_skips_remaining_messages() {
    let primary = Arc::new(MemoryProvider::new("primary").failing_batch(transient("primary")));
    let fallback = Arc::new(MemoryProvider::new("fallback"));
    let client = client_with_fallback(config(), &primary, &fallback);

    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = client.send_batch(&batch(), &cancel).await.unwrap_err();

    let MailError::Batch(error) = err else {
        panic!("expected a batch error, got {err:?}");
    };
    assert_eq!(error.failed_indices(), vec![0, 1, 2]);
    assert!(
        error
            .errors
            .iter()
            .all(|failure| matches!(failure.error, MailError::Cancelled))
    );
    assert!(error.degraded);
    assert_eq!(primary.send_calls(), 0);
}
