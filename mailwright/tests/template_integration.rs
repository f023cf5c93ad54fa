//! Integration tests for templated sends
#![allow(clippy::expect_used, clippy::unwrap_used)]

mod support;

use std::sync::Arc;

use mailwright::{
    Address, CancellationToken, ClientBuilder, Config, MailError, MemoryProvider,
    MemoryTemplateEngine, TemplateConfig, TemplateEngine, TemplateError, TemplateRequest,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use support::{client, config};

fn engine() -> Arc<MemoryTemplateEngine> {
    let engine = MemoryTemplateEngine::new();
    engine
        .register_template("welcome.subject", "Welcome, {{ user.name }}")
        .unwrap();
    engine
        .register_template("welcome.html", "<p>Hello {{ user.name }}</p>")
        .unwrap();
    engine
        .register_template("welcome.text", "Hello {{ user.name }}")
        .unwrap();
    engine
        .register_template("reminder.text", "Your code is {{ code }}")
        .unwrap();
    Arc::new(engine)
}

fn request(template: &str) -> TemplateRequest {
    TemplateRequest::new(template, Address::new("sender@example.com"))
        .to(Address::new("user@example.com"))
        .data(json!({ "user": { "name": "Ada <admin>" }, "code": 4821 }))
}

fn templated_client(primary: &Arc<MemoryProvider>) -> mailwright::Client {
    ClientBuilder::new(config())
        .provider(Arc::clone(primary) as _)
        .template_engine(engine())
        .build()
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_renders_every_part() {
    let primary = Arc::new(MemoryProvider::new("primary"));
    let client = templated_client(&primary);

    let request = request("welcome")
        .metadata("campaign", json!("spring"))
        .metadata("batch", json!(7));

    client
        .send_template(&request, &CancellationToken::new())
        .await
        .unwrap();

    let sent = primary.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, "Welcome, Ada <admin>");
    assert_eq!(sent[0].html_body, "<p>Hello Ada &lt;admin&gt;</p>");
    assert_eq!(sent[0].text_body, "Hello Ada <admin>");
    assert_eq!(
        sent[0].metadata.get("campaign").map(String::as_str),
        Some("spring")
    );
    assert_eq!(sent[0].metadata.get("batch").map(String::as_str), Some("7"));
}

#[tokio::test(start_paused = true)]
async fn test_missing_parts_are_left_empty() {
    let primary = Arc::new(MemoryProvider::new("primary"));
    let client = templated_client(&primary);

    client
        .send_template(
            &request("reminder").subject("Your code"),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let sent = primary.sent();
    assert_eq!(sent[0].subject, "Your code");
    assert_eq!(sent[0].html_body, "");
    assert_eq!(sent[0].text_body, "Your code is 4821");
}

#[tokio::test(start_paused = true)]
async fn test_explicit_subject_wins() {
    let primary = Arc::new(MemoryProvider::new("primary"));
    let client = templated_client(&primary);

    client
        .send_template(
            &request("welcome").subject("Custom subject"),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(primary.sent()[0].subject, "Custom subject");
}

#[tokio::test(start_paused = true)]
async fn test_blank_subject_renders_subject_template() {
    let primary = Arc::new(MemoryProvider::new("primary"));
    let client = templated_client(&primary);

    client
        .send_template(&request("welcome").subject("  "), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(primary.sent()[0].subject, "Welcome, Ada <admin>");
}

#[tokio::test(start_paused = true)]
async fn test_missing_subject_fails_validation() {
    let primary = Arc::new(MemoryProvider::new("primary"));
    let client = templated_client(&primary);

    let err = client
        .send_template(&request("reminder"), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, MailError::Validation(_)));
    assert_eq!(primary.send_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_render_error_stops_send() {
    let primary = Arc::new(MemoryProvider::new("primary"));
    let client = templated_client(&primary);

    let request = TemplateRequest::new("welcome", Address::new("sender@example.com"))
        .to(Address::new("user@example.com"))
        .data(json!({}));

    let err = client
        .send_template(&request, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        MailError::Template(TemplateError::Render { .. })
    ));
    assert_eq!(primary.send_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_templates_disabled_without_engine() {
    let primary = Arc::new(MemoryProvider::new("primary"));
    let client = client(config(), &primary);

    let err = client
        .send_template(&request("welcome"), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, MailError::Template(TemplateError::Disabled)));
}

#[tokio::test(start_paused = true)]
async fn test_closed_client_rejects_templates() {
    let primary = Arc::new(MemoryProvider::new("primary"));
    let client = templated_client(&primary);
    client.close();

    let err = client
        .send_template(&request("welcome"), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, MailError::Closed));
}

#[tokio::test(start_paused = true)]
async fn test_engine_built_from_configured_directory() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("invite.subject.txt"), "Join {{ team }}").unwrap();
    std::fs::write(dir.path().join("invite.text.tmpl"), "You're invited to {{ team }}").unwrap();

    let primary = Arc::new(MemoryProvider::new("primary"));
    let client = client(
        Config {
            templates: TemplateConfig {
                enabled: true,
                directory: Some(dir.path().to_path_buf()),
                inline: [("invite.html".to_string(), "<b>{{ team }}</b>".to_string())]
                    .into_iter()
                    .collect(),
            },
            ..config()
        },
        &primary,
    );

    let request = TemplateRequest::new("invite", Address::new("sender@example.com"))
        .to(Address::new("user@example.com"))
        .data(json!({ "team": "Platform" }));

    client
        .send_template(&request, &CancellationToken::new())
        .await
        .unwrap();

    let sent = primary.sent();
    assert_eq!(sent[0].subject, "Join Platform");
    assert_eq!(sent[0].text_body, "You're invited to Platform");
    assert_eq!(sent[0].html_body, "<b>Platform</b>");
}
