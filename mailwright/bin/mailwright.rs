#![deny(clippy::pedantic, clippy::all, clippy::nursery)]

use std::sync::Arc;

use mailwright::{ClientBuilder, Config, MemoryProvider};

/// Loads and validates the configuration, then builds a client against an
/// in-memory provider so every configured primitive is constructed once.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    mailwright_common::logging::init()?;

    let config = match find_config_file()? {
        Some(path) => {
            tracing::info!(path = %path.display(), "Using configuration file");
            Config::load(&path)?
        }
        None => {
            tracing::info!("No configuration file found, using defaults");
            Config::default()
        }
    };

    let client = ClientBuilder::new(config.clone())
        .provider(Arc::new(MemoryProvider::new("dry-run")))
        .build()?;

    tracing::info!(
        retry = config.retry.enabled,
        max_attempts = config.retry.max_attempts,
        rate_limit = config.rate_limit.enabled,
        refill_interval_ms = u64::try_from(config.rate_limit.refill_interval().as_millis())
            .unwrap_or(u64::MAX),
        circuit_breaker = config.circuit_breaker.enabled,
        templates = config.templates.enabled,
        "Configuration OK"
    );

    client.close();
    Ok(())
}

/// Find the configuration file using the following precedence:
/// 1. `MAILWRIGHT_CONFIG` environment variable
/// 2. ./mailwright.config.ron (current working directory)
/// 3. /etc/mailwright/mailwright.config.ron (system-wide config)
fn find_config_file() -> anyhow::Result<Option<std::path::PathBuf>> {
    if let Ok(env_path) = std::env::var("MAILWRIGHT_CONFIG") {
        let path = std::path::PathBuf::from(env_path);
        if path.exists() {
            return Ok(Some(path));
        }
        anyhow::bail!(
            "MAILWRIGHT_CONFIG points to non-existent file: {}",
            path.display()
        );
    }

    Ok([
        std::path::PathBuf::from("./mailwright.config.ron"),
        std::path::PathBuf::from("/etc/mailwright/mailwright.config.ron"),
    ]
    .into_iter()
    .find(|path| path.exists()))
}
