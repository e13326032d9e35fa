use std::time::Duration;

use anyhow::{Context, Result};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the shared reqwest client for provider calls.
///
/// System proxy discovery is opt-in (`MINDMATE_ENABLE_SYSTEM_PROXY=1`); without it
/// the client goes direct.
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client> {
    let allow_system_proxy = std::env::var("MINDMATE_ENABLE_SYSTEM_PROXY")
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    if allow_system_proxy {
        match attempt_build(timeout, false) {
            Ok(client) => return Ok(client),
            Err(error) => tracing::warn!(
                "HTTP client initialization with system proxy discovery failed ({}); retrying with no_proxy",
                error
            ),
        }
    }

    attempt_build(timeout, true).context("Failed to initialize HTTP client")
}

fn attempt_build(timeout: Duration, no_proxy: bool) -> Result<reqwest::Client, reqwest::Error> {
    let mut builder = reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(CONNECT_TIMEOUT.min(timeout));
    if no_proxy {
        builder = builder.no_proxy();
    }
    builder.build()
}
