//! Outbound notification seam for password reset links.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tracing::info;
use url::Url;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_password_reset_link(&self, email: &str, reset_url: &str) -> Result<()>;
}

/// Writes the reset link to the log instead of delivering it. Default when
/// no notifier endpoint is configured; useful in development.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_password_reset_link(&self, email: &str, reset_url: &str) -> Result<()> {
        info!(email, reset_url, "password reset link (log delivery)");
        Ok(())
    }
}

#[derive(Serialize)]
struct ResetLinkPayload<'a> {
    kind: &'static str,
    email: &'a str,
    reset_url: &'a str,
}

/// Posts reset links to an external delivery service as JSON.
pub struct WebhookNotifier {
    client: reqwest::Client,
    endpoint: Url,
}

impl WebhookNotifier {
    pub fn new(endpoint: Url) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("failed to build notifier HTTP client")?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send_password_reset_link(&self, email: &str, reset_url: &str) -> Result<()> {
        let payload = ResetLinkPayload {
            kind: "password_reset",
            email,
            reset_url,
        };
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&payload)
            .send()
            .await
            .context("notifier request failed")?;
        response
            .error_for_status()
            .context("notifier returned an error status")?;
        Ok(())
    }
}
