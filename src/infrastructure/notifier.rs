//! Outbound operator notifications (circuit trips, kill-switch, panic
//! exits; spec §4.11). Best-effort: a webhook failure is logged and
//! swallowed, never propagated back into a trading loop.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::warn;

use crate::domain::ports::Notifier;

#[derive(Serialize)]
struct WebhookPayload<'a> {
    subject: &'a str,
    body: &'a str,
}

/// Posts a JSON payload to a configured webhook URL (e.g. Slack incoming
/// webhook, PagerDuty events endpoint). When no URL is configured, falls
/// back to a `warn!` log line so a dev/dry run still sees the notification.
pub struct WebhookNotifier {
    client: Client,
    webhook_url: Option<String>,
}

impl WebhookNotifier {
    pub fn new(webhook_url: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client, webhook_url }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, subject: &str, body: &str) -> Result<()> {
        let Some(url) = &self.webhook_url else {
            warn!(%subject, %body, "notification (no webhook configured)");
            return Ok(());
        };

        let response = self
            .client
            .post(url)
            .json(&WebhookPayload { subject, body })
            .send()
            .await;

        match response {
            Ok(r) if !r.status().is_success() => {
                warn!(status = %r.status(), %subject, "notification webhook returned non-success");
            }
            Err(e) => {
                warn!(error = %e, %subject, "notification webhook request failed");
            }
            Ok(_) => {}
        }
        Ok(())
    }
}
