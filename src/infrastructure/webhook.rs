// Outbound webhook delivery
use std::time::Duration;

use async_trait::async_trait;

use crate::application::alert_engine::WebhookSink;
use crate::domain::alert::AlertEvent;
use crate::domain::error::{Result, ServiceError};

/// Posts alert events to per-rule webhook targets. Delivery is best-effort:
/// the caller logs a returned error and never retries.
pub struct HttpWebhookSink {
    client: reqwest::Client,
}

impl HttpWebhookSink {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl WebhookSink for HttpWebhookSink {
    async fn post_alert(&self, url: &str, event: &AlertEvent) -> Result<()> {
        let response = self
            .client
            .post(url)
            .json(event)
            .send()
            .await
            .map_err(|e| ServiceError::WebhookDelivery(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ServiceError::WebhookDelivery(format!(
                "webhook target returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}
