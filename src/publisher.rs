//! ==============================================================================
//! publisher.rs - outbound status lines
//! ==============================================================================
//!
//! purpose:
//!     renders a sample as a short human-readable status line and hands it to
//!     an external endpoint. the endpoint is unreliable by assumption: every
//!     failure comes back as a PublishError and the throttle decides what to
//!     do with it.
//!
//! relationships:
//!     - used by: throttle.rs (rate limiting), main.rs (construction)
//!     - uses: reqwest (webhook), domain.rs (Sample)
//!
//! ==============================================================================

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::config::{GaugesConfig, PublishConfig};
use crate::domain::{format_reading, Sample};
use crate::error::PublishError;

#[async_trait]
pub trait Publisher: Send {
    async fn publish(&mut self, text: &str, sample: &Sample) -> Result<(), PublishError>;
}

/// status line layout, labels and unit come from the gauge config
#[derive(Clone, Debug)]
pub struct StatusTemplate {
    first_label: String,
    second_label: String,
    unit: String,
}

impl StatusTemplate {
    pub fn new(gauges: &GaugesConfig) -> Self {
        Self {
            first_label: gauges.first_label.clone(),
            second_label: gauges.second_label.clone(),
            unit: gauges.unit.clone(),
        }
    }

    pub fn render(&self, sample: &Sample) -> String {
        format!(
            "Date/time: {}, {}.\n{} Pressure: {} {}.\n{} Pressure: {} {}.",
            sample.date(),
            sample.time(),
            self.first_label,
            format_reading(sample.reading1),
            self.unit,
            self.second_label,
            format_reading(sample.reading2),
            self.unit,
        )
    }
}

// ==============================================================================
// webhook
// ==============================================================================

/// posts `{"status": text, "sample": {...}}` to a url
pub struct WebhookPublisher {
    url: String,
    auth_token: Option<String>,
    client: reqwest::Client,
    timeout: Duration,
}

impl WebhookPublisher {
    pub fn new(config: &PublishConfig) -> Self {
        Self {
            url: config.url.clone(),
            auth_token: config.auth_token.clone(),
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(config.timeout_seconds.max(1)),
        }
    }
}

#[async_trait]
impl Publisher for WebhookPublisher {
    async fn publish(&mut self, text: &str, sample: &Sample) -> Result<(), PublishError> {
        let mut request = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&json!({ "status": text, "sample": sample }));
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::Rejected { status, body });
        }
        Ok(())
    }
}

// ==============================================================================
// log only
// ==============================================================================

/// used when publishing is disabled: the status line goes to the log
#[derive(Default)]
pub struct LogPublisher;

#[async_trait]
impl Publisher for LogPublisher {
    async fn publish(&mut self, text: &str, _sample: &Sample) -> Result<(), PublishError> {
        tracing::debug!("[PUBLISH] {}", text.replace('\n', " "));
        Ok(())
    }
}
