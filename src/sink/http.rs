//! HTTP notifier — one JSON POST per labeled record.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tracing::trace;

use crate::config::SinkConfig;
use crate::error::SinkError;
use crate::pipeline::types::LabeledRecord;
use crate::sink::LiveNotifier;

/// Posts each record to a listener endpoint. Non-2xx responses are failures.
pub struct HttpNotifier {
    url: String,
    token: Option<SecretString>,
    client: reqwest::Client,
}

impl HttpNotifier {
    pub fn new(
        url: impl Into<String>,
        token: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SinkError::Http(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            url: url.into(),
            token,
            client,
        })
    }

    /// Build from sink configuration; `None` when no endpoint is configured.
    pub fn from_config(config: &SinkConfig) -> Result<Option<Self>, SinkError> {
        match &config.notify_url {
            Some(url) => Self::new(url.clone(), config.notify_token.clone(), config.notify_timeout)
                .map(Some),
            None => Ok(None),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl LiveNotifier for HttpNotifier {
    fn name(&self) -> &str {
        "http"
    }

    async fn notify(&self, record: &LabeledRecord) -> Result<(), SinkError> {
        let mut request = self.client.post(&self.url).json(record);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(|e| SinkError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SinkError::Rejected {
                status: status.as_u16(),
            });
        }
        trace!(id = record.id, status = status.as_u16(), "Record delivered");
        Ok(())
    }
}
