//! HTTP ingestion client
//!
//! Sends one batch per `POST {base_url}/logs` call and turns the outcome into
//! an [`Ack`] or a classified [`SendError`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use avalanche_core::domain::{AppSecret, InstallId};
//! use avalanche_ingestion::HttpIngestion;
//!
//! # fn example() -> anyhow::Result<()> {
//! let secret = AppSecret::new("app-secret")?;
//! let client = HttpIngestion::new(
//!     "https://in.avalanch.es",
//!     secret,
//!     InstallId::generate(),
//!     Duration::from_secs(30),
//! );
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use tracing::{debug, info, warn};

use avalanche_core::config::Config;
use avalanche_core::domain::{Ack, AppSecret, Batch, InstallId, SendError};
use avalanche_core::ports::IIngestion;

use crate::rate_limit::{parse_retry_after, OutboundBudget};
use crate::wire::{classify, classify_transport, AckBody, LogPayload};

/// Header carrying the application secret
pub const APP_SECRET_HEADER: &str = "App-Secret";

/// Header carrying the install identity
pub const INSTALL_ID_HEADER: &str = "Install-ID";

/// JSON-over-HTTP implementation of [`IIngestion`]
///
/// Cheap to share behind an `Arc`; concurrent sends for different channels
/// only contend on the optional [`OutboundBudget`].
pub struct HttpIngestion {
    client: Client,
    base_url: String,
    secret: AppSecret,
    install_id: InstallId,
    timeout: Duration,
    budget: Option<Arc<OutboundBudget>>,
}

impl std::fmt::Debug for HttpIngestion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpIngestion")
            .field("base_url", &self.base_url)
            .field("install_id", &self.install_id)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl HttpIngestion {
    pub fn new(
        base_url: impl Into<String>,
        secret: AppSecret,
        install_id: InstallId,
        timeout: Duration,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            secret,
            install_id,
            timeout,
            budget: None,
        }
    }

    /// Builds a client from the `hub` and `rate_limiting` sections
    pub fn from_config(config: &Config, secret: AppSecret, install_id: InstallId) -> Self {
        Self::new(
            config.hub.ingestion_url.clone(),
            secret,
            install_id,
            config.send_timeout(),
        )
        .with_budget(Arc::new(OutboundBudget::from(&config.rate_limiting)))
    }

    /// Attaches a shared outbound budget
    pub fn with_budget(mut self, budget: Arc<OutboundBudget>) -> Self {
        self.budget = Some(budget);
        self
    }

    pub fn budget(&self) -> Option<&Arc<OutboundBudget>> {
        self.budget.as_ref()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn logs_url(&self) -> String {
        format!("{}/logs", self.base_url.trim_end_matches('/'))
    }

    /// Performs the request and reads the whole response
    async fn exchange(
        &self,
        body: Vec<u8>,
    ) -> Result<(StatusCode, Option<Duration>, String), reqwest::Error> {
        let response = self
            .client
            .post(self.logs_url())
            .header(APP_SECRET_HEADER, self.secret.expose())
            .header(INSTALL_ID_HEADER, self.install_id.to_string())
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        let text = response.text().await?;
        Ok((status, retry_after, text))
    }
}

#[async_trait::async_trait]
impl IIngestion for HttpIngestion {
    async fn send(&self, batch: &Batch) -> Result<Ack, SendError> {
        let body = serde_json::to_vec(&LogPayload::from_batch(batch, self.install_id))
            .map_err(|e| SendError::fatal(format!("Failed to serialize batch: {e}")))?;

        if let Some(budget) = &self.budget {
            budget.acquire(body.len() as u64).await;
        }

        debug!(
            channel = %batch.channel(),
            batch_id = %batch.id(),
            events = batch.len(),
            bytes = body.len(),
            "Sending batch"
        );

        let (status, retry_after, text) =
            match tokio::time::timeout(self.timeout, self.exchange(body)).await {
                Err(_) => {
                    warn!(channel = %batch.channel(), timeout = ?self.timeout, "Send timed out");
                    return Err(SendError::retryable(format!(
                        "No response within {:?}",
                        self.timeout
                    )));
                }
                Ok(Err(e)) => {
                    warn!(channel = %batch.channel(), error = %e, "Send failed in transport");
                    return Err(classify_transport(&e));
                }
                Ok(Ok(exchange)) => exchange,
            };

        if let Some(budget) = &self.budget {
            if status == StatusCode::TOO_MANY_REQUESTS {
                budget.on_throttle();
            } else if status.is_success() {
                budget.on_success();
            }
        }

        if !status.is_success() {
            let error = classify(status, &text, retry_after);
            info!(
                channel = %batch.channel(),
                batch_id = %batch.id(),
                status = status.as_u16(),
                kind = %error.kind(),
                "Batch rejected"
            );
            return Err(error);
        }

        // A 2xx without a matching acknowledgement does not purge anything
        let ack: AckBody = serde_json::from_str(&text).map_err(|e| {
            SendError::retryable(format!("Unreadable acknowledgement: {e}"))
        })?;
        if ack.batch_id != *batch.id() {
            return Err(SendError::retryable(format!(
                "Acknowledgement references batch {}, expected {}",
                ack.batch_id,
                batch.id()
            )));
        }

        debug!(channel = %batch.channel(), batch_id = %batch.id(), "Batch acknowledged");
        Ok(Ack::new(ack.batch_id))
    }
}
