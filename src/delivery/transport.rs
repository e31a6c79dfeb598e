//! HTTP transport to the remote collector

use crate::config::DeliveryConfig;
use crate::error::DeliveryError;
use async_trait::async_trait;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use tracing::debug;

/// Sends one serialized payload; success means the collector answered 2xx
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post_json(&self, body: Vec<u8>) -> Result<(), DeliveryError>;
}

/// reqwest-backed transport posting to a single fixed endpoint
#[derive(Debug, Clone)]
pub struct HttpTransport {
    endpoint: String,
    http: Client,
}

impl HttpTransport {
    pub fn new(config: &DeliveryConfig) -> Result<Self, DeliveryError> {
        let http = Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .build()?;
        Ok(Self {
            endpoint: config.endpoint.clone(),
            http,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post_json(&self, body: Vec<u8>) -> Result<(), DeliveryError> {
        let bytes = body.len();
        let response = self
            .http
            .post(&self.endpoint)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .body(body)
            .send()
            .await?;

        let status = response.status();
        debug!(endpoint = %self.endpoint, bytes, status = status.as_u16(), "collector responded");
        if !status.is_success() {
            return Err(DeliveryError::Status(status.as_u16()));
        }
        Ok(())
    }
}
