// src/fetch/source.rs

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::config::RetryConfig;
use crate::error::TransportError;

/// One HTTP GET, no retries. The retry policy lives in `Fetcher`.
#[async_trait]
pub trait HttpSource: Send + Sync {
    async fn get(&self, url: &str) -> Result<Vec<u8>, TransportError>;
}

/// Production source backed by a shared `reqwest::Client`.
#[derive(Clone)]
pub struct ReqwestSource {
    client: Client,
}

impl ReqwestSource {
    pub fn new(retry: &RetryConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(retry.timeout())
            .user_agent(concat!("madash/", env!("CARGO_PKG_VERSION")))
            .gzip(true)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpSource for ReqwestSource {
    async fn get(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        debug!("GET {}", url);
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }
        let bytes = resp.bytes().await?;
        debug!(url, bytes = bytes.len(), "downloaded");
        Ok(bytes.to_vec())
    }
}
