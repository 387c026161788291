//! Deadline-bounded transport
//!
//! Wraps any `ShardTransport` so a slow backend cannot hang an upload,
//! download or repair pass. A timed-out `get` or `delete` is treated as
//! absent, a timed-out `put` as a connection failure. Puts are retried
//! with exponential backoff before giving up.

use crate::transport::{ProviderHealth, ShardTransport};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tessera_core::error::{Result, TesseraError};
use tessera_core::model::Provider;
use tokio::time::{sleep, timeout};
use tracing::warn;

/// Per-call limits
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Deadline for a single transport call
    pub timeout: Duration,
    /// Extra attempts for a failed put
    pub put_retries: u32,
    /// Delay before the first retry; doubled on each further attempt
    pub retry_delay: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            put_retries: 2,
            retry_delay: Duration::from_millis(100),
        }
    }
}

/// Transport wrapper imposing a deadline on every call
pub struct GuardedTransport {
    inner: Arc<dyn ShardTransport>,
    config: TransportConfig,
}

impl GuardedTransport {
    pub fn new(inner: Arc<dyn ShardTransport>, config: TransportConfig) -> Self {
        Self { inner, config }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    async fn put_once(&self, provider: &Provider, key: &str, data: Bytes) -> Result<()> {
        match timeout(self.config.timeout, self.inner.put(provider, key, data)).await {
            Ok(result) => result,
            Err(_) => Err(TesseraError::connection(
                &provider.name,
                format!("put timed out after {:?}", self.config.timeout),
            )),
        }
    }
}

#[async_trait]
impl ShardTransport for GuardedTransport {
    async fn put(&self, provider: &Provider, key: &str, data: Bytes) -> Result<()> {
        let mut attempt = 0;
        loop {
            match self.put_once(provider, key, data.clone()).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.config.put_retries => {
                    let delay = self.config.retry_delay * 2u32.pow(attempt);
                    warn!(provider = %provider.name, key, attempt, error = %e, "Put failed, retrying");
                    attempt += 1;
                    sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn get(&self, provider: &Provider, key: &str) -> Option<Bytes> {
        match timeout(self.config.timeout, self.inner.get(provider, key)).await {
            Ok(data) => data,
            Err(_) => {
                warn!(provider = %provider.name, key, "Get timed out, treating as absent");
                None
            }
        }
    }

    async fn object_len(&self, provider: &Provider, key: &str) -> Option<u64> {
        match timeout(self.config.timeout, self.inner.object_len(provider, key)).await {
            Ok(len) => len,
            Err(_) => {
                warn!(provider = %provider.name, key, "Length check timed out, treating as absent");
                None
            }
        }
    }

    async fn delete(&self, provider: &Provider, key: &str) {
        if timeout(self.config.timeout, self.inner.delete(provider, key))
            .await
            .is_err()
        {
            warn!(provider = %provider.name, key, "Delete timed out");
        }
    }

    async fn probe(&self, provider: &Provider) -> ProviderHealth {
        match timeout(self.config.timeout, self.inner.probe(provider)).await {
            Ok(health) => health,
            Err(_) => ProviderHealth::Offline(format!(
                "probe timed out after {:?}",
                self.config.timeout
            )),
        }
    }
}
