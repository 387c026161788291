//! S3-compatible shard transport
//!
//! One `aws_sdk_s3::Client` is built per provider from its own endpoint,
//! region and static credentials, and cached by provider id. Path-style
//! addressing is forced so MinIO and other self-hosted backends work
//! without wildcard DNS.

use crate::transport::{ProviderHealth, ShardTransport};
use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Builder as S3ConfigBuilder, Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use aws_sdk_s3::Client;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use tessera_core::error::{Result, TesseraError};
use tessera_core::model::Provider;
use tracing::{debug, warn};
use uuid::Uuid;

/// Region that must not be sent as a location constraint
const DEFAULT_REGION: &str = "us-east-1";

/// Transport for S3-compatible providers
pub struct S3Transport {
    clients: RwLock<HashMap<Uuid, Client>>,
}

impl S3Transport {
    pub fn new() -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Cached client for the provider, built on first use
    fn client(&self, provider: &Provider) -> Client {
        if let Some(client) = self.clients.read().get(&provider.id) {
            return client.clone();
        }

        let credentials = Credentials::new(
            provider.credentials.access_key.clone(),
            provider.credentials.secret_key.clone(),
            None,
            None,
            "tessera-provider-registry",
        );
        let mut builder = S3ConfigBuilder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(provider.region.clone()))
            .credentials_provider(credentials)
            .force_path_style(true);
        if !provider.endpoint_url.is_empty() {
            builder = builder.endpoint_url(provider.endpoint_url.clone());
        }

        let client = Client::from_conf(builder.build());
        self.clients.write().insert(provider.id, client.clone());
        debug!(provider = %provider.name, endpoint = %provider.endpoint_url, "Built S3 client");
        client
    }

    /// Forget a provider's cached client (after credentials change or removal)
    pub fn evict(&self, provider_id: Uuid) {
        self.clients.write().remove(&provider_id);
    }

    /// Create the bucket unless it already exists
    async fn ensure_bucket(&self, client: &Client, provider: &Provider) -> Result<()> {
        match client.head_bucket().bucket(&provider.bucket).send().await {
            Ok(_) => return Ok(()),
            Err(e) => {
                let missing = e
                    .as_service_error()
                    .map(|se| se.is_not_found())
                    .unwrap_or(false);
                if !missing {
                    return Err(TesseraError::connection(
                        &provider.name,
                        DisplayErrorContext(&e),
                    ));
                }
            }
        }

        let mut request = client.create_bucket().bucket(&provider.bucket);
        if provider.region != DEFAULT_REGION && !provider.region.is_empty() {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(provider.region.as_str()))
                    .build(),
            );
        }

        match request.send().await {
            Ok(_) => {
                debug!(provider = %provider.name, bucket = %provider.bucket, "Created bucket");
                Ok(())
            }
            Err(e) => {
                // Lost a creation race with another writer
                let already = e
                    .as_service_error()
                    .map(|se| se.is_bucket_already_owned_by_you() || se.is_bucket_already_exists())
                    .unwrap_or(false);
                if already {
                    Ok(())
                } else {
                    Err(TesseraError::connection(
                        &provider.name,
                        DisplayErrorContext(&e),
                    ))
                }
            }
        }
    }
}

impl Default for S3Transport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ShardTransport for S3Transport {
    async fn put(&self, provider: &Provider, key: &str, data: Bytes) -> Result<()> {
        let client = self.client(provider);
        self.ensure_bucket(&client, provider).await?;

        let len = data.len();
        client
            .put_object()
            .bucket(&provider.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| TesseraError::connection(&provider.name, DisplayErrorContext(&e)))?;

        debug!(provider = %provider.name, key, bytes = len, "Put object");
        Ok(())
    }

    async fn get(&self, provider: &Provider, key: &str) -> Option<Bytes> {
        let client = self.client(provider);
        let response = match client
            .get_object()
            .bucket(&provider.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                debug!(provider = %provider.name, key, error = %DisplayErrorContext(&e), "Get failed, treating as absent");
                return None;
            }
        };

        match response.body.collect().await {
            Ok(aggregated) => Some(aggregated.into_bytes()),
            Err(e) => {
                warn!(provider = %provider.name, key, error = %e, "Body read failed, treating as absent");
                None
            }
        }
    }

    async fn delete(&self, provider: &Provider, key: &str) {
        let client = self.client(provider);
        if let Err(e) = client
            .delete_object()
            .bucket(&provider.bucket)
            .key(key)
            .send()
            .await
        {
            warn!(provider = %provider.name, key, error = %DisplayErrorContext(&e), "Delete failed");
        }
    }

    async fn object_len(&self, provider: &Provider, key: &str) -> Option<u64> {
        let client = self.client(provider);
        match client
            .head_object()
            .bucket(&provider.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(head) => head.content_length().and_then(|n| u64::try_from(n).ok()),
            Err(e) => {
                debug!(provider = %provider.name, key, error = %DisplayErrorContext(&e), "Head failed, treating as absent");
                None
            }
        }
    }

    async fn probe(&self, provider: &Provider) -> ProviderHealth {
        let client = self.client(provider);
        match client.head_bucket().bucket(&provider.bucket).send().await {
            Ok(_) => ProviderHealth::Online,
            Err(e) => {
                let missing = e
                    .as_service_error()
                    .map(|se| se.is_not_found())
                    .unwrap_or(false);
                if missing {
                    ProviderHealth::BucketMissing
                } else {
                    ProviderHealth::Offline(DisplayErrorContext(&e).to_string())
                }
            }
        }
    }
}
