//! Shard transport trait
//!
//! Each provider is addressed independently by its own endpoint,
//! credentials, region and bucket. Only `put` fails loudly: reads and
//! deletes turn every failure into an absent result so a dead backend
//! becomes a hole the erasure codec can tolerate.

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use tessera_core::error::Result;
use tessera_core::model::Provider;

/// Connectivity state of one provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderHealth {
    /// Reachable and its bucket exists
    Online,
    /// Reachable but the bucket has not been created yet
    BucketMissing,
    /// Unreachable or rejecting requests
    Offline(String),
}

impl ProviderHealth {
    pub fn is_online(&self) -> bool {
        matches!(self, Self::Online)
    }

    /// Whether the provider answered at all
    pub fn is_reachable(&self) -> bool {
        !matches!(self, Self::Offline(_))
    }
}

impl fmt::Display for ProviderHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Online => write!(f, "online"),
            Self::BucketMissing => write!(f, "bucket_missing"),
            Self::Offline(reason) => write!(f, "offline ({})", reason),
        }
    }
}

/// Object operations against a single provider
#[async_trait]
pub trait ShardTransport: Send + Sync {
    /// Write an object, creating the provider's bucket first if needed
    ///
    /// Any failure surfaces as `TesseraError::Connection`.
    async fn put(&self, provider: &Provider, key: &str, data: Bytes) -> Result<()>;

    /// Read an object; `None` on any error, including a missing object
    async fn get(&self, provider: &Provider, key: &str) -> Option<Bytes>;

    /// Best-effort delete; errors are logged and swallowed
    async fn delete(&self, provider: &Provider, key: &str);

    /// Check connectivity and bucket existence
    async fn probe(&self, provider: &Provider) -> ProviderHealth;

    /// Stored length of an object; `None` when it is absent or unreadable
    async fn object_len(&self, provider: &Provider, key: &str) -> Option<u64> {
        self.get(provider, key).await.map(|data| data.len() as u64)
    }
}
