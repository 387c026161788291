//! In-memory shard transport
//!
//! Used for testing and development. Not persistent. Each provider gets
//! its own bucket map; providers can be taken offline, slowed down or
//! have objects removed to simulate backend failures.

use crate::transport::{ProviderHealth, ShardTransport};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tessera_core::error::{Result, TesseraError};
use tessera_core::model::Provider;
use uuid::Uuid;

#[derive(Default)]
struct Bucket {
    objects: HashMap<String, Bytes>,
}

/// In-memory transport with fault injection
pub struct MemoryTransport {
    /// Buckets keyed by provider id; absent until the first put
    buckets: RwLock<HashMap<Uuid, Bucket>>,

    /// Providers that refuse every request
    offline: RwLock<HashSet<Uuid>>,

    /// Artificial latency per provider
    delays: RwLock<HashMap<Uuid, Duration>>,

    /// Operation counters
    puts: AtomicU64,
    gets: AtomicU64,
    deletes: AtomicU64,
}

impl MemoryTransport {
    /// Create an empty transport
    pub fn new() -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
            offline: RwLock::new(HashSet::new()),
            delays: RwLock::new(HashMap::new()),
            puts: AtomicU64::new(0),
            gets: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
        }
    }

    /// Make every request to the provider fail
    pub fn set_offline(&self, provider_id: Uuid) {
        self.offline.write().insert(provider_id);
    }

    /// Bring a provider back; its stored objects are untouched
    pub fn set_online(&self, provider_id: Uuid) {
        self.offline.write().remove(&provider_id);
    }

    /// Delay every request to the provider
    pub fn set_delay(&self, provider_id: Uuid, delay: Duration) {
        self.delays.write().insert(provider_id, delay);
    }

    /// Remove a single object behind the engine's back
    pub fn remove_object(&self, provider_id: Uuid, key: &str) -> bool {
        self.buckets
            .write()
            .get_mut(&provider_id)
            .map(|b| b.objects.remove(key).is_some())
            .unwrap_or(false)
    }

    /// Drop the provider's whole bucket
    pub fn drop_bucket(&self, provider_id: Uuid) {
        self.buckets.write().remove(&provider_id);
    }

    /// Whether the provider holds the object
    pub fn contains(&self, provider_id: Uuid, key: &str) -> bool {
        self.buckets
            .read()
            .get(&provider_id)
            .map(|b| b.objects.contains_key(key))
            .unwrap_or(false)
    }

    /// Number of objects held by the provider
    pub fn object_count(&self, provider_id: Uuid) -> usize {
        self.buckets
            .read()
            .get(&provider_id)
            .map(|b| b.objects.len())
            .unwrap_or(0)
    }

    /// Sorted object keys held by the provider
    pub fn keys(&self, provider_id: Uuid) -> Vec<String> {
        let mut keys: Vec<String> = self
            .buckets
            .read()
            .get(&provider_id)
            .map(|b| b.objects.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    /// (puts, gets, deletes) issued so far
    pub fn op_counts(&self) -> (u64, u64, u64) {
        (
            self.puts.load(Ordering::Relaxed),
            self.gets.load(Ordering::Relaxed),
            self.deletes.load(Ordering::Relaxed),
        )
    }

    fn is_offline(&self, provider_id: Uuid) -> bool {
        self.offline.read().contains(&provider_id)
    }

    async fn simulate_latency(&self, provider_id: Uuid) {
        let delay = self.delays.read().get(&provider_id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ShardTransport for MemoryTransport {
    async fn put(&self, provider: &Provider, key: &str, data: Bytes) -> Result<()> {
        self.simulate_latency(provider.id).await;
        if self.is_offline(provider.id) {
            return Err(TesseraError::connection(&provider.name, "connection refused"));
        }

        self.buckets
            .write()
            .entry(provider.id)
            .or_default()
            .objects
            .insert(key.to_string(), data);
        self.puts.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn get(&self, provider: &Provider, key: &str) -> Option<Bytes> {
        self.simulate_latency(provider.id).await;
        self.gets.fetch_add(1, Ordering::Relaxed);
        if self.is_offline(provider.id) {
            return None;
        }
        self.buckets
            .read()
            .get(&provider.id)
            .and_then(|b| b.objects.get(key).cloned())
    }

    async fn object_len(&self, provider: &Provider, key: &str) -> Option<u64> {
        self.simulate_latency(provider.id).await;
        if self.is_offline(provider.id) {
            return None;
        }
        self.buckets
            .read()
            .get(&provider.id)
            .and_then(|b| b.objects.get(key).map(|data| data.len() as u64))
    }

    async fn delete(&self, provider: &Provider, key: &str) {
        self.simulate_latency(provider.id).await;
        if self.is_offline(provider.id) {
            return;
        }
        if let Some(bucket) = self.buckets.write().get_mut(&provider.id) {
            if bucket.objects.remove(key).is_some() {
                self.deletes.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    async fn probe(&self, provider: &Provider) -> ProviderHealth {
        self.simulate_latency(provider.id).await;
        if self.is_offline(provider.id) {
            return ProviderHealth::Offline("connection refused".to_string());
        }
        if self.buckets.read().contains_key(&provider.id) {
            ProviderHealth::Online
        } else {
            ProviderHealth::BucketMissing
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::model::{Credentials, ProviderKind};

    fn provider(name: &str) -> Provider {
        Provider::new(
            name,
            ProviderKind::Minio,
            "http://localhost:9000",
            "eu-west-1",
            "tessera",
            Credentials {
                access_key: "a".into(),
                secret_key: "s".into(),
            },
        )
    }

    #[tokio::test]
    async fn test_put_get() {
        let transport = MemoryTransport::new();
        let p = provider("p1");
        let data = Bytes::from_static(b"hello world");

        transport.put(&p, "f/0", data.clone()).await.unwrap();
        assert_eq!(transport.get(&p, "f/0").await, Some(data));
        assert_eq!(transport.object_len(&p, "f/0").await, Some(11));
        assert_eq!(transport.object_len(&p, "f/1").await, None);
        assert_eq!(transport.get(&p, "f/1").await, None);
    }

    #[tokio::test]
    async fn test_bucket_created_on_first_put() {
        let transport = MemoryTransport::new();
        let p = provider("p1");

        assert_eq!(transport.probe(&p).await, ProviderHealth::BucketMissing);
        transport.put(&p, "k", Bytes::from_static(b"x")).await.unwrap();
        assert_eq!(transport.probe(&p).await, ProviderHealth::Online);
    }

    #[tokio::test]
    async fn test_offline_provider() {
        let transport = MemoryTransport::new();
        let p = provider("p1");
        transport.put(&p, "k", Bytes::from_static(b"x")).await.unwrap();

        transport.set_offline(p.id);
        assert!(matches!(
            transport.put(&p, "k2", Bytes::new()).await,
            Err(TesseraError::Connection { .. })
        ));
        assert_eq!(transport.get(&p, "k").await, None);
        assert!(matches!(transport.probe(&p).await, ProviderHealth::Offline(_)));

        // Delete is swallowed and leaves the object in place
        transport.delete(&p, "k").await;
        transport.set_online(p.id);
        assert!(transport.contains(p.id, "k"));
    }

    #[tokio::test]
    async fn test_delete_missing_is_noop() {
        let transport = MemoryTransport::new();
        let p = provider("p1");

        transport.delete(&p, "never-written").await;
        transport.put(&p, "k", Bytes::from_static(b"x")).await.unwrap();
        transport.delete(&p, "k").await;
        transport.delete(&p, "k").await;

        assert_eq!(transport.object_count(p.id), 0);
        assert_eq!(transport.op_counts(), (1, 0, 1));
    }

    #[tokio::test]
    async fn test_fault_injection_helpers() {
        let transport = MemoryTransport::new();
        let p = provider("p1");
        transport.put(&p, "b", Bytes::from_static(b"2")).await.unwrap();
        transport.put(&p, "a", Bytes::from_static(b"1")).await.unwrap();

        assert_eq!(transport.keys(p.id), vec!["a".to_string(), "b".to_string()]);
        assert!(transport.remove_object(p.id, "a"));
        assert!(!transport.remove_object(p.id, "a"));

        transport.drop_bucket(p.id);
        assert_eq!(transport.probe(&p).await, ProviderHealth::BucketMissing);
    }
}
