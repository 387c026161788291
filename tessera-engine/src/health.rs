//! Provider health checks

use crate::context::EngineContext;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use tessera_core::error::Result;
use tessera_storage::ProviderHealth;
use tracing::{debug, warn};
use uuid::Uuid;

/// Probe result for one provider
#[derive(Debug, Clone)]
pub struct ProviderStatus {
    pub provider_id: Uuid,
    pub name: String,
    pub region: String,
    pub enabled: bool,
    pub health: ProviderHealth,
}

/// Snapshot of every registered provider's reachability
#[derive(Debug, Clone)]
pub struct SystemHealth {
    pub checked_at: DateTime<Utc>,
    pub providers: Vec<ProviderStatus>,
}

impl SystemHealth {
    pub fn online(&self) -> usize {
        self.count(ProviderHealth::is_online)
    }

    /// Reachable but without a bucket yet
    pub fn bucket_missing(&self) -> usize {
        self.count(|h| matches!(h, ProviderHealth::BucketMissing))
    }

    pub fn offline(&self) -> usize {
        self.count(|h| !h.is_reachable())
    }

    /// Every enabled provider is reachable
    pub fn is_healthy(&self) -> bool {
        self.providers
            .iter()
            .filter(|s| s.enabled)
            .all(|s| s.health.is_reachable())
    }

    fn count(&self, predicate: impl Fn(&ProviderHealth) -> bool) -> usize {
        self.providers.iter().filter(|s| predicate(&s.health)).count()
    }
}

#[derive(Clone)]
pub struct HealthMonitor {
    ctx: EngineContext,
}

impl HealthMonitor {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// Probe every registered provider concurrently
    pub async fn check_all(&self) -> Result<SystemHealth> {
        let providers = self.ctx.providers.list().await?;
        let transport = self.ctx.transport.as_ref();

        let probes = providers.iter().map(|provider| async move {
            let health = transport.probe(provider).await;
            match &health {
                ProviderHealth::Offline(reason) => {
                    warn!(provider = %provider.name, reason = %reason, "Provider offline")
                }
                other => debug!(provider = %provider.name, health = %other, "Provider probed"),
            }
            ProviderStatus {
                provider_id: provider.id,
                name: provider.name.clone(),
                region: provider.region.clone(),
                enabled: provider.enabled,
                health,
            }
        });

        Ok(SystemHealth {
            checked_at: Utc::now(),
            providers: join_all(probes).await,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use bytes::Bytes;
    use std::sync::Arc;
    use tessera_core::model::{Credentials, Provider, ProviderKind};
    use tessera_metadata::{MemoryStore, ProviderRegistry};
    use tessera_storage::{MemoryTransport, ShardTransport};

    #[tokio::test]
    async fn test_counts_by_state() {
        let transport = Arc::new(MemoryTransport::new());
        let store = Arc::new(MemoryStore::new());
        let mut registered = Vec::new();
        for name in ["up", "fresh", "down"] {
            let provider = store
                .insert(Provider::new(
                    name,
                    ProviderKind::Minio,
                    "http://localhost:9000",
                    "eu-west-1",
                    "tessera",
                    Credentials {
                        access_key: "a".into(),
                        secret_key: "s".into(),
                    },
                ))
                .await
                .unwrap();
            registered.push(provider);
        }
        transport
            .put(&registered[0], "k", Bytes::from_static(b"x"))
            .await
            .unwrap();
        transport.set_offline(registered[2].id);

        let ctx = EngineContext::new(
            transport.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            EngineConfig::default(),
        )
        .unwrap();
        let health = HealthMonitor::new(ctx).check_all().await.unwrap();

        assert_eq!(health.providers.len(), 3);
        assert_eq!(health.online(), 1);
        assert_eq!(health.bucket_missing(), 1);
        assert_eq!(health.offline(), 1);
        assert!(!health.is_healthy());
        assert_eq!(health.providers[2].name, "down");
    }
}
