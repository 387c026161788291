//! Provider registry management
//!
//! New providers are probed before they are registered so that a typo in
//! an endpoint or credentials never reaches placement.

use crate::context::EngineContext;
use futures::future::join_all;
use tessera_core::error::{Result, TesseraError};
use tessera_core::model::{AuditAction, Credentials, Principal, Provider, ProviderKind, Severity};
use tessera_storage::ProviderHealth;
use tracing::{info, warn};
use uuid::Uuid;

/// Registration request for a storage provider
#[derive(Debug, Clone)]
pub struct NewProvider {
    pub name: String,
    pub kind: ProviderKind,
    pub endpoint_url: String,
    pub region: String,
    pub bucket: String,
    pub credentials: Credentials,
}

impl NewProvider {
    fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("name", &self.name),
            ("region", &self.region),
            ("bucket", &self.bucket),
        ] {
            if value.trim().is_empty() {
                return Err(TesseraError::InvalidInput(format!(
                    "provider {} must not be empty",
                    field
                )));
            }
        }
        Ok(())
    }
}

/// Result of registering one provider from a batch
#[derive(Debug)]
pub struct ProviderRegistration {
    pub name: String,
    pub result: Result<Provider>,
}

/// Outcome of a batch registration, in request order
#[derive(Debug, Default)]
pub struct BulkRegistration {
    pub registrations: Vec<ProviderRegistration>,
}

impl BulkRegistration {
    pub fn added(&self) -> impl Iterator<Item = &Provider> {
        self.registrations.iter().filter_map(|r| r.result.as_ref().ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = &ProviderRegistration> {
        self.registrations.iter().filter(|r| r.result.is_err())
    }
}

#[derive(Clone)]
pub struct ProviderManager {
    ctx: EngineContext,
}

impl ProviderManager {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// Probe and register a provider
    ///
    /// An unreachable provider is rejected. A reachable one whose bucket
    /// does not exist yet is accepted; the bucket is created on first write.
    pub async fn add(&self, actor: &Principal, request: NewProvider) -> Result<Provider> {
        let provider = self.checked(request).await?;
        self.register(actor, provider).await
    }

    /// Probe and register several providers
    ///
    /// Probes run concurrently; registration then happens in request order
    /// so placement order follows the batch. A rejected entry is reported
    /// in its own result and does not stop the others.
    pub async fn add_many(&self, actor: &Principal, requests: Vec<NewProvider>) -> BulkRegistration {
        let names: Vec<String> = requests.iter().map(|r| r.name.trim().to_string()).collect();
        let checked = join_all(requests.into_iter().map(|request| self.checked(request))).await;

        let mut registrations = Vec::with_capacity(names.len());
        for (name, provider) in names.into_iter().zip(checked) {
            let result = match provider {
                Ok(provider) => self.register(actor, provider).await,
                Err(e) => Err(e),
            };
            if let Err(e) = &result {
                warn!(provider = %name, error = %e, "Provider rejected");
            }
            registrations.push(ProviderRegistration { name, result });
        }

        let report = BulkRegistration { registrations };
        info!(
            added = report.added().count(),
            rejected = report.failures().count(),
            "Bulk provider registration complete"
        );
        report
    }

    /// Validate a request and probe the provider it describes
    async fn checked(&self, request: NewProvider) -> Result<Provider> {
        request.validate()?;
        let provider = Provider::new(
            request.name.trim(),
            request.kind,
            request.endpoint_url,
            request.region.trim(),
            request.bucket.trim(),
            request.credentials,
        );

        match self.ctx.transport.probe(&provider).await {
            ProviderHealth::Online => {}
            ProviderHealth::BucketMissing => {
                warn!(provider = %provider.name, bucket = %provider.bucket, "Bucket does not exist yet");
            }
            ProviderHealth::Offline(reason) => {
                return Err(TesseraError::connection(&provider.name, reason));
            }
        }
        Ok(provider)
    }

    async fn register(&self, actor: &Principal, provider: Provider) -> Result<Provider> {
        let provider = self.ctx.providers.insert(provider).await?;
        self.ctx.audit(
            AuditAction::ProviderAdded,
            &actor.id,
            format!(
                "Added {} provider {} ({}, bucket {})",
                provider.kind, provider.name, provider.region, provider.bucket
            ),
            Severity::Info,
        );
        info!(provider = %provider.name, id = %provider.id, "Provider registered");
        Ok(provider)
    }

    /// Registered providers in registration order
    pub async fn list(&self) -> Result<Vec<Provider>> {
        self.ctx.providers.list().await
    }

    pub async fn get(&self, id: Uuid) -> Result<Provider> {
        self.ctx
            .providers
            .get(id)
            .await?
            .ok_or_else(|| TesseraError::NotFound(format!("provider {}", id)))
    }

    /// Unregister a provider
    ///
    /// Shards recorded on it become absent and are migrated by the next
    /// repair pass.
    pub async fn remove(&self, actor: &Principal, id: Uuid) -> Result<Provider> {
        let provider = self.get(id).await?;
        self.ctx.providers.remove(id).await?;
        self.ctx.audit(
            AuditAction::ProviderRemoved,
            &actor.id,
            format!("Removed provider {} ({})", provider.name, provider.id),
            Severity::Warning,
        );
        warn!(provider = %provider.name, "Provider removed");
        Ok(provider)
    }

    /// Include or exclude a provider from new placements
    pub async fn set_enabled(&self, actor: &Principal, id: Uuid, enabled: bool) -> Result<Provider> {
        let provider = self.ctx.providers.set_enabled(id, enabled).await?;
        if !enabled {
            self.ctx.audit(
                AuditAction::MaintenanceStart,
                &actor.id,
                format!("Provider {} disabled for maintenance", provider.name),
                Severity::Info,
            );
        }
        info!(provider = %provider.name, enabled, "Provider state changed");
        Ok(provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use std::sync::Arc;
    use tessera_metadata::MemoryStore;
    use tessera_storage::MemoryTransport;

    fn manager() -> (ProviderManager, Arc<MemoryTransport>, Arc<MemoryStore>) {
        let transport = Arc::new(MemoryTransport::new());
        let store = Arc::new(MemoryStore::new());
        let ctx = EngineContext::new(
            transport.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            EngineConfig::default(),
        )
        .unwrap();
        (ProviderManager::new(ctx), transport, store)
    }

    fn request(name: &str) -> NewProvider {
        NewProvider {
            name: name.into(),
            kind: ProviderKind::Aws,
            endpoint_url: String::new(),
            region: "us-east-1".into(),
            bucket: "tessera".into(),
            credentials: Credentials {
                access_key: "AKIA".into(),
                secret_key: "secret".into(),
            },
        }
    }

    #[tokio::test]
    async fn test_add_list_remove() {
        let (manager, _, store) = manager();
        let admin = Principal::admin("root");

        let added = manager.add(&admin, request("aws-east")).await.unwrap();
        assert_eq!(manager.list().await.unwrap(), vec![added.clone()]);

        let removed = manager.remove(&admin, added.id).await.unwrap();
        assert_eq!(removed.id, added.id);
        assert!(manager.list().await.unwrap().is_empty());
        assert!(matches!(
            manager.get(added.id).await,
            Err(TesseraError::NotFound(_))
        ));

        let actions: Vec<AuditAction> = store.audit_records().iter().map(|r| r.action).collect();
        assert_eq!(
            actions,
            vec![AuditAction::ProviderAdded, AuditAction::ProviderRemoved]
        );
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let (manager, _, _) = manager();
        let admin = Principal::admin("root");
        manager.add(&admin, request("dup")).await.unwrap();
        assert!(matches!(
            manager.add(&admin, request("dup")).await,
            Err(TesseraError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_blank_fields_rejected() {
        let (manager, _, _) = manager();
        let mut bad = request("x");
        bad.bucket = " ".into();
        assert!(matches!(
            manager.add(&Principal::admin("root"), bad).await,
            Err(TesseraError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_add_many_reports_each_provider() {
        let (manager, _, store) = manager();
        let admin = Principal::admin("root");
        manager.add(&admin, request("taken")).await.unwrap();

        let mut blank = request("blank");
        blank.region = String::new();

        let report = manager
            .add_many(
                &admin,
                vec![request("first"), request("taken"), blank, request("second")],
            )
            .await;

        let names: Vec<&str> = report.registrations.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["first", "taken", "blank", "second"]);
        assert_eq!(
            report.added().map(|p| p.name.as_str()).collect::<Vec<_>>(),
            vec!["first", "second"]
        );
        assert_eq!(report.failures().count(), 2);
        assert!(matches!(
            report.registrations[1].result,
            Err(TesseraError::InvalidInput(_))
        ));
        assert!(matches!(
            report.registrations[2].result,
            Err(TesseraError::InvalidInput(_))
        ));

        let listed: Vec<String> = manager.list().await.unwrap().into_iter().map(|p| p.name).collect();
        assert_eq!(listed, vec!["taken", "first", "second"]);
        let added = store
            .audit_records()
            .iter()
            .filter(|r| r.action == AuditAction::ProviderAdded)
            .count();
        assert_eq!(added, 3);
    }

    #[tokio::test]
    async fn test_disable_and_enable() {
        let (manager, _, _) = manager();
        let admin = Principal::admin("root");
        let added = manager.add(&admin, request("p")).await.unwrap();

        let disabled = manager.set_enabled(&admin, added.id, false).await.unwrap();
        assert!(!disabled.enabled);
        let enabled = manager.set_enabled(&admin, added.id, true).await.unwrap();
        assert!(enabled.enabled);
    }
}
