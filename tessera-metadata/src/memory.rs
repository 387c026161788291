//! In-memory stores
//!
//! Used for testing and development. Not persistent.

use crate::store::{normalize_regions, AuditSink, MetadataStore, PolicyStore, ProviderRegistry};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use tessera_core::error::{Result, TesseraError};
use tessera_core::model::{AuditRecord, FileHeader, FileRecord, Policy, Provider};
use uuid::Uuid;

/// Every store trait backed by process memory
#[derive(Default)]
pub struct MemoryStore {
    files: RwLock<HashMap<Uuid, FileRecord>>,
    /// Registration order
    providers: RwLock<Vec<Provider>>,
    policies: RwLock<HashMap<String, Policy>>,
    /// Append order, oldest first
    audit: RwLock<Vec<AuditRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored file records
    pub fn file_count(&self) -> usize {
        self.files.read().len()
    }

    /// Every audit record, oldest first
    pub fn audit_records(&self) -> Vec<AuditRecord> {
        self.audit.read().clone()
    }
}

fn oldest_first(mut files: Vec<FileRecord>) -> Vec<FileRecord> {
    files.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    files
}

#[async_trait]
impl MetadataStore for MemoryStore {
    async fn create(&self, header: FileHeader) -> Result<FileRecord> {
        let record = FileRecord::from_header(Uuid::new_v4(), header);
        self.files.write().insert(record.id, record.clone());
        Ok(record)
    }

    async fn save(&self, record: &FileRecord) -> Result<()> {
        self.files.write().insert(record.id, record.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<FileRecord>> {
        Ok(self.files.read().get(&id).cloned())
    }

    async fn find_all(&self) -> Result<Vec<FileRecord>> {
        Ok(oldest_first(self.files.read().values().cloned().collect()))
    }

    async fn find_by_owner(&self, owner: &str) -> Result<Vec<FileRecord>> {
        let owned = self
            .files
            .read()
            .values()
            .filter(|f| f.owner == owner)
            .cloned()
            .collect();
        Ok(oldest_first(owned))
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self.files.write().remove(&id).is_some())
    }
}

#[async_trait]
impl ProviderRegistry for MemoryStore {
    async fn insert(&self, provider: Provider) -> Result<Provider> {
        let mut providers = self.providers.write();
        if providers.iter().any(|p| p.name == provider.name) {
            return Err(TesseraError::InvalidInput(format!(
                "provider name already registered: {}",
                provider.name
            )));
        }
        providers.push(provider.clone());
        Ok(provider)
    }

    async fn list(&self) -> Result<Vec<Provider>> {
        Ok(self.providers.read().clone())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Provider>> {
        Ok(self.providers.read().iter().find(|p| p.id == id).cloned())
    }

    async fn remove(&self, id: Uuid) -> Result<bool> {
        let mut providers = self.providers.write();
        let before = providers.len();
        providers.retain(|p| p.id != id);
        Ok(providers.len() != before)
    }

    async fn set_enabled(&self, id: Uuid, enabled: bool) -> Result<Provider> {
        let mut providers = self.providers.write();
        let provider = providers
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| TesseraError::NotFound(format!("provider {}", id)))?;
        provider.enabled = enabled;
        Ok(provider.clone())
    }
}

#[async_trait]
impl PolicyStore for MemoryStore {
    async fn get_or_create(&self, principal: &str) -> Result<Policy> {
        Ok(self
            .policies
            .write()
            .entry(principal.to_string())
            .or_insert_with(|| Policy::open(principal))
            .clone())
    }

    async fn update_blocked_regions(
        &self,
        principal: &str,
        regions: Vec<String>,
    ) -> Result<Policy> {
        let mut policies = self.policies.write();
        let policy = policies
            .entry(principal.to_string())
            .or_insert_with(|| Policy::open(principal));
        policy.blocked_regions = normalize_regions(regions);
        Ok(policy.clone())
    }
}

impl AuditSink for MemoryStore {
    fn log(&self, record: AuditRecord) {
        self.audit.write().push(record);
    }

    fn recent(&self, limit: usize) -> Result<Vec<AuditRecord>> {
        Ok(self.audit.read().iter().rev().take(limit).cloned().collect())
    }
}
