//! Store traits
//!
//! The engine reads the provider registry and a principal's policy once
//! per operation and treats the result as a snapshot; implementations do
//! not need to offer anything stronger than per-call consistency.

use async_trait::async_trait;
use tessera_core::error::Result;
use tessera_core::model::{AuditRecord, FileHeader, FileRecord, Policy, Provider};
use uuid::Uuid;

/// File record persistence
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Persist a header and assign the file id; the record has no shards yet
    async fn create(&self, header: FileHeader) -> Result<FileRecord>;

    /// Insert or replace a whole record, shards included
    async fn save(&self, record: &FileRecord) -> Result<()>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<FileRecord>>;

    /// Every record, oldest first
    async fn find_all(&self) -> Result<Vec<FileRecord>>;

    /// Records owned by one principal, oldest first
    async fn find_by_owner(&self, owner: &str) -> Result<Vec<FileRecord>>;

    /// Remove a record together with its shard list
    async fn delete(&self, id: Uuid) -> Result<bool>;
}

/// Storage backend catalog
#[async_trait]
pub trait ProviderRegistry: Send + Sync {
    /// Add a provider; names must be unique
    async fn insert(&self, provider: Provider) -> Result<Provider>;

    /// All providers in registration order
    async fn list(&self) -> Result<Vec<Provider>>;

    async fn get(&self, id: Uuid) -> Result<Option<Provider>>;

    async fn remove(&self, id: Uuid) -> Result<bool>;

    /// Toggle whether new shards may be placed on the provider
    async fn set_enabled(&self, id: Uuid, enabled: bool) -> Result<Provider>;
}

/// Per-principal geo-fencing policies
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Fetch the policy, creating an empty one on first access
    async fn get_or_create(&self, principal: &str) -> Result<Policy>;

    /// Replace the blocked-region list
    async fn update_blocked_regions(&self, principal: &str, regions: Vec<String>)
        -> Result<Policy>;
}

/// Audit event sink
///
/// `log` never fails; sinks report their own write errors through tracing.
pub trait AuditSink: Send + Sync {
    fn log(&self, record: AuditRecord);

    /// Up to `limit` records, newest first
    fn recent(&self, limit: usize) -> Result<Vec<AuditRecord>>;
}

/// Trim, drop empty entries and de-duplicate while keeping first-seen order
pub fn normalize_regions(regions: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(regions.len());
    for region in regions {
        let region = region.trim();
        if !region.is_empty() && !out.iter().any(|r| r == region) {
            out.push(region.to_string());
        }
    }
    out
}
