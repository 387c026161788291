//! Sled-based metadata storage
//!
//! Stores file records, providers, policies and audit events in separate
//! trees, bincode-encoded. Sled is pure Rust and embedded, which is all
//! a single-node CLI needs.
//!
//! Trees:
//! - `files`: file id -> FileRecord
//! - `files_by_owner`: owner 0x00 file id -> ()
//! - `providers`: registration sequence (big-endian) -> Provider
//! - `policies`: principal -> Policy
//! - `audit`: sequence (big-endian) -> AuditRecord

use crate::store::{normalize_regions, AuditSink, MetadataStore, PolicyStore, ProviderRegistry};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;
use tessera_core::error::{Result, TesseraError};
use tessera_core::model::{AuditRecord, FileHeader, FileRecord, Policy, Provider};
use tracing::{debug, info, warn};
use uuid::Uuid;

const FILES: &str = "files";
const FILES_BY_OWNER: &str = "files_by_owner";
const PROVIDERS: &str = "providers";
const POLICIES: &str = "policies";
const AUDIT: &str = "audit";

fn storage_err(e: sled::Error) -> TesseraError {
    TesseraError::Storage(e.to_string())
}

fn owner_key(owner: &str, id: Uuid) -> Vec<u8> {
    let mut key = owner_prefix(owner);
    key.extend_from_slice(id.as_bytes());
    key
}

fn owner_prefix(owner: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(owner.len() + 17);
    key.extend_from_slice(owner.as_bytes());
    key.push(0);
    key
}

/// Sled-based store implementing every metadata trait
pub struct SledStore {
    db: sled::Db,
}

impl SledStore {
    /// Open or create a store
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        info!(path = ?path.as_ref(), "Opening Sled metadata store");

        let db = sled::open(path.as_ref())
            .map_err(|e| TesseraError::Storage(format!("Failed to open Sled: {}", e)))?;

        Ok(Self { db })
    }

    /// Open an in-memory store (for testing)
    pub fn open_temporary() -> Result<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| TesseraError::Storage(format!("Failed to open Sled: {}", e)))?;
        Ok(Self { db })
    }

    fn tree(&self, name: &str) -> Result<sled::Tree> {
        self.db.open_tree(name).map_err(storage_err)
    }

    fn put_value<K: AsRef<[u8]>, V: Serialize>(
        &self,
        tree: &sled::Tree,
        key: K,
        value: &V,
    ) -> Result<()> {
        let encoded = bincode::serialize(value)?;
        tree.insert(key, encoded).map_err(storage_err)?;
        Ok(())
    }

    fn get_value<K: AsRef<[u8]>, V: DeserializeOwned>(
        &self,
        tree: &sled::Tree,
        key: K,
    ) -> Result<Option<V>> {
        match tree.get(key).map_err(storage_err)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn values<V: DeserializeOwned>(&self, tree: &sled::Tree) -> Result<Vec<V>> {
        tree.iter()
            .values()
            .map(|item| -> Result<V> {
                let bytes = item.map_err(storage_err)?;
                Ok(bincode::deserialize(&bytes)?)
            })
            .collect()
    }

    /// Sequence key preserving insertion order
    fn next_sequence(&self) -> Result<[u8; 8]> {
        Ok(self.db.generate_id().map_err(storage_err)?.to_be_bytes())
    }

    /// Find a provider and its sequence key
    fn find_provider(&self, id: Uuid) -> Result<Option<(sled::IVec, Provider)>> {
        let tree = self.tree(PROVIDERS)?;
        for item in tree.iter() {
            let (key, value) = item.map_err(storage_err)?;
            let provider: Provider = bincode::deserialize(&value)?;
            if provider.id == id {
                return Ok(Some((key, provider)));
            }
        }
        Ok(None)
    }

    fn write_audit(&self, record: &AuditRecord) -> Result<()> {
        let tree = self.tree(AUDIT)?;
        let key = self.next_sequence()?;
        self.put_value(&tree, key, record)
    }

    /// Flush to disk
    pub fn flush(&self) -> Result<()> {
        self.db.flush().map_err(storage_err)?;
        Ok(())
    }

    /// Get database size estimate
    pub fn size_on_disk(&self) -> u64 {
        self.db.size_on_disk().unwrap_or(0)
    }
}

#[async_trait]
impl MetadataStore for SledStore {
    async fn create(&self, header: FileHeader) -> Result<FileRecord> {
        let record = FileRecord::from_header(Uuid::new_v4(), header);
        self.save(&record).await?;
        Ok(record)
    }

    async fn save(&self, record: &FileRecord) -> Result<()> {
        let files = self.tree(FILES)?;
        self.put_value(&files, record.id.as_bytes(), record)?;

        let by_owner = self.tree(FILES_BY_OWNER)?;
        by_owner
            .insert(owner_key(&record.owner, record.id), Vec::<u8>::new())
            .map_err(storage_err)?;

        debug!(file_id = %record.id, shards = record.shards.len(), "Stored file record");
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<FileRecord>> {
        let files = self.tree(FILES)?;
        self.get_value(&files, id.as_bytes())
    }

    async fn find_all(&self) -> Result<Vec<FileRecord>> {
        let files = self.tree(FILES)?;
        let mut records: Vec<FileRecord> = self.values(&files)?;
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(records)
    }

    async fn find_by_owner(&self, owner: &str) -> Result<Vec<FileRecord>> {
        let files = self.tree(FILES)?;
        let by_owner = self.tree(FILES_BY_OWNER)?;
        let prefix = owner_prefix(owner);

        let mut records = Vec::new();
        for item in by_owner.scan_prefix(&prefix).keys() {
            let key = item.map_err(storage_err)?;
            let id = Uuid::from_slice(&key[prefix.len()..])
                .map_err(|e| TesseraError::Storage(e.to_string()))?;
            if let Some(record) = self.get_value::<_, FileRecord>(&files, id.as_bytes())? {
                records.push(record);
            }
        }
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(records)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let files = self.tree(FILES)?;

        // Shards live inside the record, so one removal drops them too
        let Some(record) = self.get_value::<_, FileRecord>(&files, id.as_bytes())? else {
            return Ok(false);
        };
        self.tree(FILES_BY_OWNER)?
            .remove(owner_key(&record.owner, id))
            .map_err(storage_err)?;
        let removed = files.remove(id.as_bytes()).map_err(storage_err)?;
        Ok(removed.is_some())
    }
}

#[async_trait]
impl ProviderRegistry for SledStore {
    async fn insert(&self, provider: Provider) -> Result<Provider> {
        let tree = self.tree(PROVIDERS)?;
        let existing: Vec<Provider> = self.values(&tree)?;
        if existing.iter().any(|p| p.name == provider.name) {
            return Err(TesseraError::InvalidInput(format!(
                "provider name already registered: {}",
                provider.name
            )));
        }

        let key = self.next_sequence()?;
        self.put_value(&tree, key, &provider)?;
        debug!(provider_id = %provider.id, name = %provider.name, "Registered provider");
        Ok(provider)
    }

    async fn list(&self) -> Result<Vec<Provider>> {
        let tree = self.tree(PROVIDERS)?;
        self.values(&tree)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Provider>> {
        Ok(self.find_provider(id)?.map(|(_, p)| p))
    }

    async fn remove(&self, id: Uuid) -> Result<bool> {
        match self.find_provider(id)? {
            Some((key, _)) => {
                self.tree(PROVIDERS)?.remove(key).map_err(storage_err)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_enabled(&self, id: Uuid, enabled: bool) -> Result<Provider> {
        let (key, mut provider) = self
            .find_provider(id)?
            .ok_or_else(|| TesseraError::NotFound(format!("provider {}", id)))?;
        provider.enabled = enabled;
        let tree = self.tree(PROVIDERS)?;
        self.put_value(&tree, key, &provider)?;
        Ok(provider)
    }
}

#[async_trait]
impl PolicyStore for SledStore {
    async fn get_or_create(&self, principal: &str) -> Result<Policy> {
        let tree = self.tree(POLICIES)?;
        if let Some(policy) = self.get_value(&tree, principal.as_bytes())? {
            return Ok(policy);
        }
        let policy = Policy::open(principal);
        self.put_value(&tree, principal.as_bytes(), &policy)?;
        Ok(policy)
    }

    async fn update_blocked_regions(
        &self,
        principal: &str,
        regions: Vec<String>,
    ) -> Result<Policy> {
        let tree = self.tree(POLICIES)?;
        let policy = Policy {
            principal: principal.to_string(),
            blocked_regions: normalize_regions(regions),
        };
        self.put_value(&tree, principal.as_bytes(), &policy)?;
        Ok(policy)
    }
}

impl AuditSink for SledStore {
    fn log(&self, record: AuditRecord) {
        if let Err(e) = self.write_audit(&record) {
            warn!(action = %record.action, error = %e, "Failed to persist audit record");
        }
    }

    fn recent(&self, limit: usize) -> Result<Vec<AuditRecord>> {
        let tree = self.tree(AUDIT)?;
        tree.iter()
            .values()
            .rev()
            .take(limit)
            .map(|item| -> Result<AuditRecord> {
                let bytes = item.map_err(storage_err)?;
                Ok(bincode::deserialize(&bytes)?)
            })
            .collect()
    }
}
