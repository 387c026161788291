//! Tessera data model
//!
//! Plain data records shared by the engine and the metadata stores.
//! A `FileRecord` owns its ordered `ShardRecord`s; shards carry no
//! back-reference to their file, only the provider they live on.

use crate::crypto::{EncryptionKey, InitVector};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Object key for one shard of one window of a file
///
/// Single-window files use `{file_id}/{shard}`; streamed files with
/// several windows use `{file_id}/{window}/{shard}`.
pub fn object_key(file_id: Uuid, window: usize, window_count: usize, shard_index: u8) -> String {
    if window_count <= 1 {
        format!("{}/{}", file_id, shard_index)
    } else {
        format!("{}/{}/{}", file_id, window, shard_index)
    }
}

/// Shard lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShardStatus {
    /// Present on its recorded provider
    Alive,
    /// Probe found it absent and it has not been healed yet
    Missing,
    /// Relocated to a spare provider by repair
    Migrated,
}

impl fmt::Display for ShardStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Alive => write!(f, "ALIVE"),
            Self::Missing => write!(f, "MISSING"),
            Self::Migrated => write!(f, "MIGRATED"),
        }
    }
}

/// Placement of one shard index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardRecord {
    /// Shard index (0..total_shards)
    pub index: u8,
    /// Provider actually holding the shard
    pub provider_id: Uuid,
    /// Bucket the shard's objects were written to; reads, repairs and
    /// deletes address this bucket on the provider
    pub bucket: String,
    pub status: ShardStatus,
}

impl ShardRecord {
    /// Record a freshly written shard
    pub fn alive(index: u8, provider: &Provider) -> Self {
        Self {
            index,
            provider_id: provider.id,
            bucket: provider.bucket.clone(),
            status: ShardStatus::Alive,
        }
    }
}

/// Header fields of a file, persisted before any shard is written
#[derive(Debug, Clone)]
pub struct FileHeader {
    pub filename: String,
    pub size: u64,
    pub encryption_key: String,
    pub iv: String,
    pub owner: String,
}

impl FileHeader {
    pub fn new(
        filename: impl Into<String>,
        size: u64,
        key: &EncryptionKey,
        iv: &InitVector,
        owner: impl Into<String>,
    ) -> Self {
        Self {
            filename: filename.into(),
            size,
            encryption_key: key.to_base64(),
            iv: iv.to_base64(),
            owner: owner.into(),
        }
    }
}

/// Stored file metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: Uuid,
    pub filename: String,
    /// Plaintext size in bytes
    pub size: u64,
    /// Base64 AES-256 key
    pub encryption_key: String,
    /// Base64 CBC IV
    pub iv: String,
    /// Principal id of the uploader
    pub owner: String,
    pub created_at: DateTime<Utc>,
    /// Ciphertext length of each window, in order
    pub encrypted_sizes: Vec<u64>,
    /// Ordered by shard index
    pub shards: Vec<ShardRecord>,
}

impl FileRecord {
    /// Materialize a header under a store-assigned id
    pub fn from_header(id: Uuid, header: FileHeader) -> Self {
        Self {
            id,
            filename: header.filename,
            size: header.size,
            encryption_key: header.encryption_key,
            iv: header.iv,
            owner: header.owner,
            created_at: Utc::now(),
            encrypted_sizes: Vec::new(),
            shards: Vec::new(),
        }
    }

    pub fn key(&self) -> Result<EncryptionKey> {
        EncryptionKey::from_base64(&self.encryption_key)
    }

    pub fn init_vector(&self) -> Result<InitVector> {
        InitVector::from_base64(&self.iv)
    }

    pub fn window_count(&self) -> usize {
        self.encrypted_sizes.len()
    }

    /// Total ciphertext length across all windows
    pub fn encrypted_size(&self) -> u64 {
        self.encrypted_sizes.iter().sum()
    }

    pub fn shard(&self, index: u8) -> Option<&ShardRecord> {
        self.shards.iter().find(|s| s.index == index)
    }

    /// Whether any shard of this file is recorded on the provider
    pub fn uses_provider(&self, provider_id: Uuid) -> bool {
        self.shards.iter().any(|s| s.provider_id == provider_id)
    }

    /// Object keys of every window of one shard index
    pub fn object_keys(&self, shard_index: u8) -> Vec<String> {
        let windows = self.window_count();
        (0..windows)
            .map(|w| object_key(self.id, w, windows, shard_index))
            .collect()
    }
}

/// Storage backend type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Aws,
    Minio,
    Azure,
    Gcs,
    Generic,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aws => write!(f, "aws"),
            Self::Minio => write!(f, "minio"),
            Self::Azure => write!(f, "azure"),
            Self::Gcs => write!(f, "gcs"),
            Self::Generic => write!(f, "generic"),
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "aws" | "s3" => Ok(Self::Aws),
            "minio" => Ok(Self::Minio),
            "azure" => Ok(Self::Azure),
            "gcs" | "gcp" => Ok(Self::Gcs),
            "generic" => Ok(Self::Generic),
            other => Err(format!("unknown provider kind: {}", other)),
        }
    }
}

/// Access credentials for a provider
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"[REDACTED]")
            .finish()
    }
}

/// A registered storage backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    pub id: Uuid,
    /// Unique display name, e.g. "aws-frankfurt"
    pub name: String,
    pub kind: ProviderKind,
    pub endpoint_url: String,
    /// Region identifier used for geo-fencing, e.g. "eu-central-1"
    pub region: String,
    pub bucket: String,
    pub credentials: Credentials,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl Provider {
    /// Create an enabled provider with a fresh id
    pub fn new(
        name: impl Into<String>,
        kind: ProviderKind,
        endpoint_url: impl Into<String>,
        region: impl Into<String>,
        bucket: impl Into<String>,
        credentials: Credentials,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            kind,
            endpoint_url: endpoint_url.into(),
            region: region.into(),
            bucket: bucket.into(),
            credentials,
            enabled: true,
            created_at: Utc::now(),
        }
    }
}

/// Per-principal geo-fencing policy
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Policy {
    pub principal: String,
    pub blocked_regions: Vec<String>,
}

impl Policy {
    /// Default policy: nothing blocked
    pub fn open(principal: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
            blocked_regions: Vec::new(),
        }
    }

    pub fn blocks(&self, region: &str) -> bool {
        self.blocked_regions.iter().any(|r| r == region)
    }
}

/// Caller role, resolved by the request boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

/// Authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: String,
    pub role: Role,
}

impl Principal {
    pub fn user(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::User,
        }
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::Admin,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Owner or administrator
    pub fn can_access(&self, file: &FileRecord) -> bool {
        self.is_admin() || file.owner == self.id
    }
}

/// Audit event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    FileUpload,
    FileDelete,
    GeoFenceRedirect,
    MaintenanceStart,
    ShardRestored,
    FailoverRepair,
    ProviderAdded,
    ProviderRemoved,
    PolicyUpdated,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::FileUpload => "FILE_UPLOAD",
            Self::FileDelete => "FILE_DELETE",
            Self::GeoFenceRedirect => "GEO_FENCE_REDIRECT",
            Self::MaintenanceStart => "MAINTENANCE_START",
            Self::ShardRestored => "SHARD_RESTORED",
            Self::FailoverRepair => "FAILOVER_REPAIR",
            Self::ProviderAdded => "PROVIDER_ADDED",
            Self::ProviderRemoved => "PROVIDER_REMOVED",
            Self::PolicyUpdated => "POLICY_UPDATED",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Success => write!(f, "SUCCESS"),
            Self::Warning => write!(f, "WARNING"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// One audit log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub action: AuditAction,
    pub principal: String,
    pub details: String,
    pub severity: Severity,
}

impl AuditRecord {
    pub fn new(
        action: AuditAction,
        principal: impl Into<String>,
        details: impl Into<String>,
        severity: Severity,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            action,
            principal: principal.into(),
            details: details.into(),
            severity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(region: &str) -> Provider {
        Provider::new(
            format!("minio-{}", region),
            ProviderKind::Minio,
            "http://localhost:9000",
            region,
            format!("bucket-{}", region),
            Credentials {
                access_key: "minio".into(),
                secret_key: "minio123".into(),
            },
        )
    }

    #[test]
    fn test_object_key_scheme() {
        let id = Uuid::nil();
        assert_eq!(
            object_key(id, 0, 1, 3),
            "00000000-0000-0000-0000-000000000000/3"
        );
        assert_eq!(
            object_key(id, 2, 5, 3),
            "00000000-0000-0000-0000-000000000000/2/3"
        );
    }

    #[test]
    fn test_file_record_keys_and_lookup() {
        let key = EncryptionKey::generate();
        let iv = InitVector::generate();
        let mut record = FileRecord::from_header(
            Uuid::new_v4(),
            FileHeader::new("report.pdf", 10, &key, &iv, "alice"),
        );
        record.encrypted_sizes = vec![16];
        let p = provider("eu-west-1");
        record.shards.push(ShardRecord::alive(0, &p));

        assert_eq!(record.key().unwrap(), key);
        assert_eq!(record.init_vector().unwrap(), iv);
        assert_eq!(record.object_keys(0), vec![format!("{}/0", record.id)]);
        assert!(record.uses_provider(p.id));
        assert_eq!(record.shard(0).unwrap().bucket, "bucket-eu-west-1");
        assert!(record.shard(1).is_none());
    }

    #[test]
    fn test_principal_access() {
        let record = FileRecord::from_header(
            Uuid::new_v4(),
            FileHeader::new(
                "a",
                1,
                &EncryptionKey::generate(),
                &InitVector::generate(),
                "alice",
            ),
        );
        assert!(Principal::user("alice").can_access(&record));
        assert!(!Principal::user("bob").can_access(&record));
        assert!(Principal::admin("root").can_access(&record));
    }

    #[test]
    fn test_policy_blocks() {
        let policy = Policy {
            principal: "alice".into(),
            blocked_regions: vec!["cn-north-1".into()],
        };
        assert!(policy.blocks("cn-north-1"));
        assert!(!policy.blocks("eu-west-1"));
        assert!(!Policy::open("bob").blocks("cn-north-1"));
    }

    #[test]
    fn test_credentials_debug_redacted() {
        let p = provider("us-east-1");
        let debug = format!("{:?}", p);
        assert!(!debug.contains("minio123"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_provider_kind_parse() {
        assert_eq!("MinIO".parse::<ProviderKind>().unwrap(), ProviderKind::Minio);
        assert_eq!("s3".parse::<ProviderKind>().unwrap(), ProviderKind::Aws);
        assert!("ftp".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_audit_display() {
        assert_eq!(AuditAction::GeoFenceRedirect.to_string(), "GEO_FENCE_REDIRECT");
        assert_eq!(AuditAction::FailoverRepair.to_string(), "FAILOVER_REPAIR");
        assert_eq!(Severity::Critical.to_string(), "CRITICAL");
        assert_eq!(ShardStatus::Migrated.to_string(), "MIGRATED");
    }

    #[test]
    fn test_file_record_bincode() {
        let mut record = FileRecord::from_header(
            Uuid::new_v4(),
            FileHeader::new(
                "b",
                3,
                &EncryptionKey::generate(),
                &InitVector::generate(),
                "carol",
            ),
        );
        record.encrypted_sizes = vec![16];
        record.shards.push(ShardRecord::alive(0, &provider("eu-west-1")));
        let bytes = bincode::serialize(&record).unwrap();
        let back: FileRecord = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, record);
    }
}
