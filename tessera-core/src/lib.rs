//! Tessera Core Library
//!
//! Core abstractions for the Tessera multi-cloud object store.
//! This crate provides:
//! - Reed-Solomon erasure coding (4 data + 2 parity shards)
//! - Per-file AES-256-CBC encryption with base64 key/IV serialization
//! - A bounded-memory streaming pipeline (encrypt, window, split)
//! - The file, shard, provider and policy data model
//! - Common error handling

pub mod crypto;
pub mod erasure;
pub mod error;
pub mod model;
pub mod stream;

pub use crypto::{decrypt, encrypt, EncryptionKey, InitVector, StreamDecryptor, StreamEncryptor};
pub use erasure::{Codec, ErasureConfig, Shard};
pub use error::{Result, TesseraError};
pub use model::{
    object_key, AuditAction, AuditRecord, Credentials, FileHeader, FileRecord, Policy, Principal,
    Provider, ProviderKind, Role, Severity, ShardRecord, ShardStatus,
};
pub use stream::{EncodedWindow, StreamSummary, StreamingPipeline, WindowReassembler};

/// Default erasure coding configuration
/// - 4 data shards: minimum required to reconstruct
/// - 2 parity shards: survives the loss of any two providers
/// - 6 total shards, one per provider when enough providers are registered
pub const DATA_SHARDS: usize = 4;
pub const PARITY_SHARDS: usize = 2;
pub const TOTAL_SHARDS: usize = DATA_SHARDS + PARITY_SHARDS;

/// Streaming window size (5 MiB, the S3 multipart part size)
pub const DEFAULT_WINDOW_SIZE: usize = 5 * 1024 * 1024;
