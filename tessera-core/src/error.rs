//! Error types for Tessera
//!
//! Provides a unified error type for all Tessera operations.

use thiserror::Error;
use uuid::Uuid;

/// Result type alias for Tessera operations
pub type Result<T> = std::result::Result<T, TesseraError>;

/// Unified error type for Tessera
#[derive(Error, Debug)]
pub enum TesseraError {
    // ===== Erasure Coding Errors =====
    #[error("Erasure coding error: {0}")]
    ErasureCoding(String),

    #[error("Insufficient shards: have {available}, need {required}")]
    InsufficientShards { available: usize, required: usize },

    #[error("Shard size mismatch: expected {expected}, got {actual}")]
    ShardSizeMismatch { expected: usize, actual: usize },

    #[error("Invalid shard index: {index} (max: {max})")]
    InvalidShardIndex { index: usize, max: usize },

    // ===== Durability Errors =====
    #[error("Critical data loss for file {file_id}: retrieved {available} shards, need {required}")]
    CriticalDataLoss {
        file_id: Uuid,
        available: usize,
        required: usize,
    },

    #[error("Upload blocked: no storage provider is allowed for principal {principal}")]
    UploadBlocked { principal: String },

    #[error("Connection to provider {provider} failed: {message}")]
    Connection { provider: String, message: String },

    #[error("No spare provider available to relocate shard {shard_index} of file {file_id}")]
    CriticalCapacityExhausted { file_id: Uuid, shard_index: u8 },

    // ===== Access Errors =====
    #[error("Access denied: {principal} may not access file {file_id}")]
    AccessDenied { principal: String, file_id: Uuid },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ===== Cryptography Errors =====
    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Decryption error: {0}")]
    Decryption(String),

    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    // ===== Storage Errors =====
    #[error("Storage error: {0}")]
    Storage(String),

    // ===== I/O Errors =====
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // ===== Serialization Errors =====
    #[error("Serialization error: {0}")]
    Serialization(String),

    // ===== Configuration Errors =====
    #[error("Configuration error: {0}")]
    Configuration(String),

    // ===== Generic Errors =====
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TesseraError {
    /// Build a connection error for the named provider
    pub fn connection(provider: impl Into<String>, message: impl std::fmt::Display) -> Self {
        TesseraError::Connection {
            provider: provider.into(),
            message: message.to_string(),
        }
    }
}

impl From<reed_solomon_erasure::Error> for TesseraError {
    fn from(err: reed_solomon_erasure::Error) -> Self {
        TesseraError::ErasureCoding(err.to_string())
    }
}

impl From<bincode::Error> for TesseraError {
    fn from(err: bincode::Error) -> Self {
        TesseraError::Serialization(err.to_string())
    }
}

impl From<base64::DecodeError> for TesseraError {
    fn from(err: base64::DecodeError) -> Self {
        TesseraError::Serialization(format!("invalid base64: {}", err))
    }
}
