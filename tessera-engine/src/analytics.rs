//! Storage footprint analytics
//!
//! Compares the raw footprint of erasure coding (`size * (k + m) / k`)
//! against plain N-way replication of the same files.

use crate::context::EngineContext;
use serde::Serialize;
use tessera_core::erasure::ErasureConfig;
use tessera_core::error::Result;
use tessera_core::model::FileRecord;

/// Aggregate storage figures over all files
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageReport {
    pub file_count: usize,
    /// Plaintext bytes stored
    pub total_bytes: u64,
    /// Raw bytes consumed across providers with erasure coding
    pub erasure_footprint_bytes: u64,
    /// Raw bytes the same files would consume with replication
    pub replication_footprint_bytes: u64,
    pub replication_factor: u32,
    pub bytes_saved: u64,
    pub saving_percent: f64,
    pub expansion_factor: f64,
}

impl StorageReport {
    /// Summarize files under a given layout and replication baseline
    pub fn summarize(files: &[FileRecord], erasure: ErasureConfig, replication_factor: u32) -> Self {
        let total_bytes: u64 = files.iter().map(|f| f.size).sum();
        let expansion_factor = erasure.expansion_factor();

        let erasure_footprint_bytes = (total_bytes as f64 * expansion_factor).round() as u64;
        let replication_footprint_bytes = total_bytes.saturating_mul(replication_factor as u64);
        let bytes_saved = replication_footprint_bytes.saturating_sub(erasure_footprint_bytes);
        let saving_percent = if replication_footprint_bytes == 0 {
            0.0
        } else {
            bytes_saved as f64 / replication_footprint_bytes as f64 * 100.0
        };

        Self {
            file_count: files.len(),
            total_bytes,
            erasure_footprint_bytes,
            replication_footprint_bytes,
            replication_factor,
            bytes_saved,
            saving_percent,
            expansion_factor,
        }
    }
}

#[derive(Clone)]
pub struct StorageAnalytics {
    ctx: EngineContext,
}

impl StorageAnalytics {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    pub async fn compute(&self) -> Result<StorageReport> {
        let files = self.ctx.files.find_all().await?;
        Ok(StorageReport::summarize(
            &files,
            self.ctx.config.erasure()?,
            self.ctx.config.replication_baseline,
        ))
    }
}
