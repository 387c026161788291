//! Durability metrics
//!
//! Recorded through the `metrics` facade; the embedding process decides
//! whether and where a recorder is installed.

use metrics::{counter, histogram};

/// Shard object written to a provider
pub fn record_shard_written(provider: &str) {
    counter!("tessera_shards_written_total", "provider" => provider.to_string()).increment(1);
}

/// Shard found absent on its recorded provider
pub fn record_shard_missing(provider: &str) {
    counter!("tessera_shards_missing_total", "provider" => provider.to_string()).increment(1);
}

/// Shard re-uploaded to its recorded provider
pub fn record_shard_restored() {
    counter!("tessera_shards_restored_total").increment(1);
}

/// Shard relocated to a spare provider
pub fn record_shard_migrated() {
    counter!("tessera_shards_migrated_total").increment(1);
}

/// Plaintext bytes accepted by an upload
pub fn record_bytes_uploaded(bytes: u64) {
    counter!("tessera_bytes_uploaded_total").increment(bytes);
}

/// Plaintext bytes returned by a download
pub fn record_bytes_downloaded(bytes: u64) {
    counter!("tessera_bytes_downloaded_total").increment(bytes);
}

/// Wall time of one file's repair pass
pub fn record_repair_duration(duration_secs: f64) {
    histogram!("tessera_repair_duration_seconds").record(duration_secs);
}
