//! Engine configuration
//!
//! Configuration loaded from environment variables, falling back to the
//! reference 4+2 layout with 5 MiB streaming windows.

use std::time::Duration;
use tessera_core::crypto::BLOCK_SIZE;
use tessera_core::erasure::ErasureConfig;
use tessera_core::error::{Result, TesseraError};
use tessera_core::{DATA_SHARDS, DEFAULT_WINDOW_SIZE, PARITY_SHARDS};
use tessera_storage::TransportConfig;

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Data shards per file (k)
    pub data_shards: usize,

    /// Parity shards per file (m)
    pub parity_shards: usize,

    /// Deadline for a single transport call in seconds
    pub transport_timeout_secs: u64,

    /// Extra attempts for a failed shard put
    pub put_retries: u32,

    /// Ciphertext bytes per streaming window
    pub stream_window_size: usize,

    /// Files repaired concurrently by a bulk repair pass
    pub repair_concurrency: usize,

    /// Replication factor analytics compares the erasure footprint against
    pub replication_baseline: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_shards: DATA_SHARDS,
            parity_shards: PARITY_SHARDS,
            transport_timeout_secs: 30,
            put_retries: 2,
            stream_window_size: DEFAULT_WINDOW_SIZE,
            repair_concurrency: 4,
            replication_baseline: 3,
        }
    }
}

impl EngineConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let config = Self {
            data_shards: env_or("TESSERA_DATA_SHARDS", defaults.data_shards),
            parity_shards: env_or("TESSERA_PARITY_SHARDS", defaults.parity_shards),
            transport_timeout_secs: env_or(
                "TESSERA_TRANSPORT_TIMEOUT_SECS",
                defaults.transport_timeout_secs,
            ),
            put_retries: env_or("TESSERA_PUT_RETRIES", defaults.put_retries),
            stream_window_size: env_or("TESSERA_STREAM_WINDOW_BYTES", defaults.stream_window_size),
            repair_concurrency: env_or("TESSERA_REPAIR_CONCURRENCY", defaults.repair_concurrency),
            replication_baseline: env_or(
                "TESSERA_REPLICATION_BASELINE",
                defaults.replication_baseline,
            ),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject layouts the codec or the stream windowing cannot handle
    pub fn validate(&self) -> Result<()> {
        ErasureConfig::new(self.data_shards, self.parity_shards)?;

        if self.stream_window_size == 0 || self.stream_window_size % BLOCK_SIZE != 0 {
            return Err(TesseraError::Configuration(format!(
                "stream window size {} must be a positive multiple of {}",
                self.stream_window_size, BLOCK_SIZE
            )));
        }
        if self.repair_concurrency == 0 {
            return Err(TesseraError::Configuration(
                "repair concurrency must be > 0".to_string(),
            ));
        }
        if self.transport_timeout_secs == 0 {
            return Err(TesseraError::Configuration(
                "transport timeout must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Erasure layout
    pub fn erasure(&self) -> Result<ErasureConfig> {
        ErasureConfig::new(self.data_shards, self.parity_shards)
    }

    /// Get transport timeout as Duration
    pub fn transport_timeout(&self) -> Duration {
        Duration::from_secs(self.transport_timeout_secs)
    }

    /// Limits for `GuardedTransport`
    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            timeout: self.transport_timeout(),
            put_retries: self.put_retries,
            ..TransportConfig::default()
        }
    }
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.data_shards, 4);
        assert_eq!(config.parity_shards, 2);
        assert_eq!(config.stream_window_size, 5 * 1024 * 1024);
        assert_eq!(config.transport_timeout(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad_window = EngineConfig {
            stream_window_size: 1000,
            ..Default::default()
        };
        assert!(bad_window.validate().is_err());

        let no_parity = EngineConfig {
            parity_shards: 0,
            ..Default::default()
        };
        assert!(no_parity.validate().is_err());

        let no_workers = EngineConfig {
            repair_concurrency: 0,
            ..Default::default()
        };
        assert!(no_workers.validate().is_err());
    }

    #[test]
    fn test_transport_limits() {
        let config = EngineConfig {
            transport_timeout_secs: 5,
            put_retries: 0,
            ..Default::default()
        };
        let transport = config.transport();
        assert_eq!(transport.timeout, Duration::from_secs(5));
        assert_eq!(transport.put_retries, 0);
    }

    #[test]
    fn test_env_or_falls_back() {
        assert_eq!(env_or("TESSERA_TEST_UNSET_VARIABLE", 7usize), 7);
    }
}
