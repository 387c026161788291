//! CLI configuration
//!
//! Config directory: ~/.tessera/ (cross-platform)
//!
//! Config file format (~/.tessera/config.toml):
//! ```toml
//! [storage]
//! metadata_path = "/home/alice/.tessera/metadata"
//!
//! [erasure]
//! data_shards = 4
//! parity_shards = 2
//!
//! [transport]
//! timeout_secs = 30
//! put_retries = 2
//!
//! [principal]
//! id = "alice"
//! admin = false
//! ```
//!
//! Every value falls back to a `TESSERA_*` environment variable, then to
//! the engine default.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tessera_core::model::Principal;
use tessera_engine::EngineConfig;

/// Structure of ~/.tessera/config.toml
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct TesseraConfig {
    #[serde(default)]
    pub storage: StorageSettings,

    #[serde(default)]
    pub erasure: ErasureSettings,

    #[serde(default)]
    pub transport: TransportSettings,

    #[serde(default)]
    pub principal: PrincipalSettings,
}

/// Local metadata database
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct StorageSettings {
    /// Sled database directory; ~/.tessera/metadata when unset
    #[serde(default)]
    pub metadata_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErasureSettings {
    #[serde(default = "default_data_shards")]
    pub data_shards: usize,

    #[serde(default = "default_parity_shards")]
    pub parity_shards: usize,
}

impl Default for ErasureSettings {
    fn default() -> Self {
        Self {
            data_shards: default_data_shards(),
            parity_shards: default_parity_shards(),
        }
    }
}

fn default_data_shards() -> usize {
    EngineConfig::from_env()
        .map(|c| c.data_shards)
        .unwrap_or(tessera_core::DATA_SHARDS)
}

fn default_parity_shards() -> usize {
    EngineConfig::from_env()
        .map(|c| c.parity_shards)
        .unwrap_or(tessera_core::PARITY_SHARDS)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransportSettings {
    /// Deadline for a single provider call
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Extra attempts for a failed shard put
    #[serde(default = "default_put_retries")]
    pub put_retries: u32,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            put_retries: default_put_retries(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    EngineConfig::from_env()
        .map(|c| c.transport_timeout_secs)
        .unwrap_or(30)
}

fn default_put_retries() -> u32 {
    EngineConfig::from_env().map(|c| c.put_retries).unwrap_or(2)
}

/// Identity the CLI acts as
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrincipalSettings {
    #[serde(default = "default_principal_id")]
    pub id: String,

    #[serde(default)]
    pub admin: bool,
}

impl Default for PrincipalSettings {
    fn default() -> Self {
        Self {
            id: default_principal_id(),
            admin: false,
        }
    }
}

fn default_principal_id() -> String {
    std::env::var("TESSERA_PRINCIPAL")
        .or_else(|_| std::env::var("USER"))
        .unwrap_or_else(|_| "default".to_string())
}

impl TesseraConfig {
    /// Engine configuration: file values over environment over defaults
    pub fn engine_config(&self) -> Result<EngineConfig> {
        let base = EngineConfig::from_env().unwrap_or_default();
        let config = EngineConfig {
            data_shards: self.erasure.data_shards,
            parity_shards: self.erasure.parity_shards,
            transport_timeout_secs: self.transport.timeout_secs,
            put_retries: self.transport.put_retries,
            ..base
        };
        config.validate().context("Invalid engine configuration")?;
        Ok(config)
    }

    pub fn principal(&self) -> Principal {
        if self.principal.admin {
            Principal::admin(self.principal.id.clone())
        } else {
            Principal::user(self.principal.id.clone())
        }
    }

    /// Metadata database directory
    pub fn metadata_path(&self) -> Result<PathBuf> {
        match &self.storage.metadata_path {
            Some(path) => Ok(path.clone()),
            None => Ok(config_dir()?.join("metadata")),
        }
    }
}

/// Get the config directory path (~/.tessera/)
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    let config_dir = home.join(".tessera");

    if !config_dir.exists() {
        fs::create_dir_all(&config_dir).context("Failed to create config directory ~/.tessera/")?;
    }

    Ok(config_dir)
}

pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Load configuration, falling back to defaults if the file doesn't exist
pub fn load_config() -> TesseraConfig {
    match config_file_path() {
        Ok(path) if path.exists() => match fs::read_to_string(&path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Warning: Failed to parse config file: {}", e);
                    TesseraConfig::default()
                }
            },
            Err(e) => {
                eprintln!("Warning: Failed to read config file: {}", e);
                TesseraConfig::default()
            }
        },
        _ => TesseraConfig::default(),
    }
}

pub fn save_config(config: &TesseraConfig) -> Result<()> {
    let path = config_file_path()?;
    let content = toml::to_string_pretty(config).context("Failed to serialize config")?;
    fs::write(&path, content).context("Failed to write config file")?;
    Ok(())
}

/// Apply a `section.key = value` assignment
pub fn set_value(config: &mut TesseraConfig, key: &str, value: &str) -> Result<()> {
    match key {
        "storage.metadata_path" => config.storage.metadata_path = Some(PathBuf::from(value)),
        "erasure.data_shards" => config.erasure.data_shards = parse(key, value)?,
        "erasure.parity_shards" => config.erasure.parity_shards = parse(key, value)?,
        "transport.timeout_secs" => config.transport.timeout_secs = parse(key, value)?,
        "transport.put_retries" => config.transport.put_retries = parse(key, value)?,
        "principal.id" => config.principal.id = value.to_string(),
        "principal.admin" => config.principal.admin = parse(key, value)?,
        _ => anyhow::bail!(
            "Unknown config key: {}. Valid keys: storage.metadata_path, erasure.data_shards, \
             erasure.parity_shards, transport.timeout_secs, transport.put_retries, \
             principal.id, principal.admin",
            key
        ),
    }
    Ok(())
}

fn parse<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .parse()
        .with_context(|| format!("Invalid value for {}: {}", key, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: TesseraConfig = toml::from_str(
            r#"
            [principal]
            id = "alice"
            admin = true
            "#,
        )
        .unwrap();

        assert_eq!(config.principal.id, "alice");
        assert!(config.principal().is_admin());
        assert_eq!(config.erasure, ErasureSettings::default());
        assert!(config.storage.metadata_path.is_none());
    }

    #[test]
    fn test_config_serialization() {
        let config = TesseraConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();

        assert!(toml_str.contains("[erasure]"));
        assert!(toml_str.contains("[transport]"));
        assert!(toml_str.contains("[principal]"));
        assert_eq!(toml::from_str::<TesseraConfig>(&toml_str).unwrap(), config);
    }

    #[test]
    fn test_engine_config_from_file_values() {
        let mut config = TesseraConfig::default();
        config.erasure.data_shards = 6;
        config.erasure.parity_shards = 3;
        config.transport.timeout_secs = 5;

        let engine = config.engine_config().unwrap();
        assert_eq!(engine.data_shards, 6);
        assert_eq!(engine.parity_shards, 3);
        assert_eq!(engine.transport_timeout_secs, 5);

        config.erasure.data_shards = 0;
        assert!(config.engine_config().is_err());
    }

    #[test]
    fn test_set_value() {
        let mut config = TesseraConfig::default();
        set_value(&mut config, "principal.id", "bob").unwrap();
        set_value(&mut config, "principal.admin", "true").unwrap();
        set_value(&mut config, "transport.put_retries", "5").unwrap();

        assert_eq!(config.principal.id, "bob");
        assert!(config.principal.admin);
        assert_eq!(config.transport.put_retries, 5);

        assert!(set_value(&mut config, "erasure.data_shards", "many").is_err());
        assert!(set_value(&mut config, "nope", "1").is_err());
    }
}
