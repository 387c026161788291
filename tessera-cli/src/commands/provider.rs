//! Provider Commands
//!
//! Register, list and retire storage providers.

use super::truncate;
use crate::symbols;
use anyhow::{bail, Context, Result};
use console::style;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tessera_core::model::{Credentials, Principal, ProviderKind};
use tessera_engine::{Engine, NewProvider};
use uuid::Uuid;

/// Provider registration arguments
pub struct AddConfig {
    pub name: String,
    pub kind: ProviderKind,
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
}

pub async fn add(engine: &Engine, principal: &Principal, config: AddConfig) -> Result<()> {
    let provider = engine
        .providers
        .add(
            principal,
            NewProvider {
                name: config.name,
                kind: config.kind,
                endpoint_url: config.endpoint,
                region: config.region,
                bucket: config.bucket,
                credentials: Credentials {
                    access_key: config.access_key,
                    secret_key: config.secret_key,
                },
            },
        )
        .await
        .context("Failed to add provider")?;

    println!(
        "{} Added {} provider {} ({})",
        style(symbols::CHECK).green(),
        provider.kind,
        style(&provider.name).bold(),
        provider.id
    );
    Ok(())
}

/// Provider list file for `provider import`
///
/// ```toml
/// [[provider]]
/// name = "aws-frankfurt"
/// kind = "aws"
/// region = "eu-central-1"
/// bucket = "tessera-shards"
/// access_key = "AKIA..."
/// secret_key = "..."
/// ```
#[derive(Debug, Deserialize)]
struct ProviderFile {
    #[serde(default, rename = "provider")]
    providers: Vec<ProviderEntry>,
}

#[derive(Debug, Deserialize)]
struct ProviderEntry {
    name: String,
    #[serde(default = "default_kind")]
    kind: ProviderKind,
    #[serde(default)]
    endpoint: String,
    region: String,
    bucket: String,
    access_key: String,
    secret_key: String,
}

fn default_kind() -> ProviderKind {
    ProviderKind::Generic
}

impl From<ProviderEntry> for NewProvider {
    fn from(entry: ProviderEntry) -> Self {
        NewProvider {
            name: entry.name,
            kind: entry.kind,
            endpoint_url: entry.endpoint,
            region: entry.region,
            bucket: entry.bucket,
            credentials: Credentials {
                access_key: entry.access_key,
                secret_key: entry.secret_key,
            },
        }
    }
}

fn parse_provider_file(content: &str) -> Result<Vec<NewProvider>> {
    let file: ProviderFile = toml::from_str(content).context("Invalid provider file")?;
    Ok(file.providers.into_iter().map(NewProvider::from).collect())
}

pub async fn import(engine: &Engine, principal: &Principal, path: &Path) -> Result<()> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let requests = parse_provider_file(&content)?;
    if requests.is_empty() {
        println!("{} No providers listed in {}", style("Info:").cyan(), path.display());
        return Ok(());
    }

    let report = engine.providers.add_many(principal, requests).await;
    for registration in &report.registrations {
        match &registration.result {
            Ok(provider) => println!(
                "{} {} ({})",
                style(symbols::CHECK).green(),
                style(&provider.name).bold(),
                provider.id
            ),
            Err(e) => println!(
                "{} {}: {}",
                style(symbols::CROSS).red(),
                style(&registration.name).bold(),
                e
            ),
        }
    }

    let added = report.added().count();
    let rejected = report.failures().count();
    println!("\nAdded {} of {} providers", added, added + rejected);
    if added == 0 {
        bail!("No providers were added");
    }
    Ok(())
}

pub async fn list(engine: &Engine) -> Result<()> {
    let providers = engine
        .providers
        .list()
        .await
        .context("Failed to list providers")?;

    if providers.is_empty() {
        println!("{} No providers registered", style("Info:").cyan());
        return Ok(());
    }

    println!(
        "{:<36}  {:<20} {:<8} {:<16} {:<24} {}",
        style("ID").bold(),
        style("NAME").bold(),
        style("KIND").bold(),
        style("REGION").bold(),
        style("BUCKET").bold(),
        style("STATE").bold()
    );
    println!("{}", "-".repeat(symbols::RULE_WIDTH + 24));

    for provider in &providers {
        let state = if provider.enabled {
            style("enabled").green()
        } else {
            style("disabled").yellow()
        };
        println!(
            "{:<36}  {:<20} {:<8} {:<16} {:<24} {}",
            provider.id,
            truncate(&provider.name, 20),
            provider.kind,
            truncate(&provider.region, 16),
            truncate(&provider.bucket, 24),
            state
        );
    }
    Ok(())
}

pub async fn remove(engine: &Engine, principal: &Principal, id: Uuid, force: bool) -> Result<()> {
    let provider = engine.providers.get(id).await.context("Failed to look up provider")?;

    if !force {
        println!(
            "{} About to remove provider {} ({})",
            style("Warning:").yellow(),
            provider.name,
            provider.id
        );
        println!("  Shards stored there will be migrated by the next repair.");
        println!("\nUse --force to remove without confirmation.");
        return Ok(());
    }

    engine
        .providers
        .remove(principal, id)
        .await
        .context("Failed to remove provider")?;
    println!(
        "{} Removed provider {}. Run '{}' to migrate its shards.",
        style(symbols::CHECK).green(),
        provider.name,
        style("tessera repair --all").green()
    );
    Ok(())
}

pub async fn set_enabled(
    engine: &Engine,
    principal: &Principal,
    id: Uuid,
    enabled: bool,
) -> Result<()> {
    let provider = engine
        .providers
        .set_enabled(principal, id, enabled)
        .await
        .context("Failed to update provider")?;
    println!(
        "{} Provider {} {}",
        style(symbols::CHECK).green(),
        provider.name,
        if enabled { "enabled" } else { "disabled" }
    );
    Ok(())
}
