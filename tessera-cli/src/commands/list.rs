//! List and Show Commands
//!
//! Lists stored files, or shows one file's shard placement.

use super::{format_bytes, truncate};
use crate::symbols;
use anyhow::{Context, Result};
use console::style;
use std::collections::HashMap;
use tessera_core::model::{Principal, ShardStatus};
use tessera_engine::Engine;
use uuid::Uuid;

/// List configuration
pub struct ListConfig {
    pub long_format: bool,
    pub human_readable: bool,
}

/// Run list command
pub async fn run(engine: &Engine, principal: &Principal, config: ListConfig) -> Result<()> {
    let files = engine
        .files
        .list(principal)
        .await
        .context("Failed to list files")?;

    if files.is_empty() {
        println!("{} No files stored", style("Info:").cyan());
        return Ok(());
    }

    if config.long_format {
        println!(
            "{:<36}  {:<28} {:>12} {:>7}  {:<12} {}",
            style("ID").bold(),
            style("NAME").bold(),
            style("SIZE").bold(),
            style("WINDOWS").bold(),
            style("OWNER").bold(),
            style("UPLOADED").bold()
        );
        println!("{}", "-".repeat(symbols::RULE_WIDTH + 24));
    }

    let mut total_size: u64 = 0;
    for file in &files {
        total_size += file.size;

        if config.long_format {
            let size = if config.human_readable {
                format_bytes(file.size)
            } else {
                file.size.to_string()
            };
            println!(
                "{:<36}  {:<28} {:>12} {:>7}  {:<12} {}",
                file.id,
                truncate(&file.filename, 28),
                size,
                file.window_count(),
                truncate(&file.owner, 12),
                file.created_at.format("%Y-%m-%d %H:%M:%S")
            );
        } else {
            println!("{}  {}", file.id, file.filename);
        }
    }

    if config.long_format {
        println!("{}", "-".repeat(symbols::RULE_WIDTH + 24));
        println!(
            "{} files, {} total",
            style(files.len()).green(),
            if config.human_readable {
                format_bytes(total_size)
            } else {
                format!("{} bytes", total_size)
            }
        );
    }

    Ok(())
}

/// Show one file and where each of its shards lives
pub async fn show(engine: &Engine, principal: &Principal, file_id: Uuid) -> Result<()> {
    let record = engine
        .files
        .describe(principal, file_id)
        .await
        .context("Failed to look up file")?;
    let providers: HashMap<Uuid, String> = engine
        .providers
        .list()
        .await
        .context("Failed to list providers")?
        .into_iter()
        .map(|p| (p.id, p.name))
        .collect();

    println!("{}", style(&record.filename).bold().underlined());
    println!();
    println!("  ID:        {}", record.id);
    println!("  Owner:     {}", record.owner);
    println!("  Size:      {} ({} bytes)", format_bytes(record.size), record.size);
    println!("  Encrypted: {} bytes in {} window(s)", record.encrypted_size(), record.window_count());
    println!("  Uploaded:  {}", record.created_at.to_rfc3339());
    println!();
    println!(
        "  {:<6} {:<24} {:<28} {}",
        style("SHARD").bold(),
        style("PROVIDER").bold(),
        style("BUCKET").bold(),
        style("STATUS").bold()
    );

    for shard in &record.shards {
        let provider = providers
            .get(&shard.provider_id)
            .map(String::as_str)
            .unwrap_or("(unregistered)");
        let status = match shard.status {
            ShardStatus::Alive => style(shard.status.to_string()).green(),
            ShardStatus::Migrated => style(shard.status.to_string()).cyan(),
            ShardStatus::Missing => style(shard.status.to_string()).red(),
        };
        println!(
            "  {:<6} {:<24} {:<28} {}",
            shard.index,
            truncate(provider, 24),
            truncate(&shard.bucket, 28),
            status
        );
    }

    Ok(())
}
