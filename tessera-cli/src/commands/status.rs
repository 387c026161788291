//! Health and Analytics Commands
//!
//! Provider reachability and storage efficiency.

use super::{format_bytes, truncate};
use crate::symbols;
use anyhow::{Context, Result};
use console::style;
use tessera_engine::Engine;
use tessera_storage::ProviderHealth;

/// Run health command
pub async fn health(engine: &Engine) -> Result<()> {
    let health = engine
        .health
        .check_all()
        .await
        .context("Failed to check provider health")?;

    println!("{}", style("Tessera Provider Health").bold().underlined());
    println!();

    if health.providers.is_empty() {
        println!(
            "{} No providers registered. Run '{}' to add one.",
            style("Info:").cyan(),
            style("tessera provider add").green()
        );
        return Ok(());
    }

    for status in &health.providers {
        let dot = match &status.health {
            ProviderHealth::Online => style(symbols::DOT).green(),
            ProviderHealth::BucketMissing => style(symbols::DOT).yellow(),
            ProviderHealth::Offline(_) => style(symbols::DOT).red(),
        };
        let enabled = if status.enabled { "" } else { " (disabled)" };
        println!(
            "  {} {:<24} {:<16} {}{}",
            dot,
            truncate(&status.name, 24),
            status.region,
            status.health,
            style(enabled).dim()
        );
    }

    println!();
    println!(
        "  {} online, {} bucket missing, {} offline",
        style(health.online()).green(),
        style(health.bucket_missing()).yellow(),
        style(health.offline()).red()
    );
    println!(
        "  Checked at {}",
        health.checked_at.format("%Y-%m-%d %H:%M:%S UTC")
    );

    Ok(())
}

/// Run analytics command
pub async fn analytics(engine: &Engine, json: bool) -> Result<()> {
    let report = engine
        .analytics
        .compute()
        .await
        .context("Failed to compute analytics")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}", style("Storage Analytics").bold().underlined());
    println!();
    println!("  Files:                {}", style(report.file_count).cyan());
    println!("  Stored data:          {}", style(format_bytes(report.total_bytes)).cyan());
    println!(
        "  Erasure footprint:    {} ({:.2}x)",
        format_bytes(report.erasure_footprint_bytes),
        report.expansion_factor
    );
    println!(
        "  {}x replication:      {}",
        report.replication_factor,
        format_bytes(report.replication_footprint_bytes)
    );
    println!(
        "  Saved:                {} ({:.1}%)",
        style(format_bytes(report.bytes_saved)).green(),
        report.saving_percent
    );

    Ok(())
}
