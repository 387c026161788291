//! Delete Command
//!
//! Deletes a file's shards and its metadata.

use super::format_bytes;
use crate::symbols;
use anyhow::{Context, Result};
use console::style;
use tessera_core::model::Principal;
use tessera_engine::Engine;
use uuid::Uuid;

/// Delete configuration
pub struct DeleteConfig {
    pub file_id: Uuid,
    pub force: bool,
}

/// Run delete command
pub async fn run(engine: &Engine, principal: &Principal, config: DeleteConfig) -> Result<()> {
    let record = engine
        .files
        .describe(principal, config.file_id)
        .await
        .context("Failed to look up file")?;

    if !config.force {
        println!(
            "{} About to delete: {} ({})",
            style("Warning:").yellow(),
            record.filename,
            record.id
        );
        println!("  Size:     {}", format_bytes(record.size));
        println!("  Uploaded: {}", record.created_at.to_rfc3339());
        println!("\nUse --force to delete without confirmation.");
        return Ok(());
    }

    engine
        .files
        .delete(principal, config.file_id)
        .await
        .context("Failed to delete file")?;

    println!(
        "{} Deleted: {} ({})",
        style(symbols::CHECK).green(),
        record.filename,
        record.id
    );

    Ok(())
}
