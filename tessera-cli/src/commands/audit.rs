//! Audit Command
//!
//! Shows the most recent audit events, newest first.

use super::truncate;
use anyhow::{Context, Result};
use console::style;
use tessera_core::model::Severity;
use tessera_engine::Engine;

pub fn run(engine: &Engine, limit: usize) -> Result<()> {
    let records = engine.audit_log(limit).context("Failed to read audit log")?;

    if records.is_empty() {
        println!("{} No audit events recorded", style("Info:").cyan());
        return Ok(());
    }

    for record in &records {
        let severity = match record.severity {
            Severity::Info => style(record.severity.to_string()).dim(),
            Severity::Success => style(record.severity.to_string()).green(),
            Severity::Warning => style(record.severity.to_string()).yellow(),
            Severity::Critical => style(record.severity.to_string()).red().bold(),
        };
        println!(
            "{}  {:<8} {:<20} {:<12} {}",
            record.timestamp.format("%Y-%m-%d %H:%M:%S"),
            severity,
            record.action.to_string(),
            truncate(&record.principal, 12),
            record.details
        );
    }
    Ok(())
}
