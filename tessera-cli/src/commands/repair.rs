//! Repair Command
//!
//! Re-derives missing shards for one file or every file.

use crate::symbols;
use anyhow::{Context, Result};
use console::style;
use tessera_engine::{Engine, RepairReport};
use uuid::Uuid;

/// Repair configuration
pub struct RepairConfig {
    pub file_id: Option<Uuid>,
    pub all: bool,
}

/// Run repair command
pub async fn run(engine: &Engine, config: RepairConfig) -> Result<()> {
    match (config.file_id, config.all) {
        (Some(file_id), false) => {
            let report = engine
                .repair
                .repair(file_id)
                .await
                .with_context(|| format!("Repair of {} failed", file_id))?;
            print_report(&report, None);
        }
        (None, true) => {
            let bulk = engine.repair.repair_all().await.context("Repair pass failed")?;

            for outcome in &bulk.outcomes {
                match &outcome.result {
                    Ok(report) => print_report(report, Some(&outcome.filename)),
                    Err(e) => println!(
                        "{} {} ({}): {}",
                        style(symbols::CROSS).red(),
                        outcome.filename,
                        outcome.file_id,
                        e
                    ),
                }
            }

            println!("\n{}", style("Repair Summary:").bold());
            println!("  {} files checked", bulk.outcomes.len());
            println!("  {} files repaired", style(bulk.files_repaired()).green());
            println!("  {} shards restored", style(bulk.shards_restored()).green());
            let failures = bulk.failures().count();
            if failures > 0 {
                println!("  {} files failed", style(failures).red());
            }
        }
        _ => anyhow::bail!("Specify a file ID or --all"),
    }

    Ok(())
}

fn print_report(report: &RepairReport, filename: Option<&str>) {
    let label = match filename {
        Some(name) => format!("{} ({})", name, report.file_id),
        None => report.file_id.to_string(),
    };

    if report.is_clean() {
        println!(
            "{} {}: {} shards healthy",
            style(symbols::CHECK).green(),
            label,
            report.healthy
        );
        return;
    }

    println!(
        "{} {}: {} healthy, {} restored in place, {} migrated",
        style(symbols::WARN).yellow(),
        label,
        report.healthy,
        report.restored,
        report.migrated
    );
    for relocation in &report.relocations {
        println!(
            "    shard {}: {} -> {}",
            relocation.shard_index, relocation.from, relocation.to
        );
    }
}
