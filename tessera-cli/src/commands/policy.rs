//! Policy Commands
//!
//! Show and edit per-principal geo-fencing.

use crate::symbols;
use anyhow::{Context, Result};
use console::style;
use tessera_core::model::{Policy, Principal};
use tessera_engine::Engine;

pub async fn show(engine: &Engine, principal_id: &str) -> Result<()> {
    let policy = engine
        .policies
        .get(principal_id)
        .await
        .context("Failed to load policy")?;
    print_policy(&policy);
    Ok(())
}

pub async fn set(
    engine: &Engine,
    actor: &Principal,
    principal_id: &str,
    regions: Vec<String>,
) -> Result<()> {
    let policy = engine
        .policies
        .set_blocked_regions(actor, principal_id, regions)
        .await
        .context("Failed to update policy")?;
    println!("{} Policy updated", style(symbols::CHECK).green());
    print_policy(&policy);
    Ok(())
}

fn print_policy(policy: &Policy) {
    println!("{}", style(format!("Policy for {}", policy.principal)).bold());
    if policy.blocked_regions.is_empty() {
        println!("  Blocked regions: {}", style("none").dim());
    } else {
        println!("  Blocked regions:");
        for region in &policy.blocked_regions {
            println!("    - {}", style(region).red());
        }
    }
}
