//! Download Command
//!
//! Reassembles and decrypts a stored file to local disk.

use super::format_bytes;
use crate::symbols;
use anyhow::{Context, Result};
use console::style;
use std::path::{Path, PathBuf};
use tessera_core::model::Principal;
use tessera_engine::Engine;
use tokio::fs;
use uuid::Uuid;

/// Download configuration
pub struct DownloadConfig {
    pub file_id: Uuid,
    /// Output path; defaults to the stored filename in the current directory
    pub output: Option<PathBuf>,
    /// Overwrite an existing output file
    pub force: bool,
}

/// Final path component of a stored filename
///
/// Stored names come from other principals' uploads, so directory parts
/// and `..` never reach the local path. Falls back to the file id.
fn local_file_name(stored: &str, id: Uuid) -> String {
    // Names uploaded from Windows hosts carry backslash separators
    let last = stored.rsplit(['/', '\\']).next().unwrap_or(stored);
    Path::new(last)
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| id.to_string())
}

/// Run download command
pub async fn run(engine: &Engine, principal: &Principal, config: DownloadConfig) -> Result<()> {
    let record = engine
        .files
        .describe(principal, config.file_id)
        .await
        .context("Failed to look up file")?;

    let local_name = local_file_name(&record.filename, record.id);
    let output = match config.output {
        Some(path) if path.is_dir() => path.join(&local_name),
        Some(path) => path,
        None => PathBuf::from(&local_name),
    };
    if output.exists() && !config.force {
        anyhow::bail!(
            "{} already exists; use --force to overwrite",
            output.display()
        );
    }

    let mut file = fs::File::create(&output)
        .await
        .with_context(|| format!("Failed to create {}", output.display()))?;

    if let Err(e) = engine
        .files
        .download_to(principal, config.file_id, &mut file)
        .await
    {
        drop(file);
        // Do not leave partial plaintext behind
        let _ = fs::remove_file(&output).await;
        return Err(e).context("Download failed");
    }

    println!(
        "{} Downloaded {} to {} ({})",
        style(symbols::CHECK).green(),
        record.filename,
        output.display(),
        format_bytes(record.size)
    );

    Ok(())
}
