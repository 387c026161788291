//! Upload Command
//!
//! Encrypts, shards and uploads a local file.

use super::format_bytes;
use crate::symbols;
use anyhow::{Context, Result};
use bytes::Bytes;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;
use tessera_core::model::Principal;
use tessera_engine::Engine;
use tokio::fs;

/// Upload configuration
pub struct UploadConfig {
    pub path: String,
    /// Stored filename; defaults to the path's file name
    pub name: Option<String>,
    /// Read in fixed-size windows instead of loading the whole file
    pub stream: bool,
}

/// Run upload command
pub async fn run(engine: &Engine, principal: &Principal, config: UploadConfig) -> Result<()> {
    let path = Path::new(&config.path);
    if !path.is_file() {
        anyhow::bail!("Not a file: {}", config.path);
    }

    let filename = match config.name {
        Some(name) => name,
        None => path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .context("Path has no usable file name; pass --name")?,
    };

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner.set_message(format!("Uploading {}", filename));

    let uploaded = if config.stream {
        let file = fs::File::open(path)
            .await
            .with_context(|| format!("Failed to open {}", path.display()))?;
        engine.files.upload_stream(principal, &filename, file).await
    } else {
        let data = fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        engine
            .files
            .upload(principal, &filename, Bytes::from(data))
            .await
    };

    let record = match uploaded {
        Ok(record) => record,
        Err(e) => {
            spinner.finish_and_clear();
            return Err(e).context("Upload failed");
        }
    };

    spinner.finish_with_message(format!(
        "{} Uploaded {} ({})",
        style(symbols::CHECK).green(),
        record.filename,
        format_bytes(record.size)
    ));

    println!(
        "\n{} {}\n  File ID: {}\n  Size:    {} bytes\n  Shards:  {} in {} window(s)",
        style("Successfully uploaded:").green().bold(),
        record.filename,
        style(record.id).cyan(),
        record.size,
        record.shards.len(),
        record.window_count()
    );

    Ok(())
}
