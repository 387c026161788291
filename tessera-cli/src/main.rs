//! Tessera CLI
//!
//! Command-line client for the Tessera multi-cloud object store.
//!
//! # Commands
//! - `upload` - Encrypt, shard and upload a file
//! - `download` - Reassemble and decrypt a file
//! - `delete` - Delete a file and its shards
//! - `list` / `show` - List files or show one file's shards
//! - `repair` - Restore missing shards for one or all files
//! - `health` - Probe every registered provider
//! - `analytics` - Storage footprint versus replication
//! - `provider` - Register, import, list, enable, disable and remove providers
//! - `policy` - Show or set blocked regions
//! - `audit` - Recent audit events
//! - `config` - Show or edit configuration
//!
//! # Configuration
//! Config file: ~/.tessera/config.toml
//! Metadata: ~/.tessera/metadata (sled)

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tessera_core::model::{Principal, ProviderKind};
use tessera_engine::{Engine, EngineContext};
use tessera_metadata::{SledStore, TracingAuditSink};
use tessera_storage::{GuardedTransport, S3Transport};
use uuid::Uuid;

mod commands;
mod config;
mod symbols;

use commands::{audit, delete, download, list, policy, provider, repair, status, upload};

#[derive(Parser)]
#[command(name = "tessera")]
#[command(about = "Tessera multi-cloud erasure-coded storage CLI")]
#[command(version)]
struct Cli {
    /// Act as this principal (overrides config file)
    #[arg(long = "as", global = true, env = "TESSERA_PRINCIPAL")]
    principal: Option<String>,

    /// Act with administrator rights (overrides config file)
    #[arg(long, global = true)]
    admin: bool,

    /// Metadata database directory (overrides config file)
    #[arg(long, global = true, env = "TESSERA_METADATA_PATH")]
    metadata_path: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt, shard and upload a file
    Upload {
        /// Path to the local file
        path: String,

        /// Stored filename (defaults to the file name)
        #[arg(short, long)]
        name: Option<String>,

        /// Stream in fixed-size windows instead of loading the file into memory
        #[arg(short, long)]
        stream: bool,
    },

    /// Download and decrypt a file
    Download {
        /// File ID
        file_id: Uuid,

        /// Output path (file or directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Overwrite an existing output file
        #[arg(short, long)]
        force: bool,
    },

    /// Delete a file and its shards
    Delete {
        /// File ID
        file_id: Uuid,

        /// Delete without confirmation
        #[arg(short, long)]
        force: bool,
    },

    /// List stored files
    List {
        /// Show detailed information
        #[arg(short, long)]
        long: bool,

        /// Human-readable sizes
        #[arg(short = 'H', long)]
        human_readable: bool,
    },

    /// Show a file and its shard placement
    Show {
        /// File ID
        file_id: Uuid,
    },

    /// Restore missing shards (administrator)
    Repair {
        /// File ID
        file_id: Option<Uuid>,

        /// Repair every file
        #[arg(long, conflicts_with = "file_id")]
        all: bool,
    },

    /// Probe every registered provider (administrator)
    Health,

    /// Storage footprint compared with replication (administrator)
    Analytics {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage storage providers (administrator)
    Provider {
        #[command(subcommand)]
        command: ProviderCommands,
    },

    /// Show or set geo-fencing policy
    Policy {
        #[command(subcommand)]
        command: PolicyCommands,
    },

    /// Show recent audit events (administrator)
    Audit {
        /// Number of events to show
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },

    /// Show or initialize configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
enum ProviderCommands {
    /// Register a provider after probing it
    Add {
        /// Unique provider name
        name: String,

        /// Backend type: aws, minio, azure, gcs, generic
        #[arg(short, long, default_value = "generic")]
        kind: ProviderKind,

        /// Endpoint URL (empty for the AWS default)
        #[arg(short, long, default_value = "")]
        endpoint: String,

        /// Region tag used for geo-fencing
        #[arg(short, long)]
        region: String,

        /// Bucket shards are written to
        #[arg(short, long)]
        bucket: String,

        /// Access key
        #[arg(long, env = "TESSERA_ACCESS_KEY")]
        access_key: String,

        /// Secret key
        #[arg(long, env = "TESSERA_SECRET_KEY", hide_env_values = true)]
        secret_key: String,
    },

    /// Register every provider listed in a TOML file
    Import {
        /// File of [[provider]] tables
        file: PathBuf,
    },

    /// List providers in registration order
    List,

    /// Unregister a provider
    Remove {
        id: Uuid,

        /// Remove without confirmation
        #[arg(short, long)]
        force: bool,
    },

    /// Include a provider in new placements
    Enable { id: Uuid },

    /// Exclude a provider from new placements
    Disable { id: Uuid },
}

#[derive(Subcommand)]
enum PolicyCommands {
    /// Show a principal's blocked regions
    Show {
        /// Principal (defaults to the current one)
        #[arg(value_name = "PRINCIPAL")]
        target: Option<String>,
    },

    /// Replace a principal's blocked regions
    Set {
        /// Principal (defaults to the current one)
        #[arg(long = "for", value_name = "PRINCIPAL")]
        target: Option<String>,

        /// Regions to block; none clears the policy
        regions: Vec<String>,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Show config file path
    Path,

    /// Initialize config file with defaults
    Init {
        /// Overwrite existing config
        #[arg(short, long)]
        force: bool,
    },

    /// Set a configuration value
    Set {
        /// Configuration key (e.g., principal.id, transport.timeout_secs)
        key: String,
        /// Value to set
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    // Load configuration from ~/.tessera/config.toml
    let mut cfg = config::load_config();

    // CLI args override config file
    if let Some(id) = cli.principal {
        cfg.principal.id = id;
    }
    if cli.admin {
        cfg.principal.admin = true;
    }
    if let Some(path) = cli.metadata_path {
        cfg.storage.metadata_path = Some(path);
    }

    // Config commands must work even when the configuration is invalid
    let command = match cli.command {
        Commands::Config { command } => return handle_config_command(command),
        command => command,
    };

    let principal = cfg.principal();
    let engine = build_engine(&cfg)?;

    match command {
        Commands::Upload { path, name, stream } => {
            let config = upload::UploadConfig { path, name, stream };
            upload::run(&engine, &principal, config).await?;
        }

        Commands::Download {
            file_id,
            output,
            force,
        } => {
            let config = download::DownloadConfig {
                file_id,
                output,
                force,
            };
            download::run(&engine, &principal, config).await?;
        }

        Commands::Delete { file_id, force } => {
            let config = delete::DeleteConfig { file_id, force };
            delete::run(&engine, &principal, config).await?;
        }

        Commands::List {
            long,
            human_readable,
        } => {
            let config = list::ListConfig {
                long_format: long,
                human_readable,
            };
            list::run(&engine, &principal, config).await?;
        }

        Commands::Show { file_id } => {
            list::show(&engine, &principal, file_id).await?;
        }

        Commands::Repair { file_id, all } => {
            require_admin(&principal)?;
            repair::run(&engine, repair::RepairConfig { file_id, all }).await?;
        }

        Commands::Health => {
            require_admin(&principal)?;
            status::health(&engine).await?;
        }

        Commands::Analytics { json } => {
            require_admin(&principal)?;
            status::analytics(&engine, json).await?;
        }

        Commands::Provider { command } => {
            require_admin(&principal)?;
            handle_provider_command(&engine, &principal, command).await?;
        }

        Commands::Policy { command } => match command {
            PolicyCommands::Show { target } => {
                let target = target.unwrap_or_else(|| principal.id.clone());
                if target != principal.id {
                    require_admin(&principal)?;
                }
                policy::show(&engine, &target).await?;
            }
            PolicyCommands::Set { target, regions } => {
                require_admin(&principal)?;
                let target = target.unwrap_or_else(|| principal.id.clone());
                policy::set(&engine, &principal, &target, regions).await?;
            }
        },

        Commands::Audit { limit } => {
            require_admin(&principal)?;
            audit::run(&engine, limit)?;
        }

        Commands::Config { command } => handle_config_command(command)?,
    }

    Ok(())
}

/// Install the global tracing subscriber
///
/// Defaults to `warn`; `RUST_LOG` overrides, e.g. `RUST_LOG=audit=info`
/// to see audit events.
fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::WARN.into());

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Wire the engine over the local metadata database and S3 providers
fn build_engine(cfg: &config::TesseraConfig) -> Result<Engine> {
    let engine_config = cfg.engine_config()?;

    let metadata_path = cfg.metadata_path()?;
    let store = Arc::new(
        SledStore::open(&metadata_path)
            .with_context(|| format!("Failed to open metadata at {}", metadata_path.display()))?,
    );

    let transport = Arc::new(GuardedTransport::new(
        Arc::new(S3Transport::new()),
        engine_config.transport(),
    ));
    let audit = Arc::new(TracingAuditSink::with_store(store.clone()));

    let ctx = EngineContext::new(
        transport,
        store.clone(),
        store.clone(),
        store,
        audit,
        engine_config,
    )?;
    Ok(Engine::new(ctx)?)
}

async fn handle_provider_command(
    engine: &Engine,
    principal: &Principal,
    command: ProviderCommands,
) -> Result<()> {
    match command {
        ProviderCommands::Add {
            name,
            kind,
            endpoint,
            region,
            bucket,
            access_key,
            secret_key,
        } => {
            let config = provider::AddConfig {
                name,
                kind,
                endpoint,
                region,
                bucket,
                access_key,
                secret_key,
            };
            provider::add(engine, principal, config).await
        }
        ProviderCommands::Import { file } => provider::import(engine, principal, &file).await,
        ProviderCommands::List => provider::list(engine).await,
        ProviderCommands::Remove { id, force } => {
            provider::remove(engine, principal, id, force).await
        }
        ProviderCommands::Enable { id } => provider::set_enabled(engine, principal, id, true).await,
        ProviderCommands::Disable { id } => {
            provider::set_enabled(engine, principal, id, false).await
        }
    }
}

/// Handle config subcommands
fn handle_config_command(command: Option<ConfigCommands>) -> Result<()> {
    use console::style;

    match command {
        None | Some(ConfigCommands::Show) => {
            let cfg = config::load_config();
            println!();
            println!("{}", style("Tessera Configuration").bold().underlined());
            println!();
            println!("{}", style("[storage]").cyan());
            match cfg.metadata_path() {
                Ok(path) => println!("  metadata_path = \"{}\"", path.display()),
                Err(e) => println!("  metadata_path = ({})", e),
            }
            println!();
            println!("{}", style("[erasure]").cyan());
            println!("  data_shards = {}", cfg.erasure.data_shards);
            println!("  parity_shards = {}", cfg.erasure.parity_shards);
            println!();
            println!("{}", style("[transport]").cyan());
            println!("  timeout_secs = {}", cfg.transport.timeout_secs);
            println!("  put_retries = {}", cfg.transport.put_retries);
            println!();
            println!("{}", style("[principal]").cyan());
            println!("  id = \"{}\"", cfg.principal.id);
            println!("  admin = {}", cfg.principal.admin);
            println!();

            if let Ok(path) = config::config_file_path() {
                println!("{} {}", style("Config file:").dim(), path.display());
                if !path.exists() {
                    println!(
                        "{} Run '{}' to create it",
                        style("(not created yet)").yellow(),
                        style("tessera config init").green()
                    );
                }
            }
        }

        Some(ConfigCommands::Path) => {
            if let Ok(path) = config::config_file_path() {
                println!("{}", path.display());
            }
        }

        Some(ConfigCommands::Init { force }) => {
            let path = config::config_file_path()?;
            if path.exists() && !force {
                println!(
                    "{} Config file already exists at {}",
                    style(symbols::WARN).yellow(),
                    path.display()
                );
                println!("Use --force to overwrite");
                return Ok(());
            }

            config::save_config(&config::TesseraConfig::default())?;
            println!(
                "{} Config file created at {}",
                style(symbols::CHECK).green(),
                path.display()
            );
        }

        Some(ConfigCommands::Set { key, value }) => {
            let mut cfg = config::load_config();
            config::set_value(&mut cfg, &key, &value)?;
            config::save_config(&cfg)?;
            println!("{} Configuration updated", style(symbols::CHECK).green());
        }
    }

    Ok(())
}

/// Administrative commands are refused for regular principals
fn require_admin(principal: &Principal) -> Result<()> {
    if !principal.is_admin() {
        anyhow::bail!(
            "'{}' is not an administrator. Pass --admin or set principal.admin in the config.",
            principal.id
        );
    }
    Ok(())
}
