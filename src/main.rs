//! WolfLog - Segmented Commit Log
//!
//! Serves a commit log over HTTP and provides tools to inspect one on disk.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wolflog::api::HttpServer;
use wolflog::config::WolfLogConfig;
use wolflog::error::Result;
use wolflog::log::{list_base_offsets, Log, LogPaths, ENTRY_WIDTH};

/// WolfLog - Segmented Commit Log
#[derive(Parser)]
#[command(name = "wolflog")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "wolflog.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the log and serve the HTTP API
    Serve,

    /// Initialize a new configuration file
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "wolflog.toml")]
        output: PathBuf,

        /// Data directory for segment files
        #[arg(long, default_value = "/var/lib/wolflog")]
        data_dir: PathBuf,
    },

    /// Validate configuration file
    Validate,

    /// Show configuration and on-disk segments
    Info,

    /// Print records from the log
    Dump {
        /// First offset to print (defaults to the lowest offset)
        #[arg(long)]
        from: Option<u64>,

        /// Maximum number of records to print
        #[arg(long, default_value_t = 100)]
        limit: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logging settings come from the config file when it is readable
    let logging = WolfLogConfig::from_file(&cli.config)
        .map(|c| c.logging)
        .unwrap_or_default();
    let level = cli.log_level.as_deref().unwrap_or(&logging.level);
    init_logging(level, &logging.format);

    match cli.command {
        Commands::Serve => run_serve(cli.config).await,
        Commands::Init { output, data_dir } => run_init(output, data_dir),
        Commands::Validate => run_validate(cli.config),
        Commands::Info => run_info(cli.config),
        Commands::Dump { from, limit } => run_dump(cli.config, from, limit),
    }
}

/// Initialize logging
fn init_logging(level: &str, format: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    let registry = tracing_subscriber::registry().with(env_filter);
    if format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Open the log and serve it until Ctrl+C
async fn run_serve(config_path: PathBuf) -> Result<()> {
    tracing::info!("Starting WolfLog...");

    let config = match WolfLogConfig::from_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Failed to load configuration from {:?}: {}", config_path, e);
            tracing::error!("Please check that the config file exists and is valid TOML");
            return Err(e);
        }
    };

    let log: Arc<Log> = match Log::open(config.data_dir().clone(), config.segment) {
        Ok(l) => Arc::new(l),
        Err(e) => {
            tracing::error!("Failed to open log at {:?}: {}", config.data_dir(), e);
            return Err(e);
        }
    };
    tracing::info!(
        "Log ready, offsets {}..{}",
        log.lowest_offset(),
        log.next_offset()
    );

    let server = HttpServer::new(config.api.clone(), Arc::clone(&log));
    server.start(shutdown_signal()).await?;
    drop(server);

    tracing::info!("Shutting down, closing log...");
    match Arc::try_unwrap(log) {
        Ok(log) => log.close()?,
        Err(_) => tracing::warn!("Log still in use at shutdown; segments close on drop"),
    }

    tracing::info!("WolfLog stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
    }
}

/// Write a default configuration file
fn run_init(output: PathBuf, data_dir: PathBuf) -> Result<()> {
    let config_content = format!(r#"# WolfLog Configuration
# Generated configuration file

[log]
data_dir = "{data_dir}"

[segment]
# A segment is sealed once either file reaches its limit
max_store_bytes = 1048576
# Index files are preallocated to this size while open (12 bytes per record)
max_index_bytes = 1048576
initial_offset = 0

[api]
enabled = true
bind_address = "0.0.0.0:8082"
cors_enabled = false

[logging]
level = "info"
format = "pretty"
"#, data_dir = data_dir.display());

    std::fs::write(&output, config_content)?;
    println!("Configuration file created: {}", output.display());
    println!("Then start with: wolflog --config {} serve", output.display());

    Ok(())
}

fn run_validate(config_path: PathBuf) -> Result<()> {
    match WolfLogConfig::from_file(&config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!("  Data Directory: {}", config.data_dir().display());
            println!("  Max Store:      {} bytes", config.segment.max_store_bytes);
            println!(
                "  Max Index:      {} bytes ({} records per segment)",
                config.segment.max_index_bytes,
                config.segment.max_entries()
            );
            println!("  API:            {}", config.api.bind_address);
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration error: {}", e);
            Err(e)
        }
    }
}

/// Print configuration and segment files without opening the log
fn run_info(config_path: PathBuf) -> Result<()> {
    let config = WolfLogConfig::from_file(&config_path)?;
    let paths = LogPaths::new(config.data_dir().clone());

    println!("WolfLog Information");
    println!("===================");
    println!();
    println!("Data Directory:   {}", config.data_dir().display());
    println!("Max Store:        {} bytes", config.segment.max_store_bytes);
    println!("Max Index:        {} bytes", config.segment.max_index_bytes);
    println!("Initial Offset:   {}", config.segment.initial_offset);
    println!("API:              {} (enabled: {})", config.api.bind_address, config.api.enabled);
    println!();

    let offsets = list_base_offsets(&paths.base_dir)?;
    println!("Segments:         {}", offsets.len());
    for base in offsets {
        let store_bytes = file_len(&paths.store_path(base));
        let index_bytes = file_len(&paths.index_path(base));
        println!(
            "  {:>20}  store {:>12} bytes  index {:>10} bytes ({} records)",
            base,
            store_bytes,
            index_bytes,
            index_bytes / ENTRY_WIDTH
        );
    }

    Ok(())
}

fn file_len(path: &std::path::Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// Print records, one per line
fn run_dump(config_path: PathBuf, from: Option<u64>, limit: u64) -> Result<()> {
    let config = WolfLogConfig::from_file(&config_path)?;
    let log: Log = Log::open(config.data_dir().clone(), config.segment)?;

    let start = from.unwrap_or_else(|| log.lowest_offset());
    let end = log.next_offset().min(start.saturating_add(limit));

    for offset in start..end {
        match log.read(offset) {
            Ok(record) => println!("{:>12}  {}", record.offset, String::from_utf8_lossy(&record.value)),
            Err(e) if e.is_not_found() => continue,
            Err(e) => {
                eprintln!("Failed to read offset {}: {}", offset, e);
                break;
            }
        }
    }

    log.close()
}
