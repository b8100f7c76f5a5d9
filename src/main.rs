use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crawl_orchestrator::config::{Config, LoggingConfig, StorageBackend};

mod commands;

#[derive(Parser)]
#[command(
    name = "crawl-orchestrator",
    version,
    about = "Single-slot scheduler for multi-platform social media crawl jobs",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json), overrides the config file
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API and orchestrator
    Serve {
        /// TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Bind address (host:port), overrides the config file
        #[arg(short, long)]
        bind: Option<String>,

        /// Crawler worker base URL
        #[arg(long)]
        worker_url: Option<String>,

        /// Result store backend (memory, sqlite)
        #[arg(long)]
        storage: Option<StorageBackend>,

        /// SQLite database path
        #[arg(long)]
        sqlite_path: Option<PathBuf>,
    },

    /// List supported platforms
    Platforms,

    /// Print stored post and comment totals for a platform
    Stats {
        /// Platform code (xhs, dy, ks, bili, wb, tieba, zhihu)
        platform: String,

        /// SQLite database path
        #[arg(long, default_value = "data/media_crawler.db")]
        sqlite_path: PathBuf,
    },

    /// Load crawler JSON exports (<data-dir>/<platform>/json/*.json) into the result store
    Import {
        /// Directory holding one sub-directory per platform
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,

        /// SQLite database path
        #[arg(long, default_value = "data/media_crawler.db")]
        sqlite_path: PathBuf,

        /// Empty each platform's table before importing
        #[arg(long)]
        delete_existing: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut logging = logging_config(&cli.command)?;
    if let Some(format) = &cli.log_format {
        logging.format = format.clone();
    }
    setup_tracing(&logging, cli.verbose)?;

    match cli.command {
        Commands::Serve {
            config,
            bind,
            worker_url,
            storage,
            sqlite_path,
        } => {
            tracing::info!(
                config = ?config,
                bind = ?bind,
                worker_url = ?worker_url,
                storage = ?storage,
                "Starting serve command"
            );
            commands::serve(commands::ServeParams {
                config,
                bind,
                worker_url,
                storage,
                sqlite_path,
            })
            .await?;
        }

        Commands::Platforms => commands::platforms(),

        Commands::Stats {
            platform,
            sqlite_path,
        } => {
            commands::stats(&platform, &sqlite_path).await?;
        }

        Commands::Import {
            data_dir,
            sqlite_path,
            delete_existing,
        } => {
            tracing::info!(data_dir = ?data_dir, delete_existing, "Starting import command");
            commands::import(&data_dir, &sqlite_path, delete_existing).await?;
        }
    }

    Ok(())
}

/// Logging section from the serve config file (if any) and the environment
fn logging_config(command: &Commands) -> Result<LoggingConfig> {
    let mut config = match command {
        Commands::Serve {
            config: Some(path), ..
        } => Config::from_file(path)?,
        _ => Config::default(),
    };
    config.apply_env();
    Ok(config.logging)
}

fn setup_tracing(logging: &LoggingConfig, verbose: bool) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            tracing_subscriber::EnvFilter::new("crawl_orchestrator=debug,tower_http=debug,info")
        } else {
            tracing_subscriber::EnvFilter::new(format!(
                "crawl_orchestrator={},warn",
                logging.level
            ))
        }
    });

    match logging.format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}
