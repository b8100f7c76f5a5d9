use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

use crawl_orchestrator::api::ApiServer;
use crawl_orchestrator::config::{Config, StorageBackend};
use crawl_orchestrator::crawler::{CrawlerRegistry, RemoteCrawler, RemoteCrawlerConfig};
use crawl_orchestrator::metrics;
use crawl_orchestrator::orchestrator::Orchestrator;
use crawl_orchestrator::storage::{MemoryResultStore, ResultStore, SqliteResultStore};

/// Command-line overrides for `serve`
pub struct ServeParams {
    pub config: Option<PathBuf>,
    pub bind: Option<String>,
    pub worker_url: Option<String>,
    pub storage: Option<StorageBackend>,
    pub sqlite_path: Option<PathBuf>,
}

/// Merge defaults, config file, environment and CLI flags
fn load_config(params: &ServeParams) -> Result<Config> {
    let mut config = match &params.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    config.apply_env();

    if let Some(bind) = &params.bind {
        let (host, port) = bind
            .rsplit_once(':')
            .with_context(|| format!("Invalid bind address '{bind}', expected host:port"))?;
        config.server.host = host.to_string();
        config.server.port = port
            .parse()
            .with_context(|| format!("Invalid port in bind address '{bind}'"))?;
    }
    if let Some(url) = &params.worker_url {
        config.crawler.worker_url = url.clone();
    }
    if let Some(backend) = params.storage {
        config.storage.backend = backend;
    }
    if let Some(path) = &params.sqlite_path {
        config.storage.sqlite_path = path.clone();
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn open_store(config: &Config) -> Result<Arc<dyn ResultStore>> {
    let store: Arc<dyn ResultStore> = match config.storage.backend {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory result store; results are lost on exit");
            Arc::new(MemoryResultStore::new())
        }
        StorageBackend::Sqlite => Arc::new(
            SqliteResultStore::new(&config.storage.sqlite_path).with_context(|| {
                format!(
                    "Failed to open SQLite store: {}",
                    config.storage.sqlite_path.display()
                )
            })?,
        ),
    };
    Ok(store)
}

pub async fn serve(params: ServeParams) -> Result<()> {
    let config = load_config(&params)?;

    if let Err(e) = metrics::init_metrics() {
        tracing::warn!("Metrics initialization failed: {}", e);
    }

    let store = open_store(&config)?;
    let crawler = RemoteCrawler::new(
        RemoteCrawlerConfig::new(&config.crawler.worker_url)
            .with_timeout(config.request_timeout()),
    )
    .context("Failed to create crawler worker client")?;
    let registry = CrawlerRegistry::uniform(Arc::new(crawler));

    let orchestrator = Arc::new(
        Orchestrator::new(registry, store)
            .with_resolver(config.resolver()?)
            .with_delays(config.delay_policy())
            .with_history_limit(config.jobs.history_limit),
    );

    let server = ApiServer::new(config.server.clone(), orchestrator);

    println!("Crawl Orchestrator");
    println!("==================");
    println!("  Worker:  {}", config.crawler.worker_url);
    println!("  Storage: {:?}", config.storage.backend);
    println!(
        "  Delays:  {}-{}s between platforms, {}-{}s between rounds",
        config.schedule.platform_delay_min_secs,
        config.schedule.platform_delay_max_secs,
        config.schedule.round_delay_min_secs,
        config.schedule.round_delay_max_secs
    );
    println!();
    println!("Listening on http://{}", config.bind_addr());
    println!("Press Ctrl+C to stop.\n");

    server.start_with_shutdown(shutdown_signal()).await?;

    println!("Crawl orchestrator stopped.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to wait for Ctrl+C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
