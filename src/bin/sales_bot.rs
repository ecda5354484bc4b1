use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn};

use sale_notifier::api::HttpFeedClient;
use sale_notifier::config::{AppConfig, CONFIG_PATH};
use sale_notifier::engine::PollCycle;
use sale_notifier::notifier::DiscordNotifier;
use sale_notifier::scheduler::Scheduler;
use sale_notifier::store::{MemoryWatermarkStore, PgWatermarkStore, WatermarkStore};

#[derive(Parser)]
#[command(name = "sales-bot", about = "Marketplace sale alert bot")]
struct Args {
    /// Path to the TOML config file
    #[arg(long, default_value = CONFIG_PATH)]
    config: PathBuf,

    /// Keep watermarks in memory instead of PostgreSQL (lost on restart)
    #[arg(long)]
    ephemeral: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = AppConfig::load(&args.config)?;
    let registry = config.registry()?;
    info!(
        "Loaded config from {} ({} collection(s): {})",
        args.config.display(),
        registry.len(),
        registry.names().join(", ")
    );

    let settings = &config.settings;
    let http = reqwest::Client::builder()
        .timeout(settings.request_timeout())
        .build()
        .context("failed to build HTTP client")?;

    // Pool lives for the whole process and is closed after the scheduler drains.
    let pg_store = if args.ephemeral {
        warn!("Running with in-memory watermarks; sales may be re-posted after a restart");
        None
    } else {
        let url = config.database.resolve_url()?;
        let store = PgWatermarkStore::connect(&url, config.database.max_connections)
            .await
            .context("failed to initialize database pool")?;
        store
            .ensure_schema()
            .await
            .context("failed to create sale_timestamps table")?;
        Some(Arc::new(store))
    };
    let store: Arc<dyn WatermarkStore> = match &pg_store {
        Some(pg) => pg.clone(),
        None => Arc::new(MemoryWatermarkStore::new()),
    };

    let cycle = Arc::new(PollCycle::new(
        Arc::new(HttpFeedClient::new(http.clone(), settings.feed_limit)),
        Arc::new(DiscordNotifier::new(http)),
        store,
        settings.staleness_window(),
    ));
    let scheduler = Scheduler::new(
        cycle,
        registry,
        settings.poll_interval(),
        settings.shutdown_grace(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(e) => warn!("Failed to listen for Ctrl+C: {e}"),
        }
        let _ = shutdown_tx.send(true);
    });

    info!("Entering polling loop. Press Ctrl+C to stop.");
    scheduler.run(shutdown_rx).await;

    if let Some(pg) = pg_store {
        pg.close().await;
    }
    Ok(())
}
