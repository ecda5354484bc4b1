use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use sale_notifier::admin;
use sale_notifier::api::HttpFeedClient;
use sale_notifier::config::{AppConfig, CONFIG_PATH};
use sale_notifier::error::SaleError;
use sale_notifier::notifier::DiscordNotifier;
use sale_notifier::reporter;

#[derive(Parser)]
#[command(name = "post-sale", about = "Post a sale alert manually, bypassing watermarks")]
struct Args {
    /// Path to the TOML config file
    #[arg(long, default_value = CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Post the most recent record from the collection's feed
    Last {
        #[arg(default_value = "dopedoges")]
        collection: String,
    },
    /// Post a synthetic test sale
    Test {
        #[arg(default_value = "dopedoges")]
        collection: String,
    },
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

    let http = reqwest::Client::builder()
        .timeout(config.settings.request_timeout())
        .build()
        .context("failed to build HTTP client")?;
    let notifier = DiscordNotifier::new(http.clone());

    let name = match &args.command {
        Command::Last { collection } | Command::Test { collection } => collection.as_str(),
    };
    let collection = registry.get(name).ok_or_else(|| {
        SaleError::configuration(
            name,
            format!("unknown collection, use one of: {}", registry.names().join(", ")),
        )
    })?;

    match &args.command {
        Command::Last { .. } => {
            let feed = HttpFeedClient::new(http, config.settings.feed_limit);
            match admin::post_latest_sale(&feed, &notifier, collection).await? {
                Some(sale) => reporter::report_posted_sale(&sale),
                None => info!("Nothing posted for {name}"),
            }
        }
        Command::Test { .. } => {
            let sale = admin::post_test_sale(&notifier, collection).await?;
            reporter::report_posted_sale(&sale);
        }
    }

    Ok(())
}
