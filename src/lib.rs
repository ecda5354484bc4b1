pub mod admin;
pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod notifier;
pub mod reporter;
pub mod scheduler;
pub mod store;
pub mod types;

use std::time::Duration;

/// Status tag the feed uses for a completed sale.
pub const SALE_STATUS: &str = "bought";

/// Raw price units per whole coin (8 decimals, like satoshis).
pub const PRICE_UNITS_PER_COIN: u64 = 100_000_000;

/// Default number of most recent orders requested per poll.
pub const DEFAULT_FEED_LIMIT: u32 = 20;

/// Default maximum age of a sale that is still eligible for notification.
pub const DEFAULT_STALENESS_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Marketplace page for a single inscription, suffixed with the inscription id.
pub const INSCRIPTION_URL_BASE: &str = "https://doggy.market/inscription";

/// Marketplace content CDN, suffixed with the inscription id.
pub const CONTENT_URL_BASE: &str = "https://cdn.doggy.market/content";
