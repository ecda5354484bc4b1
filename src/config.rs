use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{DEFAULT_FEED_LIMIT, DEFAULT_STALENESS_WINDOW};

/// Default config file path.
pub const CONFIG_PATH: &str = "config.toml";

/// Environment variables consulted for the database URL, in order.
const DATABASE_URL_VARS: [&str; 2] = ["DATABASE_URL", "POSTGRES_URL"];

/// Top-level application config deserialized from `config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub settings: SettingsConfig,
    pub collections: Vec<CollectionConfig>,
}

/// Watermark database connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL URL. Falls back to `DATABASE_URL` / `POSTGRES_URL`.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
        }
    }
}

impl DatabaseConfig {
    /// Configured URL, or the first database URL found in the environment.
    pub fn resolve_url(&self) -> Result<String> {
        if let Some(url) = self.url.as_ref().filter(|u| !u.is_empty()) {
            return Ok(url.clone());
        }
        DATABASE_URL_VARS
            .iter()
            .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
            .with_context(|| {
                format!(
                    "no database url: set [database].url or one of {}",
                    DATABASE_URL_VARS.join(", ")
                )
            })
    }
}

/// Runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsConfig {
    /// Polling interval in seconds, per collection.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Sales older than this are never notified.
    #[serde(default = "default_staleness_window")]
    pub staleness_window_hours: u64,
    /// Number of most recent orders requested per poll.
    #[serde(default = "default_feed_limit")]
    pub feed_limit: u32,
    /// How long in-flight cycles may run after a shutdown signal.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_poll_interval() -> u64 {
    60
}

fn default_staleness_window() -> u64 {
    DEFAULT_STALENESS_WINDOW.as_secs() / 3600
}

fn default_feed_limit() -> u32 {
    DEFAULT_FEED_LIMIT
}

fn default_shutdown_grace() -> u64 {
    30
}

fn default_request_timeout() -> u64 {
    15
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            staleness_window_hours: default_staleness_window(),
            feed_limit: default_feed_limit(),
            shutdown_grace_secs: default_shutdown_grace(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl SettingsConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn staleness_window(&self) -> Duration {
        Duration::from_secs(self.staleness_window_hours.saturating_mul(60 * 60))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// One tracked collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// Logical identifier, also the watermark key.
    pub name: String,
    /// Orders endpoint of the collection.
    pub api_url: String,
    /// Discord webhook the alerts go to. Falls back to `<NAME>_WEBHOOK_URL`.
    #[serde(default)]
    pub webhook_url: Option<String>,
    /// Embed colour, e.g. `0xFF4500`.
    #[serde(default)]
    pub color: u32,
    #[serde(default)]
    pub hashtag: String,
}

impl CollectionConfig {
    /// Environment variable consulted when no webhook is configured.
    pub fn webhook_env_var(&self) -> String {
        let name: String = self
            .name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
            .collect();
        format!("{name}_WEBHOOK_URL")
    }

    /// Name with the first letter capitalised, as shown in alert titles.
    pub fn display_name(&self) -> String {
        let mut chars = self.name.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}

/// Ordered, validated set of tracked collections, resolved once at startup.
#[derive(Debug, Clone)]
pub struct CollectionRegistry {
    collections: Vec<CollectionConfig>,
}

impl CollectionRegistry {
    pub fn new(collections: Vec<CollectionConfig>) -> Result<Self> {
        if collections.is_empty() {
            anyhow::bail!("no collections configured");
        }
        let mut seen = HashSet::new();
        for c in &collections {
            if c.name.is_empty() {
                anyhow::bail!("collection with empty name");
            }
            if !seen.insert(c.name.as_str()) {
                anyhow::bail!("duplicate collection {}", c.name);
            }
            Url::parse(&c.api_url)
                .with_context(|| format!("invalid api_url for {}: {}", c.name, c.api_url))?;
        }
        Ok(Self { collections })
    }

    pub fn get(&self, name: &str) -> Option<&CollectionConfig> {
        self.collections.iter().find(|c| c.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CollectionConfig> {
        self.collections.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.collections.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }
}

impl AppConfig {
    /// Load config from the given TOML file path.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        if config.settings.poll_interval_secs == 0 {
            anyhow::bail!("settings.poll_interval_secs must be positive");
        }
        if config.settings.feed_limit == 0 {
            anyhow::bail!("settings.feed_limit must be positive");
        }
        Ok(config)
    }

    /// Validate the collection list into a registry.
    pub fn registry(&self) -> Result<CollectionRegistry> {
        CollectionRegistry::new(self.collections.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r##"
[settings]
poll_interval_secs = 30

[[collections]]
name = "dopedoges"
api_url = "https://api.doggy.market/listings/nfts/dopedoges/orders"
webhook_url = "https://discord.com/api/webhooks/1/abc"
color = 0xFF4500
hashtag = "#DopeDogeVibes"

[[collections]]
name = "minidoges"
api_url = "https://api.doggy.market/listings/nfts/minidoges/orders"
color = 0x00CED1
hashtag = "#MiniDogeMagic"
"##;

    #[test]
    fn parses_sample() {
        let config = AppConfig::parse(SAMPLE).unwrap();
        assert_eq!(config.settings.poll_interval_secs, 30);
        assert_eq!(config.settings.staleness_window_hours, 24);
        assert_eq!(config.settings.feed_limit, 20);
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.collections[0].color, 0xFF4500);
        assert!(config.collections[1].webhook_url.is_none());

        let registry = config.registry().unwrap();
        assert_eq!(registry.names(), vec!["dopedoges", "minidoges"]);
        assert_eq!(registry.get("minidoges").unwrap().hashtag, "#MiniDogeMagic");
        assert!(registry.get("unknown").is_none());
    }

    #[test]
    fn rejects_zero_interval() {
        let toml = SAMPLE.replace("poll_interval_secs = 30", "poll_interval_secs = 0");
        assert!(AppConfig::parse(&toml).is_err());
    }

    #[test]
    fn huge_staleness_window_saturates() {
        // TOML integers top out at i64::MAX.
        let toml = SAMPLE.replace(
            "poll_interval_secs = 30",
            &format!("poll_interval_secs = 30\nstaleness_window_hours = {}", i64::MAX),
        );
        let config = AppConfig::parse(&toml).unwrap();
        assert_eq!(
            config.settings.staleness_window(),
            Duration::from_secs(u64::MAX)
        );

        let config = AppConfig::parse(SAMPLE).unwrap();
        assert_eq!(
            config.settings.staleness_window(),
            Duration::from_secs(24 * 60 * 60)
        );
    }

    #[test]
    fn rejects_duplicate_names() {
        let toml = SAMPLE.replace("minidoges", "dopedoges");
        let config = AppConfig::parse(&toml).unwrap();
        assert!(config.registry().is_err());
    }

    #[test]
    fn rejects_bad_url() {
        let collection = CollectionConfig {
            name: "x".to_string(),
            api_url: "not a url".to_string(),
            webhook_url: None,
            color: 0,
            hashtag: String::new(),
        };
        assert!(CollectionRegistry::new(vec![collection]).is_err());
        assert!(CollectionRegistry::new(vec![]).is_err());
    }

    #[test]
    fn naming_helpers() {
        let config = AppConfig::parse(SAMPLE).unwrap();
        let c = &config.collections[0];
        assert_eq!(c.display_name(), "Dopedoges");
        assert_eq!(c.webhook_env_var(), "DOPEDOGES_WEBHOOK_URL");
    }

    #[test]
    fn explicit_database_url_wins() {
        let db = DatabaseConfig {
            url: Some("postgres://localhost/sales".to_string()),
            max_connections: 2,
        };
        assert_eq!(db.resolve_url().unwrap(), "postgres://localhost/sales");
    }
}
