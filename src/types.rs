use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

use crate::{PRICE_UNITS_PER_COIN, SALE_STATUS};

/// Placeholder used when the feed omits the seller address.
const UNKNOWN_SELLER: &str = "Myst";

/// Placeholder used when the feed omits the buyer address.
const UNKNOWN_BUYER: &str = "NewP";

/// Response envelope of the marketplace orders endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedResponse {
    #[serde(default, deserialize_with = "skip_invalid_records")]
    pub data: Vec<RawRecord>,
}

/// One listing/order entry as returned by the feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRecord {
    #[serde(default)]
    pub status: Option<String>,
    /// Price in raw units (10^-8 of a coin).
    #[serde(default, deserialize_with = "null_as_default")]
    pub price: u64,
    #[serde(default, deserialize_with = "string_or_number")]
    pub item_id: Option<String>,
    #[serde(default)]
    pub inscription_id: Option<String>,
    #[serde(default)]
    pub inscription_number: Option<i64>,
    #[serde(default)]
    pub buyer_address: Option<String>,
    #[serde(default)]
    pub seller_address: Option<String>,
    /// ISO-8601 timestamp of the order.
    #[serde(default)]
    pub date: Option<String>,
}

impl RawRecord {
    /// Completed sale with a known buyer.
    pub fn is_completed_sale(&self) -> bool {
        self.status.as_deref() == Some(SALE_STATUS)
            && self.buyer_address.as_deref().is_some_and(|b| !b.is_empty())
    }

    /// Parsed timestamp, falling back to the epoch when missing or malformed.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.date
            .as_deref()
            .and_then(|d| DateTime::parse_from_rfc3339(d).ok())
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }
}

/// Decode each record on its own so one malformed entry does not sink the
/// batch. Undecodable entries are logged and dropped.
fn skip_invalid_records<'de, D>(deserializer: D) -> Result<Vec<RawRecord>, D::Error>
where
    D: Deserializer<'de>,
{
    let values = Option::<Vec<serde_json::Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(values
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<RawRecord>(value) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Dropping undecodable feed record: {e}");
                None
            }
        })
        .collect())
}

/// Treat an explicit `null` like a missing key.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accept item ids encoded either as JSON strings or numbers.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// The fields of a sale needed to render an alert.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaleEvent {
    pub collection: String,
    pub item_id: Option<String>,
    pub inscription_id: String,
    pub inscription_number: Option<i64>,
    /// Price in whole coins.
    pub price: Decimal,
    pub buyer: String,
    pub seller: String,
    pub timestamp: DateTime<Utc>,
}

impl SaleEvent {
    pub fn from_record(collection: &str, record: &RawRecord) -> Self {
        let price = Decimal::from(record.price) / Decimal::from(PRICE_UNITS_PER_COIN);
        Self {
            collection: collection.to_string(),
            item_id: record.item_id.clone(),
            inscription_id: record.inscription_id.clone().unwrap_or_default(),
            inscription_number: record.inscription_number,
            price,
            buyer: shorten_address(record.buyer_address.as_deref().unwrap_or(UNKNOWN_BUYER)),
            seller: shorten_address(record.seller_address.as_deref().unwrap_or(UNKNOWN_SELLER)),
            timestamp: record.timestamp(),
        }
    }

    /// Price with exactly two decimals, e.g. `70000.00`.
    pub fn display_price(&self) -> String {
        format!("{:.2}", self.price.round_dp(2))
    }
}

/// `DH5yaB2c8mkUQ9aXm7kqQHvgB7d7nvyfxL` becomes `DH5y...yfxL`.
pub fn shorten_address(addr: &str) -> String {
    let chars: Vec<char> = addr.chars().collect();
    let head: String = chars.iter().take(4).collect();
    let tail: String = chars[chars.len().saturating_sub(4)..].iter().collect();
    format!("{head}...{tail}")
}

/// Machine-readable outcome of one poll cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub collection: String,
    pub timestamp: String,
    pub fetched: usize,
    pub selected: usize,
    pub delivered: usize,
    pub failed_deliveries: usize,
    pub skipped_stale: usize,
    pub skipped_processed: usize,
    pub watermark_before: DateTime<Utc>,
    pub watermark_after: DateTime<Utc>,
    /// False when `watermark_after` could not be persisted; the next cycle
    /// selects the same sales again.
    pub watermark_saved: bool,
    /// Watermark load failed and the cycle ran from the epoch sentinel.
    pub degraded: bool,
}
