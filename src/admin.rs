//! Administrative commands. Both post straight to the notifier and never
//! read or write a watermark.

use tracing::info;

use crate::api::FeedClient;
use crate::config::CollectionConfig;
use crate::error::SaleError;
use crate::notifier::Notifier;
use crate::types::{RawRecord, SaleEvent};

/// Synthetic `(price, item id, inscription number)` for test sales. The
/// flagship collection gets the 700 DOGE sale; every other one gets 500.
const FLAGSHIP_TEST_SALE: (u64, &str, i64) = (70_000_000_000, "999", 12345);
const DEFAULT_TEST_SALE: (u64, &str, i64) = (50_000_000_000, "888", 54321);
const FLAGSHIP_COLLECTION: &str = "dopedoges";

/// Post the newest record in the collection's feed, whatever its status.
///
/// Returns `Ok(None)` when the feed is empty.
pub async fn post_latest_sale(
    feed: &dyn FeedClient,
    notifier: &dyn Notifier,
    collection: &CollectionConfig,
) -> Result<Option<SaleEvent>, SaleError> {
    let channel = notifier.resolve(collection)?;
    let records = feed.fetch_recent(collection).await?;

    let Some(latest) = records.iter().max_by_key(|r| r.timestamp()) else {
        info!("No sales data available to post for {}", collection.name);
        return Ok(None);
    };

    let sale = SaleEvent::from_record(&collection.name, latest);
    notifier.notify(&channel, &sale).await?;
    info!("Last sale for {} posted to the sales channel", collection.name);
    Ok(Some(sale))
}

/// Post a fixed synthetic sale to check the channel end to end.
pub async fn post_test_sale(
    notifier: &dyn Notifier,
    collection: &CollectionConfig,
) -> Result<SaleEvent, SaleError> {
    let channel = notifier.resolve(collection)?;
    let sale = SaleEvent::from_record(&collection.name, &test_record(&collection.name));
    notifier.notify(&channel, &sale).await?;
    info!("Test sale posted to the {} sales channel", collection.name);
    Ok(sale)
}

fn test_record(collection: &str) -> RawRecord {
    let (price, item_id, inscription_number) = if collection == FLAGSHIP_COLLECTION {
        FLAGSHIP_TEST_SALE
    } else {
        DEFAULT_TEST_SALE
    };
    RawRecord {
        status: Some("bought".to_string()),
        price,
        item_id: Some(item_id.to_string()),
        inscription_id: Some(format!("test_image_id_{collection}")),
        inscription_number: Some(inscription_number),
        buyer_address: Some("TESTBUYER456789123".to_string()),
        seller_address: Some("TESTSELLER123456789".to_string()),
        date: Some("2025-03-11T21:00:00.000Z".to_string()),
    }
}
