use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::api::FeedClient;
use crate::config::CollectionConfig;
use crate::error::{SaleError, Stage};
use crate::filter;
use crate::notifier::Notifier;
use crate::store::WatermarkStore;
use crate::types::{CycleReport, SaleEvent};

/// One fetch → filter → deliver → persist pass, shared by all collections.
///
/// Delivery is attempted once per selected sale. The watermark advances past
/// every selected sale whether its delivery succeeded or not, so a sale that
/// can never be delivered does not hold back later ones.
pub struct PollCycle {
    feed: Arc<dyn FeedClient>,
    notifier: Arc<dyn Notifier>,
    store: Arc<dyn WatermarkStore>,
    staleness_window: Duration,
}

impl PollCycle {
    pub fn new(
        feed: Arc<dyn FeedClient>,
        notifier: Arc<dyn Notifier>,
        store: Arc<dyn WatermarkStore>,
        staleness_window: Duration,
    ) -> Self {
        Self {
            feed,
            notifier,
            store,
            staleness_window,
        }
    }

    /// Run one cycle for `collection` as of `now`.
    ///
    /// Errors are configuration, fetch and save failures. A failed watermark
    /// load degrades to the epoch instead, and failed deliveries are only
    /// counted in the report. A save failure still carries the report, since
    /// alerts went out.
    pub async fn run(
        &self,
        collection: &CollectionConfig,
        now: DateTime<Utc>,
    ) -> Result<CycleReport, CycleFailure> {
        let name = collection.name.as_str();
        let channel = self.notifier.resolve(collection)?;

        let (watermark, degraded) = match self.store.load(name).await {
            Ok(Some(ts)) => (ts, false),
            Ok(None) => (DateTime::<Utc>::UNIX_EPOCH, false),
            Err(e) => {
                warn!("{e}; reprocessing {name} from epoch within the staleness window");
                (DateTime::<Utc>::UNIX_EPOCH, true)
            }
        };
        debug!("Current time: {now}, last sale timestamp for {name}: {watermark}");

        let records = self.feed.fetch_recent(collection).await?;
        let selection = filter::select(&records, watermark, now, self.staleness_window);

        if selection.skipped_stale > 0 {
            info!(
                "Skipped {} sales for {name}: older than the staleness window",
                selection.skipped_stale
            );
        }
        if selection.skipped_processed > 0 {
            info!(
                "Skipped {} sales for {name}: already processed",
                selection.skipped_processed
            );
        }

        let mut delivered = 0;
        let mut failed = 0;
        for record in &selection.to_deliver {
            let sale = SaleEvent::from_record(name, record);
            match self.notifier.notify(&channel, &sale).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!("{e} (item {})", sale.item_id.as_deref().unwrap_or("???"));
                    failed += 1;
                }
            }
        }

        let mut report = CycleReport {
            collection: name.to_string(),
            timestamp: now.to_rfc3339(),
            fetched: records.len(),
            selected: selection.to_deliver.len(),
            delivered,
            failed_deliveries: failed,
            skipped_stale: selection.skipped_stale,
            skipped_processed: selection.skipped_processed,
            watermark_before: watermark,
            watermark_after: selection.new_watermark,
            watermark_saved: true,
            degraded,
        };

        if selection.new_watermark == watermark {
            info!("No new sales to process for {name}");
            return Ok(report);
        }

        match self.store.save(name, selection.new_watermark).await {
            Ok(()) => {
                info!(
                    "Updated last sale timestamp for {name} to {}",
                    selection.new_watermark
                );
                Ok(report)
            }
            Err(error) => {
                report.watermark_saved = false;
                Err(CycleFailure {
                    error,
                    report: Some(report),
                })
            }
        }
    }
}

/// A cycle that ended in an error. `report` is set when the failure came
/// after the delivery pass, so the sales that went out are still accounted for.
#[derive(Debug)]
pub struct CycleFailure {
    pub error: SaleError,
    pub report: Option<CycleReport>,
}

impl CycleFailure {
    pub fn stage(&self) -> Stage {
        self.error.stage()
    }
}

impl From<SaleError> for CycleFailure {
    fn from(error: SaleError) -> Self {
        Self { error, report: None }
    }
}

impl fmt::Display for CycleFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl std::error::Error for CycleFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
