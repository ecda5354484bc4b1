use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::types::RawRecord;

/// Outcome of selecting the deliverable sales from a fetched batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    /// Records to deliver, ascending by timestamp.
    pub to_deliver: Vec<RawRecord>,
    /// `max(watermark, newest delivered timestamp)`.
    pub new_watermark: DateTime<Utc>,
    pub skipped_stale: usize,
    pub skipped_processed: usize,
}

/// Pick the genuinely new completed sales out of a raw feed batch.
///
/// Non-sales are dropped, the rest is sorted ascending by timestamp, then
/// anything older than `now - staleness_window` or not newer than
/// `watermark` is skipped. Records without a parsable timestamp sort at the
/// epoch and therefore fall out as stale.
pub fn select(
    records: &[RawRecord],
    watermark: DateTime<Utc>,
    now: DateTime<Utc>,
    staleness_window: Duration,
) -> Selection {
    let window = TimeDelta::from_std(staleness_window).unwrap_or(TimeDelta::MAX);
    let cutoff = now.checked_sub_signed(window).unwrap_or(DateTime::<Utc>::MIN_UTC);

    let mut sales: Vec<(DateTime<Utc>, &RawRecord)> = records
        .iter()
        .filter(|r| r.is_completed_sale())
        .map(|r| (r.timestamp(), r))
        .collect();
    // Stable, so equal timestamps keep feed order.
    sales.sort_by_key(|(ts, _)| *ts);

    let mut selection = Selection {
        to_deliver: Vec::new(),
        new_watermark: watermark,
        skipped_stale: 0,
        skipped_processed: 0,
    };

    for (ts, record) in sales {
        if ts < cutoff {
            selection.skipped_stale += 1;
            continue;
        }
        if ts <= watermark {
            selection.skipped_processed += 1;
            continue;
        }
        selection.new_watermark = selection.new_watermark.max(ts);
        selection.to_deliver.push(record.clone());
    }

    selection
}
