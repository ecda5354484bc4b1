use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::config::{CollectionConfig, CollectionRegistry};
use crate::engine::PollCycle;
use crate::reporter;

/// Runs a [`PollCycle`] for every collection on a fixed interval.
///
/// Each collection gets its own task and timer. A cycle is awaited inside
/// its task, so cycles of one collection never overlap; ticks missed while a
/// cycle overruns are dropped rather than queued.
pub struct Scheduler {
    cycle: Arc<PollCycle>,
    registry: CollectionRegistry,
    interval: Duration,
    grace: Duration,
}

impl Scheduler {
    pub fn new(
        cycle: Arc<PollCycle>,
        registry: CollectionRegistry,
        interval: Duration,
        grace: Duration,
    ) -> Self {
        Self {
            cycle,
            registry,
            interval,
            grace,
        }
    }

    /// Poll until `shutdown` flips to `true` (or its sender is dropped).
    ///
    /// In-flight cycles are allowed to finish for up to the grace period,
    /// after which their tasks are aborted.
    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        info!(
            "Scheduling {} collection(s) every {}s",
            self.registry.len(),
            self.interval.as_secs()
        );

        let handles: Vec<JoinHandle<()>> = self
            .registry
            .iter()
            .cloned()
            .map(|collection| {
                tokio::spawn(collection_loop(
                    self.cycle.clone(),
                    collection,
                    self.interval,
                    shutdown.clone(),
                ))
            })
            .collect();
        let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();

        let mut shutdown = shutdown;
        wait_for_shutdown(&mut shutdown).await;
        info!("Shutdown requested, waiting up to {}s for in-flight cycles", self.grace.as_secs());

        match tokio::time::timeout(self.grace, join_all(handles)).await {
            Ok(results) => {
                for result in results {
                    if let Err(e) = result {
                        warn!("Collection task ended abnormally: {e}");
                    }
                }
                info!("All collection tasks stopped");
            }
            Err(_) => {
                warn!("Grace period elapsed, aborting remaining cycles");
                for abort in aborts {
                    abort.abort();
                }
            }
        }
    }
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Idle → Running → Idle, forever, for one collection.
async fn collection_loop(
    cycle: Arc<PollCycle>,
    collection: CollectionConfig,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = wait_for_shutdown(&mut shutdown) => break,
            _ = ticker.tick() => {}
        }

        match cycle.run(&collection, Utc::now()).await {
            Ok(report) => reporter::report_cycle(&report),
            Err(failure) => {
                if let Some(report) = &failure.report {
                    reporter::report_cycle(report);
                }
                warn!("Poll cycle error ({} stage): {failure}", failure.stage());
            }
        }
    }
    info!("Stopped polling {}", collection.name);
}
