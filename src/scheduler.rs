//! Monthly rollup scheduler.
//!
//! Fires the previous-month rollup at midnight UTC on the first day of every
//! month. The same engine instance also serves on-demand runs from the admin
//! routes. A failed scheduled run is logged and waits for the next tick.

use std::sync::Arc;

use chrono::{DateTime, Months, NaiveTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::ServiceResult;
use crate::models::first_of_month;
use crate::rollup::{RollupEngine, RollupReport};
use crate::store::SystemLog;

// ---

pub const BACKFILL_LOG_MESSAGE: &str = "Create Batch Aggregation";
pub const MONTHLY_LOG_MESSAGE: &str = "Create Monthly Aggregation";

pub struct Scheduler {
    engine: Arc<RollupEngine>,
    system_log: Arc<dyn SystemLog>,
}

impl Scheduler {
    // ---
    pub fn new(engine: Arc<RollupEngine>, system_log: Arc<dyn SystemLog>) -> Self {
        Self { engine, system_log }
    }

    pub async fn run_full_backfill(&self) -> ServiceResult<RollupReport> {
        // ---
        let report = self.engine.run_full_backfill().await?;
        self.record(BACKFILL_LOG_MESSAGE).await;
        Ok(report)
    }

    pub async fn run_previous_month(&self) -> ServiceResult<RollupReport> {
        // ---
        let report = self.engine.run_previous_month().await?;
        self.record(MONTHLY_LOG_MESSAGE).await;
        Ok(report)
    }

    async fn record(&self, message: &str) {
        if let Err(e) = self.system_log.record(message).await {
            warn!("Failed to write system log '{}': {:#}", message, e);
        }
    }

    /// Spawn the monthly timer. Stops when `cancel` fires.
    pub fn start(self: Arc<Self>, cancel: CancellationToken) {
        // ---
        tokio::spawn(async move {
            loop {
                let now = Utc::now();
                let next = next_monthly_tick(now);
                let wait = (next - now).to_std().unwrap_or_default();
                info!("Next scheduled rollup at {}", next);

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(wait) => {
                        match self.run_previous_month().await {
                            Ok(report) => info!(
                                groups = report.groups,
                                rows_written = report.rows_written,
                                "Scheduled rollup finished"
                            ),
                            Err(e) => warn!("Scheduled rollup failed: {}", e),
                        }
                    }
                }
            }
            info!("Rollup scheduler stopped");
        });
    }
}

/// Midnight UTC on the first day of the month after `now`.
pub fn next_monthly_tick(now: DateTime<Utc>) -> DateTime<Utc> {
    // ---
    let this_month = first_of_month(now.date_naive());
    let next_month = this_month
        .checked_add_months(Months::new(1))
        .unwrap_or(this_month);
    next_month.and_time(NaiveTime::MIN).and_utc()
}
