//! Monthly rollup engine.
//!
//! Compresses raw readings into one summary per (farm, system, month) and
//! stores it as one aggregate row per metric. Full backfill and the
//! previous-month run are the same operation over different ranges.
//!
//! A run is not idempotent: rolling up a month that already has aggregate rows
//! appends another set of rows for it.

use std::sync::Arc;

use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use tracing::{error, info};

use crate::error::{ServiceError, ServiceResult};
use crate::models::{first_of_month, MonthlyAggregateRow};
use crate::store::{AggregateStore, ReadingStore, RollupRange};

// ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollupMode {
    /// Every month strictly before the current one.
    FullBackfill,
    /// Only the month before the current one.
    PreviousMonth,
}

impl RollupMode {
    /// Timestamp range this mode covers when run on `today` (UTC).
    pub fn range(self, today: NaiveDate) -> RollupRange {
        // ---
        let current = first_of_month(today);
        let until = midnight(current);
        match self {
            RollupMode::FullBackfill => RollupRange { from: None, until },
            RollupMode::PreviousMonth => {
                let previous = current
                    .checked_sub_days(Days::new(1))
                    .map(first_of_month)
                    .unwrap_or(current);
                RollupRange {
                    from: Some(midnight(previous)),
                    until,
                }
            }
        }
    }
}

fn midnight(day: NaiveDate) -> DateTime<Utc> {
    day.and_time(NaiveTime::MIN).and_utc()
}

/// Outcome of one rollup run.
#[derive(Debug, Clone, Serialize)]
pub struct RollupReport {
    // ---
    pub from: Option<DateTime<Utc>>,
    pub until: DateTime<Utc>,
    /// Number of (farm, system, month) groups summarized.
    pub groups: usize,
    pub rows_written: u64,
}

pub struct RollupEngine {
    readings: Arc<dyn ReadingStore>,
    aggregates: Arc<dyn AggregateStore>,
}

impl RollupEngine {
    // ---
    pub fn new(readings: Arc<dyn ReadingStore>, aggregates: Arc<dyn AggregateStore>) -> Self {
        Self {
            readings,
            aggregates,
        }
    }

    pub async fn run_full_backfill(&self) -> ServiceResult<RollupReport> {
        self.run_mode(RollupMode::FullBackfill, Utc::now().date_naive())
            .await
    }

    pub async fn run_previous_month(&self) -> ServiceResult<RollupReport> {
        self.run_mode(RollupMode::PreviousMonth, Utc::now().date_naive())
            .await
    }

    pub async fn run_mode(&self, mode: RollupMode, today: NaiveDate) -> ServiceResult<RollupReport> {
        // ---
        info!("Starting {:?} rollup", mode);
        self.run(mode.range(today)).await
    }

    /// Summarize every month in `range` and persist the flattened rows.
    ///
    /// A failed grouping read aborts before anything is written. A failed
    /// insert is reported as-is; retrying is left to the caller.
    pub async fn run(&self, range: RollupRange) -> ServiceResult<RollupReport> {
        // ---
        let summaries = self
            .readings
            .monthly_summaries(range)
            .await
            .map_err(|e| {
                error!("Rollup read failed for {:?}: {:#}", range, e);
                ServiceError::Aggregation(e)
            })?;

        let computed_at = Utc::now();
        let rows: Vec<MonthlyAggregateRow> = summaries
            .iter()
            .flat_map(|s| s.to_rows(computed_at))
            .collect();

        let rows_written = if rows.is_empty() {
            0
        } else {
            self.aggregates.bulk_insert(&rows).await.map_err(|e| {
                error!("Rollup insert of {} rows failed: {:#}", rows.len(), e);
                ServiceError::Insert(e)
            })?
        };

        info!(
            groups = summaries.len(),
            rows_written, "Rollup complete for {:?}", range
        );

        Ok(RollupReport {
            from: range.from,
            until: range.until,
            groups: summaries.len(),
            rows_written,
        })
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::models::{MetricKey, ReadingRow};
    use crate::store::memory::{MemoryAggregateStore, MemoryReadingStore};
    use chrono::TimeZone;
    use std::sync::atomic::Ordering;
    use uuid::Uuid;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn row(farm: Uuid, system: Uuid, ts: DateTime<Utc>, ppm: f64, ph: f64) -> ReadingRow {
        ReadingRow {
            farm_id: farm,
            system_id: system,
            ppm,
            ph,
            created_at: ts,
        }
    }

    async fn seeded() -> (Arc<MemoryReadingStore>, Arc<MemoryAggregateStore>, Uuid, Uuid) {
        // ---
        let readings = Arc::new(MemoryReadingStore::default());
        let aggregates = Arc::new(MemoryAggregateStore::default());
        let farm = Uuid::new_v4();
        let system = Uuid::new_v4();

        readings
            .bulk_append(&[
                // January 2025: two readings
                row(farm, system, Utc.with_ymd_and_hms(2025, 1, 5, 10, 0, 0).unwrap(), 400.0, 6.0),
                row(farm, system, Utc.with_ymd_and_hms(2025, 1, 20, 10, 0, 0).unwrap(), 600.0, 7.0),
                // February 2025: one reading
                row(farm, system, Utc.with_ymd_and_hms(2025, 2, 14, 8, 0, 0).unwrap(), 500.0, 6.5),
                // March 2025 is the "current" month in these tests
                row(farm, system, Utc.with_ymd_and_hms(2025, 3, 2, 8, 0, 0).unwrap(), 900.0, 8.0),
            ])
            .await
            .unwrap();

        (readings, aggregates, farm, system)
    }

    #[test]
    fn test_mode_ranges() {
        // ---
        let today = day(2025, 3, 18);
        let full = RollupMode::FullBackfill.range(today);
        assert_eq!(full.from, None);
        assert_eq!(full.until, Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap());

        let prev = RollupMode::PreviousMonth.range(today);
        assert_eq!(prev.from, Some(Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap()));
        assert_eq!(prev.until, Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap());

        // Year boundary
        let jan = RollupMode::PreviousMonth.range(day(2025, 1, 1));
        assert_eq!(jan.from, Some(Utc.with_ymd_and_hms(2024, 12, 1, 0, 0, 0).unwrap()));
        assert_eq!(jan.until, Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn test_full_backfill_writes_one_row_per_metric_per_month() {
        // ---
        let (readings, aggregates, _, _) = seeded().await;
        let engine = RollupEngine::new(readings, aggregates.clone());

        let report = engine
            .run_mode(RollupMode::FullBackfill, day(2025, 3, 18))
            .await
            .unwrap();

        assert_eq!(report.groups, 2);
        assert_eq!(report.rows_written, 14);

        let rows = aggregates.all();
        for month in [1, 2] {
            for key in MetricKey::ALL {
                let n = rows
                    .iter()
                    .filter(|r| r.month == month && r.metric == key)
                    .count();
                assert_eq!(n, 1, "month {} metric {}", month, key);
            }
        }
        assert!(rows.iter().all(|r| r.month != 3), "current month must not be rolled up");

        let jan_total = rows
            .iter()
            .find(|r| r.month == 1 && r.metric == MetricKey::TotalPpm)
            .unwrap();
        assert_eq!(jan_total.value, 1000.0);
        let jan_min_ph = rows
            .iter()
            .find(|r| r.month == 1 && r.metric == MetricKey::MinPh)
            .unwrap();
        assert_eq!(jan_min_ph.value, 6.0);
    }

    #[tokio::test]
    async fn test_previous_month_only_covers_one_month() {
        // ---
        let (readings, aggregates, _, _) = seeded().await;
        let engine = RollupEngine::new(readings, aggregates.clone());

        let report = engine
            .run_mode(RollupMode::PreviousMonth, day(2025, 3, 1))
            .await
            .unwrap();

        assert_eq!(report.groups, 1);
        let rows = aggregates.all();
        assert_eq!(rows.len(), MetricKey::ALL.len());
        assert!(rows.iter().all(|r| r.year == 2025 && r.month == 2));
    }

    #[tokio::test]
    async fn test_rerun_appends_duplicate_rows() {
        // ---
        let (readings, aggregates, _, _) = seeded().await;
        let engine = RollupEngine::new(readings, aggregates.clone());
        let today = day(2025, 3, 18);

        engine.run_mode(RollupMode::PreviousMonth, today).await.unwrap();
        engine.run_mode(RollupMode::PreviousMonth, today).await.unwrap();

        let rows = aggregates.all();
        let feb_total_data = rows
            .iter()
            .filter(|r| r.month == 2 && r.metric == MetricKey::TotalData)
            .count();
        assert_eq!(feb_total_data, 2);
    }

    #[tokio::test]
    async fn test_failed_read_writes_nothing() {
        // ---
        let (readings, aggregates, _, _) = seeded().await;
        readings.fail_reads.store(true, Ordering::SeqCst);
        let engine = RollupEngine::new(readings, aggregates.clone());

        let err = engine
            .run_mode(RollupMode::FullBackfill, day(2025, 3, 18))
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::Aggregation(_)));
        assert_eq!(aggregates.call_count(), 0);
        assert!(aggregates.all().is_empty());
    }

    #[tokio::test]
    async fn test_failed_insert_is_reported() {
        // ---
        let (readings, aggregates, _, _) = seeded().await;
        aggregates.fail_writes.store(true, Ordering::SeqCst);
        let engine = RollupEngine::new(readings, aggregates.clone());

        let err = engine
            .run_mode(RollupMode::FullBackfill, day(2025, 3, 18))
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::Insert(_)));
        assert!(aggregates.all().is_empty());
    }

    #[tokio::test]
    async fn test_empty_history_skips_insert() {
        // ---
        let readings = Arc::new(MemoryReadingStore::default());
        let aggregates = Arc::new(MemoryAggregateStore::default());
        let engine = RollupEngine::new(readings, aggregates.clone());

        let report = engine
            .run_mode(RollupMode::FullBackfill, day(2025, 3, 18))
            .await
            .unwrap();

        assert_eq!(report.groups, 0);
        assert_eq!(report.rows_written, 0);
        assert_eq!(aggregates.call_count(), 0);
    }
}
