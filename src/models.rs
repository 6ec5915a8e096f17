//! Data models shared by the stores, the rollup engine and the query router.
//!
//! Readings are immutable sensor samples. Monthly summaries are computed in a
//! normalized shape ([`MonthlySummary`]) and flattened into one
//! [`MonthlyAggregateRow`] per metric only when they are persisted, which keeps
//! the entity-attribute-value layout confined to the aggregate table.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---

/// Dataset name stamped on every aggregate row produced from readings.
pub const GROWTH_HIST_METRIC_NAME: &str = "growth-hist";

/// Ingestion payload for a single reading. The timestamp is always assigned by
/// the store.
#[derive(Debug, Clone, Deserialize)]
pub struct NewReading {
    // ---
    pub farm_id: Uuid,
    pub system_id: Uuid,
    pub ppm: f64,
    pub ph: f64,
}

/// A persisted reading as returned by the single-row append path.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct StoredReading {
    // ---
    pub id: Uuid,
    pub farm_id: Uuid,
    pub system_id: Uuid,
    pub ppm: f64,
    pub ph: f64,
    pub created_at: DateTime<Utc>,
}

/// Bulk-insert row with a caller-assigned timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadingRow {
    // ---
    pub farm_id: Uuid,
    pub system_id: Uuid,
    pub ppm: f64,
    pub ph: f64,
    pub created_at: DateTime<Utc>,
}

/// Raw sample returned by range queries.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct ReadingPoint {
    // ---
    pub ppm: f64,
    pub ph: f64,
    pub created_at: DateTime<Utc>,
}

// ---

/// Closed calendar-day interval `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    // ---
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    // ---
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Midnight UTC of the first day.
    pub fn start_at(&self) -> DateTime<Utc> {
        self.start.and_time(NaiveTime::MIN).and_utc()
    }

    /// Midnight UTC of the day after `end`, so timestamp filters can be
    /// half-open while the window itself stays inclusive.
    pub fn end_exclusive(&self) -> DateTime<Utc> {
        self.end
            .checked_add_days(Days::new(1))
            .unwrap_or(NaiveDate::MAX)
            .and_time(NaiveTime::MIN)
            .and_utc()
    }
}

// ---

/// The seven per-month metrics kept in the aggregate table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKey {
    TotalPpm,
    TotalPh,
    TotalData,
    MaxPpm,
    MinPpm,
    MaxPh,
    MinPh,
}

/// How monthly values of one metric combine into a longer period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reducer {
    Sum,
    Max,
    Min,
}

impl MetricKey {
    // ---
    pub const ALL: [MetricKey; 7] = [
        MetricKey::TotalPpm,
        MetricKey::TotalPh,
        MetricKey::TotalData,
        MetricKey::MaxPpm,
        MetricKey::MinPpm,
        MetricKey::MaxPh,
        MetricKey::MinPh,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MetricKey::TotalPpm => "total_ppm",
            MetricKey::TotalPh => "total_ph",
            MetricKey::TotalData => "total_data",
            MetricKey::MaxPpm => "max_ppm",
            MetricKey::MinPpm => "min_ppm",
            MetricKey::MaxPh => "max_ph",
            MetricKey::MinPh => "min_ph",
        }
    }

    pub fn reducer(self) -> Reducer {
        match self {
            MetricKey::MaxPpm | MetricKey::MaxPh => Reducer::Max,
            MetricKey::MinPpm | MetricKey::MinPh => Reducer::Min,
            MetricKey::TotalPpm | MetricKey::TotalPh | MetricKey::TotalData => Reducer::Sum,
        }
    }
}

impl Reducer {
    /// Pick this reducer's result out of the MAX/MIN/SUM of a metric's
    /// monthly values.
    pub fn pick(self, max: f64, min: f64, sum: f64) -> f64 {
        match self {
            Reducer::Sum => sum,
            Reducer::Max => max,
            Reducer::Min => min,
        }
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetricKey::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| format!("unknown metric key '{s}'"))
    }
}

/// Granularity of a persisted aggregate row. Only monthly rollups exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeRange {
    Monthly,
}

impl TimeRange {
    pub fn as_str(self) -> &'static str {
        match self {
            TimeRange::Monthly => "monthly",
        }
    }
}

// ---

/// Per-(farm, system, month) summary computed from raw readings.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct MonthlySummary {
    // ---
    pub farm_id: Uuid,
    pub system_id: Uuid,
    pub year: i32,
    pub month: i32,
    pub total_data: i64,
    pub total_ppm: f64,
    pub total_ph: f64,
    pub max_ppm: f64,
    pub min_ppm: f64,
    pub max_ph: f64,
    pub min_ph: f64,
}

impl MonthlySummary {
    // ---
    pub fn metric(&self, key: MetricKey) -> f64 {
        match key {
            MetricKey::TotalPpm => self.total_ppm,
            MetricKey::TotalPh => self.total_ph,
            MetricKey::TotalData => self.total_data as f64,
            MetricKey::MaxPpm => self.max_ppm,
            MetricKey::MinPpm => self.min_ppm,
            MetricKey::MaxPh => self.max_ph,
            MetricKey::MinPh => self.min_ph,
        }
    }

    /// Flatten into one EAV row per metric key.
    pub fn to_rows(&self, computed_at: DateTime<Utc>) -> Vec<MonthlyAggregateRow> {
        // ---
        MetricKey::ALL
            .into_iter()
            .map(|metric| MonthlyAggregateRow {
                farm_id: self.farm_id,
                system_id: self.system_id,
                year: self.year,
                month: self.month,
                metric,
                value: self.metric(metric),
                time_range: TimeRange::Monthly,
                computed_at,
            })
            .collect()
    }
}

/// One persisted metric of one month. Rows are never updated in place.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyAggregateRow {
    // ---
    pub farm_id: Uuid,
    pub system_id: Uuid,
    pub year: i32,
    pub month: i32,
    pub metric: MetricKey,
    pub value: f64,
    pub time_range: TimeRange,
    pub computed_at: DateTime<Utc>,
}

impl MonthlyAggregateRow {
    /// First day of the summarized month, or `None` for an out-of-range
    /// year/month pair.
    pub fn bucket_date(&self) -> Option<NaiveDate> {
        let month = u32::try_from(self.month).ok()?;
        NaiveDate::from_ymd_opt(self.year, month, 1)
    }
}

/// One pivoted metric as returned by the aggregate store.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricValue {
    // ---
    pub metric: MetricKey,
    pub value: f64,
}

// ---

/// Statistical summary over a window, from either store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AggregateResult {
    // ---
    pub total_ppm: f64,
    pub total_ph: f64,
    pub total_data: i64,
    pub min_ppm: f64,
    pub max_ppm: f64,
    pub min_ph: f64,
    pub max_ph: f64,
    pub avg_ppm: f64,
    pub avg_ph: f64,
}

impl AggregateResult {
    // ---
    /// Fill in the averages from the totals. Averages are 0 when there is no
    /// data.
    pub fn with_averages(mut self) -> Self {
        // ---
        if self.total_data > 0 {
            let count = self.total_data as f64;
            self.avg_ppm = self.total_ppm / count;
            self.avg_ph = self.total_ph / count;
        } else {
            self.avg_ppm = 0.0;
            self.avg_ph = 0.0;
        }
        self
    }

    /// Build from pivoted monthly metrics. Keys that are absent count as 0.
    pub fn from_metrics(metrics: &[MetricValue]) -> Self {
        // ---
        let mut result = AggregateResult::default();
        for m in metrics {
            match m.metric {
                MetricKey::TotalPpm => result.total_ppm = m.value,
                MetricKey::TotalPh => result.total_ph = m.value,
                MetricKey::TotalData => result.total_data = m.value.round().max(0.0) as i64,
                MetricKey::MaxPpm => result.max_ppm = m.value,
                MetricKey::MinPpm => result.min_ppm = m.value,
                MetricKey::MaxPh => result.max_ph = m.value,
                MetricKey::MinPh => result.min_ph = m.value,
            }
        }
        result.with_averages()
    }
}

// ---

/// Named window a caller can ask an aggregate for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Period {
    #[serde(rename = "today")]
    Today,
    #[serde(rename = "last_3_days")]
    Last3Days,
    #[serde(rename = "last_30_days")]
    Last30Days,
    #[serde(rename = "custom")]
    Custom,
}

impl Period {
    pub fn as_str(self) -> &'static str {
        match self {
            Period::Today => "today",
            Period::Last3Days => "last_3_days",
            Period::Last30Days => "last_30_days",
            Period::Custom => "custom",
        }
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "today" => Ok(Period::Today),
            "last_3_days" => Ok(Period::Last3Days),
            "last_30_days" => Ok(Period::Last30Days),
            "custom" => Ok(Period::Custom),
            other => Err(format!("invalid period '{other}'")),
        }
    }
}

/// First day of the month containing `day`.
pub fn first_of_month(day: NaiveDate) -> NaiveDate {
    day.with_day(1).unwrap_or(day)
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::TimeZone;

    fn summary() -> MonthlySummary {
        // ---
        MonthlySummary {
            farm_id: Uuid::nil(),
            system_id: Uuid::nil(),
            year: 2025,
            month: 3,
            total_data: 4,
            total_ppm: 2000.0,
            total_ph: 28.0,
            max_ppm: 800.0,
            min_ppm: 200.0,
            max_ph: 8.5,
            min_ph: 5.5,
        }
    }

    #[test]
    fn test_summary_flattens_to_one_row_per_metric() {
        // ---
        let computed_at = Utc.with_ymd_and_hms(2025, 4, 1, 0, 0, 0).unwrap();
        let rows = summary().to_rows(computed_at);

        assert_eq!(rows.len(), MetricKey::ALL.len());
        for key in MetricKey::ALL {
            assert_eq!(rows.iter().filter(|r| r.metric == key).count(), 1);
        }
        let total_data = rows.iter().find(|r| r.metric == MetricKey::TotalData).unwrap();
        assert_eq!(total_data.value, 4.0);
        assert_eq!(
            total_data.bucket_date(),
            NaiveDate::from_ymd_opt(2025, 3, 1)
        );
    }

    #[test]
    fn test_reducer_per_metric_family() {
        // ---
        assert_eq!(MetricKey::MaxPh.reducer().pick(9.0, 1.0, 20.0), 9.0);
        assert_eq!(MetricKey::MinPpm.reducer().pick(9.0, 1.0, 20.0), 1.0);
        assert_eq!(MetricKey::TotalData.reducer().pick(9.0, 1.0, 20.0), 20.0);
        assert_eq!(MetricKey::TotalPh.reducer(), Reducer::Sum);
    }

    #[test]
    fn test_metric_key_round_trip_names() {
        // ---
        for key in MetricKey::ALL {
            assert_eq!(key.as_str().parse::<MetricKey>().unwrap(), key);
        }
        assert!("avg_ppm".parse::<MetricKey>().is_err());
    }

    #[test]
    fn test_averages_are_zero_without_data() {
        // ---
        let empty = AggregateResult::default().with_averages();
        assert_eq!(empty.avg_ppm, 0.0);
        assert_eq!(empty.avg_ph, 0.0);

        let result = AggregateResult {
            total_ppm: 1500.0,
            total_ph: 21.0,
            total_data: 3,
            ..Default::default()
        }
        .with_averages();
        assert!((result.avg_ppm - 500.0).abs() < 1e-9);
        assert!((result.avg_ph - 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_from_metrics_fills_missing_keys_with_zero() {
        // ---
        let result = AggregateResult::from_metrics(&[
            MetricValue { metric: MetricKey::TotalPpm, value: 900.0 },
            MetricValue { metric: MetricKey::TotalData, value: 3.0 },
        ]);
        assert_eq!(result.total_data, 3);
        assert_eq!(result.avg_ppm, 300.0);
        assert_eq!(result.max_ph, 0.0);
        assert_eq!(result.avg_ph, 0.0);
    }

    #[test]
    fn test_window_bounds_are_inclusive() {
        // ---
        let window = DateWindow::new(
            NaiveDate::from_ymd_opt(2025, 1, 10).unwrap(),
            NaiveDate::from_ymd_opt(2025, 1, 12).unwrap(),
        );
        assert_eq!(
            window.start_at(),
            Utc.with_ymd_and_hms(2025, 1, 10, 0, 0, 0).unwrap()
        );
        assert_eq!(
            window.end_exclusive(),
            Utc.with_ymd_and_hms(2025, 1, 13, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_period_parsing() {
        // ---
        assert_eq!("last_3_days".parse::<Period>().unwrap(), Period::Last3Days);
        assert_eq!("custom".parse::<Period>().unwrap(), Period::Custom);
        assert!("yesterday".parse::<Period>().is_err());
        assert!("".parse::<Period>().is_err());
    }
}
