//! Storage capabilities used by the core.
//!
//! Each capability is a trait so the rollup engine, the query router and the
//! synthetic generator can be driven by the PostgreSQL implementations in
//! production and by in-memory ones under test.
//!
//! Reads and writes are not wrapped in a shared transaction. A reading that
//! lands between a rollup's grouping read and its bulk write may or may not be
//! reflected in that month's summary.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    AggregateResult, DateWindow, MetricValue, MonthlyAggregateRow, MonthlySummary, NewReading,
    ReadingPoint, ReadingRow, StoredReading,
};

#[cfg(test)]
pub mod memory;
mod postgres;

pub use postgres::{PgAggregateStore, PgEntityDirectory, PgReadingStore, PgSystemLog};

// ---

/// Half-open timestamp range `[from, until)` read by a rollup run. `from` of
/// `None` means "from the first reading ever stored".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollupRange {
    // ---
    pub from: Option<DateTime<Utc>>,
    pub until: DateTime<Utc>,
}

/// Append-mostly store of raw sensor samples.
#[async_trait]
pub trait ReadingStore: Send + Sync {
    // ---
    /// Persist one reading stamped with the store's own clock.
    async fn append(&self, reading: &NewReading) -> anyhow::Result<StoredReading>;

    /// Persist many readings with caller-assigned timestamps in one
    /// statement. Either every row is written or none is.
    async fn bulk_append(&self, rows: &[ReadingRow]) -> anyhow::Result<u64>;

    /// Raw samples in the inclusive date window. Order is not guaranteed.
    async fn range(
        &self,
        farm_id: Uuid,
        system_id: Uuid,
        window: DateWindow,
    ) -> anyhow::Result<Vec<ReadingPoint>>;

    /// Single-pass sum/count/min/max over the inclusive date window. An empty
    /// window yields an all-zero result.
    async fn live_aggregate(
        &self,
        farm_id: Uuid,
        system_id: Uuid,
        window: DateWindow,
    ) -> anyhow::Result<AggregateResult>;

    /// Per-(farm, system, year, month) summaries of readings in `range`.
    async fn monthly_summaries(&self, range: RollupRange) -> anyhow::Result<Vec<MonthlySummary>>;
}

/// Store of precomputed monthly summary rows.
#[async_trait]
pub trait AggregateStore: Send + Sync {
    // ---
    /// Insert all rows in one statement, all-or-nothing.
    async fn bulk_insert(&self, rows: &[MonthlyAggregateRow]) -> anyhow::Result<u64>;

    /// One value per canonical metric key for months whose bucket date falls
    /// in the window: MAX for `max_*`, MIN for `min_*`, SUM for `total_*`.
    /// Keys without rows come back as 0.
    async fn pivot(
        &self,
        farm_id: Uuid,
        system_id: Uuid,
        window: DateWindow,
    ) -> anyhow::Result<Vec<MetricValue>>;
}

/// Kinds of externally owned entities the core needs to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Farm,
    SystemUnit,
}

impl EntityKind {
    pub fn label(self) -> &'static str {
        match self {
            EntityKind::Farm => "farm",
            EntityKind::SystemUnit => "system unit",
        }
    }
}

/// Existence checks answered by the farm/system CRUD side of the platform.
#[async_trait]
pub trait EntityDirectory: Send + Sync {
    async fn exists(&self, kind: EntityKind, id: Uuid) -> anyhow::Result<bool>;
}

/// Append-only audit trail of maintenance and ingestion events.
#[async_trait]
pub trait SystemLog: Send + Sync {
    async fn record(&self, message: &str) -> anyhow::Result<()>;
}
