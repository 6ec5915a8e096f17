//! PostgreSQL implementations of the storage capabilities.
//!
//! Every statement binds its values as parameters. Bulk paths send columns as
//! arrays and expand them with `UNNEST`, so a whole batch is one statement and
//! commits or fails as a unit.

use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::PgPool;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{AggregateStore, EntityDirectory, EntityKind, ReadingStore, RollupRange, SystemLog};
use crate::models::{
    AggregateResult, DateWindow, MetricKey, MetricValue, MonthlyAggregateRow, MonthlySummary,
    NewReading, ReadingPoint, ReadingRow, StoredReading, TimeRange, GROWTH_HIST_METRIC_NAME,
};

// ---

#[derive(Clone)]
pub struct PgReadingStore {
    pool: PgPool,
}

impl PgReadingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct LiveAggregateRow {
    total_data: i64,
    total_ppm: f64,
    total_ph: f64,
    min_ppm: f64,
    max_ppm: f64,
    min_ph: f64,
    max_ph: f64,
}

#[async_trait]
impl ReadingStore for PgReadingStore {
    // ---
    async fn append(&self, reading: &NewReading) -> Result<StoredReading> {
        // ---
        debug!(
            farm_id = %reading.farm_id,
            system_id = %reading.system_id,
            "Inserting reading"
        );

        let stored: StoredReading = sqlx::query_as(
            r#"
            INSERT INTO readings (farm_id, system_id, ppm, ph, created_at)
            VALUES ($1, $2, $3, $4, NOW())
            RETURNING id, farm_id, system_id, ppm, ph, created_at
            "#,
        )
        .bind(reading.farm_id)
        .bind(reading.system_id)
        .bind(reading.ppm)
        .bind(reading.ph)
        .fetch_one(&self.pool)
        .await
        .context("failed to insert reading")?;

        Ok(stored)
    }

    async fn bulk_append(&self, rows: &[ReadingRow]) -> Result<u64> {
        // ---
        if rows.is_empty() {
            return Ok(0);
        }

        let mut farm_ids = Vec::with_capacity(rows.len());
        let mut system_ids = Vec::with_capacity(rows.len());
        let mut ppms = Vec::with_capacity(rows.len());
        let mut phs = Vec::with_capacity(rows.len());
        let mut created = Vec::with_capacity(rows.len());
        for row in rows {
            farm_ids.push(row.farm_id);
            system_ids.push(row.system_id);
            ppms.push(row.ppm);
            phs.push(row.ph);
            created.push(row.created_at);
        }

        let result = sqlx::query(
            r#"
            INSERT INTO readings (farm_id, system_id, ppm, ph, created_at)
            SELECT * FROM UNNEST($1::uuid[], $2::uuid[], $3::float8[], $4::float8[], $5::timestamptz[])
            "#,
        )
        .bind(farm_ids)
        .bind(system_ids)
        .bind(ppms)
        .bind(phs)
        .bind(created)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Bulk reading insert of {} rows failed: {}", rows.len(), e);
            e
        })
        .context("failed to bulk insert readings")?;

        info!("Bulk inserted {} readings", result.rows_affected());
        Ok(result.rows_affected())
    }

    async fn range(
        &self,
        farm_id: Uuid,
        system_id: Uuid,
        window: DateWindow,
    ) -> Result<Vec<ReadingPoint>> {
        // ---
        let points: Vec<ReadingPoint> = sqlx::query_as(
            r#"
            SELECT ppm, ph, created_at
            FROM readings
            WHERE farm_id = $1
              AND system_id = $2
              AND created_at >= $3
              AND created_at < $4
              AND deleted_at IS NULL
            "#,
        )
        .bind(farm_id)
        .bind(system_id)
        .bind(window.start_at())
        .bind(window.end_exclusive())
        .fetch_all(&self.pool)
        .await
        .context("failed to fetch readings")?;

        debug!("Fetched {} readings for {:?}", points.len(), window);
        Ok(points)
    }

    async fn live_aggregate(
        &self,
        farm_id: Uuid,
        system_id: Uuid,
        window: DateWindow,
    ) -> Result<AggregateResult> {
        // ---
        let row: LiveAggregateRow = sqlx::query_as(
            r#"
            SELECT
                COUNT(*)                        AS total_data,
                COALESCE(SUM(ppm), 0)::float8   AS total_ppm,
                COALESCE(SUM(ph), 0)::float8    AS total_ph,
                COALESCE(MIN(ppm), 0)::float8   AS min_ppm,
                COALESCE(MAX(ppm), 0)::float8   AS max_ppm,
                COALESCE(MIN(ph), 0)::float8    AS min_ph,
                COALESCE(MAX(ph), 0)::float8    AS max_ph
            FROM readings
            WHERE farm_id = $1
              AND system_id = $2
              AND created_at >= $3
              AND created_at < $4
              AND deleted_at IS NULL
            "#,
        )
        .bind(farm_id)
        .bind(system_id)
        .bind(window.start_at())
        .bind(window.end_exclusive())
        .fetch_one(&self.pool)
        .await
        .context("failed to compute live aggregate")?;

        Ok(AggregateResult {
            total_ppm: row.total_ppm,
            total_ph: row.total_ph,
            total_data: row.total_data,
            min_ppm: row.min_ppm,
            max_ppm: row.max_ppm,
            min_ph: row.min_ph,
            max_ph: row.max_ph,
            ..Default::default()
        }
        .with_averages())
    }

    async fn monthly_summaries(&self, range: RollupRange) -> Result<Vec<MonthlySummary>> {
        // ---
        let summaries: Vec<MonthlySummary> = sqlx::query_as(
            r#"
            SELECT
                farm_id,
                system_id,
                EXTRACT(YEAR FROM created_at AT TIME ZONE 'UTC')::int4  AS year,
                EXTRACT(MONTH FROM created_at AT TIME ZONE 'UTC')::int4 AS month,
                COUNT(*)          AS total_data,
                SUM(ppm)::float8  AS total_ppm,
                SUM(ph)::float8   AS total_ph,
                MAX(ppm)::float8  AS max_ppm,
                MIN(ppm)::float8  AS min_ppm,
                MAX(ph)::float8   AS max_ph,
                MIN(ph)::float8   AS min_ph
            FROM readings
            WHERE ($1::timestamptz IS NULL OR created_at >= $1)
              AND created_at < $2
              AND deleted_at IS NULL
            GROUP BY farm_id, system_id, year, month
            ORDER BY year, month, farm_id, system_id
            "#,
        )
        .bind(range.from)
        .bind(range.until)
        .fetch_all(&self.pool)
        .await
        .context("failed to group readings by month")?;

        info!("Grouped readings into {} monthly summaries", summaries.len());
        Ok(summaries)
    }
}

// ---

#[derive(Clone)]
pub struct PgAggregateStore {
    pool: PgPool,
}

impl PgAggregateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct PivotRow {
    metric_key: String,
    max_value: f64,
    min_value: f64,
    sum_value: f64,
}

#[async_trait]
impl AggregateStore for PgAggregateStore {
    // ---
    async fn bulk_insert(&self, rows: &[MonthlyAggregateRow]) -> Result<u64> {
        // ---
        if rows.is_empty() {
            return Ok(0);
        }

        let mut farm_ids = Vec::with_capacity(rows.len());
        let mut system_ids = Vec::with_capacity(rows.len());
        let mut keys = Vec::with_capacity(rows.len());
        let mut values = Vec::with_capacity(rows.len());
        let mut ranges = Vec::with_capacity(rows.len());
        let mut buckets: Vec<NaiveDate> = Vec::with_capacity(rows.len());
        let mut computed = Vec::with_capacity(rows.len());
        for row in rows {
            let bucket = row.bucket_date().with_context(|| {
                format!("invalid rollup month {}-{}", row.year, row.month)
            })?;
            farm_ids.push(row.farm_id);
            system_ids.push(row.system_id);
            keys.push(row.metric.as_str().to_string());
            values.push(row.value);
            ranges.push(row.time_range.as_str().to_string());
            buckets.push(bucket);
            computed.push(row.computed_at);
        }

        let result = sqlx::query(
            r#"
            INSERT INTO monthly_aggregates
                (farm_id, system_id, metric_name, metric_key, value, time_range, bucket_date, created_at)
            SELECT u.farm_id, u.system_id, $1, u.metric_key, u.value, u.time_range, u.bucket_date, u.created_at
            FROM UNNEST(
                $2::uuid[], $3::uuid[], $4::text[], $5::float8[], $6::text[], $7::date[], $8::timestamptz[]
            ) AS u(farm_id, system_id, metric_key, value, time_range, bucket_date, created_at)
            "#,
        )
        .bind(GROWTH_HIST_METRIC_NAME)
        .bind(farm_ids)
        .bind(system_ids)
        .bind(keys)
        .bind(values)
        .bind(ranges)
        .bind(buckets)
        .bind(computed)
        .execute(&self.pool)
        .await
        .context("failed to bulk insert monthly aggregates")?;

        info!("Bulk inserted {} aggregate rows", result.rows_affected());
        Ok(result.rows_affected())
    }

    async fn pivot(
        &self,
        farm_id: Uuid,
        system_id: Uuid,
        window: DateWindow,
    ) -> Result<Vec<MetricValue>> {
        // ---
        let rows: Vec<PivotRow> = sqlx::query_as(
            r#"
            SELECT
                metric_key,
                MAX(value)::float8 AS max_value,
                MIN(value)::float8 AS min_value,
                SUM(value)::float8 AS sum_value
            FROM monthly_aggregates
            WHERE metric_name = $1
              AND time_range = $2
              AND farm_id = $3
              AND system_id = $4
              AND bucket_date BETWEEN $5 AND $6
            GROUP BY metric_key
            "#,
        )
        .bind(GROWTH_HIST_METRIC_NAME)
        .bind(TimeRange::Monthly.as_str())
        .bind(farm_id)
        .bind(system_id)
        .bind(window.start)
        .bind(window.end)
        .fetch_all(&self.pool)
        .await
        .context("failed to pivot monthly aggregates")?;

        let mut by_key: HashMap<MetricKey, f64> = HashMap::new();
        for row in rows {
            match row.metric_key.parse::<MetricKey>() {
                Ok(key) => {
                    let value = key
                        .reducer()
                        .pick(row.max_value, row.min_value, row.sum_value);
                    by_key.insert(key, value);
                }
                Err(e) => warn!("Skipping aggregate row: {}", e),
            }
        }

        Ok(MetricKey::ALL
            .into_iter()
            .map(|metric| MetricValue {
                metric,
                value: by_key.get(&metric).copied().unwrap_or(0.0),
            })
            .collect())
    }
}

// ---

#[derive(Clone)]
pub struct PgEntityDirectory {
    pool: PgPool,
}

impl PgEntityDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EntityDirectory for PgEntityDirectory {
    async fn exists(&self, kind: EntityKind, id: Uuid) -> Result<bool> {
        // ---
        let sql = match kind {
            EntityKind::Farm => {
                "SELECT EXISTS (SELECT 1 FROM farms WHERE id = $1 AND deleted_at IS NULL)"
            }
            EntityKind::SystemUnit => {
                "SELECT EXISTS (SELECT 1 FROM system_units WHERE id = $1 AND deleted_at IS NULL)"
            }
        };

        let found: bool = sqlx::query_scalar(sql)
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("failed to look up {} {}", kind.label(), id))?;
        Ok(found)
    }
}

// ---

#[derive(Clone)]
pub struct PgSystemLog {
    pool: PgPool,
}

impl PgSystemLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SystemLog for PgSystemLog {
    async fn record(&self, message: &str) -> Result<()> {
        // ---
        sqlx::query("INSERT INTO system_logs (message, created_at) VALUES ($1, $2)")
            .bind(message)
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .context("failed to write system log")?;

        debug!("System log recorded: {}", message);
        Ok(())
    }
}
