//! Database schema management for `hydro-rollup`.
//!
//! Ensures required tables and indexes exist before serving requests.
//! Applied once on startup from `main.rs` (EMBP: single gateway call).

use anyhow::Result;
use sqlx::PgPool;

// ---

/// Create the database schema if it does not exist (idempotent).
///
/// Creates `readings` for raw samples, `monthly_aggregates` for rollup output
/// (one row per metric per month) and `system_logs` for the audit trail.
/// `farms` and `system_units` belong to the farm management side of the
/// platform; only their id/soft-delete columns are ensured here so existence
/// lookups work against a fresh database.
///
/// `monthly_aggregates` has no unique key on (farm, system, month, metric);
/// re-running a rollup appends rows.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    for statement in STATEMENTS {
        sqlx::query(statement).execute(&mut *tx).await?;
    }

    tx.commit().await?;
    tracing::info!("Database schema ready");
    Ok(())
}

const STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS farms (
        id          UUID PRIMARY KEY,
        deleted_at  TIMESTAMPTZ
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS system_units (
        id          UUID PRIMARY KEY,
        deleted_at  TIMESTAMPTZ
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS readings (
        id          UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        farm_id     UUID             NOT NULL,
        system_id   UUID             NOT NULL,
        ppm         DOUBLE PRECISION NOT NULL,
        ph          DOUBLE PRECISION NOT NULL,
        created_at  TIMESTAMPTZ      NOT NULL DEFAULT NOW(),
        deleted_at  TIMESTAMPTZ
    );
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_readings_farm_system_created
        ON readings (farm_id, system_id, created_at);
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_readings_created_at
        ON readings (created_at);
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS monthly_aggregates (
        id          UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        farm_id     UUID             NOT NULL,
        system_id   UUID             NOT NULL,
        metric_name TEXT             NOT NULL,
        metric_key  TEXT             NOT NULL,
        value       DOUBLE PRECISION NOT NULL,
        time_range  TEXT             NOT NULL,
        bucket_date DATE             NOT NULL,
        created_at  TIMESTAMPTZ      NOT NULL DEFAULT NOW()
    );
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_monthly_aggregates_lookup
        ON monthly_aggregates (farm_id, system_id, bucket_date);
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS system_logs (
        id          UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        message     TEXT        NOT NULL,
        created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
    );
    "#,
];
