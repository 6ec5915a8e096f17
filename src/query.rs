//! Query router for aggregate and raw reading requests.
//!
//! Inputs are parsed and validated first, then farm/system ids are resolved
//! through the entity directory, and only then is a store touched. Named
//! periods always aggregate live readings, since the current month is never
//! rolled up. A `custom` window is served from the monthly aggregates only
//! when both of its endpoints fall before the current month.

use std::sync::Arc;

use chrono::{Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::error::{ServiceError, ServiceResult};
use crate::models::{first_of_month, AggregateResult, DateWindow, Period, ReadingPoint};
use crate::store::{AggregateStore, EntityDirectory, EntityKind, ReadingStore};

// ---

/// Query string of the aggregate endpoint. Everything arrives as text so that
/// malformed values surface as validation errors with stable messages.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AggregateFilter {
    // ---
    pub farm_id: Option<String>,
    pub system_id: Option<String>,
    pub period: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// Query string of the raw data endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawFilter {
    // ---
    pub farm_id: Option<String>,
    pub system_id: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// Which store answered an aggregate request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Live,
    Rollup,
}

#[derive(Debug, Clone, Serialize)]
pub struct AggregateResponse {
    // ---
    pub period: Period,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub source: DataSource,
    pub aggregate_data: AggregateResult,
}

#[derive(Debug, Clone, Serialize)]
pub struct RawDataResponse {
    // ---
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub data: Vec<ReadingPoint>,
}

pub struct QueryRouter {
    readings: Arc<dyn ReadingStore>,
    aggregates: Arc<dyn AggregateStore>,
    directory: Arc<dyn EntityDirectory>,
}

impl QueryRouter {
    // ---
    pub fn new(
        readings: Arc<dyn ReadingStore>,
        aggregates: Arc<dyn AggregateStore>,
        directory: Arc<dyn EntityDirectory>,
    ) -> Self {
        Self {
            readings,
            aggregates,
            directory,
        }
    }

    pub async fn aggregate(&self, filter: &AggregateFilter) -> ServiceResult<AggregateResponse> {
        self.aggregate_on(filter, Utc::now().date_naive()).await
    }

    /// Aggregate with an explicit notion of "today" (UTC calendar day).
    pub async fn aggregate_on(
        &self,
        filter: &AggregateFilter,
        today: NaiveDate,
    ) -> ServiceResult<AggregateResponse> {
        // ---
        let farm_id = parse_id("farm_id", filter.farm_id.as_deref())?;
        let system_id = parse_id("system_id", filter.system_id.as_deref())?;
        let period = parse_period(filter.period.as_deref())?;

        let (start, end) = if period == Period::Custom {
            let start = require_date("start_date", filter.start_date.as_deref())?;
            let end = require_date("end_date", filter.end_date.as_deref())?;
            if start >= end {
                return Err(ServiceError::validation(
                    "start_date must be earlier than end_date",
                ));
            }
            (Some(start), Some(end))
        } else {
            (None, None)
        };

        ensure_known(self.directory.as_ref(), farm_id, system_id).await?;

        let window = resolve_window(period, today, start, end);
        let source = select_source(period, window, today);
        info!(
            %farm_id, %system_id, period = period.as_str(), ?source,
            "Aggregating {} .. {}", window.start, window.end
        );

        let aggregate_data = match source {
            DataSource::Live => self
                .readings
                .live_aggregate(farm_id, system_id, window)
                .await
                .map_err(|e| {
                    error!("Live aggregate failed: {:#}", e);
                    ServiceError::Aggregation(e)
                })?,
            DataSource::Rollup => {
                let metrics = self
                    .aggregates
                    .pivot(farm_id, system_id, window)
                    .await
                    .map_err(|e| {
                        error!("Aggregate pivot failed: {:#}", e);
                        ServiceError::Aggregation(e)
                    })?;
                AggregateResult::from_metrics(&metrics)
            }
        };

        Ok(AggregateResponse {
            period,
            start_date: window.start,
            end_date: window.end,
            source,
            aggregate_data,
        })
    }

    /// Raw samples for an inclusive date window. Single-day windows are
    /// allowed here.
    pub async fn raw(&self, filter: &RawFilter) -> ServiceResult<RawDataResponse> {
        // ---
        let farm_id = parse_id("farm_id", filter.farm_id.as_deref())?;
        let system_id = parse_id("system_id", filter.system_id.as_deref())?;
        let start = require_date("start_date", filter.start_date.as_deref())?;
        let end = require_date("end_date", filter.end_date.as_deref())?;
        if start > end {
            return Err(ServiceError::validation(
                "start_date must not be later than end_date",
            ));
        }

        ensure_known(self.directory.as_ref(), farm_id, system_id).await?;

        let data = self
            .readings
            .range(farm_id, system_id, DateWindow::new(start, end))
            .await
            .map_err(|e| {
                error!("Reading range query failed: {:#}", e);
                ServiceError::Aggregation(e)
            })?;

        debug!("Returning {} raw readings", data.len());
        Ok(RawDataResponse {
            start_date: start,
            end_date: end,
            data,
        })
    }
}

// ---

/// Resolve a farm and a system unit through the directory. Lookup failures are
/// logged and reported as not found.
pub async fn ensure_known(
    directory: &dyn EntityDirectory,
    farm_id: Uuid,
    system_id: Uuid,
) -> ServiceResult<()> {
    // ---
    for (kind, id) in [(EntityKind::Farm, farm_id), (EntityKind::SystemUnit, system_id)] {
        match directory.exists(kind, id).await {
            Ok(true) => {}
            Ok(false) => {
                return Err(ServiceError::not_found(format!("invalid {} id", kind.label())));
            }
            Err(e) => {
                error!("Directory lookup for {} {} failed: {:#}", kind.label(), id, e);
                return Err(ServiceError::not_found(format!("invalid {} id", kind.label())));
            }
        }
    }
    Ok(())
}

fn parse_id(name: &str, raw: Option<&str>) -> ServiceResult<Uuid> {
    // ---
    let raw = raw
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ServiceError::validation(format!("{name} is required")))?;
    Uuid::parse_str(raw.trim()).map_err(|_| ServiceError::validation(format!("invalid {name}")))
}

fn parse_period(raw: Option<&str>) -> ServiceResult<Period> {
    // ---
    let raw = raw
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ServiceError::validation("period is required"))?;
    raw.parse::<Period>().map_err(ServiceError::Validation)
}

fn require_date(name: &str, raw: Option<&str>) -> ServiceResult<NaiveDate> {
    // ---
    let raw = raw
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ServiceError::validation(format!("{name} is required")))?;
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| ServiceError::validation(format!("{name} must be formatted as YYYY-MM-DD")))
}

/// Window for a period as seen on `today`. `custom` uses the supplied dates;
/// callers validate that both are present.
pub fn resolve_window(
    period: Period,
    today: NaiveDate,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> DateWindow {
    // ---
    let days_back = |n: u64| today.checked_sub_days(Days::new(n)).unwrap_or(today);
    match period {
        Period::Today => DateWindow::new(today, today),
        Period::Last3Days => DateWindow::new(days_back(3), today),
        Period::Last30Days => DateWindow::new(days_back(30), today),
        Period::Custom => DateWindow::new(start.unwrap_or(today), end.unwrap_or(today)),
    }
}

/// Monthly aggregates only cover months before the current one, so they can
/// answer a `custom` window only when the whole window lies in that history.
pub fn select_source(period: Period, window: DateWindow, today: NaiveDate) -> DataSource {
    // ---
    let current_month = first_of_month(today);
    match period {
        Period::Custom if window.start < current_month && window.end < current_month => {
            DataSource::Rollup
        }
        _ => DataSource::Live,
    }
}
