//! Synthetic history generator.
//!
//! Fills the reading store with one random reading per hour over the last four
//! years. Generation runs on a blocking thread pool shaped as
//!
//! ```text
//! dispatcher --jobs(bounded)--> W workers --rows(bounded)--> collector
//! ```
//!
//! where W is twice the available parallelism, capped at the number of hourly
//! slots. The call waits for every worker to finish and then for the collector
//! to drain the row queue before handing the buffer to a single bulk insert.
//! Cancelling the token stops the dispatcher and the workers; a cancelled run
//! writes nothing.

use std::sync::Arc;
use std::thread;
use std::time::Instant;

use anyhow::anyhow;
use chrono::{DateTime, Duration, DurationRound, Months, Utc};
use crossbeam_channel::bounded;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ServiceError, ServiceResult};
use crate::models::ReadingRow;
use crate::store::{ReadingStore, SystemLog};

// ---

/// Length of the generated history.
pub const HISTORY_MONTHS: u32 = 48;

const PPM_RANGE: std::ops::Range<f64> = 1.0..1001.0;
const PH_RANGE: std::ops::Range<f64> = 1.0..15.0;

#[derive(Debug, Clone, Deserialize)]
pub struct SyntheticRequest {
    // ---
    pub farm_id: Uuid,
    pub system_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyntheticReport {
    // ---
    pub farm_id: Uuid,
    pub system_id: Uuid,
    pub rows: u64,
    pub elapsed_ms: u64,
}

pub struct SyntheticGenerator {
    readings: Arc<dyn ReadingStore>,
    system_log: Arc<dyn SystemLog>,
}

impl SyntheticGenerator {
    // ---
    pub fn new(readings: Arc<dyn ReadingStore>, system_log: Arc<dyn SystemLog>) -> Self {
        Self {
            readings,
            system_log,
        }
    }

    /// Generate and persist the full synthetic history for one farm/system.
    ///
    /// Ids are used as given; callers are expected to pass resolved ones.
    pub async fn generate(
        &self,
        request: &SyntheticRequest,
        cancel: CancellationToken,
    ) -> ServiceResult<SyntheticReport> {
        // ---
        let started = Instant::now();
        let now = Utc::now();
        let end = now.duration_trunc(Duration::hours(1)).unwrap_or(now);
        let start = end
            .checked_sub_months(Months::new(HISTORY_MONTHS))
            .unwrap_or(end);

        info!(
            farm_id = %request.farm_id,
            system_id = %request.system_id,
            "Generating synthetic readings {} .. {}", start, end
        );

        let (farm_id, system_id) = (request.farm_id, request.system_id);
        let token = cancel.clone();
        let rows = tokio::task::spawn_blocking(move || {
            synthesize(farm_id, system_id, start, end, &token)
        })
        .await
        .map_err(|e| ServiceError::Insert(anyhow!("synthetic generation task failed: {e}")))??;

        if cancel.is_cancelled() {
            return Err(ServiceError::Cancelled);
        }

        let written = self
            .readings
            .bulk_append(&rows)
            .await
            .map_err(ServiceError::Insert)?;

        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(rows = written, elapsed_ms, "Synthetic generation complete");

        let message = format!(
            "Generate Synthetic Data: {{farm_id:{}, system_id:{}, rows:{}}}",
            farm_id, system_id, written
        );
        if let Err(e) = self.system_log.record(&message).await {
            warn!("Failed to write system log: {:#}", e);
        }

        Ok(SyntheticReport {
            farm_id,
            system_id,
            rows: written,
            elapsed_ms,
        })
    }
}

/// Number of whole hours in `[start, end)`.
pub fn hourly_slots(start: DateTime<Utc>, end: DateTime<Utc>) -> u64 {
    u64::try_from((end - start).num_hours()).unwrap_or(0)
}

/// Produce one random reading per hourly slot in `[start, end)` using the
/// dispatcher/worker/collector pipeline. Blocks the calling thread.
pub fn synthesize(
    farm_id: Uuid,
    system_id: Uuid,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    cancel: &CancellationToken,
) -> ServiceResult<Vec<ReadingRow>> {
    // ---
    let total = hourly_slots(start, end);
    if total == 0 {
        return Ok(Vec::new());
    }

    let parallelism = thread::available_parallelism().map_or(1, |n| n.get());
    let workers = usize::try_from(total).map_or(parallelism * 2, |t| t.min(parallelism * 2));
    debug!("Synthesizing {} slots with {} workers", total, workers);

    let (job_tx, job_rx) = bounded::<DateTime<Utc>>(workers);
    let (row_tx, row_rx) = bounded::<ReadingRow>(workers);

    let rows = thread::scope(|scope| {
        // ---
        scope.spawn(move || {
            for k in 0..total {
                if cancel.is_cancelled() {
                    break;
                }
                let Ok(hours) = i64::try_from(k) else { break };
                // Fails only once every worker has gone away.
                if job_tx.send(start + Duration::hours(hours)).is_err() {
                    break;
                }
            }
        });

        let handles: Vec<_> = (0..workers)
            .map(|_| {
                let jobs = job_rx.clone();
                let results = row_tx.clone();
                scope.spawn(move || {
                    let mut rng = rand::thread_rng();
                    for created_at in jobs.iter() {
                        if cancel.is_cancelled() {
                            break;
                        }
                        let row = ReadingRow {
                            farm_id,
                            system_id,
                            ppm: rng.gen_range(PPM_RANGE),
                            ph: rng.gen_range(PH_RANGE),
                            created_at,
                        };
                        if results.send(row).is_err() {
                            break;
                        }
                    }
                })
            })
            .collect();

        // Workers hold the only remaining queue ends from here on.
        drop(job_rx);
        drop(row_tx);

        let collector = scope.spawn(move || {
            let mut buffer = Vec::with_capacity(usize::try_from(total).unwrap_or(0));
            for row in row_rx.iter() {
                buffer.push(row);
            }
            buffer
        });

        for handle in handles {
            if let Err(panic) = handle.join() {
                std::panic::resume_unwind(panic);
            }
        }
        match collector.join() {
            Ok(buffer) => buffer,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    });

    if cancel.is_cancelled() {
        info!("Synthetic generation cancelled after {} rows", rows.len());
        return Err(ServiceError::Cancelled);
    }
    Ok(rows)
}
