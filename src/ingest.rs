//! Single-reading ingestion.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{ServiceError, ServiceResult};
use crate::models::{NewReading, StoredReading};
use crate::query::ensure_known;
use crate::store::{EntityDirectory, ReadingStore, SystemLog};

// ---

pub struct IngestService {
    readings: Arc<dyn ReadingStore>,
    directory: Arc<dyn EntityDirectory>,
    system_log: Arc<dyn SystemLog>,
}

impl IngestService {
    // ---
    pub fn new(
        readings: Arc<dyn ReadingStore>,
        directory: Arc<dyn EntityDirectory>,
        system_log: Arc<dyn SystemLog>,
    ) -> Self {
        Self {
            readings,
            directory,
            system_log,
        }
    }

    /// Validate and persist one reading. The stored timestamp comes from the
    /// store clock.
    pub async fn ingest(&self, reading: &NewReading) -> ServiceResult<StoredReading> {
        // ---
        if !reading.ppm.is_finite() || !reading.ph.is_finite() {
            return Err(ServiceError::validation("ppm and ph must be finite numbers"));
        }

        ensure_known(self.directory.as_ref(), reading.farm_id, reading.system_id).await?;

        let stored = self
            .readings
            .append(reading)
            .await
            .map_err(ServiceError::Insert)?;

        info!(id = %stored.id, farm_id = %stored.farm_id, "Reading stored");

        let message = format!("Create Growth History: {{ID:{}}}", stored.id);
        if let Err(e) = self.system_log.record(&message).await {
            warn!("Failed to write system log: {:#}", e);
        }
        Ok(stored)
    }
}
