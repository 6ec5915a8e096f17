//! Shared application state handed to every route.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::ingest::IngestService;
use crate::query::QueryRouter;
use crate::rollup::RollupEngine;
use crate::scheduler::Scheduler;
use crate::store::{AggregateStore, EntityDirectory, ReadingStore, SystemLog};
use crate::synthetic::SyntheticGenerator;

// ---

#[derive(Clone)]
pub struct AppState {
    // ---
    pub query: Arc<QueryRouter>,
    pub ingest: Arc<IngestService>,
    pub generator: Arc<SyntheticGenerator>,
    /// Owns the one rollup engine used by both the timer and the admin routes.
    pub scheduler: Arc<Scheduler>,
    /// Cancelled on process shutdown.
    pub shutdown: CancellationToken,
}

impl AppState {
    // ---
    pub fn new(
        readings: Arc<dyn ReadingStore>,
        aggregates: Arc<dyn AggregateStore>,
        directory: Arc<dyn EntityDirectory>,
        system_log: Arc<dyn SystemLog>,
        shutdown: CancellationToken,
    ) -> Self {
        // ---
        let engine = Arc::new(RollupEngine::new(readings.clone(), aggregates.clone()));
        Self {
            query: Arc::new(QueryRouter::new(
                readings.clone(),
                aggregates,
                directory.clone(),
            )),
            ingest: Arc::new(IngestService::new(
                readings.clone(),
                directory,
                system_log.clone(),
            )),
            generator: Arc::new(SyntheticGenerator::new(readings, system_log.clone())),
            scheduler: Arc::new(Scheduler::new(engine, system_log)),
            shutdown,
        }
    }
}
