// src/routes/growth_hist.rs
//! Reading endpoints: ingestion, aggregate and raw queries, and synthetic
//! history generation.

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, warn};

use crate::error::ServiceError;
use crate::models::NewReading;
use crate::query::{AggregateFilter, RawFilter};
use crate::state::AppState;
use crate::synthetic::SyntheticRequest;

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/growth-hist/create", post(create))
        .route("/growth-hist/random-data", post(random_data))
        .route("/growth-hist/aggregation/filter", get(aggregation_filter))
        .route("/growth-hist/filter", get(filter))
}

/// Malformed or incomplete JSON bodies are validation errors, not axum's
/// plain-text 422.
fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ServiceError> {
    // ---
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| {
            warn!("Rejected request body: {}", rejection.body_text());
            ServiceError::validation(format!("invalid request body: {}", rejection.body_text()))
        })
}

async fn create(
    State(state): State<AppState>,
    payload: Result<Json<NewReading>, JsonRejection>,
) -> Result<impl IntoResponse, ServiceError> {
    // ---
    info!("POST /growth-hist/create");
    let body = json_body(payload)?;
    let stored = state.ingest.ingest(&body).await?;
    Ok((StatusCode::CREATED, Json(stored)))
}

async fn aggregation_filter(
    State(state): State<AppState>,
    Query(params): Query<AggregateFilter>,
) -> Result<impl IntoResponse, ServiceError> {
    // ---
    info!("GET /growth-hist/aggregation/filter - {:?}", params);
    let resp = state.query.aggregate(&params).await?;
    Ok(Json(resp))
}

async fn filter(
    State(state): State<AppState>,
    Query(params): Query<RawFilter>,
) -> Result<impl IntoResponse, ServiceError> {
    // ---
    info!("GET /growth-hist/filter - {:?}", params);
    let resp = state.query.raw(&params).await?;
    Ok(Json(resp))
}

/// Blocks until generation and the bulk write finish. Dropping the request
/// (client disconnect) or shutting down cancels the run.
async fn random_data(
    State(state): State<AppState>,
    payload: Result<Json<SyntheticRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ServiceError> {
    // ---
    let body = json_body(payload)?;
    info!("POST /growth-hist/random-data - farm {}", body.farm_id);
    let token = state.shutdown.child_token();
    let guard = token.clone().drop_guard();

    let result = state.generator.generate(&body, token).await;
    let _ = guard.disarm();

    Ok(Json(result?))
}
