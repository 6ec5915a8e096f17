// src/routes/aggregation.rs
//! Manual rollup triggers. Both run on the scheduler's engine.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info};

use crate::error::ServiceResult;
use crate::rollup::RollupReport;
use crate::state::AppState;

// ---

#[derive(Serialize)]
struct TriggerResponse {
    success: bool,
    #[serde(flatten)]
    report: RollupReport,
}

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/aggregation/growth-hist", post(full_backfill))
        .route("/aggregation/growth-hist/monthly", post(previous_month))
}

async fn full_backfill(State(state): State<AppState>) -> impl IntoResponse {
    // ---
    info!("POST /aggregation/growth-hist - full backfill");
    respond(state.scheduler.run_full_backfill().await)
}

async fn previous_month(State(state): State<AppState>) -> impl IntoResponse {
    // ---
    info!("POST /aggregation/growth-hist/monthly - previous month");
    respond(state.scheduler.run_previous_month().await)
}

fn respond(result: ServiceResult<RollupReport>) -> Response {
    // ---
    match result {
        Ok(report) => (
            StatusCode::CREATED,
            Json(TriggerResponse {
                success: true,
                report,
            }),
        )
            .into_response(),
        Err(e) => {
            error!("Rollup trigger failed: {}", e);
            (
                e.status(),
                Json(json!({ "success": false, "error": e.public_message() })),
            )
                .into_response()
        }
    }
}
