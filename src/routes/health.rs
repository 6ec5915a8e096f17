// src/routes/health.rs
//! Liveness endpoint.
//!
//! Sibling module in the `routes` directory following the Explicit Module
//! Boundary Pattern (EMBP): the handler and its response type stay private,
//! only the subrouter is exported to the gateway (`mod.rs`).

use axum::{routing::get, Json, Router};
use serde::Serialize;

/// JSON response body for the `/health` endpoint.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

/// Handle `GET /health`.
///
/// Never touches the database, so it reports process liveness only.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Subrouter with the `/health` route, generic over the gateway state.
pub fn router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route("/health", get(health))
}
