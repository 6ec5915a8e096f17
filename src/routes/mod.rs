//! Route gateway: mounts every sibling subrouter and binds the shared
//! application state (EMBP pattern).

use axum::Router;

use crate::state::AppState;

mod aggregation;
mod growth_hist;
mod health;

// ---

pub fn router(state: AppState) -> Router {
    // ---
    Router::new()
        .merge(growth_hist::router())
        .merge(aggregation::router())
        .merge(health::router())
        .with_state(state)
}
