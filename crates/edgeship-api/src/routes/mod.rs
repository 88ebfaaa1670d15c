//! API routes.

pub mod health;
pub mod outputs;
pub mod runs;
pub mod site;
pub mod webhooks;

use crate::AppState;
use axum::Router;

/// Build the main API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", api_router())
        .nest("/webhooks", webhooks::router())
        .nest("/site", site::router())
        .merge(health::router())
        .with_state(state)
}

fn api_router() -> Router<AppState> {
    Router::new()
        .nest("/runs", runs::router())
        .nest("/outputs", outputs::router())
}
