//! Operator outputs of the provisioned site.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use edgeship_config::SiteOutputs;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(outputs))
}

async fn outputs(State(state): State<AppState>) -> Json<SiteOutputs> {
    Json(state.site.outputs())
}
