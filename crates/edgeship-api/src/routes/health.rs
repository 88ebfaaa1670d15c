//! Health check endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(ready))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Ready once the site's pipeline has a running queue.
async fn ready(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let pipelines = state.scheduler.pipelines().await;
    if pipelines.contains(&state.pipeline_name()) {
        (
            StatusCode::OK,
            Json(json!({ "status": "ready", "pipelines": pipelines })),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "starting" })),
        )
    }
}

#[cfg(test)]
mod tests {
    use crate::routes::router;
    use crate::routes::testing::{body_json, fixture};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health_and_ready() {
        let app = router(fixture().await.state);

        let response = app
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");

        let response = app
            .oneshot(Request::get("/health/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["pipelines"][0], "docs-pipeline");
    }
}
