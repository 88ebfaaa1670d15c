//! Run inspection, manual triggers and cancellation.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use edgeship_core::RunId;
use edgeship_core::run::RunResult;
use edgeship_core::source::{TriggerEvent, TriggerSource};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use crate::AppState;
use crate::error::ApiError;

const DEFAULT_LIMIT: usize = 20;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_runs).post(trigger_run))
        .route("/{id}", get(get_run))
        .route("/{id}/cancel", post(cancel_run))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    pipeline: Option<String>,
    limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct TriggerRequest {
    /// Revision to deploy; defaults to the current branch head.
    revision: Option<String>,
    actor: Option<String>,
}

async fn list_runs(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Json<Vec<RunResult>> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    Json(state.scheduler.list(query.pipeline.as_deref(), limit).await)
}

async fn get_run(
    State(state): State<AppState>,
    Path(id): Path<RunId>,
) -> Result<Json<RunResult>, ApiError> {
    state
        .scheduler
        .status(id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("run {}", id)))
}

async fn trigger_run(
    State(state): State<AppState>,
    Json(request): Json<TriggerRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let repository = state.site.repository();
    let revision = match request.revision.filter(|r| !r.trim().is_empty()) {
        Some(revision) => revision,
        None => state.source.latest_revision(&repository).await?,
    };

    let mut trigger = TriggerEvent::new(repository, &revision, TriggerSource::Manual);
    if let Some(actor) = request.actor {
        trigger = trigger.with_actor(actor);
    }

    let pipeline = state.pipeline_name();
    let ticket = state.scheduler.enqueue(&pipeline, trigger).await?;
    info!(pipeline = %pipeline, run_id = %ticket.run_id, revision = %revision, "Manual run queued");

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "run_id": ticket.run_id,
            "pipeline": pipeline,
            "revision": revision,
        })),
    ))
}

async fn cancel_run(
    State(state): State<AppState>,
    Path(id): Path<RunId>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    state.scheduler.cancel(id).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "run_id": id, "status": "cancelling" })),
    ))
}

#[cfg(test)]
mod tests {
    use crate::routes::router;
    use crate::routes::testing::{HEAD, body_json, fixture};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use edgeship_core::RunId;
    use edgeship_core::run::RunStatus;
    use tower::ServiceExt;

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn wait_until_done(scheduler: &edgeship_scheduler::Scheduler, id: RunId) -> RunStatus {
        for _ in 0..100 {
            let status = scheduler.status(id).await.unwrap().status;
            if status.is_terminal() {
                return status;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        panic!("run {} did not finish", id);
    }

    #[tokio::test]
    async fn test_manual_trigger_defaults_to_head() {
        let fixture = fixture().await;
        let scheduler = fixture.state.scheduler.clone();
        let app = router(fixture.state);

        let response = app
            .clone()
            .oneshot(post_json("/api/v1/runs", r#"{"actor":"ops"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = body_json(response).await;
        assert_eq!(body["revision"], HEAD);
        let id: RunId = body["run_id"].as_str().unwrap().parse().unwrap();

        assert_eq!(wait_until_done(&scheduler, id).await, RunStatus::Succeeded);

        let response = app
            .clone()
            .oneshot(Request::get(format!("/api/v1/runs/{}", id)).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let run = body_json(response).await;
        assert_eq!(run["status"]["state"], "succeeded");
        assert_eq!(run["trigger"]["source"], "manual");
        assert_eq!(run["trigger"]["actor"], "ops");

        let response = app
            .oneshot(
                Request::get("/api/v1/runs?pipeline=docs-pipeline&limit=5")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let runs = body_json(response).await;
        assert_eq!(runs.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_queued_run() {
        let fixture = fixture().await;
        let scheduler = fixture.state.scheduler.clone();
        let app = router(fixture.state);

        let first = body_json(
            app.clone()
                .oneshot(post_json("/api/v1/runs", r#"{"revision":"1111111"}"#))
                .await
                .unwrap(),
        )
        .await;
        let second = body_json(
            app.clone()
                .oneshot(post_json("/api/v1/runs", r#"{"revision":"2222222"}"#))
                .await
                .unwrap(),
        )
        .await;
        let first: RunId = first["run_id"].as_str().unwrap().parse().unwrap();
        let second: RunId = second["run_id"].as_str().unwrap().parse().unwrap();

        let response = app
            .clone()
            .oneshot(
                Request::post(format!("/api/v1/runs/{}/cancel", second))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        assert_eq!(wait_until_done(&scheduler, first).await, RunStatus::Succeeded);
        assert_eq!(wait_until_done(&scheduler, second).await, RunStatus::Cancelled);

        // Finished runs can no longer be cancelled.
        let response = app
            .oneshot(
                Request::post(format!("/api/v1/runs/{}/cancel", first))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_unknown_run() {
        let app = router(fixture().await.state);
        let id = RunId::new();

        let response = app
            .clone()
            .oneshot(Request::get(format!("/api/v1/runs/{}", id)).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .oneshot(
                Request::post(format!("/api/v1/runs/{}/cancel", id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
