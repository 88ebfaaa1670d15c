//! Preview of the deployed site, served straight from the bucket with the
//! store's website rules.

use axum::Router;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;

use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/{*path}", get(object))
}

async fn index(State(state): State<AppState>) -> Result<Response, ApiError> {
    serve(&state, "/").await
}

async fn object(State(state): State<AppState>, Path(path): Path<String>) -> Result<Response, ApiError> {
    serve(&state, &path).await
}

async fn serve(state: &AppState, path: &str) -> Result<Response, ApiError> {
    let served = edgeship_deployer::serve(state.store.as_ref(), &state.site.store.website, path).await?;
    let status = StatusCode::from_u16(served.status)
        .map_err(|e| ApiError::Internal(format!("invalid status: {}", e)))?;
    Ok((status, [(header::CONTENT_TYPE, served.content_type)], served.body).into_response())
}

#[cfg(test)]
mod tests {
    use crate::routes::router;
    use crate::routes::testing::fixture;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use bytes::Bytes;
    use edgeship_core::store::ObjectStore;
    use tower::ServiceExt;

    async fn get(app: &axum::Router, uri: &str) -> (StatusCode, String, String) {
        let response = app
            .clone()
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let content_type = response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .to_string();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, content_type, String::from_utf8_lossy(&body).to_string())
    }

    #[tokio::test]
    async fn test_serves_index_and_error_documents() {
        let fixture = fixture().await;
        let html = "text/html; charset=utf-8";
        fixture
            .store
            .put("index.html", Bytes::from_static(b"<h1>Docs</h1>"), html)
            .await
            .unwrap();
        fixture
            .store
            .put("guide/index.html", Bytes::from_static(b"<h1>Guide</h1>"), html)
            .await
            .unwrap();
        fixture
            .store
            .put("404.html", Bytes::from_static(b"<h1>Lost</h1>"), html)
            .await
            .unwrap();
        let app = router(fixture.state);

        let (status, content_type, body) = get(&app, "/site").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type, html);
        assert_eq!(body, "<h1>Docs</h1>");

        let (status, _, body) = get(&app, "/site/guide/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "<h1>Guide</h1>");

        let (status, _, body) = get(&app, "/site/missing.html").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, "<h1>Lost</h1>");
    }
}
