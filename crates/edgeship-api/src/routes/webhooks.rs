//! GitHub webhook endpoint.
//!
//! A push to the watched branch queues a run for the pushed revision.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use edgeship_core::source::{TriggerEvent, TriggerSource};
use hmac::{Hmac, Mac};
use serde_json::{Value, json};
use sha2::Sha256;
use tracing::{info, warn};

use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new().route("/github", post(github_webhook))
}

/// The parts of a GitHub push payload needed to trigger a run.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PushEvent {
    r#ref: String,
    after: String,
    repository_full_name: String,
    branch: Option<String>,
    deleted: bool,
    pusher: Option<String>,
}

impl PushEvent {
    fn from_github_payload(payload: &Value) -> Option<Self> {
        let r#ref = payload.get("ref")?.as_str()?.to_string();
        let after = payload.get("after")?.as_str()?.to_string();
        let repository_full_name = payload
            .get("repository")?
            .get("full_name")?
            .as_str()?
            .to_string();
        let branch = r#ref.strip_prefix("refs/heads/").map(str::to_string);
        let deleted = payload
            .get("deleted")
            .and_then(|d| d.as_bool())
            .unwrap_or(false);
        let pusher = payload
            .get("pusher")
            .and_then(|p| p.get("name"))
            .and_then(|n| n.as_str())
            .map(str::to_string);

        Some(Self {
            r#ref,
            after,
            repository_full_name,
            branch,
            deleted,
            pusher,
        })
    }

    /// A branch deletion carries an all-zero `after` revision.
    fn is_delete(&self) -> bool {
        self.deleted || self.after.chars().all(|c| c == '0')
    }
}

async fn github_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let event_type = headers
        .get("X-GitHub-Event")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");
    let signature = headers
        .get("X-Hub-Signature-256")
        .and_then(|v| v.to_str().ok());

    match state.webhook_secret.as_deref() {
        Some(secret) => {
            if !verify_github_signature(secret, &body, signature) {
                warn!(event = %event_type, "Invalid webhook signature");
                return Err(ApiError::Unauthorized("invalid webhook signature".to_string()));
            }
        }
        None => warn!(event = %event_type, "No webhook secret configured; signature not checked"),
    }

    let payload: Value = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid JSON: {}", e)))?;

    info!(
        event = %event_type,
        delivery = ?headers.get("X-GitHub-Delivery").and_then(|v| v.to_str().ok()),
        "Received GitHub webhook"
    );

    match event_type {
        "push" => {
            let push = PushEvent::from_github_payload(&payload)
                .ok_or_else(|| ApiError::BadRequest("malformed push payload".to_string()))?;
            handle_push_event(&state, push).await
        }
        "ping" => {
            info!("Ping event received - webhook is configured correctly");
            Ok((StatusCode::OK, Json(json!({ "status": "pong" }))))
        }
        _ => {
            info!(event = %event_type, "Unhandled event type");
            Ok(ignored(format!("unhandled event '{}'", event_type)))
        }
    }
}

async fn handle_push_event(
    state: &AppState,
    push: PushEvent,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let repository = state.site.repository();

    if !push
        .repository_full_name
        .eq_ignore_ascii_case(&repository.full_name())
    {
        warn!(repo = %push.repository_full_name, "Push event for unknown repository");
        return Ok(ignored(format!(
            "repository '{}' is not watched",
            push.repository_full_name
        )));
    }
    if push.branch.as_deref() != Some(repository.branch.as_str()) {
        info!(git_ref = %push.r#ref, "Push to unwatched ref, skipping");
        return Ok(ignored(format!("ref '{}' is not watched", push.r#ref)));
    }
    if push.is_delete() {
        info!(git_ref = %push.r#ref, "Branch deleted, skipping");
        return Ok(ignored("branch deleted".to_string()));
    }

    let mut trigger = TriggerEvent::new(repository, &push.after, TriggerSource::Webhook);
    if let Some(pusher) = push.pusher {
        trigger = trigger.with_actor(pusher);
    }

    let pipeline = state.pipeline_name();
    let ticket = state.scheduler.enqueue(&pipeline, trigger).await?;
    info!(
        pipeline = %pipeline,
        run_id = %ticket.run_id,
        sha = %push.after,
        "Triggered pipeline from push"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "run_id": ticket.run_id,
            "pipeline": pipeline,
            "revision": push.after,
        })),
    ))
}

fn ignored(reason: String) -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({ "status": "ignored", "reason": reason })),
    )
}

/// Verify GitHub webhook signature.
fn verify_github_signature(secret: &str, body: &[u8], signature: Option<&str>) -> bool {
    let Some(signature) = signature else {
        return false;
    };

    // Signature format: "sha256=<hex>"
    let Some(sig_hex) = signature.strip_prefix("sha256=") else {
        return false;
    };

    let Ok(sig_bytes) = hex::decode(sig_hex) else {
        return false;
    };

    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);

    mac.verify_slice(&sig_bytes).is_ok()
}
