//! Run commands against the API server.

use anyhow::{Context, Result};
use edgeship_core::run::RunResult;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use super::{action_label, status_label};

fn endpoint(api_url: &str, path: &str) -> String {
    format!("{}/api/v1{}", api_url.trim_end_matches('/'), path)
}

/// Turn a non-2xx response into an error carrying the server's message.
async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body: Value = response.json().await.unwrap_or(Value::Null);
        let message = body
            .get("error")
            .and_then(|e| e.as_str())
            .unwrap_or("no details");
        anyhow::bail!("API returned {}: {}", status, message);
    }
    response
        .json()
        .await
        .context("Failed to decode API response")
}

pub async fn list(api_url: &str, pipeline: Option<String>, limit: u32) -> Result<()> {
    let mut query = vec![("limit", limit.to_string())];
    if let Some(pipeline) = pipeline {
        query.push(("pipeline", pipeline));
    }

    let response = reqwest::Client::new()
        .get(endpoint(api_url, "/runs"))
        .query(&query)
        .send()
        .await
        .with_context(|| format!("Failed to reach {}", api_url))?;
    let runs: Vec<RunResult> = decode(response).await?;

    if runs.is_empty() {
        println!("No runs");
        return Ok(());
    }
    for run in &runs {
        println!(
            "{}  {}  {}  {}",
            run.run_id,
            run.pipeline,
            run.trigger.short_revision(),
            status_label(&run.status)
        );
    }
    Ok(())
}

pub async fn show(api_url: &str, id: &str) -> Result<()> {
    let response = reqwest::Client::new()
        .get(endpoint(api_url, &format!("/runs/{}", id)))
        .send()
        .await
        .with_context(|| format!("Failed to reach {}", api_url))?;
    let run: RunResult = decode(response).await?;

    println!("Run:      {}", run.run_id);
    println!("Pipeline: {}", run.pipeline);
    println!(
        "Revision: {} ({:?}{})",
        run.trigger.revision,
        run.trigger.source,
        run.trigger
            .actor
            .as_deref()
            .map(|a| format!(" by {}", a))
            .unwrap_or_default()
    );
    println!("Status:   {}", status_label(&run.status));
    for record in &run.actions {
        println!(
            "  {}/{} - {}",
            record.stage,
            record.action,
            action_label(&record.status)
        );
    }
    if let Some(failure) = &run.failure {
        println!("Failure:  {:?}: {}", failure.kind, failure.message);
    }
    Ok(())
}

pub async fn trigger(api_url: &str, revision: Option<String>) -> Result<()> {
    let response = reqwest::Client::new()
        .post(endpoint(api_url, "/runs"))
        .json(&json!({ "revision": revision }))
        .send()
        .await
        .with_context(|| format!("Failed to reach {}", api_url))?;
    let body: Value = decode(response).await?;

    println!(
        "Queued run {} of {} at {}",
        body["run_id"].as_str().unwrap_or("?"),
        body["pipeline"].as_str().unwrap_or("?"),
        body["revision"].as_str().unwrap_or("?")
    );
    Ok(())
}

pub async fn cancel(api_url: &str, id: &str) -> Result<()> {
    let response = reqwest::Client::new()
        .post(endpoint(api_url, &format!("/runs/{}/cancel", id)))
        .send()
        .await
        .with_context(|| format!("Failed to reach {}", api_url))?;
    let _: Value = decode(response).await?;
    println!("Cancellation requested for run {}", id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const RUN_ID: &str = "01928f3e-7c1a-7d2b-9e4f-5a6b7c8d9e0f";

    fn run_json() -> Value {
        json!({
            "run_id": RUN_ID,
            "pipeline": "docs-pipeline",
            "trigger": {
                "repository": { "owner": "acme", "name": "docs-site", "branch": "main" },
                "revision": "4f2c9e1a7b3d5f60718293a4b5c6d7e8f9012345",
                "source": "webhook",
                "actor": "octocat"
            },
            "status": { "state": "succeeded" },
            "actions": [],
            "failure": null,
            "deployed_objects": ["index.html"],
            "created_at": "2026-10-19T10:00:00Z",
            "started_at": "2026-10-19T10:00:01Z",
            "finished_at": "2026-10-19T10:01:00Z"
        })
    }

    #[tokio::test]
    async fn test_list_and_show() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/runs"))
            .and(query_param("limit", "5"))
            .and(query_param("pipeline", "docs-pipeline"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([run_json()])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/api/v1/runs/{}", RUN_ID)))
            .respond_with(ResponseTemplate::new(200).set_body_json(run_json()))
            .expect(1)
            .mount(&server)
            .await;

        list(&server.uri(), Some("docs-pipeline".into()), 5).await.unwrap();
        show(&server.uri(), RUN_ID).await.unwrap();
    }

    #[tokio::test]
    async fn test_trigger_sends_revision() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/runs"))
            .and(wiremock::matchers::body_json(json!({ "revision": "abc1234" })))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({
                "run_id": RUN_ID,
                "pipeline": "docs-pipeline",
                "revision": "abc1234"
            })))
            .expect(1)
            .mount(&server)
            .await;

        trigger(&server.uri(), Some("abc1234".into())).await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_conflict_surfaces_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/api/v1/runs/{}/cancel", RUN_ID)))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "error": "run has entered its final stage"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = cancel(&server.uri(), RUN_ID).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("409"));
        assert!(message.contains("final stage"));
    }
}
