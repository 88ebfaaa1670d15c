//! Edge distribution backends.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use edgeship_core::distribution::{EdgeDistribution, InvalidationReceipt, InvalidationRequest};
use edgeship_core::secret::CredentialProvider;
use edgeship_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Serialize)]
struct CreateInvalidationBody<'a> {
    paths: &'a [String],
    caller_reference: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreateInvalidationResponse {
    id: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

/// CDN reached through its HTTP management API.
///
/// Invalidations are created with
/// `POST {endpoint}/distributions/{id}/invalidations`.
pub struct HttpEdgeDistribution {
    client: reqwest::Client,
    endpoint: String,
    credentials: Option<(Arc<dyn CredentialProvider>, String)>,
}

impl HttpEdgeDistribution {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self::with_client(client, endpoint))
    }

    pub fn with_client(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            credentials: None,
        }
    }

    /// Send the credential named `name` as a bearer token.
    pub fn with_credentials(
        mut self,
        provider: Arc<dyn CredentialProvider>,
        name: impl Into<String>,
    ) -> Self {
        self.credentials = Some((provider, name.into()));
        self
    }
}

fn validate_distribution_id(id: &str) -> Result<()> {
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(Error::Invalidation(format!("invalid distribution id '{}'", id)));
    }
    Ok(())
}

#[async_trait]
impl EdgeDistribution for HttpEdgeDistribution {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn create_invalidation(&self, request: &InvalidationRequest) -> Result<InvalidationReceipt> {
        validate_distribution_id(&request.distribution_id)?;

        let url = format!(
            "{}/distributions/{}/invalidations",
            self.endpoint, request.distribution_id
        );
        let mut builder = self.client.post(&url).json(&CreateInvalidationBody {
            paths: &request.paths,
            caller_reference: &request.caller_reference,
        });

        if let Some((provider, name)) = &self.credentials {
            let token = provider
                .resolve(name)
                .await
                .map_err(|e| Error::Invalidation(e.to_string()))?;
            builder = builder.bearer_auth(token.expose());
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout(format!("invalidation request to {} timed out", self.endpoint))
            } else {
                Error::Invalidation(format!("request failed: {}", e.without_url()))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(
                distribution = %request.distribution_id,
                status = status.as_u16(),
                "Invalidation rejected"
            );
            return Err(Error::Invalidation(format!(
                "distribution {} returned {}: {}",
                request.distribution_id,
                status.as_u16(),
                text.trim()
            )));
        }

        let body: CreateInvalidationResponse = response
            .json()
            .await
            .map_err(|e| Error::Invalidation(format!("malformed response: {}", e)))?;

        info!(
            distribution = %request.distribution_id,
            invalidation = %body.id,
            paths = ?request.paths,
            "Invalidation created"
        );

        Ok(InvalidationReceipt {
            id: body.id,
            status: body.status.unwrap_or_else(|| "InProgress".to_string()),
            created_at: body.created_at.unwrap_or_else(Utc::now),
        })
    }
}

/// In-memory distribution that records every request.
#[derive(Default)]
pub struct MemoryDistribution {
    requests: Mutex<Vec<InvalidationRequest>>,
    failure: Mutex<Option<String>>,
    delay: Option<Duration>,
}

impl MemoryDistribution {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every request with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        let distribution = Self::new();
        distribution.set_failure(Some(message.into()));
        distribution
    }

    /// Wait before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_failure(&self, message: Option<String>) {
        if let Ok(mut failure) = self.failure.lock() {
            *failure = message;
        }
    }

    /// Requests received so far, including rejected ones.
    pub fn requests(&self) -> Vec<InvalidationRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl EdgeDistribution for MemoryDistribution {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn create_invalidation(&self, request: &InvalidationRequest) -> Result<InvalidationReceipt> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let count = {
            let mut requests = self
                .requests
                .lock()
                .map_err(|_| Error::Internal("distribution state poisoned".to_string()))?;
            requests.push(request.clone());
            requests.len()
        };

        let failure = self.failure.lock().ok().and_then(|f| f.clone());
        if let Some(message) = failure {
            return Err(Error::Invalidation(message));
        }

        Ok(InvalidationReceipt {
            id: format!("I{:04}", count),
            status: "Completed".to_string(),
            created_at: Utc::now(),
        })
    }
}
