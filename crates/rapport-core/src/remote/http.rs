use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::{Connectivity, RemoteBackend};
use crate::error::RemoteError;

/// Response shape shared by all create endpoints.
#[derive(Deserialize)]
struct CreatedResponse {
    id: String,
}

/// HTTP implementation of [`RemoteBackend`] against the rapport server API.
///
/// Every request carries the client-wide timeout, so a hung network call is
/// turned into a transient error instead of stalling a flush pass.
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpBackend {
    pub fn new(base_url: &str, auth_token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token,
        })
    }

    async fn post(&self, path: &str, payload: &Value) -> Result<String, RemoteError> {
        let url = format!("{}/{}", self.base_url, path);
        let mut request = self.client.post(&url).json(payload);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(classify_request_error)?;
        let status = response.status();
        if status.is_success() {
            let created: CreatedResponse = response
                .json()
                .await
                .map_err(|e| RemoteError::Transient(format!("unreadable response body: {e}")))?;
            return Ok(created.id);
        }

        let body = response.text().await.unwrap_or_default();
        let message = format!("{} returned {}: {}", url, status, body);
        if is_permanent_status(status) {
            Err(RemoteError::Permanent(message))
        } else {
            Err(RemoteError::Transient(message))
        }
    }
}

/// 4xx means the server understood and rejected the write; retrying cannot
/// help. 408 and 429 are the exceptions: the request itself was fine.
fn is_permanent_status(status: reqwest::StatusCode) -> bool {
    status.is_client_error()
        && status != reqwest::StatusCode::REQUEST_TIMEOUT
        && status != reqwest::StatusCode::TOO_MANY_REQUESTS
}

fn classify_request_error(err: reqwest::Error) -> RemoteError {
    // Anything that never reached the server is worth retrying.
    RemoteError::Transient(err.to_string())
}

#[async_trait]
impl RemoteBackend for HttpBackend {
    async fn create_time_entry(&self, payload: &Value) -> Result<String, RemoteError> {
        self.post("api/time-entries", payload).await
    }

    async fn update_task_status(&self, payload: &Value) -> Result<String, RemoteError> {
        self.post("api/tasks/status", payload).await
    }

    async fn add_note(&self, payload: &Value) -> Result<String, RemoteError> {
        self.post("api/notes", payload).await
    }

    async fn create_photo_record(&self, payload: &Value) -> Result<String, RemoteError> {
        self.post("api/photos", payload).await
    }

    async fn create_day_report(&self, payload: &Value) -> Result<String, RemoteError> {
        self.post("api/reports/day", payload).await
    }

    async fn create_project_report(&self, payload: &Value) -> Result<String, RemoteError> {
        self.post("api/reports/project", payload).await
    }
}

/// Connectivity probe: a cheap GET against the server health endpoint with
/// a short timeout. Any failure is read as "offline".
pub struct HttpProbe {
    client: reqwest::Client,
    health_url: String,
}

impl HttpProbe {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build probe HTTP client")?;
        Ok(Self {
            client,
            health_url: format!("{}/api/health", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl Connectivity for HttpProbe {
    async fn is_connected(&self) -> bool {
        match self.client.get(&self.health_url).send().await {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                debug!(error = %err, "connectivity probe failed");
                false
            }
        }
    }
}
