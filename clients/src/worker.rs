//! Worker client: sends one formatted prompt to the
//! local worker model and returns its raw text response. Retry-on-empty is
//! the scan pipeline's responsibility, not this client's — a
//! client call either returns text or fails transport-wise.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::http::worker_http_client;

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("worker transport error: {0}")]
    Transport(String),
    #[error("worker response was not valid JSON: {0}")]
    InvalidJson(String),
}

#[derive(Debug, Serialize)]
struct WorkerRequestBody<'a> {
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct WorkerRawResponse {
    text: String,
}

#[async_trait]
pub trait WorkerClient: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, WorkerError>;
}

pub struct RemoteWorkerClient {
    client: Client,
    url: String,
    timeout: Duration,
}

impl RemoteWorkerClient {
    #[must_use]
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: worker_http_client(),
            url: url.into(),
            timeout,
        }
    }
}

#[async_trait]
impl WorkerClient for RemoteWorkerClient {
    async fn generate(&self, prompt: &str) -> Result<String, WorkerError> {
        let body = WorkerRequestBody { prompt };

        let response = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| WorkerError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(WorkerError::Transport(format!(
                "worker returned HTTP {}",
                response.status()
            )));
        }

        let raw: WorkerRawResponse = response
            .json()
            .await
            .map_err(|e| WorkerError::InvalidJson(e.to_string()))?;

        Ok(raw.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_worker_text_on_success() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "text": "hello from worker" })),
            )
            .mount(&server)
            .await;

        let worker = RemoteWorkerClient::new(server.uri(), Duration::from_secs(5));
        let text = worker.generate("hi").await.unwrap();
        assert_eq!(text, "hello from worker");
    }

    #[tokio::test]
    async fn surfaces_non_success_status_as_transport_error() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(wiremock::ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let worker = RemoteWorkerClient::new(server.uri(), Duration::from_secs(5));
        assert!(worker.generate("hi").await.is_err());
    }
}
