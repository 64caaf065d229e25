//! Serverless docking backend (RunPod-style REST API).
//!
//! `POST {base}/{endpoint}/run` submits a job, `GET {base}/{endpoint}/status/{id}`
//! reports its progress and, once `COMPLETED`, its output.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::adapters::http::{build_client, resolve_api_key, HttpFailure, RetryPolicy};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    BackendConfig, DockingJob, JobPoll, JobStatus, RawScore, RetryConfig, WorkItem,
};
use crate::domain::ports::DockingBackend;

pub const API_KEY_ENV: &str = "RUNPOD_API_KEY";

#[derive(Debug, Serialize)]
struct RunRequest<'a> {
    input: RunInput<'a>,
}

#[derive(Debug, Serialize)]
struct RunInput<'a> {
    protein_pdb_b64: &'a str,
    ligands: &'a [WorkItem],
    samples_per_complex: u32,
}

#[derive(Debug, Deserialize)]
struct RunResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
    #[serde(default)]
    output: Option<JobOutput>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct JobOutput {
    #[serde(default)]
    results: Vec<RawScore>,
    #[serde(default)]
    processing_time_seconds: Option<f64>,
    #[serde(default)]
    error: Option<String>,
}

pub struct RunPodBackend {
    client: Client,
    base_url: String,
    endpoint_id: String,
    api_key: String,
    retry: RetryPolicy,
}

impl RunPodBackend {
    /// Build from config. The API key falls back to `RUNPOD_API_KEY`.
    pub fn new(config: &BackendConfig, retry: &RetryConfig) -> DomainResult<Self> {
        let api_key = resolve_api_key(config.api_key.as_deref(), API_KEY_ENV).ok_or_else(|| {
            DomainError::ValidationFailed(format!(
                "docking backend API key missing (set backend.api_key or {API_KEY_ENV})"
            ))
        })?;
        if config.endpoint_id.trim().is_empty() {
            return Err(DomainError::ValidationFailed(
                "backend.endpoint_id must be set".to_string(),
            ));
        }
        Ok(Self {
            client: build_client(config.request_timeout_secs)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            endpoint_id: config.endpoint_id.clone(),
            api_key,
            retry: RetryPolicy::from(retry),
        })
    }

    fn url(&self, tail: &str) -> String {
        format!("{}/{}/{tail}", self.base_url, self.endpoint_id)
    }

    async fn submit_once(&self, body: &RunRequest<'_>) -> Result<String, HttpFailure> {
        let response = self
            .client
            .post(self.url("run"))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(HttpFailure::from_status(status, &text));
        }
        let parsed: RunResponse = response.json().await?;
        Ok(parsed.id)
    }

    async fn status_once(&self, job_id: &str) -> Result<StatusResponse, HttpFailure> {
        let response = self
            .client
            .get(self.url(&format!("status/{job_id}")))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(HttpFailure::from_status(status, &text));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl DockingBackend for RunPodBackend {
    #[instrument(skip(self, job), fields(items = job.items.len()))]
    async fn submit(&self, job: &DockingJob) -> DomainResult<String> {
        let body = RunRequest {
            input: RunInput {
                protein_pdb_b64: &job.structure_encoded,
                ligands: &job.items,
                samples_per_complex: job.samples_per_item,
            },
        };
        let job_id = self.retry.run("docking backend", || self.submit_once(&body)).await?;
        debug!(job_id = %job_id, "docking job submitted");
        Ok(job_id)
    }

    async fn poll(&self, job_id: &str) -> DomainResult<JobPoll> {
        let response = self
            .status_once(job_id)
            .await
            .map_err(|e| DomainError::Backend(e.message().to_string()))?;

        let status = JobStatus::from_backend(&response.status);
        let poll = match status {
            JobStatus::Completed => {
                let output = response.output;
                match output.as_ref().and_then(|o| o.error.clone()) {
                    Some(error) => JobPoll {
                        status: JobStatus::Failed,
                        scores: Vec::new(),
                        error: Some(error),
                    },
                    None => {
                        if let Some(seconds) = output.as_ref().and_then(|o| o.processing_time_seconds) {
                            debug!(job_id, seconds, "docking job finished");
                        }
                        JobPoll {
                            status,
                            scores: output.map(|o| o.results).unwrap_or_default(),
                            error: None,
                        }
                    }
                }
            }
            s if s.is_terminal() => JobPoll {
                status: s,
                scores: Vec::new(),
                error: Some(
                    response
                        .error
                        .map_or_else(|| format!("job {}", response.status), |e| e.to_string()),
                ),
            },
            s => JobPoll::pending(s),
        };
        Ok(poll)
    }
}

#[cfg(test)]
mod tests {
    use mockito::Matcher;
    use serde_json::json;

    use super::*;

    fn backend(server: &mockito::Server) -> RunPodBackend {
        let config = BackendConfig {
            base_url: server.url(),
            endpoint_id: "ep123".into(),
            api_key: Some("secret".into()),
            request_timeout_secs: 5,
        };
        let retry = RetryConfig {
            max_retries: 2,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
        };
        RunPodBackend::new(&config, &retry).unwrap()
    }

    fn job() -> DockingJob {
        DockingJob {
            structure_encoded: "UERC".into(),
            items: vec![WorkItem {
                name: "aspirin".into(),
                structure: "CC(=O)O".into(),
            }],
            samples_per_item: 10,
        }
    }

    #[tokio::test]
    async fn test_submit_posts_input_envelope() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/ep123/run")
            .match_header("authorization", "Bearer secret")
            .match_body(Matcher::PartialJson(json!({
                "input": {
                    "protein_pdb_b64": "UERC",
                    "ligands": [{"name": "aspirin", "smiles": "CC(=O)O"}],
                    "samples_per_complex": 10
                }
            })))
            .with_status(200)
            .with_body(r#"{"id": "job-1", "status": "IN_QUEUE"}"#)
            .create_async()
            .await;

        let id = backend(&server).submit(&job()).await.unwrap();
        assert_eq!(id, "job-1");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_submit_retries_server_errors() {
        let mut server = mockito::Server::new_async().await;
        let failing = server
            .mock("POST", "/ep123/run")
            .with_status(503)
            .expect(3)
            .create_async()
            .await;

        let result = backend(&server).submit(&job()).await;
        assert!(matches!(result, Err(DomainError::Collaborator { .. })));
        failing.assert_async().await;
    }

    #[tokio::test]
    async fn test_poll_completed_returns_scores() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/ep123/status/job-1")
            .with_status(200)
            .with_body(
                json!({
                    "status": "COMPLETED",
                    "output": {
                        "results": [{"name": "aspirin", "confidence_score": 0.42, "confidence_raw": -0.3}],
                        "processing_time_seconds": 12.5
                    }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let poll = backend(&server).poll("job-1").await.unwrap();
        assert_eq!(poll.status, JobStatus::Completed);
        assert_eq!(poll.scores.len(), 1);
        assert!((poll.scores[0].confidence_score - 0.42).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_poll_maps_pending_and_failed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/ep123/status/queued")
            .with_body(r#"{"status": "IN_QUEUE"}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/ep123/status/dead")
            .with_body(r#"{"status": "FAILED", "error": "CUDA out of memory"}"#)
            .create_async()
            .await;

        let backend = backend(&server);
        assert_eq!(backend.poll("queued").await.unwrap().status, JobStatus::Queued);

        let failed = backend.poll("dead").await.unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert!(failed.error.unwrap().contains("CUDA"));
    }

    #[test]
    fn test_missing_key_is_rejected() {
        temp_env::with_var_unset(API_KEY_ENV, || {
            let config = BackendConfig {
                endpoint_id: "ep".into(),
                ..BackendConfig::default()
            };
            assert!(RunPodBackend::new(&config, &RetryConfig::default()).is_err());
        });
    }
}
