// TALKREEL Lip-Sync - Remote Task Submit/Poll
// Copyright (c) 2026 Xing_The_Creator | TALKREEL
//
// The lip-sync service is asynchronous: a submit returns a task id, and the
// result has to be polled for. The poll loop tells apart blips (connection
// drops, 429, 5xx) from verdicts (task failed, 4xx) and carries its own
// wall-clock budget on top of the per-request HTTP timeout.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::PollSettings;
use crate::error::{check_response, PipelineError};
use crate::pipeline::retry::RetryPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Submitted,
    Processing,
    Completed,
    Failed,
}

impl TaskState {
    pub fn label(self) -> &'static str {
        match self {
            TaskState::Submitted => "submitted",
            TaskState::Processing => "processing",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
        }
    }
}

/// Ephemeral handle on a submitted remote task. Never persisted.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    pub id: String,
    pub submitted_at: Instant,
    pub last_status: TaskState,
}

/// One status observation.
#[derive(Debug, Clone, PartialEq)]
pub enum PollStatus {
    /// Any non-terminal status the service reports (`created`, `processing`, ...).
    Pending(String),
    Completed { outputs: Vec<String> },
    Failed { error: String },
}

#[async_trait]
pub trait LipSyncApi: Send + Sync {
    async fn submit(&self, audio_url: &str, image_url: &str, resolution: &str) -> Result<String, PipelineError>;
    async fn poll(&self, task_id: &str) -> Result<PollStatus, PipelineError>;
}

/// WaveSpeed `wan-2.2/speech-to-video` client.
pub struct WaveSpeedClient {
    client: reqwest::Client,
    api_key: String,
}

impl WaveSpeedClient {
    const BASE_URL: &'static str = "https://api.wavespeed.ai/api/v3";
    const MODEL_PATH: &'static str = "wavespeed-ai/wan-2.2/speech-to-video";

    pub fn new(api_key: &str) -> Result<Self, PipelineError> {
        if api_key.trim().is_empty() {
            return Err(PipelineError::Configuration("WAVESPEED_API_KEY not set".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        info!("[LIPSYNC] WaveSpeed client ready");
        Ok(Self {
            client,
            api_key: api_key.to_string(),
        })
    }
}

/// Pull the task id out of a submit response.
pub fn parse_submit_body(body: &Value) -> Result<String, PipelineError> {
    let code = body["code"].as_i64();
    if code != Some(200) {
        return Err(PipelineError::Provider(format!(
            "Submit returned code {}: {}",
            code.map(|c| c.to_string()).unwrap_or_else(|| "none".into()),
            body["message"].as_str().unwrap_or("no message")
        )));
    }
    body["data"]["id"]
        .as_str()
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| PipelineError::Provider("Submit response has no task id".into()))
}

/// Interpret a poll response.
pub fn parse_poll_body(body: &Value) -> Result<PollStatus, PipelineError> {
    let data = &body["data"];
    let status = data["status"]
        .as_str()
        .ok_or_else(|| PipelineError::Provider("Poll response has no status".into()))?;

    Ok(match status {
        "completed" => PollStatus::Completed {
            outputs: data["outputs"]
                .as_array()
                .map(|outs| outs.iter().filter_map(|o| o.as_str().map(str::to_string)).collect())
                .unwrap_or_default(),
        },
        "failed" => PollStatus::Failed {
            error: data["error"]
                .as_str()
                .filter(|e| !e.is_empty())
                .unwrap_or("unknown error")
                .to_string(),
        },
        other => PollStatus::Pending(other.to_string()),
    })
}

#[async_trait]
impl LipSyncApi for WaveSpeedClient {
    async fn submit(&self, audio_url: &str, image_url: &str, resolution: &str) -> Result<String, PipelineError> {
        let payload = json!({
            "audio": audio_url,
            "image": image_url,
            "prompt": "",
            "resolution": resolution,
            "seed": -1,
        });
        let resp = self
            .client
            .post(format!("{}/{}", Self::BASE_URL, Self::MODEL_PATH))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;
        let body: Value = check_response(resp).await?.json().await?;
        parse_submit_body(&body)
    }

    async fn poll(&self, task_id: &str) -> Result<PollStatus, PipelineError> {
        let resp = self
            .client
            .get(format!("{}/predictions/{}/result", Self::BASE_URL, task_id))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let body: Value = check_response(resp).await?.json().await?;
        parse_poll_body(&body)
    }
}

/// Drives one clip through submit and poll.
pub struct LipSyncRunner {
    api: Arc<dyn LipSyncApi>,
    settings: PollSettings,
    retry: RetryPolicy,
}

impl LipSyncRunner {
    pub fn new(api: Arc<dyn LipSyncApi>, settings: PollSettings) -> Self {
        Self {
            api,
            settings,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub async fn submit(&self, audio_url: &str, image_url: &str, resolution: &str) -> Result<TaskHandle, PipelineError> {
        let id = self
            .retry
            .run("lip-sync submit", || self.api.submit(audio_url, image_url, resolution))
            .await?;
        info!("[LIPSYNC] Task submitted: {}", id);
        Ok(TaskHandle {
            id,
            submitted_at: Instant::now(),
            last_status: TaskState::Submitted,
        })
    }

    /// Poll until the task settles and return its first output URL. The
    /// timeout is a hard deadline that also bounds cooldowns and stalled polls.
    pub async fn wait(&self, handle: &mut TaskHandle) -> Result<String, PipelineError> {
        let timeout = self.settings.timeout;
        let deadline = Instant::now() + timeout;

        let outcome = tokio::time::timeout_at(deadline, self.poll_until_settled(handle)).await;
        match outcome {
            Ok(result) => result,
            Err(_) => {
                error!(
                    "[LIPSYNC] Task {} timed out after {:?} (last status: {:?})",
                    handle.id, timeout, handle.last_status
                );
                Err(PipelineError::Timeout(format!(
                    "task {} not finished after {}s (last status: {})",
                    handle.id,
                    timeout.as_secs(),
                    handle.last_status.label()
                )))
            }
        }
    }

    async fn poll_until_settled(&self, handle: &mut TaskHandle) -> Result<String, PipelineError> {
        let s = &self.settings;
        let mut connection_errors = 0u32;

        debug!("[LIPSYNC] Warm-up {:?} before first poll of {}", s.warmup, handle.id);
        tokio::time::sleep(s.warmup).await;

        loop {
            match self.api.poll(&handle.id).await {
                Ok(PollStatus::Completed { outputs }) => {
                    handle.last_status = TaskState::Completed;
                    let url = outputs.into_iter().next().ok_or_else(|| {
                        PipelineError::Provider(format!("task {} completed without outputs", handle.id))
                    })?;
                    info!(
                        "[LIPSYNC] ✅ Task {} completed in {:?}",
                        handle.id,
                        handle.submitted_at.elapsed()
                    );
                    return Ok(url);
                }
                Ok(PollStatus::Failed { error: message }) => {
                    handle.last_status = TaskState::Failed;
                    error!("[LIPSYNC] Task {} failed remotely: {}", handle.id, message);
                    return Err(PipelineError::RemoteTaskFailed(message));
                }
                Ok(PollStatus::Pending(status)) => {
                    connection_errors = 0;
                    handle.last_status = TaskState::Processing;
                    debug!("[LIPSYNC] Task {} status: {}", handle.id, status);
                    tokio::time::sleep(s.interval).await;
                }
                Err(PipelineError::Connection(e)) => {
                    connection_errors += 1;
                    if connection_errors >= s.max_connection_errors {
                        error!("[LIPSYNC] Task {}: giving up after {} connection errors", handle.id, connection_errors);
                        return Err(PipelineError::Connection(format!(
                            "{} consecutive connection errors polling task {}: {}",
                            connection_errors, handle.id, e
                        )));
                    }
                    warn!(
                        "[LIPSYNC] Connection error {}/{} polling {}: {}",
                        connection_errors, s.max_connection_errors, handle.id, e
                    );
                    tokio::time::sleep(s.connection_backoff).await;
                }
                Err(PipelineError::RateLimited(_)) => {
                    warn!("[LIPSYNC] Rate limited, cooling down {:?}", s.rate_limit_cooldown);
                    tokio::time::sleep(s.rate_limit_cooldown).await;
                }
                Err(PipelineError::Server { status, .. }) => {
                    warn!("[LIPSYNC] Server error ({}), cooling down {:?}", status, s.server_error_cooldown);
                    tokio::time::sleep(s.server_error_cooldown).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Submit and wait.
    pub async fn generate(&self, audio_url: &str, image_url: &str, resolution: &str) -> Result<String, PipelineError> {
        let mut handle = self.submit(audio_url, image_url, resolution).await?;
        self.wait(&mut handle).await
    }
}
