// TALKREEL Error Taxonomy
// Copyright (c) 2026 Xing_The_Creator | TALKREEL
//
// Every remote call funnels its failure through `PipelineError` so the
// retry layer and the poll loop can tell a blip from a dead end.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Bad input, rejected before any job exists.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Network-level failure (connect refused, reset, call timeout).
    #[error("Connection error: {0}")]
    Connection(String),

    /// HTTP 429 from a provider.
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// HTTP 5xx from a provider.
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Non-retryable provider answer (4xx, malformed body, empty result).
    #[error("Provider error: {0}")]
    Provider(String),

    /// The remote lip-sync task reported `failed`. Displayed verbatim.
    #[error("{0}")]
    RemoteTaskFailed(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Upload failed: {0}")]
    Upload(String),

    /// External media tool missing or exiting non-zero.
    #[error("Media tool error: {0}")]
    Tool(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A stage finished with per-item failures. `first_error` is the reason
    /// given by the lowest-numbered failed item.
    #[error("{failed} of {total} {what} failed to generate (first error: {first_error})")]
    Stage {
        what: &'static str,
        failed: usize,
        total: usize,
        first_error: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    /// Errors worth retrying locally with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PipelineError::Connection(_)
                | PipelineError::RateLimited(_)
                | PipelineError::Server { .. }
        )
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            return from_status(status.as_u16(), e.to_string());
        }
        if e.is_timeout() || e.is_connect() || e.is_request() {
            return PipelineError::Connection(e.to_string());
        }
        if e.is_decode() || e.is_body() {
            return PipelineError::Provider(format!("Malformed response: {}", e));
        }
        PipelineError::Connection(e.to_string())
    }
}

/// Classify a non-success HTTP status.
pub fn from_status(status: u16, message: String) -> PipelineError {
    match status {
        429 => PipelineError::RateLimited(message),
        500..=599 => PipelineError::Server { status, message },
        _ => PipelineError::Provider(format!("HTTP {}: {}", status, message)),
    }
}

/// Turn a non-success response into a classified error, keeping the body for context.
pub async fn check_response(resp: reqwest::Response) -> Result<reqwest::Response, PipelineError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let body: String = body.chars().take(300).collect();
    Err(from_status(status.as_u16(), body))
}
