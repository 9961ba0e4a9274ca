// TALKREEL Text Rewriter - LLM Narration Polish
// Copyright (c) 2026 Xing_The_Creator | TALKREEL
//
// Sends each batch to a language model that smooths the text for lip-sync
// narration. Batches are rewritten one after another; a failed batch never
// touches its siblings.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::RewriteFailurePolicy;
use crate::error::{check_response, PipelineError};
use crate::pipeline::chunker::Batch;
use crate::pipeline::retry::RetryPolicy;

#[async_trait]
pub trait TextRewriter: Send + Sync {
    async fn rewrite(&self, batch_text: &str, batch_number: usize) -> Result<String, PipelineError>;
}

/// Fixed sampling parameters for the rewrite model.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingConfig {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
            top_k: 40,
            max_output_tokens: 8192,
        }
    }
}

pub fn formatting_prompt(batch_text: &str, batch_number: usize) -> String {
    format!(
        "You are an expert scriptwriter preparing text for narration in a lip-synced video.\n\
         \n\
         BATCH #{batch_number}:\n\
         {batch_text}\n\
         \n\
         INSTRUCTIONS:\n\
         1. Keep the original content but improve the flow and naturalness of the narration\n\
         2. Split long sentences so the narrator can breathe naturally\n\
         3. Remove filler words and needless repetition\n\
         4. Add natural pauses where appropriate (use \"...\" for short pauses)\n\
         5. Keep a tone suitable for a professional video\n\
         6. Preserve key information and the main message\n\
         \n\
         Return ONLY the rewritten text, with no comments or explanations.\n\
         Keep the original paragraph structure when it makes sense.\n\
         \n\
         REWRITTEN TEXT:"
    )
}

/// Gemini `generateContent` client.
pub struct GeminiRewriter {
    client: reqwest::Client,
    api_key: String,
    model: String,
    sampling: SamplingConfig,
    retry: RetryPolicy,
}

impl GeminiRewriter {
    pub const DEFAULT_MODEL: &'static str = "gemini-2.5-flash-lite";
    const BASE_URL: &'static str = "https://generativelanguage.googleapis.com/v1beta";

    pub fn new(api_key: &str) -> Result<Self, PipelineError> {
        if api_key.trim().is_empty() {
            return Err(PipelineError::Configuration("GEMINI_API_KEY not set".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        info!("[REWRITE] Initialized with {}", Self::DEFAULT_MODEL);
        Ok(Self {
            client,
            api_key: api_key.to_string(),
            model: Self::DEFAULT_MODEL.to_string(),
            sampling: SamplingConfig::default(),
            retry: RetryPolicy::default(),
        })
    }

    async fn generate(&self, prompt: &str) -> Result<String, PipelineError> {
        let endpoint = format!("{}/models/{}:generateContent", Self::BASE_URL, self.model);
        let payload = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": self.sampling.temperature,
                "topP": self.sampling.top_p,
                "topK": self.sampling.top_k,
                "maxOutputTokens": self.sampling.max_output_tokens,
            }
        });

        let resp = self
            .client
            .post(&endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&payload)
            .send()
            .await?;
        let body: Value = check_response(resp).await?.json().await?;
        extract_candidate_text(&body)
    }
}

/// Concatenate the text parts of the first candidate.
pub fn extract_candidate_text(body: &Value) -> Result<String, PipelineError> {
    let parts = body["candidates"][0]["content"]["parts"]
        .as_array()
        .ok_or_else(|| PipelineError::Provider("Rewrite response has no candidates".into()))?;
    let text: String = parts
        .iter()
        .filter_map(|p| p["text"].as_str())
        .collect::<Vec<_>>()
        .join("");
    let text = text.trim();
    if text.is_empty() {
        return Err(PipelineError::Provider("Rewrite response was empty".into()));
    }
    Ok(text.to_string())
}

#[async_trait]
impl TextRewriter for GeminiRewriter {
    async fn rewrite(&self, batch_text: &str, batch_number: usize) -> Result<String, PipelineError> {
        info!("[REWRITE] Formatting batch #{}...", batch_number);
        let prompt = formatting_prompt(batch_text, batch_number);
        let label = format!("rewrite batch #{}", batch_number);
        let text = self.retry.run(&label, || self.generate(&prompt)).await?;
        info!("[REWRITE] Batch #{} formatted ({} chars)", batch_number, text.chars().count());
        Ok(text)
    }
}

/// Rewrite every batch in order, saving each result under `out_dir`.
///
/// `on_batch(n, total)` fires before each batch. Under `UseOriginal` a failed
/// batch keeps its raw text; under `Abort` the first failure is returned.
pub async fn rewrite_batches<F>(
    rewriter: &dyn TextRewriter,
    batches: &mut [Batch],
    out_dir: &Path,
    policy: RewriteFailurePolicy,
    on_batch: F,
) -> Result<(), PipelineError>
where
    F: Fn(usize, usize),
{
    tokio::fs::create_dir_all(out_dir).await?;
    let total = batches.len();

    for batch in batches.iter_mut() {
        on_batch(batch.batch_number, total);

        let text = match rewriter.rewrite(&batch.text, batch.batch_number).await {
            Ok(text) => text,
            Err(e) => match policy {
                RewriteFailurePolicy::Abort => {
                    error!("[REWRITE] Batch #{} failed: {}", batch.batch_number, e);
                    return Err(e);
                }
                RewriteFailurePolicy::UseOriginal => {
                    warn!(
                        "[REWRITE] Batch #{} failed ({}); narrating original text",
                        batch.batch_number, e
                    );
                    batch.text.clone()
                }
            },
        };

        let file_path = out_dir.join(format!("batch_{}.txt", batch.batch_number));
        tokio::fs::write(&file_path, &text).await?;
        batch.rewritten_text = Some(text);
    }

    info!("[REWRITE] Text processing complete: {} batches", total);
    Ok(())
}
