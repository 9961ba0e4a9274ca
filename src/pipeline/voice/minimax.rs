// TALKREEL Voice - MiniMax Backend
// Copyright (c) 2026 Xing_The_Creator | TALKREEL
//
// MiniMax answers 200 even on failure; the real verdict lives in
// `base_resp.status_code`. The audio comes back either hex-encoded inline or
// as a URL to fetch.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use super::{SpeechProvider, Voice};
use crate::error::{check_response, PipelineError};
use crate::pipeline::stream_to_file;

const BASE_URL: &str = "https://api.minimax.chat";

pub struct MiniMaxProvider {
    client: reqwest::Client,
    api_key: String,
}

impl MiniMaxProvider {
    pub fn new(api_key: &str) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        info!("[TTS] MiniMax client ready");
        Ok(Self {
            client,
            api_key: api_key.to_string(),
        })
    }

    /// MiniMax publishes no voice listing endpoint.
    pub fn builtin_voices() -> Vec<Voice> {
        vec![
            Voice::new("male-qn-qingse", "Male Qingse (CN)", Some("zh")),
            Voice::new("male-qn-jingying", "Male Jingying (CN)", Some("zh")),
            Voice::new("male-qn-badao", "Male Badao (CN)", Some("zh")),
            Voice::new("female-shaonv", "Female Shaonv (CN)", Some("zh")),
            Voice::new("female-yujie", "Female Yujie (CN)", Some("zh")),
            Voice::new("female-chengshu", "Female Chengshu (CN)", Some("zh")),
            Voice::new("presenter_male", "Presenter Male", Some("en")),
            Voice::new("presenter_female", "Presenter Female", Some("en")),
        ]
    }
}

/// Where the synthesized audio lives in a MiniMax response.
#[derive(Debug, PartialEq)]
pub enum AudioPayload {
    Inline(Vec<u8>),
    Remote(String),
}

/// Validate a MiniMax response body and pull out the audio.
pub fn parse_response(body: &Value) -> Result<AudioPayload, PipelineError> {
    let status = body["base_resp"]["status_code"].as_i64();
    if status != Some(0) {
        let msg = body["base_resp"]["status_msg"].as_str().unwrap_or("unknown error");
        return Err(PipelineError::Provider(format!("MiniMax API error: {}", msg)));
    }

    let audio = body["data"]["audio"]
        .as_str()
        .filter(|a| !a.is_empty())
        .ok_or_else(|| PipelineError::Provider("MiniMax returned no audio data".into()))?;

    if audio.starts_with("http://") || audio.starts_with("https://") {
        return Ok(AudioPayload::Remote(audio.to_string()));
    }
    decode_hex(audio)
        .map(AudioPayload::Inline)
        .ok_or_else(|| PipelineError::Provider("MiniMax audio is neither hex nor URL".into()))
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| s.get(i..i + 2).and_then(|pair| u8::from_str_radix(pair, 16).ok()))
        .collect()
}

#[async_trait]
impl SpeechProvider for MiniMaxProvider {
    fn name(&self) -> &'static str {
        "minimax"
    }

    async fn list_voices(&self) -> Result<Vec<Voice>, PipelineError> {
        Ok(Self::builtin_voices())
    }

    async fn synthesize(
        &self,
        text: &str,
        voice_id: &str,
        _model_id: &str,
        output: &Path,
    ) -> Result<(), PipelineError> {
        let payload = json!({
            "text": text,
            "voice_setting": { "voice_id": voice_id, "speed": 1.0, "vol": 1.0, "pitch": 0 },
            "audio_setting": { "format": "mp3", "sample_rate": 32000, "bitrate": 128000, "channel": 1 }
        });

        let resp = self
            .client
            .post(format!("{}/v1/text_to_speech", BASE_URL))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;
        let body: Value = check_response(resp).await?.json().await?;

        match parse_response(&body)? {
            AudioPayload::Inline(bytes) => {
                if let Some(parent) = output.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(output, bytes).await?;
            }
            AudioPayload::Remote(url) => {
                let resp = check_response(self.client.get(&url).send().await?).await?;
                stream_to_file(resp, output).await?;
            }
        }
        info!("[TTS] MiniMax audio written: {:?}", output);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_payload() {
        let body = json!({ "base_resp": { "status_code": 0 }, "data": { "audio": "49443303ff" } });
        assert_eq!(
            parse_response(&body).unwrap(),
            AudioPayload::Inline(vec![0x49, 0x44, 0x33, 0x03, 0xff])
        );
    }

    #[test]
    fn test_url_payload() {
        let body = json!({ "base_resp": { "status_code": 0 }, "data": { "audio": "https://cdn.example/a.mp3" } });
        assert_eq!(
            parse_response(&body).unwrap(),
            AudioPayload::Remote("https://cdn.example/a.mp3".into())
        );
    }

    #[test]
    fn test_status_code_surfaces_message() {
        let body = json!({ "base_resp": { "status_code": 1004, "status_msg": "authentication failed" } });
        let err = parse_response(&body).unwrap_err();
        assert!(err.to_string().contains("authentication failed"));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_garbage_audio_rejected() {
        let body = json!({ "base_resp": { "status_code": 0 }, "data": { "audio": "zz1" } });
        assert!(parse_response(&body).is_err());
        let empty = json!({ "base_resp": { "status_code": 0 }, "data": {} });
        assert!(parse_response(&empty).is_err());
    }
}
