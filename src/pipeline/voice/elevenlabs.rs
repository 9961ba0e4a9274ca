// TALKREEL Voice - ElevenLabs Backend
// Copyright (c) 2026 Xing_The_Creator | TALKREEL

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use super::{SpeechProvider, Voice};
use crate::error::{check_response, PipelineError};
use crate::pipeline::stream_to_file;

const BASE_URL: &str = "https://api.elevenlabs.io";
const OUTPUT_FORMAT: &str = "mp3_44100_128";

#[derive(Deserialize)]
struct VoicesResponse {
    voices: Vec<VoiceEntry>,
}

#[derive(Deserialize)]
struct VoiceEntry {
    voice_id: String,
    name: String,
    #[serde(default)]
    labels: serde_json::Value,
}

pub struct ElevenLabsProvider {
    client: reqwest::Client,
    api_key: String,
}

impl ElevenLabsProvider {
    pub fn new(api_key: &str) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        info!("[TTS] ElevenLabs client ready");
        Ok(Self {
            client,
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl SpeechProvider for ElevenLabsProvider {
    fn name(&self) -> &'static str {
        "elevenlabs"
    }

    async fn list_voices(&self) -> Result<Vec<Voice>, PipelineError> {
        let resp = self
            .client
            .get(format!("{}/v1/voices", BASE_URL))
            .header("xi-api-key", &self.api_key)
            .send()
            .await?;
        let body: VoicesResponse = check_response(resp).await?.json().await?;

        Ok(body
            .voices
            .into_iter()
            .map(|v| {
                let language = v.labels["language"].as_str().map(str::to_string);
                Voice {
                    voice_id: v.voice_id,
                    name: v.name,
                    language,
                }
            })
            .collect())
    }

    async fn synthesize(
        &self,
        text: &str,
        voice_id: &str,
        model_id: &str,
        output: &Path,
    ) -> Result<(), PipelineError> {
        debug!("[TTS] ElevenLabs synth -> {:?}", output);
        let resp = self
            .client
            .post(format!("{}/v1/text-to-speech/{}", BASE_URL, voice_id))
            .query(&[("output_format", OUTPUT_FORMAT)])
            .header("xi-api-key", &self.api_key)
            .json(&json!({ "text": text, "model_id": model_id }))
            .send()
            .await?;
        let resp = check_response(resp).await?;

        let bytes = stream_to_file(resp, output).await?;
        if bytes == 0 {
            return Err(PipelineError::Provider("ElevenLabs returned empty audio".into()));
        }
        Ok(())
    }
}
