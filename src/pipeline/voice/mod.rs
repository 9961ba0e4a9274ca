// TALKREEL Voice - Speech Synthesis
// Copyright (c) 2026 Xing_The_Creator | TALKREEL
//
// One `SpeechProvider` per TTS backend, selected once at construction.
// `SpeechSynthesizer` adds voice resolution, retries and the bounded
// worker pool on top.

pub mod elevenlabs;
pub mod minimax;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::config::{AppConfig, SpeechProviderKind};
use crate::error::PipelineError;
use crate::pipeline::chunker::Batch;
use crate::pipeline::job::AudioArtifact;
use crate::pipeline::retry::RetryPolicy;
use crate::pipeline::run_bounded;

pub use elevenlabs::ElevenLabsProvider;
pub use minimax::MiniMaxProvider;

pub const DEFAULT_MODEL_ID: &str = "eleven_multilingual_v2";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Voice {
    pub voice_id: String,
    pub name: String,
    #[serde(default)]
    pub language: Option<String>,
}

impl Voice {
    pub fn new(voice_id: &str, name: &str, language: Option<&str>) -> Self {
        Self {
            voice_id: voice_id.to_string(),
            name: name.to_string(),
            language: language.map(str::to_string),
        }
    }

    fn fallback() -> Self {
        Voice::new("default", "Default Voice", None)
    }
}

#[async_trait]
pub trait SpeechProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn list_voices(&self) -> Result<Vec<Voice>, PipelineError>;

    /// Write synthesized speech for `text` to `output`.
    async fn synthesize(
        &self,
        text: &str,
        voice_id: &str,
        model_id: &str,
        output: &Path,
    ) -> Result<(), PipelineError>;
}

/// Build the provider named by the configuration.
pub fn build_provider(config: &AppConfig) -> Result<Arc<dyn SpeechProvider>, PipelineError> {
    let key = config.speech_api_key().ok_or_else(|| {
        PipelineError::Configuration(format!("No API key set for speech provider '{}'", config.audio_provider))
    })?;
    match config.audio_provider {
        SpeechProviderKind::ElevenLabs => Ok(Arc::new(ElevenLabsProvider::new(key)?)),
        SpeechProviderKind::MiniMax => Ok(Arc::new(MiniMaxProvider::new(key)?)),
    }
}

pub struct SpeechSynthesizer {
    provider: Arc<dyn SpeechProvider>,
    voices: Mutex<Option<Vec<Voice>>>,
    retry: RetryPolicy,
}

impl SpeechSynthesizer {
    pub fn new(provider: Arc<dyn SpeechProvider>) -> Self {
        info!("[TTS] Speech synthesizer using {}", provider.name());
        Self {
            provider,
            voices: Mutex::new(None),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Provider voice list, fetched once and cached. A listing failure
    /// yields a single `default` voice and is not cached.
    pub async fn voices(&self) -> Vec<Voice> {
        let mut cache = self.voices.lock().await;
        if let Some(voices) = cache.as_ref() {
            return voices.clone();
        }
        match self.provider.list_voices().await {
            Ok(voices) => {
                info!("[TTS] Found {} available voices", voices.len());
                *cache = Some(voices.clone());
                voices
            }
            Err(e) => {
                error!("[TTS] Failed to list voices: {}", e);
                vec![Voice::fallback()]
            }
        }
    }

    /// Map a human-readable voice name to a provider voice id.
    pub async fn resolve_voice(&self, name: &str) -> String {
        let voices = self.voices().await;
        if let Some(voice) = voices.iter().find(|v| v.name.eq_ignore_ascii_case(name)) {
            return voice.voice_id.clone();
        }
        match voices.first() {
            Some(first) => {
                warn!("[TTS] Voice '{}' not found. Using '{}'", name, first.name);
                first.voice_id.clone()
            }
            None => Voice::fallback().voice_id,
        }
    }

    /// Synthesize one clip with retries.
    pub async fn synthesize(
        &self,
        text: &str,
        voice_id: &str,
        model_id: &str,
        output: &Path,
    ) -> Result<PathBuf, PipelineError> {
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let label = format!("tts {}", output.display());
        self.retry
            .run(&label, || self.provider.synthesize(text, voice_id, model_id, output))
            .await?;
        Ok(output.to_path_buf())
    }

    /// Synthesize every batch into `<audio_dir>/audio_<n>.mp3` with at most
    /// `max_workers` calls in flight. Failures are captured per artifact.
    /// `on_done(finished, total)` fires as each clip settles.
    pub async fn synthesize_many<F>(
        &self,
        batches: &[Batch],
        voice_id: &str,
        model_id: &str,
        audio_dir: &Path,
        max_workers: usize,
        on_done: F,
    ) -> Vec<AudioArtifact>
    where
        F: Fn(usize, usize) + Sync,
    {
        let total = batches.len();
        info!("[TTS] Generating {} audio clips ({} workers)", total, max_workers.max(1));
        let finished = AtomicUsize::new(0);

        let mut artifacts = run_bounded(batches.iter().collect(), max_workers, |batch: &Batch| {
            let finished = &finished;
            let on_done = &on_done;
            async move {
                let n = batch.batch_number;
                let text = batch.narration();
                let output = audio_dir.join(format!("audio_{}.mp3", n));
                let artifact = match self.synthesize(text, voice_id, model_id, &output).await {
                    Ok(path) => {
                        info!("[TTS] Audio {} done", n);
                        AudioArtifact::succeeded(n, text, path)
                    }
                    Err(e) => {
                        error!("[TTS] Audio {} failed: {}", n, e);
                        AudioArtifact::failed(n, text, e.to_string())
                    }
                };
                on_done(finished.fetch_add(1, Ordering::SeqCst) + 1, total);
                artifact
            }
        })
        .await;

        artifacts.sort_by_key(|a| a.sequence_number);
        artifacts
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::pipeline::chunker::chunk;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    /// Writes the text to the output file after a per-batch delay.
    pub(crate) struct FakeSpeech {
        pub voices: Option<Vec<Voice>>,
        pub fail_texts: HashSet<String>,
        pub list_calls: AtomicU32,
    }

    impl FakeSpeech {
        pub(crate) fn new() -> Self {
            Self {
                voices: Some(vec![
                    Voice::new("v-rachel", "Rachel", Some("en")),
                    Voice::new("v-adam", "Adam", Some("en")),
                ]),
                fail_texts: HashSet::new(),
                list_calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl SpeechProvider for FakeSpeech {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn list_voices(&self) -> Result<Vec<Voice>, PipelineError> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            self.voices
                .clone()
                .ok_or_else(|| PipelineError::Connection("refused".into()))
        }

        async fn synthesize(
            &self,
            text: &str,
            _voice_id: &str,
            _model_id: &str,
            output: &Path,
        ) -> Result<(), PipelineError> {
            // Shorter texts finish later so completion order is scrambled.
            tokio::time::sleep(Duration::from_millis(1000 / (text.len() as u64 + 1))).await;
            if self.fail_texts.contains(text) {
                return Err(PipelineError::Provider("HTTP 422: unsupported text".into()));
            }
            tokio::fs::write(output, text).await?;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_resolve_voice_case_insensitive_and_cached() {
        let fake = Arc::new(FakeSpeech::new());
        let synth = SpeechSynthesizer::new(fake.clone());

        assert_eq!(synth.resolve_voice("adam").await, "v-adam");
        assert_eq!(synth.resolve_voice("RACHEL").await, "v-rachel");
        assert_eq!(fake.list_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_voice_falls_back_to_first() {
        let synth = SpeechSynthesizer::new(Arc::new(FakeSpeech::new()));
        assert_eq!(synth.resolve_voice("Nobody").await, "v-rachel");
    }

    #[tokio::test]
    async fn test_listing_failure_falls_back_to_default() {
        let mut fake = FakeSpeech::new();
        fake.voices = None;
        let synth = SpeechSynthesizer::new(Arc::new(fake));
        assert_eq!(synth.resolve_voice("Rachel").await, "default");
    }

    #[tokio::test(start_paused = true)]
    async fn test_synthesize_many_sorted_with_captured_failures() {
        let tmp = tempfile::tempdir().unwrap();
        let text = "a\nbb\nccc\ndddd\neeeee";
        let batches = chunk(text, 1);

        let mut fake = FakeSpeech::new();
        fake.fail_texts.insert("ccc".into());
        let synth = SpeechSynthesizer::new(Arc::new(fake)).with_retry(RetryPolicy::none());

        let ticks = std::sync::Mutex::new(Vec::new());
        let artifacts = synth
            .synthesize_many(&batches, "v-rachel", DEFAULT_MODEL_ID, tmp.path(), 2, |done, total| {
                ticks.lock().unwrap().push((done, total));
            })
            .await;

        let numbers: Vec<usize> = artifacts.iter().map(|a| a.sequence_number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4, 5]);
        assert!(!artifacts[2].is_ok());
        assert!(artifacts[2].error.as_deref().unwrap().contains("unsupported text"));
        assert_eq!(artifacts.iter().filter(|a| a.is_ok()).count(), 4);

        let written = std::fs::read_to_string(tmp.path().join("audio_5.mp3")).unwrap();
        assert_eq!(written, "eeeee");

        let ticks = ticks.into_inner().unwrap();
        assert_eq!(ticks.len(), 5);
        assert_eq!(ticks.last(), Some(&(5, 5)));
    }

    #[test]
    fn test_build_provider_uses_selected_key() {
        let config = AppConfig {
            audio_provider: SpeechProviderKind::MiniMax,
            minimax_api_key: Some("mm-key".into()),
            ..AppConfig::default()
        };
        assert_eq!(build_provider(&config).unwrap().name(), "minimax");

        let config = AppConfig {
            audio_provider: SpeechProviderKind::ElevenLabs,
            minimax_api_key: Some("mm-key".into()),
            ..AppConfig::default()
        };
        let err = build_provider(&config).err().unwrap();
        assert!(matches!(err, PipelineError::Configuration(_)));
        assert!(err.to_string().contains("elevenlabs"));
    }
}

