// TALKREEL Configuration
// Copyright (c) 2026 Xing_The_Creator | TALKREEL
//
// One explicit settings value, read from the environment once at startup
// and handed to each component at construction.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::PipelineError;

pub const MIN_TEXT_LENGTH: usize = 10;
pub const MAX_TEXT_LENGTH: usize = 100_000;
pub const MIN_IMAGES: usize = 1;
pub const MAX_IMAGES: usize = 20;
pub const SUPPORTED_IMAGE_FORMATS: &[&str] = &["png", "jpg", "jpeg"];

/// Which TTS backend the speech stage talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeechProviderKind {
    ElevenLabs,
    MiniMax,
}

impl FromStr for SpeechProviderKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "elevenlabs" => Ok(Self::ElevenLabs),
            "minimax" => Ok(Self::MiniMax),
            other => Err(PipelineError::Configuration(format!(
                "Invalid audio provider '{}'. Use 'elevenlabs' or 'minimax'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for SpeechProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ElevenLabs => write!(f, "elevenlabs"),
            Self::MiniMax => write!(f, "minimax"),
        }
    }
}

/// What the orchestrator does when a batch cannot be rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewriteFailurePolicy {
    /// Fail the whole job.
    #[default]
    Abort,
    /// Narrate the unrewritten batch text instead.
    UseOriginal,
}

impl FromStr for RewriteFailurePolicy {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "use_original" | "original" => Ok(Self::UseOriginal),
            other => Err(PipelineError::Configuration(format!(
                "Invalid rewrite failure policy '{}'. Use 'abort' or 'use_original'",
                other
            ))),
        }
    }
}

/// Timing knobs for the lip-sync submit/poll loop.
#[derive(Debug, Clone, PartialEq)]
pub struct PollSettings {
    /// Wait before the first status query.
    pub warmup: Duration,
    pub interval: Duration,
    /// Wall-clock budget for the whole polling phase of one clip.
    pub timeout: Duration,
    pub connection_backoff: Duration,
    pub max_connection_errors: u32,
    pub rate_limit_cooldown: Duration,
    pub server_error_cooldown: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            warmup: Duration::from_secs(15),
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(900),
            connection_backoff: Duration::from_secs(10),
            max_connection_errors: 5,
            rate_limit_cooldown: Duration::from_secs(30),
            server_error_cooldown: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub elevenlabs_api_key: Option<String>,
    pub minimax_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub wavespeed_api_key: Option<String>,
    pub audio_provider: SpeechProviderKind,
    pub max_concurrent_requests: usize,
    pub elevenlabs_max_concurrent: usize,
    pub temp_folder: PathBuf,
    pub data_dir: PathBuf,
    pub batch_size: usize,
    pub poll: PollSettings,
    pub default_resolution: String,
    pub rewrite_failure_policy: RewriteFailurePolicy,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            elevenlabs_api_key: None,
            minimax_api_key: None,
            gemini_api_key: None,
            wavespeed_api_key: None,
            audio_provider: SpeechProviderKind::ElevenLabs,
            max_concurrent_requests: 10,
            elevenlabs_max_concurrent: 3,
            temp_folder: PathBuf::from("./temp"),
            data_dir: PathBuf::from("./data"),
            batch_size: 3,
            poll: PollSettings::default(),
            default_resolution: "480p".to_string(),
            rewrite_failure_policy: RewriteFailurePolicy::Abort,
        }
    }
}

/// Outcome of `AppConfig::validate`: blocking errors and advisory warnings.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ConfigReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ConfigReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

impl AppConfig {
    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self, PipelineError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through an arbitrary key lookup. Unset or blank keys
    /// keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, PipelineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut cfg = Self::default();

        cfg.elevenlabs_api_key = get("ELEVENLABS_API_KEY");
        cfg.minimax_api_key = get("MINIMAX_API_KEY");
        cfg.gemini_api_key = get("GEMINI_API_KEY");
        cfg.wavespeed_api_key = get("WAVESPEED_API_KEY");

        if let Some(v) = get("AUDIO_PROVIDER") {
            cfg.audio_provider = v.parse()?;
        }
        if let Some(v) = get("MAX_CONCURRENT_REQUESTS") {
            cfg.max_concurrent_requests = parse_number("MAX_CONCURRENT_REQUESTS", &v)?;
        }
        if let Some(v) = get("ELEVENLABS_MAX_CONCURRENT") {
            cfg.elevenlabs_max_concurrent = parse_number("ELEVENLABS_MAX_CONCURRENT", &v)?;
        }
        if let Some(v) = get("TEMP_FOLDER") {
            cfg.temp_folder = PathBuf::from(v);
        }
        if let Some(v) = get("DATA_DIR") {
            cfg.data_dir = PathBuf::from(v);
        }
        if let Some(v) = get("BATCH_SIZE") {
            cfg.batch_size = parse_number("BATCH_SIZE", &v)?;
        }
        if let Some(v) = get("POLL_INTERVAL") {
            cfg.poll.interval = parse_seconds("POLL_INTERVAL", &v)?;
        }
        if let Some(v) = get("POLL_TIMEOUT") {
            cfg.poll.timeout = parse_seconds("POLL_TIMEOUT", &v)?;
        }
        if let Some(v) = get("DEFAULT_RESOLUTION") {
            cfg.default_resolution = v;
        }
        if let Some(v) = get("REWRITE_FAILURE_POLICY") {
            cfg.rewrite_failure_policy = v.parse()?;
        }

        Ok(cfg)
    }

    /// Check that the keys the pipeline needs are present.
    pub fn validate(&self) -> ConfigReport {
        let mut report = ConfigReport::default();

        if self.elevenlabs_api_key.is_none() && self.minimax_api_key.is_none() {
            report.errors.push(
                "No audio provider configured (ELEVENLABS_API_KEY or MINIMAX_API_KEY)".to_string(),
            );
        }
        if self.elevenlabs_api_key.is_none() {
            report
                .warnings
                .push("ELEVENLABS_API_KEY not set - ElevenLabs unavailable".to_string());
        }
        if self.minimax_api_key.is_none() {
            report
                .warnings
                .push("MINIMAX_API_KEY not set - MiniMax unavailable".to_string());
        }
        if self.gemini_api_key.is_none() {
            report.errors.push("GEMINI_API_KEY not set".to_string());
        }
        if self.wavespeed_api_key.is_none() {
            report.errors.push("WAVESPEED_API_KEY not set".to_string());
        }
        if self.batch_size == 0 {
            report.errors.push("BATCH_SIZE must be at least 1".to_string());
        }

        report
    }

    /// API key for the selected speech provider.
    pub fn speech_api_key(&self) -> Option<&str> {
        match self.audio_provider {
            SpeechProviderKind::ElevenLabs => self.elevenlabs_api_key.as_deref(),
            SpeechProviderKind::MiniMax => self.minimax_api_key.as_deref(),
        }
    }

    /// Worker budget for the speech stage. ElevenLabs caps concurrent
    /// requests per account, so it gets its own ceiling.
    pub fn speech_workers(&self) -> usize {
        match self.audio_provider {
            SpeechProviderKind::ElevenLabs => self.elevenlabs_max_concurrent.max(1),
            SpeechProviderKind::MiniMax => self.max_concurrent_requests.max(1),
        }
    }
}

fn parse_number(key: &str, value: &str) -> Result<usize, PipelineError> {
    value
        .trim()
        .parse::<usize>()
        .map_err(|_| PipelineError::Configuration(format!("{} must be an integer, got '{}'", key, value)))
}

fn parse_seconds(key: &str, value: &str) -> Result<Duration, PipelineError> {
    let secs = value
        .trim()
        .parse::<f64>()
        .map_err(|_| PipelineError::Configuration(format!("{} must be a number, got '{}'", key, value)))?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(PipelineError::Configuration(format!(
            "{} must be a non-negative number of seconds",
            key
        )));
    }
    Ok(Duration::from_secs_f64(secs))
}
