// TALKREEL Job Manager - Pipeline Orchestrator
// Copyright (c) 2026 Xing_The_Creator | TALKREEL
//
// Owns the job lifecycle: validate, then run text -> audio -> video ->
// concatenation in strict order. Any failed item aborts the job; whatever
// was produced stays on disk under the job directory.

use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::{AppConfig, MAX_IMAGES, MAX_TEXT_LENGTH, MIN_IMAGES, MIN_TEXT_LENGTH, SUPPORTED_IMAGE_FORMATS};
use crate::error::PipelineError;
use crate::pipeline::chunker::chunk;
use crate::pipeline::estimate::{estimate, JobEstimate};
use crate::pipeline::image_picker::{stage_images, ImagePicker};
use crate::pipeline::job::{Job, JobStage};
use crate::pipeline::lipsync::{LipSyncRunner, WaveSpeedClient};
use crate::pipeline::media_probe::probe_media;
use crate::pipeline::progress::{ProgressReporter, ProgressSink};
use crate::pipeline::text_rewriter::{rewrite_batches, GeminiRewriter, TextRewriter};
use crate::pipeline::uploader::UploadChain;
use crate::pipeline::video_stitcher::{ClipJoiner, VideoStitcher};
use crate::pipeline::video_synth::{HttpDownloader, VideoSynthesizer};
use crate::pipeline::voice::{build_provider, SpeechSynthesizer};
use crate::store::{JobStore, JsonJobStore, RecordStatus};

pub const DEFAULT_VIDEO_WORKERS: usize = 3;
const FINAL_VIDEO_NAME: &str = "final_video.mp4";

/// Collaborators the orchestrator drives. Built once from configuration,
/// or assembled by hand in tests.
pub struct PipelineServices {
    pub rewriter: Arc<dyn TextRewriter>,
    pub speech: Arc<SpeechSynthesizer>,
    pub video: Arc<VideoSynthesizer>,
    pub joiner: Arc<dyn ClipJoiner>,
    pub store: Option<Arc<dyn JobStore>>,
}

pub struct JobManager {
    config: AppConfig,
    services: PipelineServices,
}

impl JobManager {
    pub fn new(config: AppConfig, services: PipelineServices) -> Self {
        Self { config, services }
    }

    /// Wire up the real providers. Missing keys, an unknown provider or a
    /// missing ffmpeg fail here, before any job exists.
    pub async fn from_config(config: AppConfig) -> Result<Self, PipelineError> {
        let report = config.validate();
        for w in &report.warnings {
            warn!("[JOB] {}", w);
        }
        if !report.is_ok() {
            return Err(PipelineError::Configuration(report.errors.join("; ")));
        }

        let gemini_key = config.gemini_api_key.as_deref().unwrap_or_default();
        let wavespeed_key = config.wavespeed_api_key.as_deref().unwrap_or_default();

        let rewriter = Arc::new(GeminiRewriter::new(gemini_key)?);
        let speech = Arc::new(SpeechSynthesizer::new(build_provider(&config)?));
        let lipsync = LipSyncRunner::new(Arc::new(WaveSpeedClient::new(wavespeed_key)?), config.poll.clone());
        let video = Arc::new(VideoSynthesizer::new(
            UploadChain::with_default_backends()?,
            lipsync,
            Box::new(HttpDownloader::new()?),
            &config.default_resolution,
        ));
        let joiner = Arc::new(VideoStitcher::new().await?);
        let store: Arc<dyn JobStore> = Arc::new(JsonJobStore::open(&config.data_dir)?);

        info!("[JOB] Pipeline ready (speech: {})", speech.provider_name());
        Ok(Self::new(
            config,
            PipelineServices {
                rewriter,
                speech,
                video,
                joiner,
                store: Some(store),
            },
        ))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn estimate(&self, text: &str) -> JobEstimate {
        estimate(text, self.config.batch_size)
    }

    /// Validate inputs and allocate `<temp_folder>/job_<id>`. No remote calls.
    pub fn create(&self, text: &str, voice: &str, images: &[PathBuf], model_id: &str) -> Result<Job, PipelineError> {
        validate_text(text)?;
        validate_images(images)?;
        if voice.trim().is_empty() {
            return Err(PipelineError::Validation("Voice name is required".into()));
        }

        let id = Uuid::new_v4().to_string();
        let job_dir = self.config.temp_folder.join(format!("job_{}", id));
        std::fs::create_dir_all(&job_dir)?;

        let job = Job::new(id, text.trim(), voice, images.to_vec(), model_id, job_dir);
        job.save_snapshot()?;
        info!("[JOB] Created job {} ({} chars, {} images)", job.id, job.text.chars().count(), images.len());
        Ok(job)
    }

    /// Run every stage and return the final video path. `workers` overrides
    /// the per-stage concurrency when given.
    pub async fn process(
        &self,
        job: &mut Job,
        sink: Arc<dyn ProgressSink>,
        workers: Option<usize>,
    ) -> Result<PathBuf, PipelineError> {
        if job.stage.is_terminal() {
            info!("[JOB] Job {} already {}, nothing to do", job.id, job.stage);
            return match (&job.final_video, &job.error) {
                (Some(video), _) if job.stage == JobStage::Completed => Ok(video.clone()),
                (_, Some(message)) => Err(PipelineError::Validation(format!("Job {} already failed: {}", job.id, message))),
                _ => Err(PipelineError::Validation(format!("Job {} is already {}", job.id, job.stage))),
            };
        }

        let reporter = ProgressReporter::new(sink);
        self.register(job);

        match self.run_stages(job, &reporter, workers).await {
            Ok(final_video) => {
                job.final_video = Some(final_video.clone());
                job.advance(JobStage::Completed)?;
                self.checkpoint(job, &reporter, "Video generated successfully!", 100);
                if let Some(store_id) = job.store_id.as_deref() {
                    self.with_store(|s| s.update_status(store_id, RecordStatus::Completed, Some(&final_video)));
                }
                info!("[JOB] ✅ Job {} completed: {:?}", job.id, final_video);
                Ok(final_video)
            }
            Err(e) => {
                let message = e.to_string();
                error!("[JOB] ❌ Job {} failed during {}: {}", job.id, job.stage, message);
                job.fail(&message);
                if let Err(save_err) = job.save_snapshot() {
                    error!("[JOB] Could not persist failure snapshot: {}", save_err);
                }
                if let Some(store_id) = job.store_id.as_deref() {
                    self.with_store(|s| s.record_error(store_id, &message));
                }
                Err(e)
            }
        }
    }

    async fn run_stages(
        &self,
        job: &mut Job,
        reporter: &ProgressReporter,
        workers: Option<usize>,
    ) -> Result<PathBuf, PipelineError> {
        let job_dir = job.job_dir.clone();

        // Text
        self.transition(job, reporter, JobStage::ProcessingText, "Processing text...", 5)?;
        job.batches = chunk(&job.text, self.config.batch_size);
        if job.batches.is_empty() {
            return Err(PipelineError::Validation("Text has no paragraphs".into()));
        }
        info!("[CHUNKER] {} batches of up to {} paragraphs", job.batches.len(), self.config.batch_size);
        rewrite_batches(
            self.services.rewriter.as_ref(),
            &mut job.batches,
            &job_dir.join("formatted_text"),
            self.config.rewrite_failure_policy,
            |n, total| {
                let pct = 10 + (10 * (n as i32 - 1)) / total.max(1) as i32;
                reporter.report(&format!("Formatting batch {}/{}...", n, total), pct);
            },
        )
        .await?;
        self.checkpoint(job, reporter, &format!("{} batches formatted", job.batches.len()), 20);

        // Audio
        self.transition(job, reporter, JobStage::GeneratingAudio, "Generating audio...", 25)?;
        let voice_id = self.services.speech.resolve_voice(&job.voice).await;
        let speech_workers = workers.unwrap_or_else(|| self.config.speech_workers());
        job.audios = self
            .services
            .speech
            .synthesize_many(
                &job.batches,
                &voice_id,
                &job.model_id,
                &job_dir.join("audios"),
                speech_workers,
                |done, total| {
                    reporter.report(&format!("Audio {}/{} done", done, total), stage_percent(30, 50, done, total));
                },
            )
            .await;
        if let Some(err) = stage_failure("audios", job.audios.iter().map(|a| a.error.as_deref())) {
            return Err(err);
        }
        self.checkpoint(job, reporter, &format!("{} audios generated", job.audios.len()), 50);

        // Video
        self.transition(job, reporter, JobStage::GeneratingVideo, "Generating lip-sync videos...", 55)?;
        let pool = stage_images(&job.images, &job_dir.join("images")).await?;
        let picker = ImagePicker::new(pool)?;
        let video_workers = workers.unwrap_or(DEFAULT_VIDEO_WORKERS);
        job.videos = self
            .services
            .video
            .generate_many(&job.audios, &picker, &job_dir.join("videos"), video_workers, |done, total| {
                reporter.report(&format!("Video {}/{} done", done, total), stage_percent(60, 85, done, total));
            })
            .await;
        if let Some(err) = stage_failure("videos", job.videos.iter().map(|v| v.error.as_deref())) {
            return Err(err);
        }
        self.checkpoint(job, reporter, &format!("{} videos generated", job.videos.len()), 85);

        // Concatenation
        self.transition(job, reporter, JobStage::Concatenating, "Concatenating videos...", 90)?;
        let clips: Vec<PathBuf> = job.videos.iter().filter_map(|v| v.path.clone()).collect();
        self.checkpoint(job, reporter, &format!("Joining {} clips...", clips.len()), 95);
        let final_video = self
            .services
            .joiner
            .concatenate(&clips, &job_dir.join(FINAL_VIDEO_NAME), false)
            .await?;

        match probe_media(&final_video).await {
            Ok(info) => info!(
                "[JOB] Final video: {:.1}s, {:.2} MB",
                info.duration,
                info.size as f64 / (1024.0 * 1024.0)
            ),
            Err(e) => warn!("[JOB] Could not probe final video: {}", e),
        }
        Ok(final_video)
    }

    /// Advance the stage, then persist before any remote work starts.
    fn transition(
        &self,
        job: &mut Job,
        reporter: &ProgressReporter,
        stage: JobStage,
        message: &str,
        percent: i32,
    ) -> Result<(), PipelineError> {
        job.advance(stage)?;
        info!("[JOB] {} -> {}", job.id, stage);
        job.progress_percent = reporter.report(message, percent);
        job.progress_message = message.to_string();
        job.save_snapshot()?;
        self.sync_progress(job);
        Ok(())
    }

    fn checkpoint(&self, job: &mut Job, reporter: &ProgressReporter, message: &str, percent: i32) {
        job.progress_percent = reporter.report(message, percent);
        job.progress_message = message.to_string();
        if let Err(e) = job.save_snapshot() {
            warn!("[JOB] Snapshot write failed: {}", e);
        }
        self.sync_progress(job);
    }

    fn register(&self, job: &mut Job) {
        if job.store_id.is_some() {
            return;
        }
        let est = self.estimate(&job.text);
        let metadata = json!({
            "job_id": job.id,
            "voice": job.voice,
            "model_id": job.model_id,
            "image_count": job.images.len(),
            "job_dir": job.job_dir,
        });
        if let Some(store) = &self.services.store {
            match store.create_job("video_generation", est.estimated_time.as_secs(), metadata) {
                Ok(record) => job.store_id = Some(record.id),
                Err(e) => warn!("[STORE] Could not register job {}: {}", job.id, e),
            }
        }
    }

    fn sync_progress(&self, job: &Job) {
        if let Some(store_id) = job.store_id.as_deref() {
            let percent = job.progress_percent;
            self.with_store(|s| s.update_progress(store_id, percent));
        }
    }

    /// Store writes never fail a job; they are logged instead.
    fn with_store<T, F>(&self, op: F)
    where
        F: FnOnce(&dyn JobStore) -> Result<T, PipelineError>,
    {
        if let Some(store) = &self.services.store {
            if let Err(e) = op(store.as_ref()) {
                warn!("[STORE] Write failed: {}", e);
            }
        }
    }
}

/// Summarize a stage's per-item errors, in sequence order. `None` when every
/// item succeeded.
fn stage_failure<'a, I>(what: &'static str, errors: I) -> Option<PipelineError>
where
    I: Iterator<Item = Option<&'a str>>,
{
    let errors: Vec<Option<&str>> = errors.collect();
    let total = errors.len();
    let mut failed = errors.into_iter().flatten();
    let first_error = failed.next()?.to_string();
    Some(PipelineError::Stage {
        what,
        failed: 1 + failed.count(),
        total,
        first_error,
    })
}

/// Interpolate a per-item percent between a stage's start and end checkpoints.
fn stage_percent(start: i32, end: i32, done: usize, total: usize) -> i32 {
    if total == 0 {
        return end;
    }
    start + ((end - start) as i64 * done as i64 / total as i64) as i32
}

pub fn validate_text(text: &str) -> Result<(), PipelineError> {
    let len = text.trim().chars().count();
    if len < MIN_TEXT_LENGTH {
        return Err(PipelineError::Validation(format!(
            "Text too short ({} chars, minimum {})",
            len, MIN_TEXT_LENGTH
        )));
    }
    if len > MAX_TEXT_LENGTH {
        return Err(PipelineError::Validation(format!(
            "Text too long ({} chars, maximum {})",
            len, MAX_TEXT_LENGTH
        )));
    }
    Ok(())
}

pub fn validate_images(images: &[PathBuf]) -> Result<(), PipelineError> {
    if images.len() < MIN_IMAGES || images.len() > MAX_IMAGES {
        return Err(PipelineError::Validation(format!(
            "Between {} and {} images are required, got {}",
            MIN_IMAGES,
            MAX_IMAGES,
            images.len()
        )));
    }
    for image in images {
        if !image.is_file() {
            return Err(PipelineError::Validation(format!("Image not found: {:?}", image)));
        }
        if !has_supported_extension(image) {
            return Err(PipelineError::Validation(format!(
                "Unsupported image format: {:?} (use {})",
                image,
                SUPPORTED_IMAGE_FORMATS.join(", ")
            )));
        }
    }
    Ok(())
}

fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .map_or(false, |ext| SUPPORTED_IMAGE_FORMATS.contains(&ext.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_bounds() {
        assert!(validate_text("   short   ").is_err());
        assert!(validate_text("Long enough text.").is_ok());
        assert!(validate_text(&"x".repeat(MAX_TEXT_LENGTH + 1)).is_err());
        assert!(validate_text(&"x".repeat(MAX_TEXT_LENGTH)).is_ok());
    }

    #[test]
    fn test_image_rules() {
        let tmp = tempfile::tempdir().unwrap();
        let png = tmp.path().join("face.PNG");
        let gif = tmp.path().join("face.gif");
        std::fs::write(&png, b"png").unwrap();
        std::fs::write(&gif, b"gif").unwrap();

        assert!(validate_images(&[]).is_err());
        assert!(validate_images(&[png.clone()]).is_ok());
        assert!(validate_images(&[gif]).is_err());
        assert!(validate_images(&[tmp.path().join("missing.jpg")]).is_err());
        assert!(validate_images(&vec![png; MAX_IMAGES + 1]).is_err());
    }

    #[test]
    fn test_stage_failure_counts_and_keeps_first_reason() {
        let ok: [Option<&str>; 2] = [None, None];
        assert!(stage_failure("videos", ok.into_iter()).is_none());

        let mixed = [None, Some("X"), Some("later")];
        let err = stage_failure("videos", mixed.into_iter()).unwrap();
        assert_eq!(err.to_string(), "2 of 3 videos failed to generate (first error: X)");
    }

    #[test]
    fn test_stage_percent() {
        assert_eq!(stage_percent(30, 50, 0, 4), 30);
        assert_eq!(stage_percent(30, 50, 2, 4), 40);
        assert_eq!(stage_percent(30, 50, 4, 4), 50);
        assert_eq!(stage_percent(60, 85, 0, 0), 85);
    }
}
