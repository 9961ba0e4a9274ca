// TALKREEL Video Synthesizer
// Copyright (c) 2026 Xing_The_Creator | TALKREEL
//
// Per clip: pick a portrait, stage audio and image at public URLs, run the
// lip-sync task, then download the result to `videos/video_<n>.mp4`. Every
// failure along the way lands in that clip's artifact.

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{error, info};

use crate::error::{check_response, PipelineError};
use crate::pipeline::image_picker::ImagePicker;
use crate::pipeline::job::{AudioArtifact, VideoArtifact};
use crate::pipeline::lipsync::LipSyncRunner;
use crate::pipeline::uploader::UploadChain;
use crate::pipeline::{run_bounded, stream_to_file};

#[async_trait]
pub trait Downloader: Send + Sync {
    async fn download(&self, url: &str, dest: &Path) -> Result<(), PipelineError>;
}

pub struct HttpDownloader {
    client: reqwest::Client,
}

impl HttpDownloader {
    pub fn new() -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn download(&self, url: &str, dest: &Path) -> Result<(), PipelineError> {
        let resp = check_response(self.client.get(url).send().await?).await?;
        let bytes = stream_to_file(resp, dest).await?;
        if bytes == 0 {
            return Err(PipelineError::Provider(format!("Downloaded clip is empty: {}", url)));
        }
        Ok(())
    }
}

pub struct VideoSynthesizer {
    uploads: UploadChain,
    lipsync: LipSyncRunner,
    downloader: Box<dyn Downloader>,
    resolution: String,
}

impl VideoSynthesizer {
    pub fn new(uploads: UploadChain, lipsync: LipSyncRunner, downloader: Box<dyn Downloader>, resolution: &str) -> Self {
        Self {
            uploads,
            lipsync,
            downloader,
            resolution: resolution.to_string(),
        }
    }

    async fn render(&self, audio_path: &Path, image_path: &Path, output: &Path) -> Result<(), PipelineError> {
        let audio_url = self.uploads.upload(audio_path).await?;
        let image_url = self.uploads.upload(image_path).await?;
        let video_url = self
            .lipsync
            .generate(&audio_url, &image_url, &self.resolution)
            .await?;
        info!("[VIDEO] Downloading {} -> {:?}", video_url, output);
        self.downloader.download(&video_url, output).await
    }

    /// Produce the clip for one audio artifact.
    pub async fn generate_one(&self, audio: &AudioArtifact, picker: &ImagePicker, video_dir: &Path) -> VideoArtifact {
        let n = audio.sequence_number;
        let mut artifact = VideoArtifact {
            sequence_number: n,
            audio_path: audio.path.clone(),
            image_path: None,
            path: None,
            error: None,
        };

        let audio_path = match audio.path.as_deref() {
            Some(p) if p.exists() => p,
            other => {
                let msg = format!("Audio not found: {:?}", other);
                error!("[VIDEO] Video {}: {}", n, msg);
                artifact.error = Some(msg);
                return artifact;
            }
        };

        let image_path = picker.pick();
        info!(
            "[VIDEO] Video {}: audio={:?} image={:?}",
            n,
            audio_path.file_name().unwrap_or_default(),
            image_path.file_name().unwrap_or_default()
        );
        artifact.image_path = Some(image_path.clone());

        let output = video_dir.join(format!("video_{}.mp4", n));
        match self.render(audio_path, &image_path, &output).await {
            Ok(()) => {
                info!("[VIDEO] ✅ Video {} saved: {:?}", n, output);
                artifact.path = Some(output);
            }
            Err(e) => {
                error!("[VIDEO] ❌ Video {} failed: {}", n, e);
                artifact.error = Some(e.to_string());
            }
        }
        artifact
    }

    /// Generate every clip with at most `max_workers` in flight, sorted by
    /// sequence number. `on_done(finished, total)` fires as each clip settles.
    pub async fn generate_many<F>(
        &self,
        audios: &[AudioArtifact],
        picker: &ImagePicker,
        video_dir: &Path,
        max_workers: usize,
        on_done: F,
    ) -> Vec<VideoArtifact>
    where
        F: Fn(usize, usize) + Sync,
    {
        let total = audios.len();
        info!("[VIDEO] 🚀 Sending {} clips to lip-sync ({} workers)", total, max_workers.max(1));
        if let Err(e) = tokio::fs::create_dir_all(video_dir).await {
            error!("[VIDEO] Cannot create {:?}: {}", video_dir, e);
        }
        let finished = AtomicUsize::new(0);

        let mut videos = run_bounded(audios.iter().collect(), max_workers, |audio: &AudioArtifact| {
            let finished = &finished;
            let on_done = &on_done;
            async move {
                let artifact = self.generate_one(audio, picker, video_dir).await;
                on_done(finished.fetch_add(1, Ordering::SeqCst) + 1, total);
                artifact
            }
        })
        .await;

        videos.sort_by_key(|v| v.sequence_number);
        let ok = videos.iter().filter(|v| v.is_ok()).count();
        info!("[VIDEO] Video generation finished: {}/{} succeeded", ok, total);
        videos
    }
}
