// TALKREEL Video Stitcher - Clip Concatenation
// Copyright (c) 2026 Xing_The_Creator | TALKREEL
//
// Joins the ordered lip-sync clips with FFmpeg's concat demuxer. Stream copy
// first; if the clips disagree on codecs or timebases, fall back to a
// libx264/aac re-encode over the same manifest.

use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{error, info, warn};

use crate::error::PipelineError;

/// Joins clips into one file, in the order given.
#[async_trait]
pub trait ClipJoiner: Send + Sync {
    async fn concatenate(
        &self,
        clips: &[PathBuf],
        output: &Path,
        with_transitions: bool,
    ) -> Result<PathBuf, PipelineError>;
}

pub struct VideoStitcher {
    ffmpeg: PathBuf,
}

impl VideoStitcher {
    /// Locate `ffmpeg` on PATH. Fails if it is missing or broken.
    pub async fn new() -> Result<Self, PipelineError> {
        Self::with_binary("ffmpeg").await
    }

    pub async fn with_binary(binary: impl Into<PathBuf>) -> Result<Self, PipelineError> {
        let ffmpeg = binary.into();
        let status = Command::new(&ffmpeg)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| PipelineError::Tool(format!("{} not found: {}", ffmpeg.display(), e)))?;
        if !status.success() {
            return Err(PipelineError::Tool(format!("{} -version failed", ffmpeg.display())));
        }
        Ok(Self { ffmpeg })
    }

    /// Build concat demuxer lines, one `file '<path>'` per clip with
    /// apostrophes escaped for the demuxer's quoting.
    pub fn create_concat_manifest(segments: &[PathBuf]) -> String {
        segments
            .iter()
            .map(|p| format!("file '{}'", p.to_string_lossy().replace('\'', "'\\''")))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Every clip must exist and be non-empty. Returns absolute paths.
    fn validate_clips(clips: &[PathBuf]) -> Result<Vec<PathBuf>, PipelineError> {
        if clips.is_empty() {
            return Err(PipelineError::Validation("No clips to concatenate".into()));
        }
        clips
            .iter()
            .map(|clip| {
                let meta = fs::metadata(clip)
                    .map_err(|_| PipelineError::Validation(format!("Clip not found: {:?}", clip)))?;
                if meta.len() == 0 {
                    return Err(PipelineError::Validation(format!("Clip is empty: {:?}", clip)));
                }
                Ok(fs::canonicalize(clip)?)
            })
            .collect()
    }

    async fn run_concat(&self, manifest: &Path, output: &Path, reencode: bool) -> Result<(), PipelineError> {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-y", "-hide_banner", "-loglevel", "error", "-f", "concat", "-safe", "0", "-i"])
            .arg(manifest);
        if reencode {
            cmd.args(["-c:v", "libx264", "-preset", "fast", "-crf", "23", "-c:a", "aac", "-b:a", "128k"]);
        } else {
            cmd.args(["-c", "copy"]);
        }
        let out = cmd.arg(output).output().await?;

        if out.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&out.stderr);
            let tail: String = stderr.chars().rev().take(500).collect::<Vec<_>>().into_iter().rev().collect();
            Err(PipelineError::Tool(format!("ffmpeg concat failed: {}", tail.trim())))
        }
    }

    async fn join(&self, clips: &[PathBuf], output: &Path, manifest_path: &Path) -> Result<(), PipelineError> {
        fs::write(manifest_path, Self::create_concat_manifest(clips))?;
        info!("[STITCHER] Manifest written ({} segments): {:?}", clips.len(), manifest_path);

        match self.run_concat(manifest_path, output, false).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("[STITCHER] Stream copy failed ({}), re-encoding", e);
                self.run_concat(manifest_path, output, true).await
            }
        }
    }
}

#[async_trait]
impl ClipJoiner for VideoStitcher {
    async fn concatenate(
        &self,
        clips: &[PathBuf],
        output: &Path,
        with_transitions: bool,
    ) -> Result<PathBuf, PipelineError> {
        let clips = Self::validate_clips(clips)?;
        if with_transitions && clips.len() > 1 {
            info!("[STITCHER] Transitions requested; joining without crossfades");
        }
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)?;
        }

        let manifest_path = output.with_extension("concat_manifest.txt");
        let result = self.join(&clips, output, &manifest_path).await;
        let _ = fs::remove_file(&manifest_path);

        match result {
            Ok(()) => {
                info!("[STITCHER] ✅ Final output: {:?}", output);
                Ok(output.to_path_buf())
            }
            Err(e) => {
                error!("[STITCHER] ❌ Concatenation failed: {}", e);
                Err(e)
            }
        }
    }
}
