// TALKREEL Job Model & Snapshot
// Copyright (c) 2026 Xing_The_Creator | TALKREEL
//
// A job owns every artifact its stages produce. The snapshot written to
// `<job_dir>/state.json` is the "black box" a front end reads to show
// where a job stands, or where it died.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::error::PipelineError;
use crate::pipeline::chunker::Batch;

const SNAPSHOT_FILE: &str = "state.json";

/// Lifecycle stage of a job. Stages only move forward; `Failed` is reachable
/// from any non-terminal stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    Created,
    ProcessingText,
    GeneratingAudio,
    GeneratingVideo,
    Concatenating,
    Completed,
    Failed,
}

impl JobStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStage::Completed | JobStage::Failed)
    }

    /// Whether `self -> next` is a legal move.
    pub fn can_advance_to(self, next: JobStage) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == JobStage::Failed || next > self
    }
}

impl std::fmt::Display for JobStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            JobStage::Created => "created",
            JobStage::ProcessingText => "processing_text",
            JobStage::GeneratingAudio => "generating_audio",
            JobStage::GeneratingVideo => "generating_video",
            JobStage::Concatenating => "concatenating",
            JobStage::Completed => "completed",
            JobStage::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// One synthesized narration clip, tagged with its batch number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioArtifact {
    pub sequence_number: usize,
    pub text: String,
    pub path: Option<PathBuf>,
    pub error: Option<String>,
}

impl AudioArtifact {
    pub fn succeeded(sequence_number: usize, text: &str, path: PathBuf) -> Self {
        Self {
            sequence_number,
            text: text.to_string(),
            path: Some(path),
            error: None,
        }
    }

    pub fn failed(sequence_number: usize, text: &str, error: String) -> Self {
        Self {
            sequence_number,
            text: text.to_string(),
            path: None,
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none() && self.path.is_some()
    }
}

/// One lip-synced clip produced from an audio artifact and an image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoArtifact {
    pub sequence_number: usize,
    pub audio_path: Option<PathBuf>,
    pub image_path: Option<PathBuf>,
    pub path: Option<PathBuf>,
    pub error: Option<String>,
}

impl VideoArtifact {
    pub fn is_ok(&self) -> bool {
        self.error.is_none() && self.path.is_some()
    }
}

/// One end-to-end generation request.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub text: String,
    pub voice: String,
    pub images: Vec<PathBuf>,
    pub model_id: String,
    pub job_dir: PathBuf,
    pub stage: JobStage,
    pub progress_message: String,
    pub progress_percent: u8,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub batches: Vec<Batch>,
    pub audios: Vec<AudioArtifact>,
    pub videos: Vec<VideoArtifact>,
    pub final_video: Option<PathBuf>,
    /// Id of the matching record in the job store, once registered.
    pub store_id: Option<String>,
}

impl Job {
    pub fn new(id: String, text: &str, voice: &str, images: Vec<PathBuf>, model_id: &str, job_dir: PathBuf) -> Self {
        Self {
            id,
            text: text.to_string(),
            voice: voice.to_string(),
            images,
            model_id: model_id.to_string(),
            job_dir,
            stage: JobStage::Created,
            progress_message: "Job created".to_string(),
            progress_percent: 0,
            created_at: Utc::now(),
            completed_at: None,
            error: None,
            batches: Vec::new(),
            audios: Vec::new(),
            videos: Vec::new(),
            final_video: None,
            store_id: None,
        }
    }

    /// Move to `next`, rejecting backwards moves and moves out of a terminal stage.
    pub fn advance(&mut self, next: JobStage) -> Result<(), PipelineError> {
        if !self.stage.can_advance_to(next) {
            return Err(PipelineError::Validation(format!(
                "Job {} cannot move from {} to {}",
                self.id, self.stage, next
            )));
        }
        self.stage = next;
        if next.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Mark the job failed. The first recorded error is kept.
    pub fn fail(&mut self, message: &str) {
        if self.stage.is_terminal() {
            return;
        }
        self.stage = JobStage::Failed;
        self.completed_at = Some(Utc::now());
        if self.error.is_none() {
            self.error = Some(message.to_string());
        }
        self.progress_message = format!("Error: {}", message);
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            id: self.id.clone(),
            stage: self.stage,
            voice: self.voice.clone(),
            model_id: self.model_id.clone(),
            progress_message: self.progress_message.clone(),
            progress_percent: self.progress_percent,
            created_at: self.created_at,
            completed_at: self.completed_at,
            error: self.error.clone(),
            batch_count: self.batches.len(),
            audio_count: self.audios.iter().filter(|a| a.is_ok()).count(),
            video_count: self.videos.iter().filter(|v| v.is_ok()).count(),
            final_video: self.final_video.clone(),
        }
    }

    pub fn save_snapshot(&self) -> Result<PathBuf, PipelineError> {
        self.snapshot().save(&self.job_dir)
    }
}

/// Serializable view of a job written to the job directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: String,
    pub stage: JobStage,
    pub voice: String,
    pub model_id: String,
    pub progress_message: String,
    pub progress_percent: u8,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub batch_count: usize,
    pub audio_count: usize,
    pub video_count: usize,
    pub final_video: Option<PathBuf>,
}

impl JobSnapshot {
    /// Write the snapshot next to the job's artifacts. The file is replaced
    /// through a rename so readers never see a torn write.
    pub fn save(&self, job_dir: &Path) -> Result<PathBuf, PipelineError> {
        fs::create_dir_all(job_dir)?;
        let path = job_dir.join(SNAPSHOT_FILE);
        let tmp = job_dir.join(format!("{}.tmp", SNAPSHOT_FILE));
        fs::write(&tmp, serde_json::to_string_pretty(self)?)?;
        fs::rename(&tmp, &path)?;
        Ok(path)
    }

    /// Load a snapshot from a job directory. Returns `None` if none exists
    /// or it cannot be parsed.
    pub fn load(job_dir: &Path) -> Option<Self> {
        let path = job_dir.join(SNAPSHOT_FILE);
        if !path.exists() {
            return None;
        }
        match fs::read_to_string(&path) {
            Ok(json) => match serde_json::from_str::<JobSnapshot>(&json) {
                Ok(snapshot) => {
                    info!("[JOB] 📂 Found snapshot: id='{}', stage={}", snapshot.id, snapshot.stage);
                    Some(snapshot)
                }
                Err(e) => {
                    error!("[JOB] Failed to parse snapshot: {}", e);
                    None
                }
            },
            Err(e) => {
                error!("[JOB] Failed to read snapshot: {}", e);
                None
            }
        }
    }
}
