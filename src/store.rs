// TALKREEL Job Store
// Copyright (c) 2026 Xing_The_Creator | TALKREEL
//
// Job records for the front end, kept as one JSON array in
// `<data_dir>/jobs.json`. Every write is a read-modify-write of the whole
// file, serialized by a mutex and landed with a temp-file rename.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::PipelineError;

const JOBS_FILE: &str = "jobs.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Processing,
    Completed,
    Failed,
}

impl std::str::FromStr for RecordStatus {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(PipelineError::Validation(format!("Unknown job status '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub status: RecordStatus,
    pub progress: u8,
    pub estimated_time: u64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub video_path: Option<PathBuf>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// The narrow surface the orchestrator needs from persistence.
pub trait JobStore: Send + Sync {
    fn create_job(&self, kind: &str, estimated_secs: u64, metadata: serde_json::Value) -> Result<JobRecord, PipelineError>;
    fn update_progress(&self, id: &str, progress: u8) -> Result<Option<JobRecord>, PipelineError>;
    fn update_status(&self, id: &str, status: RecordStatus, video_path: Option<&Path>) -> Result<Option<JobRecord>, PipelineError>;
    fn record_error(&self, id: &str, message: &str) -> Result<Option<JobRecord>, PipelineError>;
    fn get_job(&self, id: &str) -> Result<Option<JobRecord>, PipelineError>;
    fn list_jobs(&self, status: Option<RecordStatus>, limit: usize) -> Result<Vec<JobRecord>, PipelineError>;
}

pub struct JsonJobStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonJobStore {
    pub fn open(data_dir: &Path) -> Result<Self, PipelineError> {
        fs::create_dir_all(data_dir)?;
        let path = data_dir.join(JOBS_FILE);
        if !path.exists() {
            fs::write(&path, "[]")?;
            info!("[STORE] Created {:?}", path);
        }
        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    fn load(&self) -> Result<Vec<JobRecord>, PipelineError> {
        let raw = fs::read_to_string(&self.path)?;
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&raw).map_err(|e| {
            error!("[STORE] Corrupt {:?}: {}", self.path, e);
            PipelineError::Json(e)
        })
    }

    fn save(&self, jobs: &[JobRecord]) -> Result<(), PipelineError> {
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(jobs)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Apply `edit` to the record with `id` under the write lock.
    fn modify<F>(&self, id: &str, edit: F) -> Result<Option<JobRecord>, PipelineError>
    where
        F: FnOnce(&mut JobRecord),
    {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut jobs = self.load()?;
        let Some(job) = jobs.iter_mut().find(|j| j.id == id) else {
            return Ok(None);
        };
        edit(job);
        let updated = job.clone();
        self.save(&jobs)?;
        Ok(Some(updated))
    }
}

impl JobStore for JsonJobStore {
    fn create_job(&self, kind: &str, estimated_secs: u64, metadata: serde_json::Value) -> Result<JobRecord, PipelineError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut jobs = self.load()?;
        let record = JobRecord {
            id: format!("job_{}", &Uuid::new_v4().simple().to_string()[..8]),
            kind: kind.to_string(),
            status: RecordStatus::Processing,
            progress: 0,
            estimated_time: estimated_secs,
            started_at: Utc::now(),
            completed_at: None,
            video_path: None,
            error: None,
            metadata,
        };
        jobs.push(record.clone());
        self.save(&jobs)?;
        info!("[STORE] Job {} registered", record.id);
        Ok(record)
    }

    fn update_progress(&self, id: &str, progress: u8) -> Result<Option<JobRecord>, PipelineError> {
        self.modify(id, |job| job.progress = progress.min(100))
    }

    fn update_status(&self, id: &str, status: RecordStatus, video_path: Option<&Path>) -> Result<Option<JobRecord>, PipelineError> {
        self.modify(id, |job| {
            job.status = status;
            if let Some(path) = video_path {
                job.video_path = Some(path.to_path_buf());
            }
            if status == RecordStatus::Completed {
                job.completed_at = Some(Utc::now());
                job.progress = 100;
            }
        })
    }

    fn record_error(&self, id: &str, message: &str) -> Result<Option<JobRecord>, PipelineError> {
        self.modify(id, |job| {
            job.status = RecordStatus::Failed;
            job.completed_at = Some(Utc::now());
            if job.error.is_none() {
                job.error = Some(message.to_string());
            }
        })
    }

    fn get_job(&self, id: &str) -> Result<Option<JobRecord>, PipelineError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        Ok(self.load()?.into_iter().find(|j| j.id == id))
    }

    fn list_jobs(&self, status: Option<RecordStatus>, limit: usize) -> Result<Vec<JobRecord>, PipelineError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut jobs: Vec<JobRecord> = self
            .load()?
            .into_iter()
            .filter(|j| status.map_or(true, |s| j.status == s))
            .collect();
        jobs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        jobs.truncate(limit);
        Ok(jobs)
    }
}
