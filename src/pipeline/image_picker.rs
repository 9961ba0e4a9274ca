// TALKREEL Image Picker
// Copyright (c) 2026 Xing_The_Creator | TALKREEL
//
// Random portrait selection that never shows the same face twice in a row.
// The last pick is shared by every video worker.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

use crate::error::PipelineError;

pub struct ImagePicker {
    pool: Vec<PathBuf>,
    state: Mutex<PickState>,
}

struct PickState {
    last: Option<usize>,
    rng: StdRng,
}

impl ImagePicker {
    pub fn new(pool: Vec<PathBuf>) -> Result<Self, PipelineError> {
        Self::build(pool, StdRng::from_entropy())
    }

    /// Deterministic picker for tests and reproducible runs.
    pub fn with_seed(pool: Vec<PathBuf>, seed: u64) -> Result<Self, PipelineError> {
        Self::build(pool, StdRng::seed_from_u64(seed))
    }

    fn build(pool: Vec<PathBuf>, rng: StdRng) -> Result<Self, PipelineError> {
        if pool.is_empty() {
            return Err(PipelineError::Validation("Image pool is empty".into()));
        }
        Ok(Self {
            pool,
            state: Mutex::new(PickState { last: None, rng }),
        })
    }

    pub fn len(&self) -> usize {
        self.pool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    /// Pick the next image. With two or more images the previous pick is
    /// excluded.
    pub fn pick(&self) -> PathBuf {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let idx = if self.pool.len() == 1 {
            0
        } else {
            // Draw from n-1 slots and skip over the last pick.
            let candidates = match state.last {
                Some(_) => self.pool.len() - 1,
                None => self.pool.len(),
            };
            let mut idx = state.rng.gen_range(0..candidates);
            if let Some(last) = state.last {
                if idx >= last {
                    idx += 1;
                }
            }
            idx
        };
        state.last = Some(idx);
        debug!("[VIDEO] Picked image {}", idx + 1);
        self.pool[idx].clone()
    }
}

/// Copy the pool into `<images_dir>/image_<i>.<ext>` so the job directory is
/// self-contained. Existing copies are kept.
pub async fn stage_images(images: &[PathBuf], images_dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    tokio::fs::create_dir_all(images_dir).await?;
    let mut staged = Vec::with_capacity(images.len());
    for (i, src) in images.iter().enumerate() {
        let ext = src
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_else(|| "png".to_string());
        let dest = images_dir.join(format!("image_{}.{}", i + 1, ext));
        if !dest.exists() {
            tokio::fs::copy(src, &dest).await?;
        }
        staged.push(dest);
    }
    info!("[VIDEO] Staged {} images in {:?}", staged.len(), images_dir);
    Ok(staged)
}
