// TALKREEL Pipeline
// Copyright (c) 2026 Xing_The_Creator | TALKREEL
//
// text -> rewrite -> speech -> lip-sync video -> concatenation.

pub mod chunker;
pub mod estimate;
pub mod health;
pub mod image_picker;
pub mod job;
pub mod job_manager;
pub mod lipsync;
pub mod media_probe;
pub mod progress;
pub mod retry;
pub mod text_rewriter;
pub mod uploader;
pub mod video_stitcher;
pub mod video_synth;
pub mod voice;

use futures::stream::{self, StreamExt};
use std::future::Future;
use std::path::Path;
use tokio::io::AsyncWriteExt;

use crate::error::PipelineError;

/// Run `work` over `items` with at most `max_workers` in flight. Results come
/// back in completion order; callers sort by sequence number.
pub async fn run_bounded<I, T, F, Fut>(items: Vec<I>, max_workers: usize, work: F) -> Vec<T>
where
    F: FnMut(I) -> Fut,
    Fut: Future<Output = T>,
{
    stream::iter(items)
        .map(work)
        .buffer_unordered(max_workers.max(1))
        .collect()
        .await
}

/// Stream a response body to `path`, creating parent directories.
pub async fn stream_to_file(resp: reqwest::Response, path: &Path) -> Result<u64, PipelineError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::File::create(path).await?;
    let mut stream = resp.bytes_stream();
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let data = chunk?;
        file.write_all(&data).await?;
        written += data.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}
