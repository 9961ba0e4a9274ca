// TALKREEL Estimate - Cost & Time Forecast
// Copyright (c) 2026 Xing_The_Creator | TALKREEL
//
// Rough numbers shown before a job is started. Pure: no I/O, no clock.

use serde::Serialize;
use std::time::Duration;

use crate::pipeline::chunker::chunk;

const REWRITE_SECS_PER_BATCH: u64 = 3;
const SPEECH_SECS_PER_CLIP: u64 = 5;
const LIPSYNC_SECS_PER_CLIP: u64 = 120;
const CONCAT_SECS: u64 = 10;

const REWRITE_USD_PER_MILLION_CHARS: f64 = 0.10;
const SPEECH_USD_PER_THOUSAND_CHARS: f64 = 0.30;
const LIPSYNC_USD_PER_CLIP: f64 = 0.20;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostBreakdown {
    pub rewrite: f64,
    pub speech: f64,
    pub video: f64,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobEstimate {
    pub batch_count: usize,
    pub video_count: usize,
    pub char_count: usize,
    pub estimated_time: Duration,
    pub estimated_cost: CostBreakdown,
}

impl JobEstimate {
    pub fn time_display(&self) -> String {
        format_duration(self.estimated_time)
    }
}

pub fn estimate(text: &str, batch_size: usize) -> JobEstimate {
    let batch_count = chunk(text, batch_size).len();
    let video_count = batch_count;
    let char_count = text.chars().count();

    let secs = batch_count as u64 * REWRITE_SECS_PER_BATCH
        + video_count as u64 * (SPEECH_SECS_PER_CLIP + LIPSYNC_SECS_PER_CLIP)
        + CONCAT_SECS;

    let rewrite = char_count as f64 / 1_000_000.0 * REWRITE_USD_PER_MILLION_CHARS;
    let speech = char_count as f64 / 1_000.0 * SPEECH_USD_PER_THOUSAND_CHARS;
    let video = video_count as f64 * LIPSYNC_USD_PER_CLIP;

    JobEstimate {
        batch_count,
        video_count,
        char_count,
        estimated_time: Duration::from_secs(secs),
        estimated_cost: CostBreakdown {
            rewrite,
            speech,
            video,
            total: rewrite + speech + video,
        },
    }
}

/// "45s", "2m 5s", "1h 3m 0s".
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        return format!("{}s", secs);
    }
    let (minutes, secs) = (secs / 60, secs % 60);
    if minutes < 60 {
        return format!("{}m {}s", minutes, secs);
    }
    format!("{}h {}m {}s", minutes / 60, minutes % 60, secs)
}
