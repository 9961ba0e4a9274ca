// TALKREEL Media Probe
// Copyright (c) 2026 Xing_The_Creator | TALKREEL

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use tokio::process::Command;

use crate::error::PipelineError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub duration: f64,
    pub size: u64,
    pub format: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<f64>,
    pub codec: Option<String>,
}

/// Run ffprobe on `path`.
pub async fn probe_media(path: &Path) -> Result<MediaInfo, PipelineError> {
    let out = Command::new("ffprobe")
        .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
        .arg(path)
        .output()
        .await
        .map_err(|e| PipelineError::Tool(format!("ffprobe not available: {}", e)))?;

    if !out.status.success() {
        return Err(PipelineError::Tool(format!(
            "ffprobe failed on {:?}: {}",
            path,
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }
    let json: Value = serde_json::from_slice(&out.stdout)?;
    Ok(parse_probe_output(&json))
}

/// ffprobe reports most numbers as strings.
pub fn parse_probe_output(json: &Value) -> MediaInfo {
    let format = &json["format"];
    let number = |v: &Value| -> Option<f64> {
        v.as_f64().or_else(|| v.as_str().and_then(|s| s.parse().ok()))
    };

    let mut info = MediaInfo {
        duration: number(&format["duration"]).unwrap_or(0.0),
        size: number(&format["size"]).map(|s| s as u64).unwrap_or(0),
        format: format["format_name"].as_str().unwrap_or("unknown").to_string(),
        ..MediaInfo::default()
    };

    let video = json["streams"]
        .as_array()
        .and_then(|streams| streams.iter().find(|s| s["codec_type"] == "video"));
    if let Some(stream) = video {
        info.width = stream["width"].as_u64().map(|w| w as u32);
        info.height = stream["height"].as_u64().map(|h| h as u32);
        info.fps = stream["r_frame_rate"].as_str().and_then(parse_frame_rate);
        info.codec = stream["codec_name"].as_str().map(str::to_string);
    }
    info
}

/// "30000/1001" -> 29.97
fn parse_frame_rate(rate: &str) -> Option<f64> {
    match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            (den != 0.0).then(|| num / den)
        }
        None => rate.trim().parse().ok(),
    }
}
