// TALKREEL Health Check
// Copyright (c) 2026 Xing_The_Creator | TALKREEL
//
// One-shot report on everything the pipeline needs before it can run:
// API keys, the selected speech provider, and the local media tools.

use std::process::Stdio;
use tokio::process::Command;
use tracing::{info, warn};

use crate::config::{AppConfig, ConfigReport};

#[derive(Debug, Clone, PartialEq)]
pub enum ToolStatus {
    Available(String),
    Missing(String),
}

#[derive(Debug, Clone)]
pub struct HealthReport {
    pub provider: String,
    pub keys: Vec<(&'static str, bool)>,
    pub config: ConfigReport,
    pub tools: Vec<(&'static str, ToolStatus)>,
}

impl HealthReport {
    pub fn is_ok(&self) -> bool {
        self.config.is_ok()
            && self
                .tools
                .iter()
                .all(|(_, status)| matches!(status, ToolStatus::Available(_)))
    }

    pub fn status_report(&self) -> String {
        let mut lines = vec!["TALKREEL Health Report".to_string()];
        lines.push(format!("  Speech provider: {}", self.provider));
        for (key, present) in &self.keys {
            lines.push(format!("  {:<20} {}", key, if *present { "set" } else { "missing" }));
        }
        for (tool, status) in &self.tools {
            match status {
                ToolStatus::Available(version) => lines.push(format!("  {:<20} {}", tool, version)),
                ToolStatus::Missing(reason) => lines.push(format!("  {:<20} MISSING ({})", tool, reason)),
            }
        }
        for e in &self.config.errors {
            lines.push(format!("  error: {}", e));
        }
        for w in &self.config.warnings {
            lines.push(format!("  warning: {}", w));
        }
        lines.push(format!("  Status: {}", if self.is_ok() { "READY" } else { "NOT READY" }));
        lines.join("\n")
    }
}

/// Run `<tool> -version` and return its first output line.
pub async fn check_tool(tool: &str) -> ToolStatus {
    match Command::new(tool).arg("-version").stderr(Stdio::null()).output().await {
        Ok(out) if out.status.success() => {
            let first = String::from_utf8_lossy(&out.stdout)
                .lines()
                .next()
                .unwrap_or("")
                .trim()
                .to_string();
            ToolStatus::Available(first)
        }
        Ok(out) => ToolStatus::Missing(format!("exit status {}", out.status)),
        Err(e) => ToolStatus::Missing(e.to_string()),
    }
}

pub async fn run_health_check(config: &AppConfig) -> HealthReport {
    let keys = vec![
        ("ELEVENLABS_API_KEY", config.elevenlabs_api_key.is_some()),
        ("MINIMAX_API_KEY", config.minimax_api_key.is_some()),
        ("GEMINI_API_KEY", config.gemini_api_key.is_some()),
        ("WAVESPEED_API_KEY", config.wavespeed_api_key.is_some()),
    ];
    let tools = vec![
        ("ffmpeg", check_tool("ffmpeg").await),
        ("ffprobe", check_tool("ffprobe").await),
    ];

    let report = HealthReport {
        provider: config.audio_provider.to_string(),
        keys,
        config: config.validate(),
        tools,
    };
    if report.is_ok() {
        info!("[HEALTH] All dependencies present");
    } else {
        warn!("[HEALTH] ⚠️ Pipeline not ready");
    }
    report
}
