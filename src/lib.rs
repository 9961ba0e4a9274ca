// TALKREEL Core Library
// Copyright (c) 2026 Xing_The_Creator | TALKREEL
//
// Turns narration text and a pool of portraits into one lip-synced video.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod store;

pub use config::AppConfig;
pub use error::PipelineError;
