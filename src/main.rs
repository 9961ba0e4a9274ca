// TALKREEL Main Entry Point
// Copyright (c) 2026 Xing_The_Creator | TALKREEL

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use talkreel_core::config::{AppConfig, SpeechProviderKind};
use talkreel_core::pipeline::estimate::format_duration;
use talkreel_core::pipeline::health::run_health_check;
use talkreel_core::pipeline::job_manager::JobManager;
use talkreel_core::pipeline::progress::LogSink;
use talkreel_core::pipeline::voice::{build_provider, SpeechSynthesizer, DEFAULT_MODEL_ID};
use talkreel_core::store::{JobStore, JsonJobStore, RecordStatus};

#[derive(Parser)]
#[command(name = "talkreel")]
#[command(about = "TALKREEL lip-sync video pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a lip-synced video from narration text and portraits
    Generate {
        /// Narration text file
        #[arg(short, long)]
        text_file: PathBuf,

        /// Voice name (matched case-insensitively)
        #[arg(short, long)]
        voice: String,

        /// Portrait image (repeat for a pool)
        #[arg(short, long = "image", required = true)]
        images: Vec<PathBuf>,

        /// TTS model identifier
        #[arg(short, long, default_value = DEFAULT_MODEL_ID)]
        model: String,

        /// Concurrent workers per stage
        #[arg(short, long)]
        workers: Option<usize>,

        /// Speech provider override (elevenlabs | minimax)
        #[arg(long)]
        provider: Option<SpeechProviderKind>,

        /// Copy the final video here
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Forecast batches, time and cost for a text
    Estimate {
        #[arg(short, long)]
        text_file: PathBuf,
    },

    /// List voices offered by the speech provider
    Voices {
        #[arg(long)]
        provider: Option<SpeechProviderKind>,
    },

    /// Check API keys and external tools
    Check,

    /// List stored jobs, newest first
    Jobs {
        /// processing | completed | failed
        #[arg(short, long)]
        status: Option<RecordStatus>,

        #[arg(short, long, default_value = "50")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info,reqwest=warn,hyper=warn");
    }
    tracing_subscriber::fmt::init();

    std::panic::set_hook(Box::new(|panic_info| {
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());
        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        eprintln!("[TALKREEL PANIC] at {}: {}", location, message);
    }));

    let cli = Cli::parse();
    let mut config = AppConfig::from_env().context("Invalid configuration")?;

    match cli.command {
        Commands::Generate {
            text_file,
            voice,
            images,
            model,
            workers,
            provider,
            output,
        } => {
            if let Some(p) = provider {
                config.audio_provider = p;
            }
            let text = std::fs::read_to_string(&text_file)
                .with_context(|| format!("Failed to read {:?}", text_file))?;

            info!("--- TALKREEL v{} ---", env!("CARGO_PKG_VERSION"));
            let manager = JobManager::from_config(config).await?;
            let mut job = manager.create(&text, &voice, &images, &model)?;
            info!("[JOB] Job directory: {:?}", job.job_dir);

            match manager.process(&mut job, Arc::new(LogSink), workers).await {
                Ok(final_video) => {
                    let delivered = match output {
                        Some(dest) => {
                            std::fs::copy(&final_video, &dest)
                                .with_context(|| format!("Failed to copy final video to {:?}", dest))?;
                            dest
                        }
                        None => final_video,
                    };
                    println!("{}", delivered.display());
                }
                Err(e) => {
                    error!("Generation failed: {}", e);
                    bail!("Job {} failed: {}", job.id, e);
                }
            }
        }

        Commands::Estimate { text_file } => {
            let text = std::fs::read_to_string(&text_file)
                .with_context(|| format!("Failed to read {:?}", text_file))?;
            let est = talkreel_core::pipeline::estimate::estimate(&text, config.batch_size);
            println!("Batches:         {}", est.batch_count);
            println!("Videos:          {}", est.video_count);
            println!("Characters:      {}", est.char_count);
            println!("Estimated time:  {}", format_duration(est.estimated_time));
            println!("Rewrite cost:    ${:.2}", est.estimated_cost.rewrite);
            println!("Speech cost:     ${:.2}", est.estimated_cost.speech);
            println!("Video cost:      ${:.2}", est.estimated_cost.video);
            println!("Total cost:      ${:.2}", est.estimated_cost.total);
        }

        Commands::Voices { provider } => {
            if let Some(p) = provider {
                config.audio_provider = p;
            }
            let synth = SpeechSynthesizer::new(build_provider(&config)?);
            for voice in synth.voices().await {
                println!(
                    "{:<24} {:<28} {}",
                    voice.voice_id,
                    voice.name,
                    voice.language.as_deref().unwrap_or("-")
                );
            }
        }

        Commands::Check => {
            let report = run_health_check(&config).await;
            println!("{}", report.status_report());
            if !report.is_ok() {
                bail!("Pipeline is not ready");
            }
        }

        Commands::Jobs { status, limit } => {
            let store = JsonJobStore::open(&config.data_dir)?;
            for job in store.list_jobs(status, limit)? {
                let elapsed = job
                    .completed_at
                    .map(|done| {
                        let secs = (done - job.started_at).num_seconds().max(0) as u64;
                        format_duration(std::time::Duration::from_secs(secs))
                    })
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{}  {:<10} {:>3}%  {}  {:>8}  {}",
                    job.id,
                    format!("{:?}", job.status).to_lowercase(),
                    job.progress,
                    job.started_at.format("%Y-%m-%d %H:%M:%S"),
                    elapsed,
                    job.error.as_deref().unwrap_or("")
                );
            }
        }
    }

    Ok(())
}
