// TALKREEL Pipeline Flow Tests
// Copyright (c) 2026 Xing_The_Creator | TALKREEL
//
// Drives the whole orchestrator against in-process stand-ins for every
// remote service.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use talkreel_core::config::{AppConfig, PollSettings, RewriteFailurePolicy};
use talkreel_core::error::PipelineError;
use talkreel_core::pipeline::job::{JobSnapshot, JobStage};
use talkreel_core::pipeline::job_manager::{JobManager, PipelineServices};
use talkreel_core::pipeline::lipsync::{LipSyncApi, LipSyncRunner, PollStatus};
use talkreel_core::pipeline::progress::ChannelSink;
use talkreel_core::pipeline::retry::RetryPolicy;
use talkreel_core::pipeline::text_rewriter::TextRewriter;
use talkreel_core::pipeline::uploader::{UploadBackend, UploadChain, UrlProbe};
use talkreel_core::pipeline::video_stitcher::ClipJoiner;
use talkreel_core::pipeline::video_synth::{Downloader, VideoSynthesizer};
use talkreel_core::pipeline::voice::{SpeechProvider, SpeechSynthesizer, Voice};
use talkreel_core::store::{JobStore, JsonJobStore, RecordStatus};

const SAMPLE: &str = "Hello world.\n\nSecond line.\n\nThird line.";

struct PrefixRewriter;

#[async_trait]
impl TextRewriter for PrefixRewriter {
    async fn rewrite(&self, batch_text: &str, _n: usize) -> Result<String, PipelineError> {
        Ok(format!("Narrated: {}", batch_text))
    }
}

/// Fails batch 2 and narrates the rest.
struct FlakyRewriter;

#[async_trait]
impl TextRewriter for FlakyRewriter {
    async fn rewrite(&self, batch_text: &str, n: usize) -> Result<String, PipelineError> {
        if n == 2 {
            return Err(PipelineError::Provider("HTTP 400: prompt blocked".into()));
        }
        Ok(format!("Narrated: {}", batch_text))
    }
}

struct StubSpeech {
    fail_containing: Option<&'static str>,
    calls: AtomicU32,
}

impl StubSpeech {
    fn new(fail_containing: Option<&'static str>) -> Self {
        Self {
            fail_containing,
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl SpeechProvider for StubSpeech {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn list_voices(&self) -> Result<Vec<Voice>, PipelineError> {
        Ok(vec![Voice::new("v-1", "Rachel", Some("en"))])
    }

    async fn synthesize(&self, text: &str, voice_id: &str, _model: &str, output: &Path) -> Result<(), PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // Longer text finishes first, so completion order is scrambled.
        tokio::time::sleep(Duration::from_millis(2000 / text.len().max(1) as u64)).await;
        if let Some(needle) = self.fail_containing {
            if text.contains(needle) {
                return Err(PipelineError::Provider("HTTP 422: text rejected".into()));
            }
        }
        tokio::fs::write(output, format!("{}|{}", voice_id, text)).await?;
        Ok(())
    }
}

struct NameUpload;

#[async_trait]
impl UploadBackend for NameUpload {
    fn name(&self) -> &str {
        "stub-host"
    }

    async fn upload(&self, path: &Path) -> Result<String, PipelineError> {
        Ok(format!("https://stub.test/{}", path.file_name().unwrap().to_string_lossy()))
    }
}

struct AlwaysOk;

#[async_trait]
impl UrlProbe for AlwaysOk {
    async fn probe(&self, _url: &str) -> Result<u16, PipelineError> {
        Ok(200)
    }
}

/// The task id is the uploaded audio URL. Lower sequence numbers take longer.
struct StubLipSync {
    fail_audio: Option<(&'static str, &'static str)>,
    submits: AtomicU32,
}

fn sequence_of(url: &str) -> u64 {
    url.trim_end_matches(".mp3")
        .rsplit('_')
        .next()
        .and_then(|n| n.parse().ok())
        .unwrap_or(1)
}

#[async_trait]
impl LipSyncApi for StubLipSync {
    async fn submit(&self, audio_url: &str, _image_url: &str, resolution: &str) -> Result<String, PipelineError> {
        assert_eq!(resolution, "480p");
        self.submits.fetch_add(1, Ordering::SeqCst);
        Ok(audio_url.to_string())
    }

    async fn poll(&self, task_id: &str) -> Result<PollStatus, PipelineError> {
        tokio::time::sleep(Duration::from_secs(20 / sequence_of(task_id))).await;
        if let Some((audio, message)) = self.fail_audio {
            if task_id.ends_with(audio) {
                return Ok(PollStatus::Failed { error: message.to_string() });
            }
        }
        Ok(PollStatus::Completed {
            outputs: vec![format!("{}.mp4", task_id)],
        })
    }
}

struct StubDownloader;

#[async_trait]
impl Downloader for StubDownloader {
    async fn download(&self, url: &str, dest: &Path) -> Result<(), PipelineError> {
        tokio::fs::write(dest, format!("clip<{}>", url)).await?;
        Ok(())
    }
}

/// Writes the clip contents one per line, in the order received.
struct LineJoiner {
    calls: Mutex<Vec<Vec<PathBuf>>>,
    transitions: Mutex<Vec<bool>>,
}

#[async_trait]
impl ClipJoiner for LineJoiner {
    async fn concatenate(&self, clips: &[PathBuf], output: &Path, with_transitions: bool) -> Result<PathBuf, PipelineError> {
        self.calls.lock().unwrap().push(clips.to_vec());
        self.transitions.lock().unwrap().push(with_transitions);
        let mut joined = Vec::new();
        for clip in clips {
            joined.push(tokio::fs::read_to_string(clip).await?);
        }
        tokio::fs::write(output, joined.join("\n")).await?;
        Ok(output.to_path_buf())
    }
}

struct Harness {
    _tmp: tempfile::TempDir,
    manager: JobManager,
    store: Arc<JsonJobStore>,
    lipsync: Arc<StubLipSync>,
    speech: Arc<StubSpeech>,
    joiner: Arc<LineJoiner>,
    image: PathBuf,
}

fn harness(batch_size: usize, speech: StubSpeech, fail_audio: Option<(&'static str, &'static str)>) -> Harness {
    harness_with(batch_size, speech, fail_audio, Arc::new(PrefixRewriter), RewriteFailurePolicy::Abort)
}

fn harness_with(
    batch_size: usize,
    speech: StubSpeech,
    fail_audio: Option<(&'static str, &'static str)>,
    rewriter: Arc<dyn TextRewriter>,
    rewrite_failure_policy: RewriteFailurePolicy,
) -> Harness {
    let tmp = tempfile::tempdir().unwrap();
    let image = tmp.path().join("portrait.png");
    std::fs::write(&image, b"png bytes").unwrap();

    let config = AppConfig {
        temp_folder: tmp.path().join("temp"),
        data_dir: tmp.path().join("data"),
        batch_size,
        rewrite_failure_policy,
        poll: PollSettings {
            warmup: Duration::from_secs(15),
            interval: Duration::from_secs(10),
            ..PollSettings::default()
        },
        ..AppConfig::default()
    };

    let store = Arc::new(JsonJobStore::open(&config.data_dir).unwrap());
    let lipsync = Arc::new(StubLipSync {
        fail_audio,
        submits: AtomicU32::new(0),
    });
    let joiner = Arc::new(LineJoiner {
        calls: Mutex::new(Vec::new()),
        transitions: Mutex::new(Vec::new()),
    });
    let speech = Arc::new(speech);

    let video = VideoSynthesizer::new(
        UploadChain::new(vec![Arc::new(NameUpload)], Arc::new(AlwaysOk)),
        LipSyncRunner::new(lipsync.clone(), config.poll.clone()).with_retry(RetryPolicy::none()),
        Box::new(StubDownloader),
        &config.default_resolution,
    );
    let services = PipelineServices {
        rewriter,
        speech: Arc::new(SpeechSynthesizer::new(speech.clone()).with_retry(RetryPolicy::none())),
        video: Arc::new(video),
        joiner: joiner.clone(),
        store: Some(store.clone()),
    };

    Harness {
        manager: JobManager::new(config, services),
        store,
        lipsync,
        speech,
        joiner,
        image,
        _tmp: tmp,
    }
}

#[tokio::test(start_paused = true)]
async fn test_sample_text_end_to_end() {
    let h = harness(2, StubSpeech::new(None), None);
    let mut job = h
        .manager
        .create(SAMPLE, "rachel", &[h.image.clone()], "eleven_multilingual_v2")
        .unwrap();
    let (sink, mut rx) = ChannelSink::new();

    let final_video = h.manager.process(&mut job, Arc::new(sink), None).await.unwrap();

    assert_eq!(job.stage, JobStage::Completed);
    assert_eq!(job.batches.len(), 2);
    assert_eq!(job.audios.len(), 2);
    assert_eq!(job.videos.len(), 2);
    assert_eq!(final_video, job.job_dir.join("final_video.mp4"));

    let segments: Vec<String> = std::fs::read_to_string(&final_video)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect();
    assert_eq!(
        segments,
        vec![
            "clip<https://stub.test/audio_1.mp3.mp4>",
            "clip<https://stub.test/audio_2.mp3.mp4>",
        ]
    );
    assert_eq!(h.joiner.calls.lock().unwrap().len(), 1);
    assert_eq!(*h.joiner.transitions.lock().unwrap(), vec![false], "clips are joined back to back");

    let rewritten = std::fs::read_to_string(job.job_dir.join("formatted_text/batch_1.txt")).unwrap();
    assert_eq!(rewritten, "Narrated: Hello world.\n\nSecond line.");
    let audio = std::fs::read_to_string(job.job_dir.join("audios/audio_2.mp3")).unwrap();
    assert_eq!(audio, "v-1|Narrated: Third line.");
    assert!(job.job_dir.join("images/image_1.png").exists());

    let mut percents = Vec::new();
    while let Ok(event) = rx.try_recv() {
        percents.push(event.percent);
    }
    assert!(percents.windows(2).all(|w| w[0] <= w[1]), "{:?}", percents);
    assert_eq!(percents.first(), Some(&5));
    assert_eq!(percents.last(), Some(&100));

    let snapshot = JobSnapshot::load(&job.job_dir).unwrap();
    assert_eq!(snapshot.stage, JobStage::Completed);
    assert_eq!(snapshot.progress_percent, 100);
    assert_eq!(snapshot.final_video, Some(final_video.clone()));

    let record = h.store.get_job(job.store_id.as_deref().unwrap()).unwrap().unwrap();
    assert_eq!(record.status, RecordStatus::Completed);
    assert_eq!(record.video_path, Some(final_video));
}

#[tokio::test(start_paused = true)]
async fn test_remote_failure_fails_job_with_count() {
    let h = harness(2, StubSpeech::new(None), Some(("audio_2.mp3", "X")));
    let mut job = h.manager.create(SAMPLE, "Rachel", &[h.image.clone()], "m").unwrap();
    let (sink, _rx) = ChannelSink::new();

    let err = h.manager.process(&mut job, Arc::new(sink), None).await.unwrap_err();

    assert_eq!(err.to_string(), "1 of 2 videos failed to generate (first error: X)");
    assert_eq!(job.stage, JobStage::Failed);
    assert_eq!(job.error.as_deref(), Some("1 of 2 videos failed to generate (first error: X)"));
    assert_eq!(job.videos[1].error.as_deref(), Some("X"));
    assert!(job.videos[0].is_ok());
    assert!(job.job_dir.join("videos/video_1.mp4").exists(), "partial artifacts stay on disk");
    assert!(h.joiner.calls.lock().unwrap().is_empty());

    let record = h.store.get_job(job.store_id.as_deref().unwrap()).unwrap().unwrap();
    assert_eq!(record.status, RecordStatus::Failed);
    assert_eq!(JobSnapshot::load(&job.job_dir).unwrap().stage, JobStage::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_audio_failure_stops_before_video() {
    let h = harness(1, StubSpeech::new(Some("Second")), None);
    let mut job = h.manager.create(SAMPLE, "Rachel", &[h.image.clone()], "m").unwrap();
    let (sink, _rx) = ChannelSink::new();

    let err = h.manager.process(&mut job, Arc::new(sink), None).await.unwrap_err();

    assert_eq!(
        err.to_string(),
        "1 of 3 audios failed to generate (first error: Provider error: HTTP 422: text rejected)"
    );
    let numbers: Vec<usize> = job.audios.iter().map(|a| a.sequence_number).collect();
    assert_eq!(numbers, vec![1, 2, 3]);
    assert!(job.audios[1].error.is_some());
    assert_eq!(h.lipsync.submits.load(Ordering::SeqCst), 0);
    assert!(job.videos.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_scrambled_completion_keeps_batch_order() {
    let text = (1..=7)
        .map(|i| format!("Paragraph {} {}", i, "words ".repeat(8 - i)))
        .collect::<Vec<_>>()
        .join("\n");
    let h = harness(1, StubSpeech::new(None), None);
    let mut job = h.manager.create(&text, "Rachel", &[h.image.clone()], "m").unwrap();
    let (sink, _rx) = ChannelSink::new();

    let final_video = h.manager.process(&mut job, Arc::new(sink), Some(3)).await.unwrap();

    let clip_names: Vec<String> = h.joiner.calls.lock().unwrap()[0]
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
        .collect();
    let expected: Vec<String> = (1..=7).map(|n| format!("video_{}.mp4", n)).collect();
    assert_eq!(clip_names, expected);

    let lines = std::fs::read_to_string(final_video).unwrap();
    for (i, line) in lines.lines().enumerate() {
        assert!(line.contains(&format!("audio_{}.mp3", i + 1)), "{}", line);
    }
    assert_eq!(h.lipsync.submits.load(Ordering::SeqCst), 7);
}

#[tokio::test]
async fn test_invalid_inputs_create_no_job() {
    let h = harness(2, StubSpeech::new(None), None);

    let short = h.manager.create("too short", "Rachel", &[h.image.clone()], "m");
    assert!(matches!(short, Err(PipelineError::Validation(_))));

    let no_images = h.manager.create(SAMPLE, "Rachel", &[], "m");
    assert!(matches!(no_images, Err(PipelineError::Validation(_))));

    let temp = h.manager.config().temp_folder.clone();
    let created = std::fs::read_dir(&temp).map(|d| d.count()).unwrap_or(0);
    assert_eq!(created, 0);
}

#[test]
fn test_estimate_matches_sample() {
    let h = harness(2, StubSpeech::new(None), None);
    let est = h.manager.estimate(SAMPLE);
    assert_eq!((est.batch_count, est.video_count, est.char_count), (2, 2, 39));
    assert_eq!(est, h.manager.estimate(SAMPLE));
}

#[tokio::test(start_paused = true)]
async fn test_rewrite_failure_aborts_before_speech() {
    let h = harness_with(2, StubSpeech::new(None), None, Arc::new(FlakyRewriter), RewriteFailurePolicy::Abort);
    let mut job = h.manager.create(SAMPLE, "Rachel", &[h.image.clone()], "m").unwrap();
    let (sink, _rx) = ChannelSink::new();

    let err = h.manager.process(&mut job, Arc::new(sink), None).await.unwrap_err();

    assert_eq!(err.to_string(), "Provider error: HTTP 400: prompt blocked");
    assert_eq!(job.stage, JobStage::Failed);
    assert!(job.audios.is_empty());
    assert_eq!(h.speech.calls.load(Ordering::SeqCst), 0);
    assert!(job.job_dir.join("formatted_text/batch_1.txt").exists());
    assert!(!job.job_dir.join("formatted_text/batch_2.txt").exists());

    let record = h.store.get_job(job.store_id.as_deref().unwrap()).unwrap().unwrap();
    assert_eq!(record.status, RecordStatus::Failed);
    assert_eq!(record.error.as_deref(), Some("Provider error: HTTP 400: prompt blocked"));
}

#[tokio::test(start_paused = true)]
async fn test_rewrite_failure_narrates_original_text() {
    let h = harness_with(
        2,
        StubSpeech::new(None),
        None,
        Arc::new(FlakyRewriter),
        RewriteFailurePolicy::UseOriginal,
    );
    let mut job = h.manager.create(SAMPLE, "Rachel", &[h.image.clone()], "m").unwrap();
    let (sink, _rx) = ChannelSink::new();

    h.manager.process(&mut job, Arc::new(sink), None).await.unwrap();

    assert_eq!(job.stage, JobStage::Completed);
    let first = std::fs::read_to_string(job.job_dir.join("audios/audio_1.mp3")).unwrap();
    let second = std::fs::read_to_string(job.job_dir.join("audios/audio_2.mp3")).unwrap();
    assert_eq!(first, "v-1|Narrated: Hello world.\n\nSecond line.");
    assert_eq!(second, "v-1|Third line.");
    assert_eq!(h.speech.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_reprocessing_a_finished_job_changes_nothing() {
    let h = harness(2, StubSpeech::new(None), None);
    let mut job = h.manager.create(SAMPLE, "Rachel", &[h.image.clone()], "m").unwrap();
    let (sink, _rx) = ChannelSink::new();
    let sink = Arc::new(sink);

    let final_video = h.manager.process(&mut job, sink.clone(), None).await.unwrap();
    let again = h.manager.process(&mut job, sink, None).await.unwrap();

    assert_eq!(again, final_video);
    assert_eq!(job.stage, JobStage::Completed);
    assert!(job.error.is_none());
    assert_eq!(h.joiner.calls.lock().unwrap().len(), 1);
    assert_eq!(h.speech.calls.load(Ordering::SeqCst), 2);

    let record = h.store.get_job(job.store_id.as_deref().unwrap()).unwrap().unwrap();
    assert_eq!(record.status, RecordStatus::Completed);
    assert!(record.error.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_reprocessing_a_failed_job_keeps_its_error() {
    let h = harness(2, StubSpeech::new(None), Some(("audio_2.mp3", "X")));
    let mut job = h.manager.create(SAMPLE, "Rachel", &[h.image.clone()], "m").unwrap();
    let (sink, _rx) = ChannelSink::new();
    let sink = Arc::new(sink);

    h.manager.process(&mut job, sink.clone(), None).await.unwrap_err();
    let submits = h.lipsync.submits.load(Ordering::SeqCst);
    let err = h.manager.process(&mut job, sink, None).await.unwrap_err();

    assert!(matches!(err, PipelineError::Validation(_)));
    assert!(err.to_string().contains("already failed"), "{}", err);
    assert_eq!(h.lipsync.submits.load(Ordering::SeqCst), submits);
    assert_eq!(job.error.as_deref(), Some("1 of 2 videos failed to generate (first error: X)"));
}
