// TALKREEL Progress Reporting
// Copyright (c) 2026 Xing_The_Creator | TALKREEL
//
// Sinks receive (message, percent) pairs from many workers at once. The
// reporter is the single serialization point: it clamps to [0, 100], keeps
// the percent monotonic and forwards under one lock. Sinks must return
// quickly and never block the caller.

use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::info;

/// One-way progress callback.
pub trait ProgressSink: Send + Sync {
    fn report(&self, message: &str, percent: u8);
}

impl<F> ProgressSink for F
where
    F: Fn(&str, u8) + Send + Sync,
{
    fn report(&self, message: &str, percent: u8) {
        self(message, percent)
    }
}

/// Writes progress to the log.
pub struct LogSink;

impl ProgressSink for LogSink {
    fn report(&self, message: &str, percent: u8) {
        info!("[PROGRESS] {:>3}% {}", percent, message);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub message: String,
    pub percent: u8,
}

/// Forwards progress over an unbounded channel so a UI task can consume it.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelSink {
    fn report(&self, message: &str, percent: u8) {
        // Receiver gone means nobody is listening any more.
        let _ = self.tx.send(ProgressEvent {
            message: message.to_string(),
            percent,
        });
    }
}

/// Clamping, monotonic front for a sink.
pub struct ProgressReporter {
    sink: Arc<dyn ProgressSink>,
    last: Mutex<u8>,
}

impl ProgressReporter {
    pub fn new(sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            sink,
            last: Mutex::new(0),
        }
    }

    /// Forward a checkpoint and return the percent actually reported.
    pub fn report(&self, message: &str, percent: i32) -> u8 {
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        let clamped = percent.clamp(0, 100) as u8;
        let effective = clamped.max(*last);
        *last = effective;
        self.sink.report(message, effective);
        effective
    }

    pub fn current(&self) -> u8 {
        *self.last.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_is_clamped_and_monotonic() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_sink = seen.clone();
        let reporter = ProgressReporter::new(Arc::new(move |msg: &str, pct: u8| {
            seen_sink.lock().unwrap().push((msg.to_string(), pct));
        }));

        assert_eq!(reporter.report("start", -5), 0);
        assert_eq!(reporter.report("text", 20), 20);
        assert_eq!(reporter.report("late worker", 10), 20);
        assert_eq!(reporter.report("overflow", 250), 100);
        assert_eq!(reporter.current(), 100);

        let pcts: Vec<u8> = seen.lock().unwrap().iter().map(|(_, p)| *p).collect();
        assert_eq!(pcts, vec![0, 20, 20, 100]);
    }

    #[tokio::test]
    async fn test_channel_sink_delivers_in_order() {
        let (sink, mut rx) = ChannelSink::new();
        let reporter = ProgressReporter::new(Arc::new(sink));
        reporter.report("one", 5);
        reporter.report("two", 50);
        drop(reporter);

        assert_eq!(rx.recv().await.unwrap().message, "one");
        let second = rx.recv().await.unwrap();
        assert_eq!((second.message.as_str(), second.percent), ("two", 50));
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn test_concurrent_reports_stay_monotonic() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_sink = seen.clone();
        let reporter = Arc::new(ProgressReporter::new(Arc::new(move |_: &str, pct: u8| {
            seen_sink.lock().unwrap().push(pct);
        })));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let reporter = reporter.clone();
                std::thread::spawn(move || {
                    for step in 0..20 {
                        reporter.report("tick", (i * 7 + step * 3) % 101);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let pcts = seen.lock().unwrap();
        assert_eq!(pcts.len(), 160);
        assert!(pcts.windows(2).all(|w| w[0] <= w[1]));
    }
}
