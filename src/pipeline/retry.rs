// TALKREEL Retry Policy
// Copyright (c) 2026 Xing_The_Creator | TALKREEL
//
// Bounded exponential backoff applied explicitly by each remote-call
// wrapper. Only errors whose kind qualifies are retried.

use std::future::Future;
use std::time::Duration;
use tracing::{error, warn};

use crate::error::PipelineError;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// `base * 2^attempt` when set, flat `base` otherwise.
    pub exponential: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            exponential: true,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            exponential: false,
        }
    }

    /// Delay after the given zero-based failed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if self.exponential {
            self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
        } else {
            self.base_delay
        }
    }

    pub fn should_retry(&self, err: &PipelineError) -> bool {
        err.is_transient()
    }

    /// Run `op` until it succeeds, fails with a non-qualifying error, or the
    /// attempt budget is spent.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, PipelineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PipelineError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt + 1 < attempts && self.should_retry(&e) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        "[RETRY] {} attempt {}/{} failed: {}. Waiting {:?}",
                        label,
                        attempt + 1,
                        attempts,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_transient() {
                        error!("[RETRY] {} failed after {} attempts: {}", label, attempts, e);
                    }
                    return Err(e);
                }
            }
        }
    }
}
