//! Retry backoff and politeness delays
//!
//! Sleeping goes through the [`Sleeper`] trait so tests can observe the
//! requested delays without waiting for them.

use crate::config::FetchConfig;
use async_trait::async_trait;
use rand::Rng;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Exponential backoff between fetch attempts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub base: Duration,
    pub max: Duration,
    /// When set, each delay is drawn uniformly from `[d/2, d]`
    pub jitter: bool,
}

impl BackoffPolicy {
    pub fn from_config(config: &FetchConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base: Duration::from_millis(config.backoff_base_ms),
            max: Duration::from_millis(config.backoff_max_ms),
            jitter: config.jitter,
        }
    }

    /// Delay before retrying after the given failed attempt (0-based)
    ///
    /// `base * 2^attempt`, capped at `max`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        let delay = self.base.saturating_mul(factor).min(self.max);

        if !self.jitter || delay.is_zero() {
            return delay;
        }

        let millis = delay.as_millis() as u64;
        let low = millis / 2;
        Duration::from_millis(rand::thread_rng().gen_range(low..=millis))
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&FetchConfig::default())
    }
}

/// Randomized politeness delay applied before every request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    pub min: Duration,
    pub max: Duration,
}

impl DelayRange {
    pub fn from_config(config: &FetchConfig) -> Self {
        let min = Duration::from_millis(config.min_delay_ms);
        let max = Duration::from_millis(config.max_delay_ms).max(min);
        Self { min, max }
    }

    pub fn sample(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

/// Something that can wait
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

/// Records requested delays and returns immediately
#[derive(Debug, Clone, Default)]
pub struct RecordingSleeper {
    delays: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every delay requested so far, in order
    pub fn delays(&self) -> Vec<Duration> {
        self.delays
            .lock()
            .map(|delays| delays.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        if let Ok(mut delays) = self.delays.lock() {
            delays.push(duration);
        }
    }
}
