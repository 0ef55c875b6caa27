//! Bandwidth limiting.
//!
//! # Responsibilities
//! - Define the `Limiter` interface handed to rate-limited backend factories
//! - Provide a static token-bucket limiter per transfer direction
//!
//! # Design Decisions
//! - A reservation never blocks the caller synchronously; it returns how long
//!   to wait, and the async helpers do the sleeping
//! - Buckets may go into debt so large transfers are admitted immediately and
//!   paid for by the transfers that follow

use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::LimitConfig;

/// Bandwidth limiter shared by every backend of a repository.
pub trait Limiter: Send + Sync + fmt::Debug {
    /// Reserve `bytes` of upload budget and return how long to wait before sending.
    fn reserve_upload(&self, bytes: usize) -> Duration;

    /// Reserve `bytes` of download budget and return how long to wait before reading.
    fn reserve_download(&self, bytes: usize) -> Duration;
}

impl dyn Limiter {
    /// Wait until `bytes` may be uploaded.
    pub async fn upload(&self, bytes: usize) {
        let delay = self.reserve_upload(bytes);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    /// Wait until `bytes` may be downloaded.
    pub async fn download(&self, bytes: usize) {
        let delay = self.reserve_download(bytes);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Limiter that never delays.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unlimited;

impl Limiter for Unlimited {
    fn reserve_upload(&self, _bytes: usize) -> Duration {
        Duration::ZERO
    }

    fn reserve_download(&self, _bytes: usize) -> Duration {
        Duration::ZERO
    }
}

/// A byte-denominated token bucket.
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_update: Instant::now(),
        }
    }

    fn reserve(&mut self, bytes: f64, rate: f64) -> Duration {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();

        // Refill tokens; capacity is one second worth of traffic.
        self.tokens = (self.tokens + elapsed * rate).min(rate);
        self.last_update = now;

        self.tokens -= bytes;
        if self.tokens >= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(-self.tokens / rate)
        }
    }
}

/// Direction-specific bucket; `None` when unlimited.
#[derive(Debug)]
struct Direction {
    rate: f64,
    bucket: Mutex<TokenBucket>,
}

impl Direction {
    fn new(kib_per_sec: u64) -> Option<Self> {
        if kib_per_sec == 0 {
            return None;
        }
        let rate = (kib_per_sec * 1024) as f64;
        Some(Self {
            rate,
            bucket: Mutex::new(TokenBucket::new(rate)),
        })
    }

    fn reserve(&self, bytes: usize) -> Duration {
        let mut bucket = self.bucket.lock().expect("limiter bucket mutex poisoned");
        bucket.reserve(bytes as f64, self.rate)
    }
}

/// Limiter with fixed upload and download rates.
#[derive(Debug)]
pub struct StaticLimiter {
    upload: Option<Direction>,
    download: Option<Direction>,
}

impl StaticLimiter {
    /// Create a limiter from KiB/s limits; zero leaves a direction unlimited.
    pub fn new(config: &LimitConfig) -> Self {
        tracing::debug!(
            upload_kib = config.upload_kib,
            download_kib = config.download_kib,
            "Bandwidth limits configured"
        );
        Self {
            upload: Direction::new(config.upload_kib),
            download: Direction::new(config.download_kib),
        }
    }
}

impl Limiter for StaticLimiter {
    fn reserve_upload(&self, bytes: usize) -> Duration {
        self.upload
            .as_ref()
            .map_or(Duration::ZERO, |direction| direction.reserve(bytes))
    }

    fn reserve_download(&self, bytes: usize) -> Duration {
        self.download
            .as_ref()
            .map_or(Duration::ZERO, |direction| direction.reserve(bytes))
    }
}
