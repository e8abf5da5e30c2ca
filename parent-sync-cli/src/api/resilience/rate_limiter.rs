//! Token bucket rate limiter
//!
//! HubSpot private apps are allowed a fixed number of requests per rolling
//! window. Every outgoing request takes one token; tokens refill continuously.

use super::config::RateLimitConfig;
use log::debug;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
    acquired: u64,
    waited: u64,
}

#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    bucket: Arc<Mutex<Bucket>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let bucket = Bucket {
            tokens: config.burst_capacity.max(1) as f64,
            last_refill: Instant::now(),
            acquired: 0,
            waited: 0,
        };

        Self {
            config,
            bucket: Arc::new(Mutex::new(bucket)),
        }
    }

    fn tokens_per_second(&self) -> f64 {
        let window = self.config.window.as_secs_f64();
        if window <= 0.0 {
            return f64::INFINITY;
        }
        self.config.requests_per_window as f64 / window
    }

    fn refill(&self, bucket: &mut Bucket) {
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        let capacity = self.config.burst_capacity.max(1) as f64;
        bucket.tokens = (bucket.tokens + elapsed * self.tokens_per_second()).min(capacity);
        bucket.last_refill = now;
    }

    /// Wait until a request may be sent
    pub async fn acquire(&self) {
        if !self.config.enabled {
            return;
        }

        let mut counted_wait = false;
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                self.refill(&mut bucket);

                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    bucket.acquired += 1;
                    return;
                }

                if !counted_wait {
                    bucket.waited += 1;
                    counted_wait = true;
                }
                let missing = 1.0 - bucket.tokens;
                Duration::from_secs_f64(missing / self.tokens_per_second())
            };

            debug!("Rate limiter: waiting {:?} for a token", wait);
            tokio::time::sleep(wait).await;
        }
    }

    /// Take a token without waiting; `false` when the bucket is empty
    #[cfg(test)]
    pub async fn try_acquire(&self) -> bool {
        if !self.config.enabled {
            return true;
        }

        let mut bucket = self.bucket.lock().await;
        self.refill(&mut bucket);
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            bucket.acquired += 1;
            true
        } else {
            false
        }
    }

    pub async fn stats(&self) -> RateLimiterStats {
        let bucket = self.bucket.lock().await;
        RateLimiterStats {
            requests_acquired: bucket.acquired,
            requests_waited: bucket.waited,
            enabled: self.config.enabled,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RateLimiterStats {
    pub requests_acquired: u64,
    /// Number of acquisitions that had to sleep at least once
    pub requests_waited: u64,
    pub enabled: bool,
}
