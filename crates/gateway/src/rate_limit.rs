//! Per-actor request throttling.
//!
//! A fixed-window counter per session address, held in process memory and
//! passed into the engine as an explicit handle so tests can inject a fresh
//! instance per case. Fixed windows are deliberate: the cap is a coarse abuse
//! brake, not a fairness mechanism, and the simpler algorithm keeps the
//! check-and-increment atomic under one lock.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use alloy_primitives::Address;

use crate::error::DenyReason;

/// Window parameters for the limiter.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub window: Duration,
    pub max_requests: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            max_requests: 50,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    count: u32,
    window_reset: Instant,
}

/// Fixed-window in-memory rate limiter keyed by session address.
#[derive(Debug)]
pub struct FixedWindowRateLimit {
    config: RateLimitConfig,
    buckets: Mutex<HashMap<Address, Bucket>>,
}

impl FixedWindowRateLimit {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Counts one request for `address`. Exceeding the cap is terminal for
    /// that request; nothing is queued.
    pub fn try_acquire(&self, address: Address) -> Result<(), DenyReason> {
        self.try_acquire_at(address, Instant::now())
    }

    fn try_acquire_at(&self, address: Address, now: Instant) -> Result<(), DenyReason> {
        let mut buckets = self.buckets.lock().unwrap();

        // New addresses pay for eviction: the map only holds buckets whose
        // window is still open.
        if !buckets.contains_key(&address) {
            buckets.retain(|_, bucket| now < bucket.window_reset);
        }

        let bucket = buckets.entry(address).or_insert(Bucket {
            count: 0,
            window_reset: now + self.config.window,
        });

        if now >= bucket.window_reset {
            bucket.count = 0;
            bucket.window_reset = now + self.config.window;
        }

        if bucket.count >= self.config.max_requests {
            return Err(DenyReason::RateLimited);
        }

        bucket.count += 1;
        Ok(())
    }
}
