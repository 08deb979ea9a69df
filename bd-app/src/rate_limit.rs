//! Sliding-window rate limiter.
//!
//! Two independent windows gate every inbound invocation: one keyed by
//! user, one by organization; either rejecting blocks the request.
//! Single-process and lifecycle-scoped: construct at startup, share via
//! `Arc`. A multi-instance deployment must substitute a shared store.

use bd_core::clock::Clock;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// How often the background sweep of empty keys may actually run.
const SWEEP_INTERVAL_SECONDS: i64 = 60;

#[derive(Debug, Copy, Clone)]
pub struct RateLimitConfig {
    pub max_requests: usize,
    pub window_seconds: i64,
}

#[derive(Debug, Copy, Clone)]
pub struct RateDecision {
    pub allowed: bool,
    pub retry_after_seconds: u64,
}

impl RateDecision {
    fn allowed() -> Self {
        Self {
            allowed: true,
            retry_after_seconds: 0,
        }
    }
}

pub struct RateLimiter {
    entries: DashMap<String, Vec<DateTime<Utc>>>,
    clock: Arc<dyn Clock>,
    last_sweep_epoch: AtomicI64,
}

impl RateLimiter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            last_sweep_epoch: AtomicI64::new(0),
        }
    }

    /// Prunes the key's window, admits and records, or computes when the
    /// oldest timestamp will age out.
    pub fn check(&self, key: &str, config: RateLimitConfig) -> RateDecision {
        let now = self.clock.now();
        self.maybe_sweep(now, config.window_seconds);

        let window = Duration::seconds(config.window_seconds);
        let mut entry = self.entries.entry(key.to_string()).or_default();
        entry.retain(|ts| now - *ts < window);

        if entry.len() < config.max_requests {
            entry.push(now);
            return RateDecision::allowed();
        }

        let oldest = entry.first().copied().unwrap_or(now);
        let retry_at = oldest + window;
        let retry_after_seconds = (retry_at - now).num_seconds().max(1) as u64;
        RateDecision {
            allowed: false,
            retry_after_seconds,
        }
    }

    /// Applies the user window then the org window; the first rejection
    /// wins.
    pub fn check_pair(
        &self,
        user_key: &str,
        user_config: RateLimitConfig,
        org_key: &str,
        org_config: RateLimitConfig,
    ) -> RateDecision {
        let user = self.check(user_key, user_config);
        if !user.allowed {
            return user;
        }
        self.check(org_key, org_config)
    }

    pub fn tracked_keys(&self) -> usize {
        self.entries.len()
    }

    /// Drops keys whose windows have fully drained so memory does not
    /// grow with key cardinality. Throttled; also callable directly.
    pub fn sweep(&self, window_seconds: i64) {
        let now = self.clock.now();
        let window = Duration::seconds(window_seconds);
        self.entries.retain(|_, stamps| {
            stamps.retain(|ts| now - *ts < window);
            !stamps.is_empty()
        });
    }

    fn maybe_sweep(&self, now: DateTime<Utc>, window_seconds: i64) {
        let now_epoch = now.timestamp();
        let last = self.last_sweep_epoch.load(Ordering::Relaxed);
        if now_epoch - last < SWEEP_INTERVAL_SECONDS {
            return;
        }
        if self
            .last_sweep_epoch
            .compare_exchange(last, now_epoch, Ordering::Relaxed, Ordering::Relaxed)
            .is_err()
        {
            return;
        }
        self.sweep(window_seconds);
    }
}
