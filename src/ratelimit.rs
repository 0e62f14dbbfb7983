//! Per-source token-bucket rate limiting with a cool-down block.
//!
//! A source that drains its bucket is blocked outright for a fixed window
//! instead of being throttled to the refill rate, which keeps abusive
//! sources cheap to reject. Entries idle for ten block windows are reaped
//! by a periodic sweep so spoofed-source floods cannot grow the table
//! without bound.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last: Instant,
    blocked_until: Option<Instant>,
    last_seen: Instant,
}

/// Token-bucket limiter keyed by source address.
#[derive(Debug)]
pub struct RateLimiter {
    buckets: Mutex<HashMap<IpAddr, Bucket>>,
    qps: f64,
    burst: f64,
    block: Duration,
}

impl RateLimiter {
    /// Create a limiter refilling at `qps` tokens per second up to `burst`,
    /// blocking exhausted sources for `block`.
    pub fn new(qps: f64, burst: f64, block: Duration) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            qps,
            burst,
            block,
        }
    }

    /// Check one datagram from `source`. False means reply REFUSED.
    pub fn check(&self, source: IpAddr) -> bool {
        self.check_at(source, Instant::now())
    }

    fn check_at(&self, source: IpAddr, now: Instant) -> bool {
        let mut buckets = self.buckets.lock();
        let bucket = buckets.entry(source).or_insert_with(|| Bucket {
            tokens: self.burst,
            last: now,
            blocked_until: None,
            last_seen: now,
        });
        bucket.last_seen = now;

        if let Some(until) = bucket.blocked_until {
            if now < until {
                return false;
            }
            bucket.blocked_until = None;
        }

        let elapsed = now.saturating_duration_since(bucket.last).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.qps).min(self.burst);
        bucket.last = now;

        if bucket.tokens < 1.0 {
            bucket.blocked_until = Some(now + self.block);
            crate::metrics::record_rate_limited();
            return false;
        }
        bucket.tokens -= 1.0;
        true
    }

    /// Drop entries idle longer than ten block windows.
    pub fn sweep(&self) {
        self.sweep_at(Instant::now());
    }

    fn sweep_at(&self, now: Instant) {
        let idle_cutoff = self.block * 10;
        let mut buckets = self.buckets.lock();
        buckets.retain(|_, b| now.saturating_duration_since(b.last_seen) <= idle_cutoff);
        crate::metrics::record_ratelimit_entries(buckets.len());
    }

    /// Number of tracked sources.
    pub fn len(&self) -> usize {
        self.buckets.lock().len()
    }

    /// True when no sources are tracked.
    pub fn is_empty(&self) -> bool {
        self.buckets.lock().is_empty()
    }
}
