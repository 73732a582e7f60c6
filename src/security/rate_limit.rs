//! Per-client token bucket rate limiting.
//!
//! Buckets live in a [`DashMap`] keyed by client IP. The map shard lock is
//! only held to look up or insert the bucket handle; the token arithmetic runs
//! under the bucket's own mutex, so unrelated clients never contend.
//!
//! When the map is full, a new client triggers at most one TTL sweep per
//! [`FULL_SWEEP_INTERVAL`] and then evicts a batch of the least recently used
//! buckets, so the O(n) scan is paid once per batch rather than per client.

use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::config::RateLimitConfig;

/// A simple token bucket rate limiter.
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_update: now,
        }
    }

    fn try_acquire(&mut self, capacity: f64, refill_rate: f64, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_update).as_secs_f64();

        // Refill tokens
        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_update = self.last_update.max(now);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

type SharedBucket = Arc<Mutex<TokenBucket>>;

/// Minimum spacing of TTL sweeps forced by a full map.
pub const FULL_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// A full map evicts `max_buckets / EVICTION_DIVISOR` buckets (at least one).
const EVICTION_DIVISOR: usize = 16;

fn lock(bucket: &SharedBucket) -> MutexGuard<'_, TokenBucket> {
    // The critical section cannot panic; recover the guard regardless.
    bucket.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Per-IP rate limiter shared by every request handler.
#[derive(Debug)]
pub struct RateLimiter {
    buckets: DashMap<IpAddr, SharedBucket>,
    capacity: f64,
    refill_rate: f64,
    idle_ttl: Duration,
    max_buckets: usize,
    last_forced_sweep: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            buckets: DashMap::new(),
            capacity: f64::from(config.capacity),
            refill_rate: config.refill_per_second,
            idle_ttl: Duration::from_secs(config.idle_ttl_secs),
            max_buckets: config.max_buckets,
            last_forced_sweep: Mutex::new(None),
        }
    }

    /// Admit or reject one request from `ip`.
    pub fn check(&self, ip: IpAddr) -> bool {
        self.check_at(ip, Instant::now())
    }

    /// Admit or reject one request from `ip` as of `now`.
    pub fn check_at(&self, ip: IpAddr, now: Instant) -> bool {
        let bucket = self.bucket_for(ip, now);
        let mut bucket = lock(&bucket);
        bucket.try_acquire(self.capacity, self.refill_rate, now)
    }

    fn bucket_for(&self, ip: IpAddr, now: Instant) -> SharedBucket {
        if let Some(existing) = self.buckets.get(&ip) {
            return Arc::clone(existing.value());
        }

        if self.buckets.len() >= self.max_buckets {
            self.make_room(now);
        }

        let entry = self
            .buckets
            .entry(ip)
            .or_insert_with(|| Arc::new(Mutex::new(TokenBucket::new(self.capacity, now))));
        Arc::clone(entry.value())
    }

    /// Evict idle buckets; if the map is still full, evict a batch of the least recently used.
    fn make_room(&self, now: Instant) {
        if self.forced_sweep_due(now) {
            self.sweep_at(now);
            if self.buckets.len() < self.max_buckets {
                return;
            }
        }

        let batch = (self.max_buckets / EVICTION_DIVISOR).max(1);
        let evicted = self.evict_oldest(batch);
        tracing::debug!(evicted, "Evicted least recently used rate limit buckets");
    }

    fn forced_sweep_due(&self, now: Instant) -> bool {
        let mut last = self
            .last_forced_sweep
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let due = last.map_or(true, |at| now.saturating_duration_since(at) >= FULL_SWEEP_INTERVAL);
        if due {
            *last = Some(now);
        }
        due
    }

    fn evict_oldest(&self, count: usize) -> usize {
        let mut ages: Vec<(Instant, IpAddr)> = self
            .buckets
            .iter()
            .map(|entry| (lock(entry.value()).last_update, *entry.key()))
            .collect();

        let count = count.min(ages.len());
        if count == 0 {
            return 0;
        }
        if count < ages.len() {
            ages.select_nth_unstable(count - 1);
        }

        for (_, ip) in &ages[..count] {
            self.buckets.remove(ip);
        }
        count
    }

    /// Reclaim buckets idle for longer than the configured TTL.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    /// Reclaim buckets idle for longer than the configured TTL as of `now`.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let before = self.buckets.len();
        let ttl = self.idle_ttl;
        self.buckets
            .retain(|_, bucket| now.saturating_duration_since(lock(bucket).last_update) < ttl);
        before.saturating_sub(self.buckets.len())
    }

    /// Number of client buckets currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.buckets.len()
    }
}
