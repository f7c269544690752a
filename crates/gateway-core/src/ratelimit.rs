//! Token-bucket rate limiter keyed by client IP (spec.md §4.6/§3).

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

#[derive(Debug, Clone)]
struct Bucket {
    tokens: f64,
    last_check: Instant,
}

pub struct RateLimiter {
    buckets: Mutex<HashMap<IpAddr, Bucket>>,
    rate: f64,
    max_buckets: usize,
    stale_after: Duration,
}

impl RateLimiter {
    pub fn new(rate: f64, max_buckets: usize, stale_after: Duration) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            rate,
            max_buckets,
            stale_after,
        }
    }

    /// Refills tokens proportionally to elapsed time (capped at `rate`),
    /// deducts one, and reports whether the request is admitted. Evicts
    /// the least-recently-used bucket when the map would exceed
    /// `max_buckets` and the caller's own IP isn't already tracked.
    pub async fn allow(&self, ip: IpAddr) -> bool {
        let now = Instant::now();
        let mut buckets = self.buckets.lock().await;

        if !buckets.contains_key(&ip) && buckets.len() >= self.max_buckets {
            if let Some(oldest_ip) = buckets
                .iter()
                .min_by_key(|(_, b)| b.last_check)
                .map(|(ip, _)| *ip)
            {
                buckets.remove(&oldest_ip);
            }
        }

        let bucket = buckets.entry(ip).or_insert(Bucket {
            tokens: self.rate,
            last_check: now,
        });

        let elapsed = now.duration_since(bucket.last_check).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate).min(self.rate);
        bucket.last_check = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Drops buckets idle longer than `stale_after`. Intended to run on an
    /// internal timer alongside the shadow store's sweeper.
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut buckets = self.buckets.lock().await;
        let before = buckets.len();
        buckets.retain(|_, b| now.duration_since(b.last_check) < self.stale_after);
        before - buckets.len()
    }

    pub fn spawn_sweeper(self: std::sync::Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let removed = self.sweep().await;
                if removed > 0 {
                    tracing::debug!(removed, "rate limit bucket sweep");
                }
            }
        })
    }

    #[cfg(test)]
    async fn bucket_count(&self) -> usize {
        self.buckets.lock().await.len()
    }
}

/// Extracts the client IP per spec.md §4.6: trust `X-Forwarded-For` /
/// `X-Real-IP` only when the immediate peer is loopback, otherwise use the
/// socket peer address.
pub fn client_ip(peer: IpAddr, forwarded_for: Option<&str>, real_ip: Option<&str>) -> IpAddr {
    if !peer.is_loopback() {
        return peer;
    }
    if let Some(value) = forwarded_for {
        if let Some(first) = value.split(',').next() {
            if let Ok(parsed) = first.trim().parse() {
                return parsed;
            }
        }
    }
    if let Some(value) = real_ip {
        if let Ok(parsed) = value.trim().parse() {
            return parsed;
        }
    }
    peer
}
