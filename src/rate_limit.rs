// Token-bucket rate limiter, one bucket per named source. Grounded on the
// atomics-plus-RwLock-plus-tracing shape of a usage tracker, but this is a
// real token bucket with lazy refill rather than a response-header driven
// weight counter — there is no exchange handing us `X-...-WEIGHT` headers
// here, so the budget has to be modeled, not read off the wire.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

struct Bucket {
    capacity: f64,
    refill_per_minute: f64,
    tokens: f64,
    last_refill: Instant,
    paused_until_half: bool,
}

impl Bucket {
    fn new(capacity: f64, refill_per_minute: f64) -> Self {
        Bucket {
            capacity,
            refill_per_minute,
            tokens: capacity,
            last_refill: Instant::now(),
            paused_until_half: false,
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        let rate_per_sec = self.refill_per_minute / 60.0;
        self.tokens = (self.tokens + rate_per_sec * elapsed).min(self.capacity);
        self.last_refill = now;
    }

    fn try_acquire(&mut self, source: &str, now: Instant) -> (bool, Duration) {
        self.refill(now);

        let ratio_used = 1.0 - (self.tokens / self.capacity);
        if self.paused_until_half {
            if self.tokens >= self.capacity / 2.0 {
                self.paused_until_half = false;
            } else {
                let rate_per_sec = self.refill_per_minute / 60.0;
                let need = self.capacity / 2.0 - self.tokens;
                let wait = if rate_per_sec > 0.0 {
                    need / rate_per_sec
                } else {
                    60.0
                };
                return (false, Duration::from_secs_f64(wait.max(0.0)));
            }
        }

        if ratio_used >= 0.95 {
            warn!(source, ratio_used, "rate limiter hard-paused at 95% consumed");
            self.paused_until_half = true;
            let rate_per_sec = self.refill_per_minute / 60.0;
            let need = self.capacity / 2.0 - self.tokens;
            let wait = if rate_per_sec > 0.0 {
                need / rate_per_sec
            } else {
                60.0
            };
            return (false, Duration::from_secs_f64(wait.max(0.0)));
        }

        if ratio_used >= 0.80 {
            warn!(source, ratio_used, "rate limiter above 80% consumed");
        }

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            (true, Duration::ZERO)
        } else {
            let rate_per_sec = self.refill_per_minute / 60.0;
            let wait = if rate_per_sec > 0.0 {
                (1.0 - self.tokens) / rate_per_sec
            } else {
                60.0
            };
            (false, Duration::from_secs_f64(wait.max(0.0)))
        }
    }
}

/// Per-source token buckets behind a single lock. Contention is expected to
/// be low (a handful of sources, called a handful of times per cycle) so one
/// mutex over a small map is simpler than per-source atomics without giving
/// up meaningfully on throughput.
pub struct RateLimiterRegistry {
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl RateLimiterRegistry {
    pub fn new() -> Self {
        RateLimiterRegistry {
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub fn configure(&self, source: &str, capacity: f64, refill_per_minute: f64) {
        self.buckets
            .lock()
            .insert(source.to_string(), Bucket::new(capacity, refill_per_minute));
    }

    /// Non-blocking: returns `(granted, wait_duration)`. `wait_duration` is
    /// zero when granted.
    pub fn acquire(&self, source: &str) -> (bool, Duration) {
        let now = Instant::now();
        let mut buckets = self.buckets.lock();
        let bucket = buckets
            .entry(source.to_string())
            .or_insert_with(|| Bucket::new(60.0, 60.0));
        bucket.try_acquire(source, now)
    }

    /// Blocks (async sleep) until a token is available or `deadline` passes.
    /// Never blocks longer than `deadline`.
    pub async fn wait_until_available(&self, source: &str, deadline: Duration) -> bool {
        let start = Instant::now();
        loop {
            let (granted, wait) = self.acquire(source);
            if granted {
                return true;
            }
            let elapsed = start.elapsed();
            if elapsed >= deadline {
                return false;
            }
            let remaining = deadline - elapsed;
            tokio::time::sleep(wait.min(remaining)).await;
            if start.elapsed() >= deadline {
                return false;
            }
        }
    }
}

impl Default for RateLimiterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grants_up_to_capacity_then_denies() {
        let reg = RateLimiterRegistry::new();
        reg.configure("test", 3.0, 60.0);
        assert!(reg.acquire("test").0);
        assert!(reg.acquire("test").0);
        assert!(reg.acquire("test").0);
        let (granted, wait) = reg.acquire("test");
        assert!(!granted);
        assert!(wait > Duration::ZERO);
    }

    #[test]
    fn unconfigured_source_gets_default_bucket() {
        let reg = RateLimiterRegistry::new();
        let (granted, _) = reg.acquire("unknown-source");
        assert!(granted);
    }

    #[tokio::test]
    async fn wait_until_available_respects_deadline() {
        let reg = RateLimiterRegistry::new();
        reg.configure("slow", 1.0, 1.0); // 1 token/min refill, practically frozen
        assert!(reg.acquire("slow").0);
        let ok = reg
            .wait_until_available("slow", Duration::from_millis(50))
            .await;
        assert!(!ok);
    }
}
