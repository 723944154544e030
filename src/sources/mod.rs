// Source clients: one capability set per external provider. Grounded on
// `binance::client::BinanceClient` for the reqwest-plus-retry-plus-instrument
// shape, generalized from a single signed exchange client into three
// capability traits (`Pricer`, `MarketLister`, `MarketPricer`) so each
// provider implements only the capabilities it actually offers.

pub mod crypto_fallback;
pub mod crypto_primary;
pub mod market_lister;
pub mod market_pricer;

use crate::domain::{Market, PriceQuote};
use crate::errors::SourceError;
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

pub use crypto_fallback::FallbackCryptoPricer;
pub use crypto_primary::PrimaryCryptoPricer;
pub use market_lister::PredictionMarketLister as MarketListerClient;
pub use market_pricer::PredictionMarketPricer as MarketPricerClient;

#[async_trait]
pub trait Pricer: Send + Sync {
    fn name(&self) -> &str;
    async fn get_prices(&self, symbols: &[String]) -> Result<Vec<PriceQuote>, SourceError>;
}

#[async_trait]
pub trait MarketLister: Send + Sync {
    fn name(&self) -> &str;
    async fn list_active(
        &self,
        min_liquidity_usd: rust_decimal::Decimal,
        min_volume_24h_usd: rust_decimal::Decimal,
        keywords: &[String],
        exclude_keywords: &[String],
    ) -> Result<Vec<Market>, SourceError>;
}

#[async_trait]
pub trait MarketPricer: Send + Sync {
    fn name(&self) -> &str;
    async fn get_market_prices(
        &self,
        market_id: &str,
    ) -> Result<std::collections::BTreeMap<String, rust_decimal::Decimal>, SourceError>;
}

/// Retry a transient-error-prone async call with exponential backoff and
/// jitter: `base * 2^attempt`, capped at a maximum delay.
pub async fn retry_with_backoff<T, F, Fut>(
    source: &str,
    max_attempts: u32,
    base: Duration,
    cap: Duration,
    mut f: F,
) -> Result<T, SourceError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, SourceError>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                let retryable = matches!(e, SourceError::TransientNetwork { .. });
                if !retryable || attempt >= max_attempts {
                    return Err(e);
                }
                let exp = base.as_millis() as u64 * 2u64.saturating_pow(attempt);
                let jitter = (attempt as u64 * 17) % 97;
                let wait = Duration::from_millis((exp + jitter).min(cap.as_millis() as u64));
                warn!(source, attempt, ?wait, error = %e, "retrying after transient error");
                sleep(wait).await;
                attempt += 1;
            }
        }
    }
}

/// Rolling health bit for a source, derived from last success age, trailing
/// error rate over a 20-call window, and rate-limit saturation.
pub struct SourceHealthTracker {
    window: parking_lot::Mutex<std::collections::VecDeque<bool>>,
    last_success: parking_lot::Mutex<Option<tokio::time::Instant>>,
}

const WINDOW_SIZE: usize = 20;

impl SourceHealthTracker {
    pub fn new() -> Self {
        SourceHealthTracker {
            window: parking_lot::Mutex::new(std::collections::VecDeque::with_capacity(WINDOW_SIZE)),
            last_success: parking_lot::Mutex::new(None),
        }
    }

    pub fn record(&self, ok: bool) {
        let mut w = self.window.lock();
        if w.len() == WINDOW_SIZE {
            w.pop_front();
        }
        w.push_back(ok);
        if ok {
            *self.last_success.lock() = Some(tokio::time::Instant::now());
        }
    }

    pub fn status(&self, saturated: bool) -> &'static str {
        let w = self.window.lock();
        if w.is_empty() {
            return "healthy";
        }
        let errors = w.iter().filter(|ok| !**ok).count();
        let error_rate = errors as f64 / w.len() as f64;
        let last_success_age = self
            .last_success
            .lock()
            .map(|t| t.elapsed())
            .unwrap_or(Duration::from_secs(u64::MAX));

        if last_success_age > Duration::from_secs(120) || error_rate > 0.5 {
            "down"
        } else if saturated || error_rate > 0.2 {
            "degraded"
        } else {
            "healthy"
        }
    }
}

impl Default for SourceHealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retry_with_backoff_retries_transient_errors_then_succeeds() {
        let attempts = AtomicU32::new(0);
        let result = retry_with_backoff(
            "test",
            3,
            Duration::from_millis(1),
            Duration::from_millis(10),
            || {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(SourceError::TransientNetwork { source: "test".to_string(), message: "boom".to_string() })
                    } else {
                        Ok(42)
                    }
                }
            },
        )
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_with_backoff_gives_up_after_max_attempts() {
        let attempts = AtomicU32::new(0);
        let result: Result<(), SourceError> = retry_with_backoff(
            "test",
            2,
            Duration::from_millis(1),
            Duration::from_millis(10),
            || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(SourceError::TransientNetwork { source: "test".to_string(), message: "boom".to_string() }) }
            },
        )
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_with_backoff_does_not_retry_non_transient_errors() {
        let attempts = AtomicU32::new(0);
        let result: Result<(), SourceError> = retry_with_backoff(
            "test",
            5,
            Duration::from_millis(1),
            Duration::from_millis(10),
            || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(SourceError::ProtocolFormat { source: "test".to_string(), message: "bad json".to_string() }) }
            },
        )
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn health_tracker_reports_healthy_with_no_history() {
        let tracker = SourceHealthTracker::new();
        assert_eq!(tracker.status(false), "healthy");
    }

    #[test]
    fn health_tracker_degrades_then_goes_down_on_errors() {
        let tracker = SourceHealthTracker::new();
        for _ in 0..WINDOW_SIZE {
            tracker.record(true);
        }
        assert_eq!(tracker.status(false), "healthy");

        for _ in 0..5 {
            tracker.record(false);
        }
        assert_eq!(tracker.status(false), "degraded");

        for _ in 0..WINDOW_SIZE {
            tracker.record(false);
        }
        assert_eq!(tracker.status(false), "down");
    }

    #[test]
    fn health_tracker_reports_degraded_when_saturated() {
        let tracker = SourceHealthTracker::new();
        tracker.record(true);
        assert_eq!(tracker.status(true), "degraded");
    }
}
