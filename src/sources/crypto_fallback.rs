// Fallback crypto pricer: lower rate-limit budget, broader symbol coverage,
// single batched request per poll rather than one call per symbol. Used by
// the aggregator as a second independent source for consensus/outlier work.

use super::{Pricer, SourceHealthTracker};
use crate::domain::PriceQuote;
use crate::errors::SourceError;
use crate::rate_limit::RateLimiterRegistry;
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

pub struct FallbackCryptoPricer {
    base_url: String,
    client: reqwest::Client,
    rate_limiter: Arc<RateLimiterRegistry>,
    health: SourceHealthTracker,
}

const SOURCE_NAME: &str = "crypto_fallback";

impl FallbackCryptoPricer {
    pub fn new(base_url: String, rate_limiter: Arc<RateLimiterRegistry>) -> Self {
        rate_limiter.configure(SOURCE_NAME, 50.0, 50.0);
        FallbackCryptoPricer {
            base_url,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("reqwest client builds"),
            rate_limiter,
            health: SourceHealthTracker::new(),
        }
    }

    pub fn status(&self) -> &'static str {
        self.health.status(false)
    }
}

#[async_trait]
impl Pricer for FallbackCryptoPricer {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    #[instrument(skip(self, symbols), name = "crypto_fallback::get_prices")]
    async fn get_prices(&self, symbols: &[String]) -> Result<Vec<PriceQuote>, SourceError> {
        let (granted, wait) = self.rate_limiter.acquire(SOURCE_NAME);
        if !granted {
            return Err(SourceError::RateLimit {
                source: SOURCE_NAME.to_string(),
                retry_after_ms: wait.as_millis() as u64,
            });
        }

        let ids = symbols.join(",");
        let url = format!("{}/simple/price?ids={}&vs_currencies=usd", self.base_url, ids);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| SourceError::TransientNetwork {
                source: SOURCE_NAME.to_string(),
                message: e.to_string(),
            })?;

        if !resp.status().is_success() {
            self.health.record(false);
            return Err(SourceError::Unavailable {
                source: SOURCE_NAME.to_string(),
                message: format!("status {}", resp.status()),
            });
        }

        let body: serde_json::Value = resp.json().await.map_err(|e| SourceError::ProtocolFormat {
            source: SOURCE_NAME.to_string(),
            message: e.to_string(),
        })?;

        let now = Utc::now();
        let mut quotes = Vec::new();
        for symbol in symbols {
            if let Some(price) = body
                .get(symbol)
                .and_then(|v| v.get("usd"))
                .and_then(price_to_decimal)
            {
                quotes.push(PriceQuote {
                    symbol: symbol.clone(),
                    source: SOURCE_NAME.to_string(),
                    price,
                    volume_24h: Decimal::ZERO,
                    timestamp: now,
                });
            }
        }
        self.health.record(!quotes.is_empty());
        Ok(quotes)
    }
}

fn price_to_decimal(v: &serde_json::Value) -> Option<Decimal> {
    if let Some(f) = v.as_f64() {
        return Decimal::from_str(&f.to_string()).ok();
    }
    v.as_str().and_then(|s| Decimal::from_str(s).ok())
}
