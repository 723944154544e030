// Primary crypto spot pricer: high rate-limit budget REST provider,
// supports symbol batches. Grounded on `binance::client::BinanceClient`'s
// reqwest-plus-retry-plus-instrument shape; this one calls an unauthenticated
// public price endpoint, so there is no HMAC signing step — paper trading
// never needs order-placement credentials.

use super::{retry_with_backoff, Pricer, SourceHealthTracker};
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

pub struct PrimaryCryptoPricer {
    base_url: String,
    client: reqwest::Client,
    rate_limiter: Arc<RateLimiterRegistry>,
    health: SourceHealthTracker,
}

const SOURCE_NAME: &str = "crypto_primary";

impl PrimaryCryptoPricer {
    pub fn new(base_url: String, rate_limiter: Arc<RateLimiterRegistry>) -> Self {
        rate_limiter.configure(SOURCE_NAME, 1000.0, 1000.0);
        PrimaryCryptoPricer {
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

    #[instrument(skip(self), name = "crypto_primary::fetch_one")]
    async fn fetch_one(&self, symbol: &str) -> Result<PriceQuote, SourceError> {
        let (granted, wait) = self.rate_limiter.acquire(SOURCE_NAME);
        if !granted {
            return Err(SourceError::RateLimit {
                source: SOURCE_NAME.to_string(),
                retry_after_ms: wait.as_millis() as u64,
            });
        }

        let url = format!("{}/ticker/price?symbol={}", self.base_url, symbol);
        let resp = self.client.get(&url).send().await.map_err(|e| {
            SourceError::TransientNetwork {
                source: SOURCE_NAME.to_string(),
                message: e.to_string(),
            }
        })?;

        if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(SourceError::RateLimit {
                source: SOURCE_NAME.to_string(),
                retry_after_ms: 1000,
            });
        }
        if !resp.status().is_success() {
            return Err(SourceError::Unavailable {
                source: SOURCE_NAME.to_string(),
                message: format!("status {}", resp.status()),
            });
        }

        let body: serde_json::Value = resp.json().await.map_err(|e| SourceError::ProtocolFormat {
            source: SOURCE_NAME.to_string(),
            message: e.to_string(),
        })?;

        let price_str = body
            .get("price")
            .and_then(|v| v.as_str())
            .ok_or_else(|| SourceError::ProtocolFormat {
                source: SOURCE_NAME.to_string(),
                message: "missing price field".to_string(),
            })?;
        let price = Decimal::from_str(price_str).map_err(|e| SourceError::ProtocolFormat {
            source: SOURCE_NAME.to_string(),
            message: e.to_string(),
        })?;

        let volume = body
            .get("volume24h")
            .and_then(|v| v.as_str())
            .and_then(|s| Decimal::from_str(s).ok())
            .unwrap_or(Decimal::ZERO);

        Ok(PriceQuote {
            symbol: symbol.to_string(),
            source: SOURCE_NAME.to_string(),
            price,
            volume_24h: volume,
            timestamp: Utc::now(),
        })
    }
}

#[async_trait]
impl Pricer for PrimaryCryptoPricer {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    #[instrument(skip(self, symbols), name = "crypto_primary::get_prices")]
    async fn get_prices(&self, symbols: &[String]) -> Result<Vec<PriceQuote>, SourceError> {
        let mut quotes = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            let result = retry_with_backoff(
                SOURCE_NAME,
                3,
                Duration::from_millis(200),
                Duration::from_secs(5),
                || self.fetch_one(symbol),
            )
            .await;
            match result {
                Ok(q) => {
                    self.health.record(true);
                    quotes.push(q);
                }
                Err(e) => {
                    self.health.record(false);
                    tracing::warn!(symbol, error = %e, "primary crypto pricer failed for symbol");
                }
            }
        }
        Ok(quotes)
    }
}
