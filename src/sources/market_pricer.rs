// Prediction-market order-book pricer: returns per-outcome prices for a
// single market id, used by detectors that need a fresher read than the
// lister's last snapshot (e.g. right before a fill).

use super::{MarketPricer, SourceHealthTracker};
use crate::errors::SourceError;
use crate::rate_limit::RateLimiterRegistry;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

pub struct PredictionMarketPricer {
    base_url: String,
    client: reqwest::Client,
    rate_limiter: Arc<RateLimiterRegistry>,
    health: SourceHealthTracker,
}

const SOURCE_NAME: &str = "market_pricer";

impl PredictionMarketPricer {
    pub fn new(base_url: String, rate_limiter: Arc<RateLimiterRegistry>) -> Self {
        rate_limiter.configure(SOURCE_NAME, 200.0, 200.0);
        PredictionMarketPricer {
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
impl MarketPricer for PredictionMarketPricer {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    #[instrument(skip(self), name = "market_pricer::get_market_prices")]
    async fn get_market_prices(
        &self,
        market_id: &str,
    ) -> Result<BTreeMap<String, Decimal>, SourceError> {
        let (granted, wait) = self.rate_limiter.acquire(SOURCE_NAME);
        if !granted {
            return Err(SourceError::RateLimit {
                source: SOURCE_NAME.to_string(),
                retry_after_ms: wait.as_millis() as u64,
            });
        }

        let url = format!("{}/book?market={}", self.base_url, market_id);
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

        let mut prices = BTreeMap::new();
        if let Some(obj) = body.as_object() {
            for (outcome, v) in obj {
                let price = v
                    .as_f64()
                    .and_then(|f| Decimal::from_str(&f.to_string()).ok())
                    .or_else(|| v.as_str().and_then(|s| Decimal::from_str(s).ok()));
                if let Some(p) = price {
                    prices.insert(outcome.clone(), p);
                }
            }
        }
        self.health.record(!prices.is_empty());
        Ok(prices)
    }
}
