// Prediction-market lister: GraphQL-style query by active flag, volume
// threshold, and keyword. Returns normalized `Market` records. Grounded on
// `binance::client::BinanceClient`'s reqwest-client-plus-retry-plus-instrument
// shape, applied to a Polymarket-style gamma-markets listing endpoint.

use super::{retry_with_backoff, MarketLister, SourceHealthTracker};
use crate::domain::Market;
use crate::errors::SourceError;
use crate::rate_limit::RateLimiterRegistry;
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

pub struct PredictionMarketLister {
    base_url: String,
    client: reqwest::Client,
    rate_limiter: Arc<RateLimiterRegistry>,
    health: SourceHealthTracker,
}

const SOURCE_NAME: &str = "market_lister";

impl PredictionMarketLister {
    pub fn new(base_url: String, rate_limiter: Arc<RateLimiterRegistry>) -> Self {
        rate_limiter.configure(SOURCE_NAME, 100.0, 100.0);
        PredictionMarketLister {
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
impl MarketLister for PredictionMarketLister {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    #[instrument(skip(self, keywords, exclude_keywords), name = "market_lister::list_active")]
    async fn list_active(
        &self,
        min_liquidity_usd: Decimal,
        min_volume_24h_usd: Decimal,
        keywords: &[String],
        exclude_keywords: &[String],
    ) -> Result<Vec<Market>, SourceError> {
        let (granted, wait) = self.rate_limiter.acquire(SOURCE_NAME);
        if !granted {
            return Err(SourceError::RateLimit {
                source: SOURCE_NAME.to_string(),
                retry_after_ms: wait.as_millis() as u64,
            });
        }

        let url = format!("{}/markets?active=true", self.base_url);
        let result = retry_with_backoff(
            SOURCE_NAME,
            2,
            Duration::from_millis(200),
            Duration::from_secs(5),
            || async {
                let resp = self.client.get(&url).send().await.map_err(|e| {
                    SourceError::TransientNetwork {
                        source: SOURCE_NAME.to_string(),
                        message: e.to_string(),
                    }
                })?;
                if !resp.status().is_success() {
                    return Err(SourceError::Unavailable {
                        source: SOURCE_NAME.to_string(),
                        message: format!("status {}", resp.status()),
                    });
                }
                resp.json::<Vec<serde_json::Value>>().await.map_err(|e| {
                    SourceError::ProtocolFormat {
                        source: SOURCE_NAME.to_string(),
                        message: e.to_string(),
                    }
                })
            },
        )
        .await;

        let raw = match result {
            Ok(v) => {
                self.health.record(true);
                v
            }
            Err(e) => {
                self.health.record(false);
                return Err(e);
            }
        };

        let now = Utc::now();
        let mut markets = Vec::new();
        for entry in raw {
            let market_id = match entry.get("id").and_then(|v| v.as_str()) {
                Some(id) => id.to_string(),
                None => continue,
            };
            let question = entry
                .get("question")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();

            if !keywords.is_empty()
                && !keywords
                    .iter()
                    .any(|k| question.to_lowercase().contains(&k.to_lowercase()))
            {
                continue;
            }
            if exclude_keywords
                .iter()
                .any(|k| question.to_lowercase().contains(&k.to_lowercase()))
            {
                continue;
            }

            let liquidity = entry
                .get("liquidity")
                .and_then(decimal_field)
                .unwrap_or(Decimal::ZERO);
            let volume = entry
                .get("volume24hr")
                .and_then(decimal_field)
                .unwrap_or(Decimal::ZERO);
            if liquidity < min_liquidity_usd || volume < min_volume_24h_usd {
                continue;
            }

            let outcomes: Vec<String> = entry
                .get("outcomes")
                .and_then(|v| v.as_array())
                .map(|arr| {
                    arr.iter()
                        .filter_map(|v| v.as_str().map(String::from))
                        .collect()
                })
                .unwrap_or_else(|| vec!["YES".to_string(), "NO".to_string()]);

            let mut prices = BTreeMap::new();
            if let Some(arr) = entry.get("outcomePrices").and_then(|v| v.as_array()) {
                for (outcome, price_val) in outcomes.iter().zip(arr.iter()) {
                    if let Some(p) = decimal_field(price_val) {
                        prices.insert(outcome.clone(), p);
                    }
                }
            }
            if prices.is_empty() {
                continue;
            }

            let end_time = entry
                .get("endDate")
                .and_then(|v| v.as_str())
                .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or(now + chrono::Duration::days(30));

            markets.push(Market {
                market_id,
                question,
                outcomes,
                prices,
                liquidity_usd: liquidity,
                volume_24h_usd: volume,
                end_time,
                category: entry
                    .get("category")
                    .and_then(|v| v.as_str())
                    .map(String::from),
                source: SOURCE_NAME.to_string(),
                last_updated_at: now,
                missed_refreshes: 0,
            });
        }

        Ok(markets)
    }
}

fn decimal_field(v: &serde_json::Value) -> Option<Decimal> {
    if let Some(f) = v.as_f64() {
        return Decimal::from_str(&f.to_string()).ok();
    }
    v.as_str().and_then(|s| Decimal::from_str(s).ok())
}
