// Price aggregator: combines quotes from every configured source into a
// single consensus price with an outlier-rejection pass. The median/
// threshold shape follows the same style as `regime`/`signals`'s scoring
// helpers (pure functions over a small window, returning a confidence
// alongside the point estimate).

use crate::domain::{ConsensusPrice, PriceQuote};
use chrono::Utc;
use parking_lot::RwLock;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;

pub struct AggregatorConfig {
    pub staleness_ms: i64,
    pub outlier_threshold: f64,
    pub configured_source_count: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        AggregatorConfig {
            staleness_ms: 15_000,
            outlier_threshold: 0.05,
            configured_source_count: 2,
        }
    }
}

pub struct PriceAggregator {
    config: AggregatorConfig,
    latest: RwLock<HashMap<String, ConsensusPrice>>,
}

impl PriceAggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        PriceAggregator {
            config,
            latest: RwLock::new(HashMap::new()),
        }
    }

    /// Combine all quotes for one symbol into a `ConsensusPrice`: drop stale
    /// quotes, reject outliers against the running median, then score
    /// confidence from spread and surviving source count. Returns `None`
    /// when zero quotes survive staleness and outlier filtering.
    pub fn compute(&self, symbol: &str, quotes: &[PriceQuote]) -> Option<ConsensusPrice> {
        let now = Utc::now();
        let total_configured = self.config.configured_source_count.max(1);

        let fresh: Vec<&PriceQuote> = quotes
            .iter()
            .filter(|q| q.age_ms(now) <= self.config.staleness_ms)
            .collect();

        if fresh.is_empty() {
            return None;
        }

        let mut prices: Vec<Decimal> = fresh.iter().map(|q| q.price).collect();
        let first_median = median(&mut prices.clone());

        let survivors: Vec<&&PriceQuote> = if fresh.len() >= 2 {
            fresh
                .iter()
                .filter(|q| {
                    let m = first_median.to_f64().unwrap_or(0.0);
                    if m == 0.0 {
                        return true;
                    }
                    let dev = ((q.price.to_f64().unwrap_or(0.0) - m) / m).abs();
                    dev <= self.config.outlier_threshold
                })
                .collect()
        } else {
            fresh.iter().collect()
        };

        if survivors.is_empty() {
            return None;
        }

        let mut survivor_prices: Vec<Decimal> = survivors.iter().map(|q| q.price).collect();
        let final_median = median(&mut survivor_prices);

        let spread_pct = if !survivor_prices.is_empty() {
            let max = survivor_prices.iter().copied().fold(Decimal::MIN, Decimal::max);
            let min = survivor_prices.iter().copied().fold(Decimal::MAX, Decimal::min);
            let m = final_median.to_f64().unwrap_or(1.0).max(f64::MIN_POSITIVE);
            ((max - min).to_f64().unwrap_or(0.0) / m).abs()
        } else {
            0.0
        };

        let mut confidence = 0.5 + 0.5 * (survivors.len() as f64 / total_configured as f64);
        if spread_pct > 0.005 {
            let orders_of_magnitude = (spread_pct / 0.005).log10().max(0.0);
            confidence -= 0.1 * orders_of_magnitude;
        }
        confidence = confidence.clamp(0.0, 1.0);

        let stale = fresh.len() < quotes.len();

        let consensus = ConsensusPrice {
            symbol: symbol.to_string(),
            median: final_median,
            sources: survivors.iter().map(|q| q.source.clone()).collect(),
            confidence,
            stale,
            computed_at: now,
        };

        self.latest
            .write()
            .insert(symbol.to_string(), consensus.clone());
        Some(consensus)
    }

    pub fn best_price(&self, symbol: &str) -> Option<ConsensusPrice> {
        self.latest.read().get(symbol).cloned()
    }
}

fn median(values: &mut [Decimal]) -> Decimal {
    values.sort();
    let n = values.len();
    if n == 0 {
        return Decimal::ZERO;
    }
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / Decimal::from(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use rust_decimal_macros::dec;

    fn quote(symbol: &str, source: &str, price: Decimal, age_s: i64) -> PriceQuote {
        PriceQuote {
            symbol: symbol.to_string(),
            source: source.to_string(),
            price,
            volume_24h: Decimal::ZERO,
            timestamp: Utc::now() - ChronoDuration::seconds(age_s),
        }
    }

    #[test]
    fn scenario_d_outlier_rejection() {
        let agg = PriceAggregator::new(AggregatorConfig {
            staleness_ms: 60_000,
            outlier_threshold: 0.05,
            configured_source_count: 4,
        });
        let quotes = vec![
            quote("BTC", "a", dec!(50000), 0),
            quote("BTC", "b", dec!(50050), 0),
            quote("BTC", "c", dec!(50020), 0),
            quote("BTC", "d", dec!(75000), 0),
        ];
        let consensus = agg.compute("BTC", &quotes).unwrap();
        assert_eq!(consensus.median, dec!(50020));
        assert_eq!(consensus.sources.len(), 3);
        assert!(!consensus.sources.contains(&"d".to_string()));
    }

    #[test]
    fn stale_quotes_are_dropped() {
        let agg = PriceAggregator::new(AggregatorConfig::default());
        let quotes = vec![quote("ETH", "a", dec!(3000), 600)];
        assert!(agg.compute("ETH", &quotes).is_none());
    }

    #[test]
    fn single_surviving_source_still_yields_consensus() {
        let agg = PriceAggregator::new(AggregatorConfig::default());
        let quotes = vec![quote("SOL", "a", dec!(150), 0)];
        let consensus = agg.compute("SOL", &quotes).unwrap();
        assert_eq!(consensus.sources.len(), 1);
        assert_eq!(consensus.median, dec!(150));
    }

    #[test]
    fn zero_quotes_returns_none() {
        let agg = PriceAggregator::new(AggregatorConfig::default());
        assert!(agg.compute("XRP", &[]).is_none());
    }
}
