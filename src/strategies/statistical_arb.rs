// Statistical arbitrage (pair trading): maintains a rolling correlation
// between two markets' YES-price time series; when the z-score of their
// spread exceeds a threshold and correlation stays above a floor, emits a
// pair opportunity on the market trading away from the pair's historical
// relationship.

use super::{DetectorContext, OpportunityDetector};
use crate::domain::{Opportunity, Side};
use parking_lot::RwLock;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use uuid::Uuid;

const HISTORY_MAX: usize = 60;
const HISTORY_MIN: usize = 20;

pub struct StatisticalArbDetector {
    pairs: Vec<(String, String)>,
    history: RwLock<HashMap<String, VecDeque<f64>>>,
    z_score_threshold: f64,
    min_correlation: f64,
}

impl StatisticalArbDetector {
    pub fn new(pairs: Vec<(String, String)>, z_score_threshold: f64, min_correlation: f64) -> Self {
        StatisticalArbDetector {
            pairs,
            history: RwLock::new(HashMap::new()),
            z_score_threshold,
            min_correlation,
        }
    }

    fn record(&self, market_id: &str, price: f64) {
        let mut history = self.history.write();
        let series = history.entry(market_id.to_string()).or_default();
        if series.len() == HISTORY_MAX {
            series.pop_front();
        }
        series.push_back(price);
    }
}

fn pearson_correlation(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n < 2 {
        return 0.0;
    }
    let a = &a[a.len() - n..];
    let b = &b[b.len() - n..];
    let mean_a = a.iter().sum::<f64>() / n as f64;
    let mean_b = b.iter().sum::<f64>() / n as f64;
    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for i in 0..n {
        let da = a[i] - mean_a;
        let db = b[i] - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }
    if var_a <= 0.0 || var_b <= 0.0 {
        return 0.0;
    }
    cov / (var_a.sqrt() * var_b.sqrt())
}

fn spread_z_score(a: &[f64], b: &[f64]) -> Option<f64> {
    let n = a.len().min(b.len());
    if n < HISTORY_MIN {
        return None;
    }
    let spreads: Vec<f64> = (0..n).map(|i| a[a.len() - n + i] - b[b.len() - n + i]).collect();
    let mean = spreads.iter().sum::<f64>() / n as f64;
    let variance = spreads.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n as f64;
    let std_dev = variance.sqrt();
    if std_dev <= 0.0 {
        return None;
    }
    Some((spreads.last().copied().unwrap_or(0.0) - mean) / std_dev)
}

impl OpportunityDetector for StatisticalArbDetector {
    fn name(&self) -> &str {
        "statistical_arb"
    }

    fn on_price_update(&self, market_id: &str, price: Decimal) {
        if let Some(p) = price.to_f64() {
            self.record(market_id, p);
        }
    }

    fn detect(&self, ctx: &DetectorContext) -> Vec<Opportunity> {
        let mut opportunities = Vec::new();
        let history = self.history.read();

        for (id_a, id_b) in &self.pairs {
            if ctx.has_open_position(self.name(), id_a) || ctx.has_open_position(self.name(), id_b) {
                continue;
            }
            let (Some(market_a), Some(market_b)) = (
                ctx.markets.iter().find(|m| &m.market_id == id_a),
                ctx.markets.iter().find(|m| &m.market_id == id_b),
            ) else {
                continue;
            };
            if market_a.liquidity_usd < ctx.thresholds.min_liquidity_usd
                || market_b.liquidity_usd < ctx.thresholds.min_liquidity_usd
            {
                continue;
            }
            let (Some(series_a), Some(series_b)) = (history.get(id_a), history.get(id_b)) else {
                continue;
            };
            let a: Vec<f64> = series_a.iter().copied().collect();
            let b: Vec<f64> = series_b.iter().copied().collect();
            if a.len() < HISTORY_MIN || b.len() < HISTORY_MIN {
                continue;
            }

            let correlation = pearson_correlation(&a, &b);
            if correlation < self.min_correlation {
                continue;
            }
            let Some(z_score) = spread_z_score(&a, &b) else {
                continue;
            };
            if z_score.abs() < self.z_score_threshold {
                continue;
            }

            let edge_bps = ((z_score.abs() - self.z_score_threshold) * 500.0).round() as i64;
            if edge_bps < ctx.thresholds.min_edge_bps {
                continue;
            }

            // Spread too high -> market_a rich relative to market_b -> sell
            // market_a's YES (buy NO), buy market_b's YES.
            let (target_market, side) = if z_score > 0.0 {
                (market_a, Side::No)
            } else {
                (market_b, Side::Yes)
            };
            let Some(reference_price) = target_market.price_for(if side == Side::Yes { "YES" } else { "NO" }) else {
                continue;
            };

            opportunities.push(Opportunity {
                id: Uuid::new_v4(),
                strategy_name: self.name().to_string(),
                market_id: target_market.market_id.clone(),
                side,
                edge_bps,
                size_usd: ctx.thresholds.max_trade_size,
                rationale: serde_json::json!({
                    "kind": "statistical_arb",
                    "pair": [id_a, id_b],
                    "correlation": correlation,
                    "z_score": z_score,
                }),
                created_at: ctx.now,
                expires_at: ctx.now + chrono::Duration::minutes(10),
                reference_price,
            });
        }

        opportunities.sort_by(|a, b| b.edge_bps.cmp(&a.edge_bps));
        opportunities
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correlation_of_identical_series_is_one() {
        let series: Vec<f64> = (0..30).map(|i| i as f64).collect();
        assert!((pearson_correlation(&series, &series) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn uncorrelated_constant_series_gives_zero() {
        let a = vec![1.0; 30];
        let b = vec![2.0; 30];
        assert_eq!(pearson_correlation(&a, &b), 0.0);
    }
}
