// Mean reversion detector: emits when the z-score of price vs a rolling
// Bollinger window exceeds a threshold and the market's implied spread is
// inside a cap. Shares the ring-buffer state shape with `momentum.rs`.

use super::{DetectorContext, OpportunityDetector};
use crate::domain::{Opportunity, Side};
use crate::indicators::bollinger::calculate_bollinger;
use parking_lot::RwLock;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use uuid::Uuid;

const HISTORY_MAX: usize = 60;
const BOLLINGER_PERIOD: usize = 20;

pub struct MeanReversionDetector {
    history: RwLock<HashMap<String, VecDeque<f64>>>,
    z_score_threshold: f64,
    max_spread_pct: f64,
}

impl MeanReversionDetector {
    pub fn new(z_score_threshold: f64, max_spread_pct: f64) -> Self {
        MeanReversionDetector {
            history: RwLock::new(HashMap::new()),
            z_score_threshold,
            max_spread_pct,
        }
    }

    fn record_price(&self, market_id: &str, price: f64) {
        let mut history = self.history.write();
        let series = history.entry(market_id.to_string()).or_default();
        if series.len() == HISTORY_MAX {
            series.pop_front();
        }
        series.push_back(price);
    }
}

impl OpportunityDetector for MeanReversionDetector {
    fn name(&self) -> &str {
        "mean_reversion"
    }

    fn on_price_update(&self, market_id: &str, price: Decimal) {
        if let Some(p) = price.to_f64() {
            self.record_price(market_id, p);
        }
    }

    fn detect(&self, ctx: &DetectorContext) -> Vec<Opportunity> {
        let mut opportunities = Vec::new();
        let history = self.history.read();

        for market in ctx.markets {
            if ctx.has_open_position(self.name(), &market.market_id) {
                continue;
            }
            if market.liquidity_usd < ctx.thresholds.min_liquidity_usd {
                continue;
            }
            let (Some(yes), Some(no)) = (market.price_for("YES"), market.price_for("NO")) else {
                continue;
            };
            let spread_pct = ((yes + no) - Decimal::ONE).abs().to_f64().unwrap_or(1.0);
            if spread_pct > self.max_spread_pct {
                continue;
            }

            let series = match history.get(&market.market_id) {
                Some(s) if s.len() >= BOLLINGER_PERIOD => s,
                _ => continue,
            };
            let closes: Vec<f64> = series.iter().copied().collect();
            let Some(bb) = calculate_bollinger(&closes, BOLLINGER_PERIOD, 2.0) else {
                continue;
            };
            let std_dev = (bb.upper - bb.middle) / 2.0;
            if std_dev <= 0.0 {
                continue;
            }
            let current = *closes.last().unwrap();
            let z_score = (current - bb.middle) / std_dev;
            if z_score.abs() < self.z_score_threshold {
                continue;
            }

            let edge_bps = ((z_score.abs() - self.z_score_threshold) * 1000.0).round() as i64;
            if edge_bps < ctx.thresholds.min_edge_bps {
                continue;
            }

            // Price is too far above the mean -> expect reversion down -> buy NO.
            // Too far below the mean -> expect reversion up -> buy YES.
            let side = if z_score > 0.0 { Side::No } else { Side::Yes };

            opportunities.push(Opportunity {
                id: Uuid::new_v4(),
                strategy_name: self.name().to_string(),
                market_id: market.market_id.clone(),
                side,
                edge_bps,
                size_usd: ctx.thresholds.max_trade_size,
                rationale: serde_json::json!({
                    "kind": "mean_reversion",
                    "z_score": z_score,
                }),
                created_at: ctx.now,
                expires_at: ctx.now + chrono::Duration::minutes(10),
                reference_price: if side == Side::Yes { yes } else { no },
            });
        }

        opportunities.sort_by(|a, b| b.edge_bps.cmp(&a.edge_bps));
        opportunities
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::DetectorThresholds;
    use rust_decimal_macros::dec;
    use std::collections::{BTreeMap, HashMap};

    fn market(id: &str, yes: Decimal, no: Decimal) -> crate::domain::Market {
        let now = chrono::Utc::now();
        let mut prices = BTreeMap::new();
        prices.insert("YES".to_string(), yes);
        prices.insert("NO".to_string(), no);
        crate::domain::Market {
            market_id: id.to_string(),
            question: "q".to_string(),
            outcomes: vec!["YES".to_string(), "NO".to_string()],
            prices,
            liquidity_usd: dec!(10000),
            volume_24h_usd: dec!(1000),
            end_time: now + chrono::Duration::seconds(3600),
            category: None,
            source: "test".to_string(),
            last_updated_at: now,
            missed_refreshes: 0,
        }
    }

    fn thresholds() -> DetectorThresholds {
        DetectorThresholds {
            min_edge_bps: 0,
            max_trade_size: dec!(10),
            min_liquidity_usd: dec!(0),
        }
    }

    #[test]
    fn too_little_history_emits_nothing() {
        let detector = MeanReversionDetector::new(2.0, 0.05);
        let m = market("m1", dec!(0.50), dec!(0.49));
        let ctx = DetectorContext {
            markets: std::slice::from_ref(&m),
            consensus_prices: &HashMap::new(),
            open_positions: &[],
            thresholds: &thresholds(),
            now: chrono::Utc::now(),
        };
        assert!(detector.detect(&ctx).is_empty());
    }

    #[test]
    fn spike_above_band_emits_no_side_reversion() {
        let detector = MeanReversionDetector::new(2.0, 0.05);
        for _ in 0..BOLLINGER_PERIOD - 1 {
            detector.on_price_update("m1", dec!(1.0));
        }
        detector.on_price_update("m1", dec!(2.0));

        let m = market("m1", dec!(0.50), dec!(0.49));
        let ctx = DetectorContext {
            markets: std::slice::from_ref(&m),
            consensus_prices: &HashMap::new(),
            open_positions: &[],
            thresholds: &thresholds(),
            now: chrono::Utc::now(),
        };
        let opps = detector.detect(&ctx);
        assert_eq!(opps.len(), 1);
        assert_eq!(opps[0].side, Side::No);
    }

    #[test]
    fn duplicate_open_position_is_skipped() {
        let detector = MeanReversionDetector::new(2.0, 0.05);
        for _ in 0..BOLLINGER_PERIOD - 1 {
            detector.on_price_update("m1", dec!(1.0));
        }
        detector.on_price_update("m1", dec!(2.0));

        let m = market("m1", dec!(0.50), dec!(0.49));
        let open_position = crate::domain::Position {
            strategy_name: "mean_reversion".to_string(),
            market_id: "m1".to_string(),
            side: Side::No,
            units: dec!(10),
            avg_entry_price: dec!(0.49),
            opened_at: chrono::Utc::now(),
        };
        let ctx = DetectorContext {
            markets: std::slice::from_ref(&m),
            consensus_prices: &HashMap::new(),
            open_positions: std::slice::from_ref(&open_position),
            thresholds: &thresholds(),
            now: chrono::Utc::now(),
        };
        assert!(detector.detect(&ctx).is_empty());
    }

    #[test]
    fn wide_spread_is_skipped() {
        let detector = MeanReversionDetector::new(2.0, 0.01);
        for _ in 0..BOLLINGER_PERIOD - 1 {
            detector.on_price_update("m1", dec!(1.0));
        }
        detector.on_price_update("m1", dec!(2.0));

        // YES + NO - 1 = 0.10, above the 0.01 cap.
        let m = market("m1", dec!(0.60), dec!(0.50));
        let ctx = DetectorContext {
            markets: std::slice::from_ref(&m),
            consensus_prices: &HashMap::new(),
            open_positions: &[],
            thresholds: &thresholds(),
            now: chrono::Utc::now(),
        };
        assert!(detector.detect(&ctx).is_empty());
    }
}
