// Momentum detector: short EMA crossing long EMA with volume percentile
// confirmation. Needs a rolling price history per market, kept internally
// (ring buffer, grounded on `market_data::candle_buffer::CandleBuffer`'s
// RwLock<HashMap<_, VecDeque<_>>> shape) since the detector trait is a pure
// function of its inputs plus its *own* internal state.

use super::{DetectorContext, OpportunityDetector};
use crate::domain::{Opportunity, Side};
use crate::indicators::ema;
use parking_lot::RwLock;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use uuid::Uuid;

const HISTORY_MAX: usize = 100;
const HISTORY_MIN: usize = 55;

pub struct MomentumDetector {
    history: RwLock<HashMap<String, VecDeque<f64>>>,
    volume_percentile_floor: f64,
}

impl MomentumDetector {
    pub fn new(volume_percentile_floor: f64) -> Self {
        MomentumDetector {
            history: RwLock::new(HashMap::new()),
            volume_percentile_floor,
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

impl OpportunityDetector for MomentumDetector {
    fn name(&self) -> &str {
        "momentum"
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
            // A synthetic YES-side price series: the market's own YES price
            // is the series this strategy trades on.
            let Some(yes_price) = market.price_for("YES") else {
                continue;
            };

            let series = match history.get(&market.market_id) {
                Some(s) if s.len() >= HISTORY_MIN => s,
                _ => continue,
            };
            let closes: Vec<f64> = series.iter().copied().collect();
            let Some((is_bullish, strength)) = ema::ema_trend_aligned(&closes) else {
                continue;
            };

            let volume_percentile = estimate_volume_percentile(market.volume_24h_usd);
            if volume_percentile < self.volume_percentile_floor {
                continue;
            }

            let edge_bps = ((strength * 10_000.0).round() as i64).max(0);
            if edge_bps < ctx.thresholds.min_edge_bps {
                continue;
            }

            opportunities.push(Opportunity {
                id: Uuid::new_v4(),
                strategy_name: self.name().to_string(),
                market_id: market.market_id.clone(),
                side: if is_bullish { Side::Yes } else { Side::No },
                edge_bps,
                size_usd: ctx.thresholds.max_trade_size,
                rationale: serde_json::json!({
                    "kind": "momentum",
                    "ema_strength": strength,
                    "bullish": is_bullish,
                }),
                created_at: ctx.now,
                expires_at: ctx.now + chrono::Duration::minutes(5),
                reference_price: yes_price,
            });
        }

        opportunities.sort_by(|a, b| b.edge_bps.cmp(&a.edge_bps));
        opportunities
    }
}

/// Rough volume percentile proxy: without a cross-market ranking table this
/// just maps absolute 24h volume into [0,1] against a fixed scale.
fn estimate_volume_percentile(volume_24h_usd: Decimal) -> f64 {
    let v = volume_24h_usd.to_f64().unwrap_or(0.0);
    (v / 100_000.0).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::DetectorThresholds;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    fn market(id: &str, yes: Decimal, volume: Decimal) -> crate::domain::Market {
        let now = chrono::Utc::now();
        let mut prices = BTreeMap::new();
        prices.insert("YES".to_string(), yes);
        prices.insert("NO".to_string(), Decimal::ONE - yes);
        crate::domain::Market {
            market_id: id.to_string(),
            question: "q".to_string(),
            outcomes: vec!["YES".to_string(), "NO".to_string()],
            prices,
            liquidity_usd: dec!(10000),
            volume_24h_usd: volume,
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
    fn insufficient_history_emits_nothing() {
        let detector = MomentumDetector::new(0.0);
        for i in 0..HISTORY_MIN - 1 {
            detector.on_price_update("m1", Decimal::new(i as i64, 0));
        }
        let m = market("m1", dec!(0.5), dec!(200000));
        let ctx = DetectorContext {
            markets: std::slice::from_ref(&m),
            consensus_prices: &std::collections::HashMap::new(),
            open_positions: &[],
            thresholds: &thresholds(),
            now: chrono::Utc::now(),
        };
        assert!(detector.detect(&ctx).is_empty());
    }

    #[test]
    fn sustained_uptrend_emits_bullish_opportunity() {
        let detector = MomentumDetector::new(0.0);
        for i in 1..=HISTORY_MIN {
            detector.on_price_update("m1", Decimal::new(i as i64, 0));
        }
        let m = market("m1", dec!(0.5), dec!(200000));
        let ctx = DetectorContext {
            markets: std::slice::from_ref(&m),
            consensus_prices: &std::collections::HashMap::new(),
            open_positions: &[],
            thresholds: &thresholds(),
            now: chrono::Utc::now(),
        };
        let opps = detector.detect(&ctx);
        assert_eq!(opps.len(), 1);
        assert_eq!(opps[0].side, Side::Yes);
    }

    #[test]
    fn low_volume_percentile_is_skipped() {
        let detector = MomentumDetector::new(0.9);
        for i in 1..=HISTORY_MIN {
            detector.on_price_update("m1", Decimal::new(i as i64, 0));
        }
        // Volume far below the 100_000 scale keeps the percentile near zero.
        let m = market("m1", dec!(0.5), dec!(100));
        let ctx = DetectorContext {
            markets: std::slice::from_ref(&m),
            consensus_prices: &std::collections::HashMap::new(),
            open_positions: &[],
            thresholds: &thresholds(),
            now: chrono::Utc::now(),
        };
        assert!(detector.detect(&ctx).is_empty());
    }
}
