// Classic prediction-market arbitrage: if the outcome prices sum to less
// than 1 minus a safety margin, both sides can be bought for a guaranteed
// profit.

use super::{DetectorContext, OpportunityDetector};
use crate::domain::{Opportunity, Side};
use rust_decimal::Decimal;
use uuid::Uuid;

pub struct ArbitrageDetector {
    pub margin_floor: Decimal,
}

impl ArbitrageDetector {
    pub fn new(margin_floor: Decimal) -> Self {
        ArbitrageDetector { margin_floor }
    }
}

impl OpportunityDetector for ArbitrageDetector {
    fn name(&self) -> &str {
        "arbitrage"
    }

    fn detect(&self, ctx: &DetectorContext) -> Vec<Opportunity> {
        let mut opportunities = Vec::new();

        for market in ctx.markets {
            if ctx.has_open_position(self.name(), &market.market_id) {
                continue;
            }
            if market.liquidity_usd < ctx.thresholds.min_liquidity_usd {
                continue;
            }
            if market.outcomes.len() != 2 {
                continue;
            }
            let prices: Vec<Decimal> = market.outcomes.iter().filter_map(|o| market.price_for(o)).collect();
            if prices.len() != 2 {
                continue; // missing price for an outcome -> skip, never guess
            }
            if prices.iter().any(|p| *p <= Decimal::ZERO || *p >= Decimal::ONE) {
                continue;
            }

            let sum = prices[0] + prices[1];
            let threshold = Decimal::ONE - self.margin_floor;
            if sum >= threshold {
                continue;
            }

            let edge_bps = ((Decimal::ONE - sum) * Decimal::from(10_000))
                .round()
                .to_string()
                .parse::<i64>()
                .unwrap_or(0);
            if edge_bps < ctx.thresholds.min_edge_bps {
                continue;
            }

            let size_usd = ctx.thresholds.max_trade_size;
            opportunities.push(Opportunity {
                id: Uuid::new_v4(),
                strategy_name: self.name().to_string(),
                market_id: market.market_id.clone(),
                side: Side::Pair,
                edge_bps,
                size_usd,
                rationale: serde_json::json!({
                    "kind": "arbitrage",
                    "price_sum": sum.to_string(),
                }),
                created_at: ctx.now,
                expires_at: ctx.now + chrono::Duration::seconds(30),
                reference_price: sum,
            });
        }

        opportunities.sort_by(|a, b| b.edge_bps.cmp(&a.edge_bps));
        opportunities
    }
}
