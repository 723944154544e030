// Opportunity detectors. Each is a pure function over `(markets, prices,
// state) -> opportunities`, grounded on the pipeline shape of
// `strategy::StrategyEngine::evaluate_symbol` (gather inputs, compute
// indicators, emit-or-skip) but generalized from one hard-coded crypto
// pipeline into a `Detector` capability any strategy can implement.

pub mod arbitrage;
pub mod mean_reversion;
pub mod momentum;
pub mod reality_arbitrage;
pub mod statistical_arb;

use crate::domain::{ConsensusPrice, Market, Opportunity, Position};
use std::collections::HashMap;

/// Per-strategy thresholds a detector must respect: every emitted
/// opportunity has `edge_bps >= min_edge_bps` and `size_usd <=
/// max_trade_size`.
#[derive(Debug, Clone)]
pub struct DetectorThresholds {
    pub min_edge_bps: i64,
    pub max_trade_size: rust_decimal::Decimal,
    pub min_liquidity_usd: rust_decimal::Decimal,
}

pub struct DetectorContext<'a> {
    pub markets: &'a [Market],
    pub consensus_prices: &'a HashMap<String, ConsensusPrice>,
    pub open_positions: &'a [Position],
    pub thresholds: &'a DetectorThresholds,
    pub now: chrono::DateTime<chrono::Utc>,
}

impl<'a> DetectorContext<'a> {
    pub fn has_open_position(&self, strategy_name: &str, market_id: &str) -> bool {
        self.open_positions
            .iter()
            .any(|p| p.strategy_name == strategy_name && p.market_id == market_id)
    }
}

/// Capability set a strategy implements. `on_fill`/`on_close` let a detector
/// keep per-market rolling state (price history, correlation windows)
/// without the strategy manager needing to know the concrete type.
pub trait OpportunityDetector: Send + Sync {
    fn name(&self) -> &str;
    fn detect(&self, ctx: &DetectorContext) -> Vec<Opportunity>;
    fn on_price_update(&self, _market_id: &str, _price: rust_decimal::Decimal) {}
}
