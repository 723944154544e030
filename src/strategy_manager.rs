// Strategy manager: registry of strategies plus per-strategy virtual
// portfolios, orchestrating detectors and ranking opportunities. Grounded
// on `arena::profile`'s multi-profile-competition shape (named profiles,
// per-profile Thompson-sampling-ready state) generalized into a strategy
// registry with real ledgers instead of a phase-5 stub.

use crate::domain::{ConsensusPrice, Market, Opportunity, Position, RollingMetrics, StrategyMeta, StrategyStage};
use crate::portfolio::PortfolioTracker;
use crate::strategies::{DetectorContext, DetectorThresholds, OpportunityDetector};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

struct RegisteredStrategy {
    meta: RwLock<StrategyMeta>,
    detector: Arc<dyn OpportunityDetector>,
    thresholds: DetectorThresholds,
    max_opens_per_cycle: usize,
    tracker: RwLock<PortfolioTracker>,
}

pub struct StrategyManager {
    strategies: RwLock<Vec<RegisteredStrategy>>,
}

impl StrategyManager {
    pub fn new() -> Self {
        StrategyManager {
            strategies: RwLock::new(Vec::new()),
        }
    }

    pub fn register(
        &self,
        name: &str,
        detector: Arc<dyn OpportunityDetector>,
        thresholds: DetectorThresholds,
        max_opens_per_cycle: usize,
        initial_capital: Decimal,
        allocation: f64,
    ) {
        let registered = RegisteredStrategy {
            meta: RwLock::new(StrategyMeta {
                name: name.to_string(),
                enabled: true,
                paused: false,
                stage: StrategyStage::Paper,
                allocation,
                disabled_reason: None,
            }),
            detector,
            thresholds,
            max_opens_per_cycle,
            tracker: RwLock::new(PortfolioTracker::new(name, initial_capital)),
        };
        self.strategies.write().push(registered);
        info!(strategy_name = name, "strategy registered");
    }

    /// Run every enabled, non-paused strategy's detector, returning the
    /// per-strategy opportunity list capped at `max_opens_per_cycle` and
    /// sorted by `edge_bps` descending.
    pub fn run_all(
        &self,
        markets: &[Market],
        consensus_prices: &HashMap<String, ConsensusPrice>,
        now: chrono::DateTime<chrono::Utc>,
    ) -> HashMap<String, Vec<Opportunity>> {
        let strategies = self.strategies.read();
        let mut result = HashMap::new();

        for strategy in strategies.iter() {
            let meta = strategy.meta.read();
            if !meta.enabled || meta.paused {
                continue;
            }
            let name = meta.name.clone();
            drop(meta);

            let open_positions: Vec<Position> = strategy
                .tracker
                .read()
                .open_positions()
                .iter()
                .cloned()
                .collect();

            let ctx = DetectorContext {
                markets,
                consensus_prices,
                open_positions: &open_positions,
                thresholds: &strategy.thresholds,
                now,
            };

            let mut opportunities = strategy.detector.detect(&ctx);
            opportunities.truncate(strategy.max_opens_per_cycle);
            if !opportunities.is_empty() {
                result.insert(name, opportunities);
            }
        }

        result
    }

    pub fn with_tracker_mut<R>(&self, strategy_name: &str, f: impl FnOnce(&mut PortfolioTracker) -> R) -> Option<R> {
        let strategies = self.strategies.read();
        let strategy = strategies.iter().find(|s| s.meta.read().name == strategy_name)?;
        let mut tracker = strategy.tracker.write();
        Some(f(&mut tracker))
    }

    pub fn with_tracker<R>(&self, strategy_name: &str, f: impl FnOnce(&PortfolioTracker) -> R) -> Option<R> {
        let strategies = self.strategies.read();
        let strategy = strategies.iter().find(|s| s.meta.read().name == strategy_name)?;
        let tracker = strategy.tracker.read();
        Some(f(&tracker))
    }

    pub fn meta(&self, strategy_name: &str) -> Option<StrategyMeta> {
        let strategies = self.strategies.read();
        strategies
            .iter()
            .find(|s| s.meta.read().name == strategy_name)
            .map(|s| s.meta.read().clone())
    }

    pub fn all_meta(&self) -> Vec<StrategyMeta> {
        self.strategies
            .read()
            .iter()
            .map(|s| s.meta.read().clone())
            .collect()
    }

    pub fn disable(&self, strategy_name: &str, reason: String) {
        let strategies = self.strategies.read();
        if let Some(s) = strategies.iter().find(|s| s.meta.read().name == strategy_name) {
            let mut meta = s.meta.write();
            meta.enabled = false;
            meta.disabled_reason = Some(reason);
        }
    }

    pub fn re_enable(&self, strategy_name: &str) {
        let strategies = self.strategies.read();
        if let Some(s) = strategies.iter().find(|s| s.meta.read().name == strategy_name) {
            let mut meta = s.meta.write();
            meta.enabled = true;
            meta.disabled_reason = None;
        }
    }

    /// Rebalance allocation across registered strategies; `allocation_map`
    /// values must sum to <= 1.0 or the call is rejected wholesale.
    pub fn rebalance(&self, allocation_map: &HashMap<String, f64>) -> Result<(), String> {
        let sum: f64 = allocation_map.values().sum();
        if sum > 1.0 + 1e-9 {
            return Err(format!("allocations sum to {sum}, must be <= 1.0"));
        }
        let strategies = self.strategies.read();
        for (name, allocation) in allocation_map {
            if let Some(s) = strategies.iter().find(|s| &s.meta.read().name == name) {
                s.meta.write().allocation = *allocation;
            }
        }
        Ok(())
    }

    pub fn metrics(&self, strategy_name: &str, scan_interval_seconds: u64, mark_price_for: impl Fn(&str) -> Option<Decimal>) -> Option<RollingMetrics> {
        self.with_tracker(strategy_name, |tracker| tracker.metrics(scan_interval_seconds, mark_price_for))
    }

    pub fn strategy_names(&self) -> Vec<String> {
        self.strategies.read().iter().map(|s| s.meta.read().name.clone()).collect()
    }

    /// Feed a fresh mark price to every registered detector's internal
    /// history (momentum/mean-reversion/stat-arb keep their own rolling
    /// windows; arbitrage/reality-arbitrage ignore this, it's a no-op for
    /// them).
    pub fn record_price_update(&self, market_id: &str, price: Decimal) {
        for strategy in self.strategies.read().iter() {
            strategy.detector.on_price_update(market_id, price);
        }
    }
}

impl Default for StrategyManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Opportunity, Side};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    /// A detector stub that always emits one fixed-edge opportunity per
    /// market, purely to exercise registration/ranking/disable plumbing
    /// without needing a real indicator pipeline.
    struct FixedEdgeDetector {
        edge_bps: i64,
    }

    impl OpportunityDetector for FixedEdgeDetector {
        fn name(&self) -> &str {
            "fixed"
        }

        fn detect(&self, ctx: &DetectorContext) -> Vec<Opportunity> {
            ctx.markets
                .iter()
                .map(|m| Opportunity {
                    id: Uuid::new_v4(),
                    strategy_name: "fixed".to_string(),
                    market_id: m.market_id.clone(),
                    side: Side::Pair,
                    edge_bps: self.edge_bps,
                    size_usd: dec!(10),
                    rationale: serde_json::json!({}),
                    created_at: ctx.now,
                    expires_at: ctx.now + chrono::Duration::seconds(30),
                    reference_price: dec!(0.5),
                })
                .collect()
        }
    }

    fn thresholds() -> DetectorThresholds {
        DetectorThresholds {
            min_edge_bps: 0,
            max_trade_size: dec!(10),
            min_liquidity_usd: dec!(0),
        }
    }

    fn sample_market(id: &str) -> Market {
        let now = chrono::Utc::now();
        let mut prices = std::collections::BTreeMap::new();
        prices.insert("YES".to_string(), dec!(0.4));
        prices.insert("NO".to_string(), dec!(0.5));
        Market {
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

    #[test]
    fn run_all_caps_opportunities_at_max_opens_per_cycle() {
        let manager = StrategyManager::new();
        manager.register(
            "fixed",
            Arc::new(FixedEdgeDetector { edge_bps: 100 }),
            thresholds(),
            1,
            dec!(10000),
            1.0,
        );
        let markets = vec![sample_market("m1"), sample_market("m2")];
        let result = manager.run_all(&markets, &HashMap::new(), chrono::Utc::now());
        assert_eq!(result.get("fixed").unwrap().len(), 1);
    }

    #[test]
    fn disabled_strategy_is_not_invoked() {
        let manager = StrategyManager::new();
        manager.register(
            "fixed",
            Arc::new(FixedEdgeDetector { edge_bps: 100 }),
            thresholds(),
            5,
            dec!(10000),
            1.0,
        );
        manager.disable("fixed", "test disable".to_string());
        let markets = vec![sample_market("m1")];
        let result = manager.run_all(&markets, &HashMap::new(), chrono::Utc::now());
        assert!(result.is_empty());
        assert_eq!(manager.meta("fixed").unwrap().disabled_reason.unwrap(), "test disable");
    }

    #[test]
    fn re_enable_clears_disabled_reason() {
        let manager = StrategyManager::new();
        manager.register("fixed", Arc::new(FixedEdgeDetector { edge_bps: 100 }), thresholds(), 5, dec!(10000), 1.0);
        manager.disable("fixed", "boom".to_string());
        manager.re_enable("fixed");
        let meta = manager.meta("fixed").unwrap();
        assert!(meta.enabled);
        assert!(meta.disabled_reason.is_none());
    }

    #[test]
    fn rebalance_rejects_sum_over_one() {
        let manager = StrategyManager::new();
        manager.register("fixed", Arc::new(FixedEdgeDetector { edge_bps: 100 }), thresholds(), 5, dec!(10000), 0.5);
        let mut allocations = HashMap::new();
        allocations.insert("fixed".to_string(), 1.5);
        assert!(manager.rebalance(&allocations).is_err());
        assert_eq!(manager.meta("fixed").unwrap().allocation, 0.5);
    }

    #[test]
    fn rebalance_applies_valid_allocation() {
        let manager = StrategyManager::new();
        manager.register("fixed", Arc::new(FixedEdgeDetector { edge_bps: 100 }), thresholds(), 5, dec!(10000), 0.5);
        let mut allocations = HashMap::new();
        allocations.insert("fixed".to_string(), 0.8);
        assert!(manager.rebalance(&allocations).is_ok());
        assert_eq!(manager.meta("fixed").unwrap().allocation, 0.8);
    }
}
