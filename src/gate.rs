// Execution gate: the sole authority over "may a trade be created".
// Grounded on `decision_envelope::DecisionEnvelope`'s layered-verdict
// pattern — this generalizes that struct's fixed four-layer pipeline into
// six ordered checks (paper trading, kill switch, control kill, control
// pause, data validation, strategy enabled/paused), short-circuiting on
// first failure and counting denials by reason.

use crate::domain::{ConsensusPrice, ControlState, Market, Opportunity, StrategyMeta};
use crate::errors::GateDenialReason;
use crate::validator::DataValidator;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::info;

pub struct GateContext<'a> {
    pub opportunity: &'a Opportunity,
    pub market: &'a Market,
    pub consensus: Option<&'a ConsensusPrice>,
    pub strategy: &'a StrategyMeta,
    pub control: &'a ControlState,
    pub now: chrono::DateTime<chrono::Utc>,
}

pub struct ExecutionGate {
    paper_trading: bool,
    kill_switch: bool,
    validator: DataValidator,
    denial_counters: RwLock<HashMap<&'static str, u64>>,
}

impl ExecutionGate {
    pub fn new(paper_trading: bool, kill_switch: bool, validator: DataValidator) -> Self {
        ExecutionGate {
            paper_trading,
            kill_switch,
            validator,
            denial_counters: RwLock::new(HashMap::new()),
        }
    }

    /// `may_execute(ctx) -> (allowed, reason?)`. Every code path that could
    /// create a `Trade` must call this first — there is no bypass.
    pub fn may_execute(&self, ctx: &GateContext) -> (bool, Option<GateDenialReason>) {
        let reason = self.first_failure(ctx);
        match &reason {
            Some(r) => {
                *self.denial_counters.write().entry(r.as_str()).or_insert(0) += 1;
                info!(
                    strategy = %ctx.strategy.name,
                    market_id = %ctx.market.market_id,
                    reason = r.as_str(),
                    "execution gate denied opportunity"
                );
                (false, reason)
            }
            None => (true, None),
        }
    }

    fn first_failure(&self, ctx: &GateContext) -> Option<GateDenialReason> {
        if !self.paper_trading {
            return Some(GateDenialReason::PaperTradingDisabled);
        }
        if self.kill_switch {
            return Some(GateDenialReason::KillSwitchActive);
        }
        if ctx.control.kill_active {
            return Some(GateDenialReason::ControlKillActive);
        }
        if ctx.control.paused {
            return Some(GateDenialReason::ControlPaused);
        }
        if let Err(reason) = self
            .validator
            .check(ctx.opportunity, ctx.market, ctx.now, ctx.consensus)
        {
            return Some(reason);
        }
        if !ctx.strategy.enabled {
            return Some(GateDenialReason::StrategyDisabled);
        }
        if ctx.strategy.paused {
            return Some(GateDenialReason::StrategyPaused);
        }
        None
    }

    pub fn denial_counts(&self) -> HashMap<&'static str, u64> {
        self.denial_counters.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Side, StrategyStage};
    use crate::validator::ValidatorConfig;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    fn market() -> Market {
        let now = chrono::Utc::now();
        let mut prices = BTreeMap::new();
        prices.insert("YES".to_string(), dec!(0.48));
        prices.insert("NO".to_string(), dec!(0.49));
        Market {
            market_id: "m1".to_string(),
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

    fn opportunity() -> Opportunity {
        Opportunity {
            id: uuid::Uuid::new_v4(),
            strategy_name: "arbitrage".to_string(),
            market_id: "m1".to_string(),
            side: Side::Pair,
            edge_bps: 300,
            size_usd: dec!(10),
            rationale: serde_json::json!({}),
            created_at: chrono::Utc::now(),
            expires_at: chrono::Utc::now() + chrono::Duration::seconds(30),
            reference_price: dec!(0.97),
        }
    }

    fn strategy() -> StrategyMeta {
        StrategyMeta {
            name: "arbitrage".to_string(),
            enabled: true,
            paused: false,
            stage: StrategyStage::Paper,
            allocation: 0.3,
            disabled_reason: None,
        }
    }

    fn gate() -> ExecutionGate {
        ExecutionGate::new(
            true,
            false,
            DataValidator::new(ValidatorConfig {
                freshness_ms: 5000,
                discrepancy_pct: 0.1,
                min_liquidity_usd: dec!(0),
                min_time_to_close: chrono::Duration::seconds(0),
            }),
        )
    }

    #[test]
    fn allows_when_all_checks_pass() {
        let gate = gate();
        let market = market();
        let opp = opportunity();
        let strategy = strategy();
        let control = ControlState::default();
        let ctx = GateContext {
            opportunity: &opp,
            market: &market,
            consensus: None,
            strategy: &strategy,
            control: &control,
            now: chrono::Utc::now(),
        };
        let (allowed, reason) = gate.may_execute(&ctx);
        assert!(allowed);
        assert!(reason.is_none());
    }

    #[test]
    fn not_paper_trading_denies_first() {
        let gate = ExecutionGate::new(
            false,
            false,
            DataValidator::new(ValidatorConfig {
                freshness_ms: 5000,
                discrepancy_pct: 0.1,
                min_liquidity_usd: dec!(0),
                min_time_to_close: chrono::Duration::seconds(0),
            }),
        );
        let market = market();
        let opp = opportunity();
        let strategy = strategy();
        let control = ControlState::default();
        let ctx = GateContext {
            opportunity: &opp,
            market: &market,
            consensus: None,
            strategy: &strategy,
            control: &control,
            now: chrono::Utc::now(),
        };
        let (allowed, reason) = gate.may_execute(&ctx);
        assert!(!allowed);
        assert_eq!(reason, Some(GateDenialReason::PaperTradingDisabled));
    }

    #[test]
    fn paused_control_state_denies() {
        let gate = gate();
        let market = market();
        let opp = opportunity();
        let strategy = strategy();
        let mut control = ControlState::default();
        control.paused = true;
        let ctx = GateContext {
            opportunity: &opp,
            market: &market,
            consensus: None,
            strategy: &strategy,
            control: &control,
            now: chrono::Utc::now(),
        };
        let (allowed, reason) = gate.may_execute(&ctx);
        assert!(!allowed);
        assert_eq!(reason, Some(GateDenialReason::ControlPaused));
    }

    #[test]
    fn denial_counter_increments_per_reason() {
        let gate = gate();
        let market = market();
        let opp = opportunity();
        let strategy = strategy();
        let mut control = ControlState::default();
        control.paused = true;
        let ctx = GateContext {
            opportunity: &opp,
            market: &market,
            consensus: None,
            strategy: &strategy,
            control: &control,
            now: chrono::Utc::now(),
        };
        gate.may_execute(&ctx);
        gate.may_execute(&ctx);
        assert_eq!(gate.denial_counts().get("control_paused"), Some(&2));
    }
}
