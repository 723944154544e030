// Data validator: pre-execution checks run by the execution gate.
// Grounded on `trade_insurance::InsuranceGate`'s layered pre-trade-check
// shape, generalized from crypto-futures-specific checks to freshness,
// consensus discrepancy, liquidity, and time-to-close checks.

use crate::domain::{ConsensusPrice, Market, Opportunity};
use crate::errors::GateDenialReason;
use chrono::Duration as ChronoDuration;
use rust_decimal::Decimal;

pub struct ValidatorConfig {
    pub freshness_ms: i64,
    pub discrepancy_pct: f64,
    pub min_liquidity_usd: Decimal,
    pub min_time_to_close: ChronoDuration,
}

pub struct DataValidator {
    config: ValidatorConfig,
}

impl DataValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        DataValidator { config }
    }

    /// Returns `Ok(())` when the opportunity passes every pre-trade check,
    /// or the first failing reason: market staleness, then price staleness,
    /// then price discrepancy, then liquidity, then time-to-close.
    pub fn check(
        &self,
        opportunity: &Opportunity,
        market: &Market,
        now: chrono::DateTime<chrono::Utc>,
        consensus: Option<&ConsensusPrice>,
    ) -> Result<(), GateDenialReason> {
        let market_age_ms = now
            .signed_duration_since(market.last_updated_at)
            .num_milliseconds();
        if market_age_ms > self.config.freshness_ms {
            return Err(GateDenialReason::StaleMarketData);
        }

        if let Some(consensus) = consensus {
            if consensus.stale {
                return Err(GateDenialReason::StalePriceData);
            }
            if consensus.confidence < 1.0 - self.config.discrepancy_pct {
                return Err(GateDenialReason::PriceDiscrepancy);
            }
        }

        if market.liquidity_usd < self.config.min_liquidity_usd {
            return Err(GateDenialReason::InsufficientLiquidity);
        }

        if market.end_time.signed_duration_since(now) < self.config.min_time_to_close {
            return Err(GateDenialReason::ClosesTooSoon);
        }

        let _ = opportunity;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    fn sample_market(last_updated_age_s: i64, liquidity: Decimal, end_in_s: i64) -> Market {
        let now = chrono::Utc::now();
        let mut prices = BTreeMap::new();
        prices.insert("YES".to_string(), dec!(0.5));
        prices.insert("NO".to_string(), dec!(0.5));
        Market {
            market_id: "m1".to_string(),
            question: "q".to_string(),
            outcomes: vec!["YES".to_string(), "NO".to_string()],
            prices,
            liquidity_usd: liquidity,
            volume_24h_usd: dec!(1000),
            end_time: now + ChronoDuration::seconds(end_in_s),
            category: None,
            source: "test".to_string(),
            last_updated_at: now - ChronoDuration::seconds(last_updated_age_s),
            missed_refreshes: 0,
        }
    }

    fn sample_opportunity() -> Opportunity {
        Opportunity {
            id: uuid::Uuid::new_v4(),
            strategy_name: "arbitrage".to_string(),
            market_id: "m1".to_string(),
            side: crate::domain::Side::Pair,
            edge_bps: 300,
            size_usd: dec!(10),
            rationale: serde_json::json!({}),
            created_at: chrono::Utc::now(),
            expires_at: chrono::Utc::now() + ChronoDuration::seconds(30),
            reference_price: dec!(0.97),
        }
    }

    #[test]
    fn scenario_b_gate_denies_on_stale_data() {
        let validator = DataValidator::new(ValidatorConfig {
            freshness_ms: 5000,
            discrepancy_pct: 0.1,
            min_liquidity_usd: dec!(0),
            min_time_to_close: ChronoDuration::seconds(0),
        });
        let market = sample_market(10, dec!(10000), 3600);
        let result = validator.check(&sample_opportunity(), &market, chrono::Utc::now(), None);
        assert_eq!(result, Err(GateDenialReason::StaleMarketData));
    }

    #[test]
    fn fresh_market_passes() {
        let validator = DataValidator::new(ValidatorConfig {
            freshness_ms: 5000,
            discrepancy_pct: 0.1,
            min_liquidity_usd: dec!(0),
            min_time_to_close: ChronoDuration::seconds(0),
        });
        let market = sample_market(1, dec!(10000), 3600);
        assert!(validator
            .check(&sample_opportunity(), &market, chrono::Utc::now(), None)
            .is_ok());
    }

    #[test]
    fn insufficient_liquidity_denied() {
        let validator = DataValidator::new(ValidatorConfig {
            freshness_ms: 5000,
            discrepancy_pct: 0.1,
            min_liquidity_usd: dec!(5000),
            min_time_to_close: ChronoDuration::seconds(0),
        });
        let market = sample_market(1, dec!(100), 3600);
        let result = validator.check(&sample_opportunity(), &market, chrono::Utc::now(), None);
        assert_eq!(result, Err(GateDenialReason::InsufficientLiquidity));
    }
}
