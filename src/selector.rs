// Weekly composite-ranking selector: proposes a reallocation across
// qualifying strategies, gated behind `auto_reallocation` (off means this
// module computes proposals but the driver never applies them). Grounded
// on `risk.rs`'s tiered-threshold evaluation style, retargeted from
// per-trade risk checks to a weekly per-strategy scoring pass.

use crate::domain::RollingMetrics;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct StrategyWeekSummary {
    pub strategy_name: String,
    pub total_return_pct: f64,
    pub metrics: RollingMetrics,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReallocationProposal {
    pub allocations: HashMap<String, Decimal>,
    pub qualified: Vec<String>,
    pub disqualified: Vec<(String, String)>,
}

pub struct QualificationThresholds {
    pub min_return_pct: f64,
    pub min_sharpe: f64,
    pub min_win_rate: f64,
    pub max_drawdown_pct: f64,
    pub min_trades: u32,
}

impl Default for QualificationThresholds {
    fn default() -> Self {
        QualificationThresholds {
            min_return_pct: 0.0,
            min_sharpe: 1.5,
            min_win_rate: 0.55,
            max_drawdown_pct: 0.15,
            min_trades: 20,
        }
    }
}

pub struct WeeklySelector {
    thresholds: QualificationThresholds,
}

impl WeeklySelector {
    pub fn new(thresholds: QualificationThresholds) -> Self {
        WeeklySelector { thresholds }
    }

    fn composite_score(summary: &StrategyWeekSummary) -> f64 {
        0.4 * summary.total_return_pct + 0.3 * summary.metrics.sharpe + 0.2 * summary.metrics.win_rate
            - 0.1 * summary.metrics.max_drawdown
    }

    fn qualifies(&self, summary: &StrategyWeekSummary) -> Result<(), String> {
        if summary.total_return_pct <= self.thresholds.min_return_pct {
            return Err(format!("return_pct<={}", self.thresholds.min_return_pct));
        }
        if summary.metrics.sharpe <= self.thresholds.min_sharpe {
            return Err(format!("sharpe<={}", self.thresholds.min_sharpe));
        }
        if summary.metrics.win_rate <= self.thresholds.min_win_rate {
            return Err(format!("win_rate<={}", self.thresholds.min_win_rate));
        }
        if summary.metrics.max_drawdown >= self.thresholds.max_drawdown_pct {
            return Err(format!("max_drawdown>={}", self.thresholds.max_drawdown_pct));
        }
        if summary.metrics.total_trades < self.thresholds.min_trades {
            return Err(format!("total_trades<{}", self.thresholds.min_trades));
        }
        Ok(())
    }

    /// Ranks qualifying strategies by composite score and proposes a
    /// 70/20/10 split across the top three; fewer qualifiers means the
    /// remaining share simply isn't allocated (the driver leaves it in
    /// cash rather than inventing a fourth recipient).
    pub fn propose(&self, summaries: &[StrategyWeekSummary]) -> ReallocationProposal {
        let mut disqualified = Vec::new();
        let mut ranked: Vec<(&StrategyWeekSummary, f64)> = summaries
            .iter()
            .filter_map(|s| match self.qualifies(s) {
                Ok(()) => Some((s, Self::composite_score(s))),
                Err(reason) => {
                    disqualified.push((s.strategy_name.clone(), reason));
                    None
                }
            })
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        const SPLIT: [&str; 3] = ["0.7", "0.2", "0.1"];
        let mut allocations = HashMap::new();
        let mut qualified = Vec::new();
        for (i, (summary, _score)) in ranked.iter().take(3).enumerate() {
            let weight: Decimal = SPLIT[i].parse().unwrap();
            allocations.insert(summary.strategy_name.clone(), weight);
            qualified.push(summary.strategy_name.clone());
        }

        ReallocationProposal {
            allocations,
            qualified,
            disqualified,
        }
    }
}

pub fn allocations_sum_to_at_most_one(proposal: &ReallocationProposal) -> bool {
    let sum: Decimal = proposal.allocations.values().sum();
    sum.to_f64().map(|v| v <= 1.0001).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(name: &str, ret: f64, sharpe: f64, win_rate: f64, drawdown: f64, trades: u32) -> StrategyWeekSummary {
        StrategyWeekSummary {
            strategy_name: name.to_string(),
            total_return_pct: ret,
            metrics: RollingMetrics {
                win_rate,
                sharpe,
                sharpe_trades_per_year: 250.0,
                max_drawdown: drawdown,
                consecutive_losses: 0,
                total_trades: trades,
            },
        }
    }

    #[test]
    fn scenario_f_weekly_reallocation_proposal() {
        let selector = WeeklySelector::new(QualificationThresholds::default());
        let summaries = vec![
            summary("arbitrage", 0.08, 2.1, 0.62, 0.05, 40),
            summary("momentum", 0.05, 1.8, 0.58, 0.08, 30),
            summary("mean_reversion", 0.03, 1.6, 0.56, 0.10, 25),
            summary("reality_arbitrage", 0.01, 0.9, 0.50, 0.12, 22),
        ];
        let proposal = selector.propose(&summaries);
        assert_eq!(proposal.qualified, vec!["arbitrage", "momentum", "mean_reversion"]);
        assert_eq!(proposal.allocations["arbitrage"], "0.7".parse().unwrap());
        assert_eq!(proposal.allocations["momentum"], "0.2".parse().unwrap());
        assert_eq!(proposal.allocations["mean_reversion"], "0.1".parse().unwrap());
        assert_eq!(proposal.disqualified.len(), 1);
        assert!(allocations_sum_to_at_most_one(&proposal));
    }

    #[test]
    fn disqualifies_strategy_below_trade_count() {
        let selector = WeeklySelector::new(QualificationThresholds::default());
        let summaries = vec![summary("too_new", 0.10, 2.0, 0.60, 0.05, 5)];
        let proposal = selector.propose(&summaries);
        assert!(proposal.qualified.is_empty());
        assert_eq!(proposal.disqualified[0].0, "too_new");
        assert!(proposal.disqualified[0].1.contains("total_trades"));
    }

    #[test]
    fn empty_input_yields_empty_proposal() {
        let selector = WeeklySelector::new(QualificationThresholds::default());
        let proposal = selector.propose(&[]);
        assert!(proposal.allocations.is_empty());
    }
}
