// Health monitor: per-strategy auto-disable based on rolling metrics.
// Grounded on `risk::RiskEngine`'s circuit-breaker shape (ordered checks,
// first-failure reason, persistent-until-reset), generalized from one
// account-wide breaker into a per-strategy check against fixed daily-loss,
// consecutive-loss, drawdown, and win-rate thresholds.

use crate::domain::RollingMetrics;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::warn;

pub struct HealthMonitorConfig {
    pub daily_loss_pct: f64,
    pub consecutive_losses: u32,
    pub max_drawdown_pct: f64,
    pub min_win_rate: f64,
    pub min_trades_for_winrate: u32,
}

impl Default for HealthMonitorConfig {
    fn default() -> Self {
        HealthMonitorConfig {
            daily_loss_pct: -10.0,
            consecutive_losses: 5,
            max_drawdown_pct: 20.0,
            min_win_rate: 0.40,
            min_trades_for_winrate: 20,
        }
    }
}

pub struct HealthMonitor {
    config: HealthMonitorConfig,
}

impl HealthMonitor {
    pub fn new(config: HealthMonitorConfig) -> Self {
        HealthMonitor { config }
    }

    /// Evaluate one strategy's rolling metrics against the auto-disable
    /// conditions. Returns the first tripped reason, or `None` if healthy.
    /// `daily_pnl_usd`/`starting_capital` let the caller express the
    /// percentage check without this module owning ledger state.
    pub fn evaluate(
        &self,
        strategy_name: &str,
        metrics: &RollingMetrics,
        daily_pnl_usd: Decimal,
        starting_capital: Decimal,
    ) -> Option<String> {
        let daily_pnl_pct = if starting_capital > Decimal::ZERO {
            (daily_pnl_usd / starting_capital).to_f64().unwrap_or(0.0) * 100.0
        } else {
            0.0
        };

        if daily_pnl_pct < self.config.daily_loss_pct {
            let reason = format!("daily_pnl_pct<{}", self.config.daily_loss_pct);
            warn!(strategy_name, daily_pnl_pct, "strategy auto-disabled: daily loss breach");
            return Some(reason);
        }

        if metrics.consecutive_losses >= self.config.consecutive_losses {
            let reason = format!("consecutive_losses>={}", self.config.consecutive_losses);
            warn!(strategy_name, metrics.consecutive_losses, "strategy auto-disabled: consecutive losses breach");
            return Some(reason);
        }

        let max_drawdown_pct = metrics.max_drawdown * 100.0;
        if max_drawdown_pct > self.config.max_drawdown_pct {
            let reason = format!("max_drawdown_pct>{}", self.config.max_drawdown_pct);
            warn!(strategy_name, max_drawdown_pct, "strategy auto-disabled: max drawdown breach");
            return Some(reason);
        }

        if metrics.total_trades >= self.config.min_trades_for_winrate
            && metrics.win_rate < self.config.min_win_rate
        {
            let reason = format!("win_rate<{}", self.config.min_win_rate);
            warn!(strategy_name, metrics.win_rate, "strategy auto-disabled: win rate breach");
            return Some(reason);
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn scenario_e_auto_disable_on_consecutive_losses() {
        let monitor = HealthMonitor::new(HealthMonitorConfig::default());
        let metrics = RollingMetrics {
            consecutive_losses: 5,
            ..Default::default()
        };
        let reason = monitor.evaluate("s1", &metrics, dec!(0), dec!(10000));
        assert_eq!(reason, Some("consecutive_losses>=5".to_string()));
    }

    #[test]
    fn healthy_strategy_is_not_disabled() {
        let monitor = HealthMonitor::new(HealthMonitorConfig::default());
        let metrics = RollingMetrics {
            win_rate: 0.6,
            consecutive_losses: 1,
            max_drawdown: 0.05,
            total_trades: 30,
            ..Default::default()
        };
        assert!(monitor.evaluate("s1", &metrics, dec!(0), dec!(10000)).is_none());
    }

    #[test]
    fn win_rate_check_requires_minimum_trades() {
        let monitor = HealthMonitor::new(HealthMonitorConfig::default());
        let metrics = RollingMetrics {
            win_rate: 0.1,
            total_trades: 5,
            ..Default::default()
        };
        assert!(monitor.evaluate("s1", &metrics, dec!(0), dec!(10000)).is_none());
    }

    #[test]
    fn daily_loss_breach_detected() {
        let monitor = HealthMonitor::new(HealthMonitorConfig::default());
        let metrics = RollingMetrics::default();
        let reason = monitor.evaluate("s1", &metrics, dec!(-1500), dec!(10000));
        assert_eq!(reason, Some("daily_pnl_pct<-10".to_string()));
    }
}
