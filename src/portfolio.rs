// Per-strategy portfolio tracker: single-writer ledger applying fills and
// closes to cash/positions, computing equity, drawdown, and Sharpe. Built
// from `position_engine::PositionManager` (units, avg_entry_price,
// P&L-by-direction accounting) plus `risk::RiskEngine`'s peak-equity and
// drawdown bookkeeping, merged into one per-strategy object since each
// strategy here runs as its own independent virtual portfolio rather than
// sharing one account-wide ledger.

use crate::domain::{Position, RollingMetrics, Side, Trade, TradeStatus};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

pub struct PortfolioTracker {
    pub strategy_name: String,
    cash_usd: Decimal,
    starting_capital: Decimal,
    positions: Vec<Position>,
    open_trades: Vec<Trade>,
    closed_trades: Vec<Trade>,
    peak_equity: Decimal,
    daily_pnl_usd: Decimal,
}

#[derive(Debug)]
pub enum LedgerError {
    InsufficientCash,
    DuplicatePosition,
}

impl PortfolioTracker {
    pub fn new(strategy_name: impl Into<String>, starting_capital: Decimal) -> Self {
        PortfolioTracker {
            strategy_name: strategy_name.into(),
            cash_usd: starting_capital,
            starting_capital,
            positions: Vec::new(),
            open_trades: Vec::new(),
            closed_trades: Vec::new(),
            peak_equity: starting_capital,
            daily_pnl_usd: Decimal::ZERO,
        }
    }

    pub fn has_position(&self, market_id: &str, side: Side) -> bool {
        self.positions
            .iter()
            .any(|p| p.market_id == market_id && p.side == side)
    }

    pub fn open_positions(&self) -> &[Position] {
        &self.positions
    }

    /// Record a just-filled trade so it can later be looked up by market
    /// and side when an exit is triggered. The paper engine calls this
    /// right after `apply_fill` succeeds.
    pub fn register_open_trade(&mut self, trade: Trade) {
        self.open_trades.push(trade);
    }

    pub fn find_open_trade(&self, market_id: &str, side: Side) -> Option<Trade> {
        self.open_trades
            .iter()
            .find(|t| t.market_id == market_id && t.side == side)
            .cloned()
    }

    pub fn cash_usd(&self) -> Decimal {
        self.cash_usd
    }

    /// Apply a simulated fill. Cash is decremented by `notional_usd`;
    /// position is opened or averaged up. Rolled back (never mutated) if
    /// cash would go negative.
    pub fn apply_fill(
        &mut self,
        market_id: &str,
        side: Side,
        units: Decimal,
        entry_price: Decimal,
        notional_usd: Decimal,
        opened_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), LedgerError> {
        if self.has_position(market_id, side) {
            return Err(LedgerError::DuplicatePosition);
        }
        if self.cash_usd - notional_usd < Decimal::ZERO {
            return Err(LedgerError::InsufficientCash);
        }
        self.cash_usd -= notional_usd;
        self.positions.push(Position {
            strategy_name: self.strategy_name.clone(),
            market_id: market_id.to_string(),
            side,
            units,
            avg_entry_price: entry_price,
            opened_at,
        });
        Ok(())
    }

    /// Close a position, crediting proceeds back to cash and recording
    /// realized P&L on the trade.
    pub fn apply_close(&mut self, market_id: &str, side: Side, exit_price: Decimal, mut trade: Trade) -> Trade {
        if let Some(idx) = self
            .positions
            .iter()
            .position(|p| p.market_id == market_id && p.side == side)
        {
            let position = self.positions.remove(idx);
            let realized = position.unrealized_pnl_usd(exit_price);
            let proceeds = position.market_value(exit_price);
            self.cash_usd += proceeds;
            self.daily_pnl_usd += realized;

            trade.exit_price = Some(exit_price);
            trade.realized_pnl_usd = realized;
            trade.status = TradeStatus::Closed;
            trade.closed_at = Some(chrono::Utc::now());
        }
        self.open_trades
            .retain(|t| !(t.market_id == market_id && t.side == side));
        self.closed_trades.push(trade.clone());
        trade
    }

    /// Recompute equity against latest mark prices. `prices` maps
    /// `market_id` to the mark price to use for that position's side.
    pub fn equity(&self, mark_price_for: impl Fn(&str) -> Option<Decimal>) -> Decimal {
        let positions_value: Decimal = self
            .positions
            .iter()
            .filter_map(|p| mark_price_for(&p.market_id).map(|price| p.market_value(price)))
            .sum();
        self.cash_usd + positions_value
    }

    pub fn mark_to_market(&mut self, mark_price_for: impl Fn(&str) -> Option<Decimal>) {
        let equity = self.equity(&mark_price_for);
        if equity > self.peak_equity {
            self.peak_equity = equity;
        }
    }

    pub fn drawdown_pct(&self, equity: Decimal) -> f64 {
        if self.peak_equity <= Decimal::ZERO {
            return 0.0;
        }
        ((self.peak_equity - equity) / self.peak_equity)
            .to_f64()
            .unwrap_or(0.0)
            .max(0.0)
    }

    /// Folds the ordered closed-trade stream to find the current streak of
    /// losses — never a separately incremented counter, which would drift
    /// from the trade log on replay.
    pub fn consecutive_losses(&self) -> u32 {
        let mut streak = 0;
        for trade in self.closed_trades.iter().rev() {
            if trade.realized_pnl_usd < Decimal::ZERO {
                streak += 1;
            } else {
                break;
            }
        }
        streak
    }

    pub fn win_rate(&self) -> f64 {
        if self.closed_trades.is_empty() {
            return 0.0;
        }
        let wins = self
            .closed_trades
            .iter()
            .filter(|t| t.realized_pnl_usd > Decimal::ZERO)
            .count();
        wins as f64 / self.closed_trades.len() as f64
    }

    /// Sharpe over closed-trade returns, annualized by
    /// `sqrt(trades_per_year)` where `trades_per_year` is estimated from the
    /// realized trade rate over the trailing window rather than a fixed
    /// constant, since trade frequency varies widely across strategies.
    pub fn sharpe(&self, scan_interval_seconds: u64) -> (f64, f64) {
        if self.closed_trades.len() < 2 {
            return (0.0, 0.0);
        }
        let returns: Vec<f64> = self
            .closed_trades
            .iter()
            .filter_map(|t| (t.realized_pnl_usd / self.starting_capital.max(Decimal::ONE)).to_f64())
            .collect();
        let mean = returns.iter().sum::<f64>() / returns.len() as f64;
        let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / returns.len() as f64;
        let std_dev = variance.sqrt();
        if std_dev <= 0.0 {
            return (0.0, 0.0);
        }

        let span = self
            .closed_trades
            .last()
            .zip(self.closed_trades.first())
            .map(|(last, first)| {
                last.closed_at
                    .unwrap_or(last.filled_at)
                    .signed_duration_since(first.filled_at)
                    .num_seconds()
                    .max(scan_interval_seconds as i64)
            })
            .unwrap_or(scan_interval_seconds as i64);
        let seconds_per_year = 365.0 * 24.0 * 3600.0;
        let trades_per_year = (self.closed_trades.len() as f64) * (seconds_per_year / span as f64);

        let sharpe = (mean / std_dev) * trades_per_year.sqrt();
        (sharpe, trades_per_year)
    }

    pub fn total_return_pct(&self, equity: Decimal) -> f64 {
        if self.starting_capital <= Decimal::ZERO {
            return 0.0;
        }
        ((equity - self.starting_capital) / self.starting_capital)
            .to_f64()
            .unwrap_or(0.0)
    }

    pub fn max_drawdown_pct_observed(&self) -> f64 {
        self.drawdown_pct(self.peak_equity)
    }

    pub fn metrics(&self, scan_interval_seconds: u64, mark_price_for: impl Fn(&str) -> Option<Decimal>) -> RollingMetrics {
        let equity = self.equity(mark_price_for);
        let (sharpe, trades_per_year) = self.sharpe(scan_interval_seconds);
        RollingMetrics {
            win_rate: self.win_rate(),
            sharpe,
            sharpe_trades_per_year: trades_per_year,
            max_drawdown: self.drawdown_pct(equity),
            consecutive_losses: self.consecutive_losses(),
            total_trades: self.closed_trades.len() as u32,
        }
    }

    pub fn reset_daily_pnl(&mut self) {
        self.daily_pnl_usd = Decimal::ZERO;
    }

    pub fn daily_pnl_usd(&self) -> Decimal {
        self.daily_pnl_usd
    }

    pub fn closed_trades(&self) -> &[Trade] {
        &self.closed_trades
    }
}
