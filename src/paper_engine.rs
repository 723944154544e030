// Paper trading engine: accepts gate-approved opportunities, simulates
// fills against the strategy's `PortfolioTracker`, and emits `Trade`
// records. Grounded on `execution::ExecutionEngine`'s demo-branch shape,
// narrowed to paper-only — there is no live branch here, the engine never
// talks to a real exchange.

use crate::domain::{Side, Trade, TradeStatus};
use crate::errors::ExecutionError;
use crate::portfolio::{LedgerError, PortfolioTracker};
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

pub struct PaperTradingEngine {
    next_trade_id: AtomicU64,
    slippage_bps: i64,
}

impl PaperTradingEngine {
    pub fn new(slippage_bps: i64) -> Self {
        PaperTradingEngine {
            next_trade_id: AtomicU64::new(1),
            slippage_bps,
        }
    }

    /// `place(opportunity, size_usd) -> Trade | ExecutionError`. The caller
    /// must have already confirmed `ExecutionGate.may_execute` returned
    /// `(true, _)` — this function does not re-check the gate.
    pub fn place(
        &self,
        tracker: &mut PortfolioTracker,
        strategy_name: &str,
        market_id: &str,
        side: Side,
        opportunity_id: uuid::Uuid,
        reference_price: Decimal,
        size_usd: Decimal,
    ) -> Result<Trade, ExecutionError> {
        let slippage = reference_price * Decimal::from(self.slippage_bps) / Decimal::from(10_000);
        let fill_price = (reference_price + slippage).max(Decimal::ZERO);
        if fill_price <= Decimal::ZERO {
            return Err(ExecutionError::InsufficientCash);
        }
        let units = size_usd / fill_price;

        let trade_id = self.next_trade_id.fetch_add(1, Ordering::SeqCst);
        let filled_at = Utc::now();

        match tracker.apply_fill(market_id, side, units, fill_price, size_usd, filled_at) {
            Ok(()) => {
                info!(strategy_name, market_id, trade_id, "paper trade filled");
                let trade = Trade {
                    trade_id,
                    opportunity_id,
                    strategy_name: strategy_name.to_string(),
                    market_id: market_id.to_string(),
                    side,
                    filled_at,
                    closed_at: None,
                    entry_price: fill_price,
                    exit_price: None,
                    notional_usd: size_usd,
                    realized_pnl_usd: Decimal::ZERO,
                    status: TradeStatus::Open,
                    close_reason: None,
                };
                tracker.register_open_trade(trade.clone());
                Ok(trade)
            }
            Err(LedgerError::InsufficientCash) => Err(ExecutionError::InsufficientCash),
            Err(LedgerError::DuplicatePosition) => Err(ExecutionError::DuplicatePosition),
        }
    }

    /// Close an open position at `exit_price`, returning the closed `Trade`
    /// with realized P&L computed. `reason` is one of target/stop/expiry/
    /// manual, recorded on the trade for the activity log.
    pub fn close(
        &self,
        tracker: &mut PortfolioTracker,
        open_trade: Trade,
        market_id: &str,
        side: Side,
        exit_price: Decimal,
        reason: &str,
    ) -> Trade {
        let mut closed = tracker.apply_close(market_id, side, exit_price, open_trade);
        closed.close_reason = Some(reason.to_string());
        closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn place_fills_and_decrements_cash() {
        let engine = PaperTradingEngine::new(0);
        let mut tracker = PortfolioTracker::new("arbitrage", dec!(10000));
        let trade = engine
            .place(
                &mut tracker,
                "arbitrage",
                "m1",
                Side::Pair,
                uuid::Uuid::new_v4(),
                dec!(0.97),
                dec!(10),
            )
            .unwrap();
        assert_eq!(trade.status, TradeStatus::Open);
        assert_eq!(tracker.cash_usd(), dec!(9990));
    }

    #[test]
    fn duplicate_fill_on_same_market_and_side_rejected() {
        let engine = PaperTradingEngine::new(0);
        let mut tracker = PortfolioTracker::new("arbitrage", dec!(10000));
        engine
            .place(&mut tracker, "arbitrage", "m1", Side::Pair, uuid::Uuid::new_v4(), dec!(0.97), dec!(10))
            .unwrap();
        let result = engine.place(&mut tracker, "arbitrage", "m1", Side::Pair, uuid::Uuid::new_v4(), dec!(0.97), dec!(10));
        assert_eq!(result, Err(ExecutionError::DuplicatePosition));
    }

    #[test]
    fn close_computes_realized_pnl() {
        let engine = PaperTradingEngine::new(0);
        let mut tracker = PortfolioTracker::new("arbitrage", dec!(10000));
        let trade = engine
            .place(&mut tracker, "arbitrage", "m1", Side::Pair, uuid::Uuid::new_v4(), dec!(0.5), dec!(10))
            .unwrap();
        let closed = engine.close(&mut tracker, trade, "m1", Side::Pair, dec!(0.6), "take_profit");
        assert_eq!(closed.status, TradeStatus::Closed);
        assert_eq!(closed.realized_pnl_usd, dec!(2)); // 20 units * (0.6-0.5)
        assert_eq!(closed.close_reason.as_deref(), Some("take_profit"));
    }
}
