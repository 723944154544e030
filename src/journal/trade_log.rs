use super::append_line;
use crate::domain::Trade;
use std::path::PathBuf;

/// Append-only, never-trimmed trade stream. Replaying this into a fresh
/// `PortfolioTracker` must reproduce the live tracker's state exactly, so
/// every field a tracker needs is written, not just a display-friendly
/// subset.
pub struct TradeLog {
    path: PathBuf,
}

impl TradeLog {
    pub fn new(path: PathBuf) -> Self {
        TradeLog { path }
    }

    pub fn record(&self, trade: &Trade) {
        if let Ok(line) = serde_json::to_string(trade) {
            append_line(&self.path, &line);
        }
    }

    pub fn replay(&self) -> Vec<Trade> {
        let Ok(contents) = std::fs::read_to_string(&self.path) else {
            return Vec::new();
        };
        contents
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Side, TradeStatus};
    use rust_decimal_macros::dec;

    fn sample_trade(id: u64) -> Trade {
        Trade {
            trade_id: id,
            opportunity_id: uuid::Uuid::new_v4(),
            strategy_name: "arbitrage".to_string(),
            market_id: "m1".to_string(),
            side: Side::Pair,
            filled_at: chrono::Utc::now(),
            closed_at: None,
            entry_price: dec!(0.97),
            exit_price: None,
            notional_usd: dec!(10),
            realized_pnl_usd: dec!(0),
            status: TradeStatus::Open,
            close_reason: None,
        }
    }

    #[test]
    fn replay_reproduces_recorded_trades() {
        let dir = tempfile::tempdir().unwrap();
        let log = TradeLog::new(dir.path().join("trades.stream"));
        log.record(&sample_trade(1));
        log.record(&sample_trade(2));
        let replayed = log.replay();
        assert_eq!(replayed.len(), 2);
        assert_eq!(replayed[0].trade_id, 1);
        assert_eq!(replayed[1].trade_id, 2);
    }

    #[test]
    fn replay_of_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = TradeLog::new(dir.path().join("does_not_exist.stream"));
        assert!(log.replay().is_empty());
    }
}
