// Core data model. Money and price fields use `Decimal`, never `f64` — the
// bot's whole edge is measured in basis points and a binary float would
// silently eat it.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

pub type MarketId = String;
pub type Symbol = String;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    pub market_id: MarketId,
    pub question: String,
    pub outcomes: Vec<String>,
    pub prices: BTreeMap<String, Decimal>,
    pub liquidity_usd: Decimal,
    pub volume_24h_usd: Decimal,
    pub end_time: DateTime<Utc>,
    pub category: Option<String>,
    pub source: String,
    pub last_updated_at: DateTime<Utc>,
    /// Consecutive refreshes in which this market was absent from the
    /// lister's response. Reset to 0 on every successful sighting.
    pub missed_refreshes: u32,
}

impl Market {
    /// Sum of outcome prices. Expected in `(0, 2)`; `< 1` is the arbitrage
    /// condition this whole engine hunts for.
    pub fn price_sum(&self) -> Decimal {
        self.prices.values().copied().sum()
    }

    pub fn price_for(&self, outcome: &str) -> Option<Decimal> {
        self.prices.get(outcome).copied()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.end_time).num_seconds() > 3600
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceQuote {
    pub symbol: Symbol,
    pub source: String,
    pub price: Decimal,
    pub volume_24h: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl PriceQuote {
    pub fn age_ms(&self, now: DateTime<Utc>) -> i64 {
        now.signed_duration_since(self.timestamp)
            .num_milliseconds()
            .max(0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusPrice {
    pub symbol: Symbol,
    pub median: Decimal,
    pub sources: Vec<String>,
    pub confidence: f64,
    pub stale: bool,
    pub computed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyStage {
    Backtest,
    Paper,
    MicroLive,
    MiniLive,
    FullLive,
}

impl Default for StrategyStage {
    fn default() -> Self {
        StrategyStage::Paper
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyMeta {
    pub name: String,
    pub enabled: bool,
    pub paused: bool,
    pub stage: StrategyStage,
    pub allocation: f64,
    pub disabled_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Yes,
    No,
    Pair,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Yes => write!(f, "YES"),
            Side::No => write!(f, "NO"),
            Side::Pair => write!(f, "PAIR"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Opportunity {
    pub id: Uuid,
    pub strategy_name: String,
    pub market_id: MarketId,
    pub side: Side,
    pub edge_bps: i64,
    pub size_usd: Decimal,
    pub rationale: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Entry price the detector priced the opportunity at; used by the
    /// paper engine as the simulated fill price absent a slippage model.
    pub reference_price: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeStatus {
    Proposed,
    Gated,
    Filled,
    Open,
    Closing,
    Closed,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: u64,
    pub opportunity_id: Uuid,
    pub strategy_name: String,
    pub market_id: MarketId,
    pub side: Side,
    pub filled_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub entry_price: Decimal,
    pub exit_price: Option<Decimal>,
    pub notional_usd: Decimal,
    pub realized_pnl_usd: Decimal,
    pub status: TradeStatus,
    pub close_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub strategy_name: String,
    pub market_id: MarketId,
    pub side: Side,
    pub units: Decimal,
    pub avg_entry_price: Decimal,
    pub opened_at: DateTime<Utc>,
}

impl Position {
    pub fn unrealized_pnl_usd(&self, mark_price: Decimal) -> Decimal {
        (mark_price - self.avg_entry_price) * self.units
    }

    pub fn market_value(&self, mark_price: Decimal) -> Decimal {
        self.units * mark_price
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RollingMetrics {
    pub win_rate: f64,
    pub sharpe: f64,
    pub sharpe_trades_per_year: f64,
    pub max_drawdown: f64,
    pub consecutive_losses: u32,
    pub total_trades: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub strategy_name: String,
    pub cash_usd: Decimal,
    pub positions: Vec<Position>,
    pub equity_usd: Decimal,
    pub daily_pnl_usd: Decimal,
    pub metrics: RollingMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlState {
    pub paused: bool,
    pub kill_active: bool,
    pub kill_reason: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Default for ControlState {
    fn default() -> Self {
        ControlState {
            paused: false,
            kill_active: false,
            kill_reason: None,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ActivityEvent {
    CycleStarted {
        timestamp: DateTime<Utc>,
        cycle_id: u64,
    },
    CycleEnded {
        timestamp: DateTime<Utc>,
        cycle_id: u64,
        duration_ms: i64,
    },
    MarketsFetched {
        timestamp: DateTime<Utc>,
        count: usize,
    },
    OpportunityFound {
        timestamp: DateTime<Utc>,
        strategy_name: String,
        market_id: MarketId,
        edge_bps: i64,
    },
    TradeExecuted {
        timestamp: DateTime<Utc>,
        trade_id: u64,
        strategy_name: String,
    },
    TradeClosed {
        timestamp: DateTime<Utc>,
        trade_id: u64,
        strategy_name: String,
        realized_pnl_usd: Decimal,
    },
    Error {
        timestamp: DateTime<Utc>,
        kind: String,
        msg: String,
    },
    Heartbeat {
        timestamp: DateTime<Utc>,
    },
}

impl ActivityEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            ActivityEvent::CycleStarted { timestamp, .. }
            | ActivityEvent::CycleEnded { timestamp, .. }
            | ActivityEvent::MarketsFetched { timestamp, .. }
            | ActivityEvent::OpportunityFound { timestamp, .. }
            | ActivityEvent::TradeExecuted { timestamp, .. }
            | ActivityEvent::TradeClosed { timestamp, .. }
            | ActivityEvent::Error { timestamp, .. }
            | ActivityEvent::Heartbeat { timestamp } => *timestamp,
        }
    }
}
