// Error taxonomy shared across the engine. Kept as an explicit enum (rather
// than folding everything into `anyhow`) because callers branch on these —
// the execution gate, the driver, and the observability layer all need to
// pattern-match a `kind`, not just print a message.

use std::fmt;

/// Errors raised by source clients (price/market fetches) and propagated up
/// through the aggregator and market cache.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("transient network error from {source}: {message}")]
    TransientNetwork { source: String, message: String },

    #[error("rate limited by {source}, retry after {retry_after_ms}ms")]
    RateLimit { source: String, retry_after_ms: u64 },

    #[error("protocol format error from {source}: {message}")]
    ProtocolFormat { source: String, message: String },

    #[error("{source} unavailable: {message}")]
    Unavailable { source: String, message: String },
}

impl SourceError {
    pub fn kind(&self) -> &'static str {
        match self {
            SourceError::TransientNetwork { .. } => "transient_network",
            SourceError::RateLimit { .. } => "rate_limit",
            SourceError::ProtocolFormat { .. } => "protocol_format",
            SourceError::Unavailable { .. } => "unavailable",
        }
    }

    pub fn source_name(&self) -> &str {
        match self {
            SourceError::TransientNetwork { source, .. }
            | SourceError::RateLimit { source, .. }
            | SourceError::ProtocolFormat { source, .. }
            | SourceError::Unavailable { source, .. } => source,
        }
    }
}

/// Reasons the data validator or execution gate can refuse an opportunity.
/// Never fatal to the cycle; the opportunity is simply skipped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateDenialReason {
    #[error("stale_market_data")]
    StaleMarketData,
    #[error("stale_price_data")]
    StalePriceData,
    #[error("price_discrepancy")]
    PriceDiscrepancy,
    #[error("insufficient_liquidity")]
    InsufficientLiquidity,
    #[error("closes_too_soon")]
    ClosesTooSoon,
    #[error("paper_trading_disabled")]
    PaperTradingDisabled,
    #[error("kill_switch_active")]
    KillSwitchActive,
    #[error("control_kill_active")]
    ControlKillActive,
    #[error("control_paused")]
    ControlPaused,
    #[error("strategy_disabled")]
    StrategyDisabled,
    #[error("strategy_paused")]
    StrategyPaused,
    #[error("below_min_edge")]
    BelowMinEdge,
}

impl GateDenialReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateDenialReason::StaleMarketData => "stale_market_data",
            GateDenialReason::StalePriceData => "stale_price_data",
            GateDenialReason::PriceDiscrepancy => "price_discrepancy",
            GateDenialReason::InsufficientLiquidity => "insufficient_liquidity",
            GateDenialReason::ClosesTooSoon => "closes_too_soon",
            GateDenialReason::PaperTradingDisabled => "paper_trading_disabled",
            GateDenialReason::KillSwitchActive => "kill_switch_active",
            GateDenialReason::ControlKillActive => "control_kill_active",
            GateDenialReason::ControlPaused => "control_paused",
            GateDenialReason::StrategyDisabled => "strategy_disabled",
            GateDenialReason::StrategyPaused => "strategy_paused",
            GateDenialReason::BelowMinEdge => "below_min_edge",
        }
    }
}

/// Reasons the paper trading engine rejects a trade after the gate allowed it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionError {
    #[error("insufficient_cash")]
    InsufficientCash,
    #[error("exceeds_position_limit")]
    ExceedsPositionLimit,
    #[error("duplicate_position")]
    DuplicatePosition,
    #[error("gate_denied: {0}")]
    GateDenied(GateDenialReason),
}

/// Fatal, startup-time configuration problems. Exit code 2.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required field: {0}")]
    MissingField(String),
    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
    #[error("strategy allocations sum to {sum}, must be <= 1.0")]
    AllocationOverflow { sum: f64 },
    #[error("paper_trading must be true")]
    PaperTradingNotEnabled,
}

/// Programmer-error class. Not expected to occur in correct code; when it
/// does, the current cycle is aborted, a snapshot is still written, and the
/// loop continues after a bounded pause.
#[derive(Debug)]
pub struct InternalInvariant(pub String);

impl fmt::Display for InternalInvariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "internal invariant violated: {}", self.0)
    }
}

impl std::error::Error for InternalInvariant {}
