// Engine configuration: env > file > built-in default, in that precedence
// order. Grounded on `runtime_config::RuntimeConfig` for the serde-default
// field pattern and atomic save, generalized to a layered loader with
// environment overrides and startup validation on top of the plain
// read-from-disk path.

use crate::errors::ConfigError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

fn default_true() -> bool {
    true
}

fn default_scan_interval_seconds() -> u64 {
    30
}

fn default_staleness_ms() -> u64 {
    15_000
}

fn default_outlier_threshold() -> f64 {
    0.05
}

fn default_starting_capital() -> Decimal {
    Decimal::new(10_000, 0)
}

fn default_allocations() -> HashMap<String, Decimal> {
    let mut m = HashMap::new();
    m.insert("arbitrage".to_string(), Decimal::new(35, 2));
    m.insert("momentum".to_string(), Decimal::new(20, 2));
    m.insert("mean_reversion".to_string(), Decimal::new(20, 2));
    m.insert("reality_arbitrage".to_string(), Decimal::new(10, 2));
    m.insert("statistical_arb".to_string(), Decimal::new(15, 2));
    m
}

fn default_min_liquidity_usd() -> Decimal {
    Decimal::new(1_000, 0)
}

fn default_min_volume_24h_usd() -> Decimal {
    Decimal::ZERO
}

fn default_discrepancy_pct() -> f64 {
    0.05
}

fn default_min_time_to_close_minutes() -> i64 {
    5
}

fn default_snapshot_path() -> PathBuf {
    PathBuf::from("state/bot_state.snapshot")
}

fn default_control_path() -> PathBuf {
    PathBuf::from("state/control.record")
}

fn default_logs_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_observer_backlog() -> usize {
    256
}

fn default_activity_log_trim() -> usize {
    1000
}

fn default_max_opens_per_cycle() -> usize {
    3
}

fn default_min_edge_bps() -> i64 {
    100
}

fn default_max_trade_size() -> Decimal {
    Decimal::new(10, 0)
}

fn default_profit_target_pct() -> f64 {
    0.15
}

fn default_stop_loss_pct() -> f64 {
    0.10
}

fn default_max_hold_minutes() -> i64 {
    240
}

fn default_margin_floor() -> Decimal {
    Decimal::new(1, 2)
}

fn default_volume_percentile_floor() -> f64 {
    0.5
}

fn default_z_score_threshold() -> f64 {
    2.0
}

fn default_max_spread_pct() -> f64 {
    0.05
}

fn default_min_correlation() -> f64 {
    0.7
}

fn default_min_profit_pct() -> f64 {
    0.05
}

fn default_min_confidence() -> f64 {
    0.6
}

/// Per-strategy thresholds loaded under `strategies.<name>`: minimum edge,
/// max trade size, per-cycle open cap, profit target / stop loss, max hold
/// duration before a forced exit, and each detector's own tunables (only the
/// fields its detector reads are meaningful; the rest sit unused for that
/// strategy).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_min_edge_bps")]
    pub min_edge_bps: i64,
    #[serde(default = "default_max_trade_size")]
    pub max_trade_size_usd: Decimal,
    #[serde(default = "default_max_opens_per_cycle")]
    pub max_opens_per_cycle: usize,
    #[serde(default = "default_profit_target_pct")]
    pub profit_target_pct: f64,
    #[serde(default = "default_stop_loss_pct")]
    pub stop_loss_pct: f64,
    #[serde(default = "default_max_hold_minutes")]
    pub max_hold_minutes: i64,
    #[serde(default = "default_min_liquidity_usd")]
    pub min_liquidity_usd: Decimal,
    /// `arbitrage`: safety margin subtracted from 1 before flagging a sum as
    /// mispriced.
    #[serde(default = "default_margin_floor")]
    pub margin_floor: Decimal,
    /// `momentum`: minimum estimated 24h-volume percentile to confirm a
    /// trend crossing.
    #[serde(default = "default_volume_percentile_floor")]
    pub volume_percentile_floor: f64,
    /// `mean_reversion` and `statistical_arb`: minimum |z-score| to act on.
    #[serde(default = "default_z_score_threshold")]
    pub z_score_threshold: f64,
    /// `mean_reversion`: implied YES+NO spread above which the market is
    /// considered too illiquid to trust.
    #[serde(default = "default_max_spread_pct")]
    pub max_spread_pct: f64,
    /// `statistical_arb`: minimum rolling correlation between a pair's two
    /// price series before a spread z-score is acted on.
    #[serde(default = "default_min_correlation")]
    pub min_correlation: f64,
    /// `statistical_arb`: market id pairs to watch for spread divergence.
    #[serde(default)]
    pub pairs: Vec<(String, String)>,
    /// `reality_arbitrage`: minimum mispricing (as a probability fraction)
    /// between the market's implied odds and the crypto consensus reality.
    #[serde(default = "default_min_profit_pct")]
    pub min_profit_pct: f64,
    /// `reality_arbitrage`: minimum consensus confidence required before the
    /// detector trusts the reference price at all.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        StrategyConfig {
            enabled: true,
            min_edge_bps: default_min_edge_bps(),
            max_trade_size_usd: default_max_trade_size(),
            max_opens_per_cycle: default_max_opens_per_cycle(),
            profit_target_pct: default_profit_target_pct(),
            stop_loss_pct: default_stop_loss_pct(),
            max_hold_minutes: default_max_hold_minutes(),
            min_liquidity_usd: default_min_liquidity_usd(),
            margin_floor: default_margin_floor(),
            volume_percentile_floor: default_volume_percentile_floor(),
            z_score_threshold: default_z_score_threshold(),
            max_spread_pct: default_max_spread_pct(),
            min_correlation: default_min_correlation(),
            pairs: Vec::new(),
            min_profit_pct: default_min_profit_pct(),
            min_confidence: default_min_confidence(),
        }
    }
}

fn default_strategy_configs() -> HashMap<String, StrategyConfig> {
    let mut m = HashMap::new();
    m.insert("arbitrage".to_string(), StrategyConfig { min_edge_bps: 200, ..Default::default() });
    m.insert("momentum".to_string(), StrategyConfig::default());
    m.insert("mean_reversion".to_string(), StrategyConfig::default());
    m.insert("reality_arbitrage".to_string(), StrategyConfig::default());
    m.insert("statistical_arb".to_string(), StrategyConfig::default());
    m
}

/// Liquidity/volume floors and keyword filters applied by
/// `PredictionMarketLister::list_active`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketsConfig {
    #[serde(default = "default_min_liquidity_usd")]
    pub min_liquidity_usd: Decimal,
    #[serde(default = "default_min_volume_24h_usd")]
    pub min_volume_24h_usd: Decimal,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub exclude_keywords: Vec<String>,
}

impl Default for MarketsConfig {
    fn default() -> Self {
        MarketsConfig {
            min_liquidity_usd: default_min_liquidity_usd(),
            min_volume_24h_usd: default_min_volume_24h_usd(),
            categories: Vec::new(),
            keywords: Vec::new(),
            exclude_keywords: Vec::new(),
        }
    }
}

/// The freshness and discrepancy thresholds `DataValidator` enforces before
/// the gate ever checks control/kill state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionGateConfig {
    #[serde(default = "default_staleness_ms")]
    pub freshness_ms: u64,
    #[serde(default = "default_discrepancy_pct")]
    pub price_discrepancy_pct: f64,
    #[serde(default = "default_min_time_to_close_minutes")]
    pub min_time_to_close_minutes: i64,
    #[serde(default)]
    pub slippage_bps: i64,
}

impl Default for ExecutionGateConfig {
    fn default() -> Self {
        ExecutionGateConfig {
            freshness_ms: default_staleness_ms(),
            price_discrepancy_pct: default_discrepancy_pct(),
            min_time_to_close_minutes: default_min_time_to_close_minutes(),
            slippage_bps: 0,
        }
    }
}

/// Mirrors `HealthMonitorConfig`'s thresholds one-for-one so the loaded
/// config can build that struct directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_daily_loss_pct")]
    pub daily_loss_pct: f64,
    #[serde(default = "default_consecutive_losses")]
    pub consecutive_losses: u32,
    #[serde(default = "default_max_drawdown_pct")]
    pub max_drawdown_pct: f64,
    #[serde(default = "default_min_win_rate")]
    pub min_win_rate: f64,
    #[serde(default = "default_min_trades_for_winrate")]
    pub min_trades_for_winrate: u32,
}

fn default_daily_loss_pct() -> f64 {
    -10.0
}
fn default_consecutive_losses() -> u32 {
    5
}
fn default_max_drawdown_pct() -> f64 {
    20.0
}
fn default_min_win_rate() -> f64 {
    0.40
}
fn default_min_trades_for_winrate() -> u32 {
    20
}

impl Default for HealthConfig {
    fn default() -> Self {
        HealthConfig {
            daily_loss_pct: default_daily_loss_pct(),
            consecutive_losses: default_consecutive_losses(),
            max_drawdown_pct: default_max_drawdown_pct(),
            min_win_rate: default_min_win_rate(),
            min_trades_for_winrate: default_min_trades_for_winrate(),
        }
    }
}

/// Override of a source client's built-in bucket, keyed by source name.
/// Absent entries keep the client's own default (see each `sources::*`
/// constructor).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitOverride {
    pub per_minute: f64,
    pub burst: f64,
}

/// Source base URLs plus the streaming opt-in flag. Note: this build only
/// carries REST pollers for the two crypto sources (see DESIGN.md) —
/// `use_stream` is accepted but currently has no consumer.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SourcesConfig {
    #[serde(default)]
    pub crypto_primary_base_url: Option<String>,
    #[serde(default)]
    pub crypto_fallback_base_url: Option<String>,
    #[serde(default)]
    pub prediction_market_lister_base_url: Option<String>,
    #[serde(default)]
    pub prediction_market_pricer_base_url: Option<String>,
    #[serde(default)]
    pub use_stream: bool,
    #[serde(default)]
    pub rate_limits: HashMap<String, RateLimitOverride>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Must be `true`; this engine never places real orders.
    #[serde(default = "default_true")]
    pub paper_trading_enabled: bool,

    #[serde(default)]
    pub kill_switch: bool,

    #[serde(default = "default_scan_interval_seconds")]
    pub scan_interval_seconds: u64,

    #[serde(default = "default_staleness_ms")]
    pub price_staleness_ms: u64,

    #[serde(default = "default_outlier_threshold")]
    pub outlier_threshold: f64,

    #[serde(default = "default_starting_capital")]
    pub starting_capital_usd: Decimal,

    #[serde(default = "default_allocations")]
    pub strategy_allocations: HashMap<String, Decimal>,

    #[serde(default = "default_strategy_configs")]
    pub strategies: HashMap<String, StrategyConfig>,

    #[serde(default)]
    pub symbols: Vec<String>,

    #[serde(default)]
    pub auto_reallocation: bool,

    #[serde(default)]
    pub markets: MarketsConfig,

    #[serde(default)]
    pub execution_gate: ExecutionGateConfig,

    #[serde(default)]
    pub health: HealthConfig,

    #[serde(default)]
    pub sources: SourcesConfig,

    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,

    #[serde(default = "default_control_path")]
    pub control_path: PathBuf,

    #[serde(default = "default_logs_dir")]
    pub logs_dir: PathBuf,

    #[serde(default = "default_observer_backlog")]
    pub observer_backlog_per_subscriber: usize,

    #[serde(default = "default_activity_log_trim")]
    pub activity_log_max_entries: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            paper_trading_enabled: true,
            kill_switch: false,
            scan_interval_seconds: default_scan_interval_seconds(),
            price_staleness_ms: default_staleness_ms(),
            outlier_threshold: default_outlier_threshold(),
            starting_capital_usd: default_starting_capital(),
            strategy_allocations: default_allocations(),
            strategies: default_strategy_configs(),
            symbols: vec!["BTC".to_string(), "ETH".to_string(), "SOL".to_string()],
            auto_reallocation: false,
            markets: MarketsConfig::default(),
            execution_gate: ExecutionGateConfig::default(),
            health: HealthConfig::default(),
            sources: SourcesConfig::default(),
            snapshot_path: default_snapshot_path(),
            control_path: default_control_path(),
            logs_dir: default_logs_dir(),
            observer_backlog_per_subscriber: default_observer_backlog(),
            activity_log_max_entries: default_activity_log_trim(),
        }
    }
}

impl EngineConfig {
    /// Layers a file (if present) over the built-in default, then applies
    /// environment variable overrides on top (`AURORA_*` prefix), matching
    /// the precedence env > file > default.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = path {
            match std::fs::read_to_string(path) {
                Ok(contents) => serde_json::from_str(&contents).map_err(|e| ConfigError::InvalidValue {
                    field: "<file>".to_string(),
                    message: format!("{}: {e}", path.display()),
                })?,
                Err(_) => {
                    warn!(path = %path.display(), "config file not found, using defaults");
                    EngineConfig::default()
                }
            }
        } else {
            EngineConfig::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        info!(scan_interval_seconds = config.scan_interval_seconds, "engine config loaded");
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("AURORA_PAPER_TRADING_ENABLED") {
            if let Ok(b) = v.parse() {
                self.paper_trading_enabled = b;
            }
        }
        if let Ok(v) = std::env::var("AURORA_SCAN_INTERVAL_SECONDS") {
            if let Ok(n) = v.parse() {
                self.scan_interval_seconds = n;
            }
        }
        if let Ok(v) = std::env::var("AURORA_STARTING_CAPITAL_USD") {
            if let Ok(d) = v.parse() {
                self.starting_capital_usd = d;
            }
        }
        if let Ok(v) = std::env::var("AURORA_AUTO_REALLOCATION") {
            if let Ok(b) = v.parse() {
                self.auto_reallocation = b;
            }
        }
        if let Ok(v) = std::env::var("AURORA_KILL_SWITCH") {
            if let Ok(b) = v.parse() {
                self.kill_switch = b;
            }
        }
        if let Ok(v) = std::env::var("AURORA_CRYPTO_PRIMARY_BASE_URL") {
            self.sources.crypto_primary_base_url = Some(v);
        }
        if let Ok(v) = std::env::var("AURORA_CRYPTO_FALLBACK_BASE_URL") {
            self.sources.crypto_fallback_base_url = Some(v);
        }
        if let Ok(v) = std::env::var("AURORA_PREDICTION_MARKET_LISTER_BASE_URL") {
            self.sources.prediction_market_lister_base_url = Some(v);
        }
        if let Ok(v) = std::env::var("AURORA_PREDICTION_MARKET_PRICER_BASE_URL") {
            self.sources.prediction_market_pricer_base_url = Some(v);
        }
        if let Ok(v) = std::env::var("AURORA_SNAPSHOT_PATH") {
            self.snapshot_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("AURORA_CONTROL_PATH") {
            self.control_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("AURORA_LOGS_DIR") {
            self.logs_dir = PathBuf::from(v);
        }
    }

    /// Startup validation. This crate is paper-trading only, so a config
    /// asking for anything else is rejected rather than silently ignored.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.paper_trading_enabled {
            return Err(ConfigError::PaperTradingNotEnabled);
        }
        let allocation_sum: Decimal = self.strategy_allocations.values().sum();
        if allocation_sum > Decimal::ONE {
            return Err(ConfigError::AllocationOverflow {
                sum: allocation_sum.to_string().parse().unwrap_or(f64::MAX),
            });
        }
        if self.scan_interval_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "scan_interval_seconds".to_string(),
                message: "must be > 0".to_string(),
            });
        }
        if !(0.0..1.0).contains(&self.outlier_threshold) {
            return Err(ConfigError::InvalidValue {
                field: "outlier_threshold".to_string(),
                message: "must be in [0, 1)".to_string(),
            });
        }
        if self.starting_capital_usd <= Decimal::ZERO {
            return Err(ConfigError::InvalidValue {
                field: "starting_capital_usd".to_string(),
                message: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn missing_file_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does_not_exist.json");
        let config = EngineConfig::load(Some(&path)).unwrap();
        assert_eq!(config.scan_interval_seconds, default_scan_interval_seconds());
    }

    #[test]
    fn paper_trading_disabled_fails_validation() {
        let mut config = EngineConfig::default();
        config.paper_trading_enabled = false;
        assert_eq!(config.validate(), Err(ConfigError::PaperTradingNotEnabled));
    }

    #[test]
    fn allocation_overflow_fails_validation() {
        let mut config = EngineConfig::default();
        config
            .strategy_allocations
            .insert("extra".to_string(), Decimal::new(80, 2));
        assert!(matches!(config.validate(), Err(ConfigError::AllocationOverflow { .. })));
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"scan_interval_seconds": 60}"#).unwrap();
        let config = EngineConfig::load(Some(&path)).unwrap();
        assert_eq!(config.scan_interval_seconds, 60);
        assert!(config.paper_trading_enabled);
    }
}
