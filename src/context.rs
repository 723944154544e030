// Runtime wiring: builds every long-lived subsystem once at startup and
// hands the driver loop a single `Arc<RuntimeContext>` to share across
// tasks. Grounded on `app_state::AppState`'s role as the one shared handle
// threaded through the teacher's request handlers and background tasks,
// but built from constructor calls rather than a global singleton so tests
// can stand up an isolated context against a temp directory.

use crate::config::{EngineConfig, StrategyConfig};
use crate::control::ControlChannel;
use crate::gate::ExecutionGate;
use crate::health::{HealthMonitor, HealthMonitorConfig};
use crate::journal::{ActivityLog, OpportunityLog, TradeLog};
use crate::markets::MarketCache;
use crate::observability::HealthRegistry;
use crate::observer::ObserverHub;
use crate::paper_engine::PaperTradingEngine;
use crate::pricing::aggregator::AggregatorConfig;
use crate::pricing::PriceAggregator;
use crate::rate_limit::RateLimiterRegistry;
use crate::selector::{QualificationThresholds, WeeklySelector};
use crate::snapshot::SnapshotWriter;
use crate::sources::{
    FallbackCryptoPricer, MarketLister, MarketListerClient, MarketPricer, MarketPricerClient,
    PrimaryCryptoPricer, Pricer,
};
use crate::strategies::{arbitrage, mean_reversion, momentum, reality_arbitrage, statistical_arb, DetectorThresholds};
use crate::strategy_manager::StrategyManager;
use crate::validator::{DataValidator, ValidatorConfig};
use rust_decimal::prelude::ToPrimitive;
use std::sync::Arc;

/// Everything the scan loop needs, constructed once from `EngineConfig` and
/// shared (via `Arc`) with the API server and the Ctrl+C shutdown path.
pub struct RuntimeContext {
    pub config: EngineConfig,
    pub rate_limiter: Arc<RateLimiterRegistry>,
    pub market_cache: Arc<MarketCache>,
    pub price_aggregator: Arc<PriceAggregator>,
    pub strategy_manager: Arc<StrategyManager>,
    pub gate: Arc<ExecutionGate>,
    pub paper_engine: Arc<PaperTradingEngine>,
    pub control: Arc<ControlChannel>,
    pub health_monitor: Arc<HealthMonitor>,
    pub selector: Arc<WeeklySelector>,
    pub trade_log: Arc<TradeLog>,
    pub activity_log: Arc<ActivityLog>,
    pub opportunity_log: Arc<OpportunityLog>,
    pub snapshot_writer: Arc<SnapshotWriter>,
    pub observer_hub: Arc<ObserverHub>,
    pub health_registry: Arc<HealthRegistry>,
    pub crypto_primary: Arc<dyn Pricer>,
    pub crypto_fallback: Arc<dyn Pricer>,
    pub market_lister: Arc<dyn MarketLister>,
    pub market_pricer: Arc<dyn MarketPricer>,
}

fn strategy_config_for<'a>(config: &'a EngineConfig, name: &str) -> StrategyConfig {
    config
        .strategies
        .get(name)
        .cloned()
        .unwrap_or_default()
}

fn detector_thresholds_for(strategy: &StrategyConfig) -> DetectorThresholds {
    DetectorThresholds {
        min_edge_bps: strategy.min_edge_bps,
        max_trade_size: strategy.max_trade_size_usd,
        min_liquidity_usd: strategy.min_liquidity_usd,
    }
}

impl RuntimeContext {
    pub fn build(config: EngineConfig) -> anyhow::Result<Self> {
        let rate_limiter = Arc::new(RateLimiterRegistry::new());

        for (source, limit) in &config.sources.rate_limits {
            rate_limiter.configure(source, limit.burst, limit.per_minute);
        }

        let crypto_primary_url = config
            .sources
            .crypto_primary_base_url
            .clone()
            .unwrap_or_else(|| "https://api.binance.com/api/v3".to_string());
        let crypto_fallback_url = config
            .sources
            .crypto_fallback_base_url
            .clone()
            .unwrap_or_else(|| "https://api.coingecko.com/api/v3".to_string());
        let lister_url = config
            .sources
            .prediction_market_lister_base_url
            .clone()
            .unwrap_or_else(|| "https://gamma-api.polymarket.com".to_string());
        let pricer_url = config
            .sources
            .prediction_market_pricer_base_url
            .clone()
            .unwrap_or_else(|| "https://clob.polymarket.com".to_string());

        let crypto_primary: Arc<dyn Pricer> = Arc::new(PrimaryCryptoPricer::new(crypto_primary_url, rate_limiter.clone()));
        let crypto_fallback: Arc<dyn Pricer> = Arc::new(FallbackCryptoPricer::new(crypto_fallback_url, rate_limiter.clone()));
        let market_lister: Arc<dyn MarketLister> = Arc::new(MarketListerClient::new(lister_url, rate_limiter.clone()));
        let market_pricer: Arc<dyn MarketPricer> = Arc::new(MarketPricerClient::new(pricer_url, rate_limiter.clone()));

        let market_cache = Arc::new(MarketCache::new());
        let price_aggregator = Arc::new(PriceAggregator::new(AggregatorConfig {
            staleness_ms: config.price_staleness_ms as i64,
            outlier_threshold: config.outlier_threshold,
            configured_source_count: 2,
        }));

        let validator = DataValidator::new(ValidatorConfig {
            freshness_ms: config.execution_gate.freshness_ms as i64,
            discrepancy_pct: config.execution_gate.price_discrepancy_pct,
            min_liquidity_usd: config.markets.min_liquidity_usd,
            min_time_to_close: chrono::Duration::minutes(config.execution_gate.min_time_to_close_minutes),
        });
        let gate = Arc::new(ExecutionGate::new(config.paper_trading_enabled, config.kill_switch, validator));

        let paper_engine = Arc::new(PaperTradingEngine::new(config.execution_gate.slippage_bps));

        let control = Arc::new(ControlChannel::new(config.control_path.clone()));
        control.reload();

        let health_monitor = Arc::new(HealthMonitor::new(HealthMonitorConfig {
            daily_loss_pct: config.health.daily_loss_pct,
            consecutive_losses: config.health.consecutive_losses,
            max_drawdown_pct: config.health.max_drawdown_pct,
            min_win_rate: config.health.min_win_rate,
            min_trades_for_winrate: config.health.min_trades_for_winrate,
        }));

        let selector = Arc::new(WeeklySelector::new(QualificationThresholds::default()));

        let trade_log = Arc::new(TradeLog::new(config.logs_dir.join("trades.stream")));
        let activity_log = Arc::new(ActivityLog::new(config.logs_dir.join("activity.stream"), config.activity_log_max_entries));
        let opportunity_log = Arc::new(OpportunityLog::new(config.logs_dir.join("opportunities.stream")));

        let snapshot_writer = Arc::new(SnapshotWriter::new(config.snapshot_path.clone()));
        let observer_hub = Arc::new(ObserverHub::new(config.observer_backlog_per_subscriber));
        let health_registry = Arc::new(HealthRegistry::new());

        let strategy_manager = Arc::new(StrategyManager::new());
        register_strategies(&strategy_manager, &config);

        Ok(RuntimeContext {
            config,
            rate_limiter,
            market_cache,
            price_aggregator,
            strategy_manager,
            gate,
            paper_engine,
            control,
            health_monitor,
            selector,
            trade_log,
            activity_log,
            opportunity_log,
            snapshot_writer,
            observer_hub,
            health_registry,
            crypto_primary,
            crypto_fallback,
            market_lister,
            market_pricer,
        })
    }

    /// Per-strategy starting capital: `starting_capital_usd * allocation`.
    /// Falls back to an even split across registered strategies when a
    /// strategy is missing from `strategy_allocations`.
    pub fn starting_capital_for(&self, strategy_name: &str) -> rust_decimal::Decimal {
        let allocation = self
            .config
            .strategy_allocations
            .get(strategy_name)
            .copied()
            .unwrap_or_else(|| {
                let count = self.config.strategies.len().max(1) as i64;
                rust_decimal::Decimal::ONE / rust_decimal::Decimal::new(count, 0)
            });
        self.config.starting_capital_usd * allocation
    }
}

fn register_strategies(manager: &StrategyManager, config: &EngineConfig) {
    let names = ["arbitrage", "momentum", "mean_reversion", "reality_arbitrage", "statistical_arb"];
    for name in names {
        let strategy_config = strategy_config_for(config, name);
        if !strategy_config.enabled {
            continue;
        }
        let thresholds = detector_thresholds_for(&strategy_config);
        let allocation = config
            .strategy_allocations
            .get(name)
            .and_then(|d| d.to_f64())
            .unwrap_or(0.0);
        let starting_capital = config.starting_capital_usd * config.strategy_allocations.get(name).copied().unwrap_or_default();

        let detector: Arc<dyn crate::strategies::OpportunityDetector> = match name {
            "arbitrage" => Arc::new(arbitrage::ArbitrageDetector::new(strategy_config.margin_floor)),
            "momentum" => Arc::new(momentum::MomentumDetector::new(strategy_config.volume_percentile_floor)),
            "mean_reversion" => Arc::new(mean_reversion::MeanReversionDetector::new(
                strategy_config.z_score_threshold,
                strategy_config.max_spread_pct,
            )),
            "reality_arbitrage" => Arc::new(reality_arbitrage::RealityArbitrageDetector {
                min_profit_pct: strategy_config.min_profit_pct,
                min_confidence: strategy_config.min_confidence,
                symbols: config.symbols.clone(),
            }),
            "statistical_arb" => Arc::new(statistical_arb::StatisticalArbDetector::new(
                strategy_config.pairs.clone(),
                strategy_config.z_score_threshold,
                strategy_config.min_correlation,
            )),
            _ => unreachable!(),
        };

        manager.register(name, detector, thresholds, strategy_config.max_opens_per_cycle, starting_capital, allocation);
    }
}
