// Scan-loop driver: the engine's heartbeat. Grounded on `regime`'s polling
// loop shape (fetch -> evaluate -> act -> sleep), generalized into the full
// refresh -> detect -> gate -> fill -> exit -> snapshot cycle the runtime
// context's subsystems are wired for.

use crate::context::RuntimeContext;
use crate::domain::{
    ActivityEvent, ConsensusPrice, ControlState, Position, PriceQuote, RollingMetrics, Side,
};
use crate::gate::GateContext;
use crate::observability;
use crate::observer::ObserverEvent;
use crate::selector::StrategyWeekSummary;
use crate::snapshot::{EngineSnapshot, SourceHealthSnapshot, SNAPSHOT_SCHEMA_VERSION};
use crate::sources::{MarketLister, MarketPricer, Pricer};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Runs the scan loop until `shutdown` reports `true`. Each iteration writes
/// a fresh snapshot and sleeps for `scan_interval_seconds`, but the sleep is
/// itself interruptible so Ctrl+C is honored mid-cycle rather than only
/// between cycles.
pub async fn run(ctx: Arc<RuntimeContext>, mut shutdown: watch::Receiver<bool>) {
    let mut cycle_id: u64 = 0;
    let mut week_start = Utc::now();
    let mut day_start = Utc::now().date_naive();

    loop {
        if *shutdown.borrow() {
            break;
        }

        cycle_id += 1;
        let cycle_started = Utc::now();
        let _timer = observability::LatencyTimer::start("cycle");

        if cycle_started.date_naive() != day_start {
            for strategy_name in ctx.strategy_manager.strategy_names() {
                ctx.strategy_manager
                    .with_tracker_mut(&strategy_name, |tracker| tracker.reset_daily_pnl());
            }
            day_start = cycle_started.date_naive();
        }

        let cycle_result = run_cycle(&ctx, cycle_id, cycle_started).await;
        if let Err(e) = &cycle_result {
            error!(cycle_id, error = %e, "cycle failed");
            observability::record_error("cycle_failure");
            ctx.activity_log.record(ActivityEvent::Error {
                timestamp: Utc::now(),
                kind: "cycle_failure".to_string(),
                msg: e.to_string(),
            });
        }

        let duration_ms = Utc::now()
            .signed_duration_since(cycle_started)
            .num_milliseconds();
        observability::record_cycle_duration_ms(duration_ms as f64);
        ctx.activity_log.record(ActivityEvent::CycleEnded {
            timestamp: Utc::now(),
            cycle_id,
            duration_ms,
        });

        // Scenario C: the kill switch is the only control-plane signal that
        // stops the driver itself, not just new opens. The current step
        // (whichever was in flight) has already finished above; nothing
        // further is submitted and the loop exits after this snapshot.
        if ctx.control.current().kill_active {
            warn!(cycle_id, "kill switch active, shutting down driver loop");
            ctx.activity_log.record(ActivityEvent::Error {
                timestamp: Utc::now(),
                kind: "kill_activated".to_string(),
                msg: ctx
                    .control
                    .current()
                    .kill_reason
                    .unwrap_or_else(|| "kill switch activated".to_string()),
            });
            write_snapshot(&ctx, "killed", cycle_started, duration_ms);
            break;
        }

        if Utc::now().signed_duration_since(week_start) >= chrono::Duration::weeks(1) {
            run_weekly_reallocation(&ctx).await;
            week_start = Utc::now();
        }

        write_snapshot(&ctx, "running", cycle_started, duration_ms);

        tokio::select! {
            _ = tokio::time::sleep(std::time::Duration::from_secs(ctx.config.scan_interval_seconds)) => {}
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    write_snapshot(&ctx, "stopped", Utc::now(), 0);
    info!("driver loop exited");
}

async fn run_cycle(ctx: &RuntimeContext, cycle_id: u64, now: DateTime<Utc>) -> anyhow::Result<()> {
    ctx.control.reload();
    let control = ctx.control.current();
    ctx.activity_log
        .record(ActivityEvent::CycleStarted { timestamp: now, cycle_id });

    if control.kill_active {
        warn!(cycle_id, "control kill active, skipping cycle body");
        return Ok(());
    }

    run_health_checks(ctx, now);

    refresh_markets(ctx, now).await;
    let consensus_prices = refresh_crypto_prices(ctx).await;
    feed_detector_histories(ctx);

    let markets = ctx.market_cache.all_active();
    ctx.activity_log.record(ActivityEvent::MarketsFetched {
        timestamp: now,
        count: markets.len(),
    });

    let opportunities_by_strategy = ctx
        .strategy_manager
        .run_all(&markets, &consensus_prices, now);
    for (strategy_name, opportunities) in opportunities_by_strategy {
        for opportunity in opportunities {
            process_opportunity(ctx, &strategy_name, opportunity, &consensus_prices, &control, now).await;
        }
    }

    evaluate_exits(ctx, now);
    Ok(())
}

async fn refresh_markets(ctx: &RuntimeContext, now: DateTime<Utc>) {
    let result = ctx
        .market_lister
        .list_active(
            ctx.config.markets.min_liquidity_usd,
            ctx.config.markets.min_volume_24h_usd,
            &ctx.config.markets.keywords,
            &ctx.config.markets.exclude_keywords,
        )
        .await;

    match result {
        Ok(markets) => {
            ctx.health_registry.record(ctx.market_lister.name(), true);
            observability::record_source_call(ctx.market_lister.name(), "ok");
            ctx.market_cache.refresh_active_set(markets, now);
        }
        Err(e) => {
            ctx.health_registry.record(ctx.market_lister.name(), false);
            observability::record_source_call(ctx.market_lister.name(), "error");
            observability::record_error(e.kind());
            warn!(error = %e, "market refresh failed, continuing with cached markets");
        }
    }
}

/// Fetches crypto quotes from both configured pricers and folds them into a
/// per-symbol consensus. A source that errors is recorded unhealthy but
/// never aborts the cycle — the aggregator is built to work with whatever
/// subset of sources actually answered.
async fn refresh_crypto_prices(ctx: &RuntimeContext) -> HashMap<String, ConsensusPrice> {
    let symbols = &ctx.config.symbols;
    let mut quotes_by_symbol: HashMap<String, Vec<PriceQuote>> = HashMap::new();

    for pricer in [&ctx.crypto_primary, &ctx.crypto_fallback] {
        match pricer.get_prices(symbols).await {
            Ok(quotes) => {
                ctx.health_registry.record(pricer.name(), true);
                observability::record_source_call(pricer.name(), "ok");
                for quote in quotes {
                    quotes_by_symbol.entry(quote.symbol.clone()).or_default().push(quote);
                }
            }
            Err(e) => {
                ctx.health_registry.record(pricer.name(), false);
                observability::record_source_call(pricer.name(), "error");
                observability::record_error(e.kind());
                warn!(source = pricer.name(), error = %e, "crypto price fetch failed");
            }
        }
    }

    let mut consensus_prices = HashMap::new();
    for symbol in symbols {
        let quotes = quotes_by_symbol.remove(symbol).unwrap_or_default();
        if let Some(consensus) = ctx.price_aggregator.compute(symbol, &quotes) {
            consensus_prices.insert(symbol.clone(), consensus);
        }
    }
    consensus_prices
}

/// Feeds every active market's current YES price into the strategy
/// manager's detectors, so momentum/mean-reversion/statistical-arb can
/// accumulate the rolling history `detect()` reads on the next cycle.
fn feed_detector_histories(ctx: &RuntimeContext) {
    for market in ctx.market_cache.all_active() {
        if let Some(yes_price) = market.price_for("YES") {
            ctx.strategy_manager.record_price_update(&market.market_id, yes_price);
        }
    }
}

async fn process_opportunity(
    ctx: &RuntimeContext,
    strategy_name: &str,
    opportunity: crate::domain::Opportunity,
    consensus_prices: &HashMap<String, ConsensusPrice>,
    control: &ControlState,
    now: DateTime<Utc>,
) {
    ctx.opportunity_log.record(&opportunity);
    observability::record_opportunity_detected(strategy_name);
    ctx.activity_log.record(ActivityEvent::OpportunityFound {
        timestamp: now,
        strategy_name: strategy_name.to_string(),
        market_id: opportunity.market_id.clone(),
        edge_bps: opportunity.edge_bps,
    });

    let Some(mut market) = ctx.market_cache.get(&opportunity.market_id) else {
        warn!(market_id = %opportunity.market_id, "opportunity references a market no longer in cache");
        return;
    };

    // Read a fresher order-book snapshot right before the trade would fire,
    // rather than trusting the lister's last full-sweep snapshot.
    match ctx.market_pricer.get_market_prices(&opportunity.market_id).await {
        Ok(prices) if !prices.is_empty() => {
            ctx.health_registry.record(ctx.market_pricer.name(), true);
            market.prices = prices;
            market.last_updated_at = now;
            ctx.market_cache.put(market.clone());
        }
        Ok(_) => {}
        Err(e) => {
            ctx.health_registry.record(ctx.market_pricer.name(), false);
            observability::record_error(e.kind());
            warn!(market_id = %opportunity.market_id, error = %e, "market pricer refresh failed, using cached prices");
        }
    }

    let Some(meta) = ctx.strategy_manager.meta(strategy_name) else {
        return;
    };

    let consensus = opportunity
        .rationale
        .get("symbol")
        .and_then(|v| v.as_str())
        .and_then(|symbol| consensus_prices.get(symbol));

    let gate_ctx = GateContext {
        opportunity: &opportunity,
        market: &market,
        consensus,
        strategy: &meta,
        control,
        now,
    };
    let (allowed, reason) = ctx.gate.may_execute(&gate_ctx);
    if !allowed {
        if let Some(reason) = reason {
            observability::record_gate_denial(reason.as_str());
        }
        return;
    }

    let result = ctx.strategy_manager.with_tracker_mut(strategy_name, |tracker| {
        ctx.paper_engine.place(
            tracker,
            strategy_name,
            &opportunity.market_id,
            opportunity.side,
            opportunity.id,
            opportunity.reference_price,
            opportunity.size_usd,
        )
    });

    match result {
        Some(Ok(trade)) => {
            observability::record_trade_filled(strategy_name);
            ctx.trade_log.record(&trade);
            let event = ActivityEvent::TradeExecuted {
                timestamp: now,
                trade_id: trade.trade_id,
                strategy_name: strategy_name.to_string(),
            };
            ctx.activity_log.record(event.clone());
            ctx.observer_hub.publish(ObserverEvent::Activity(event));
        }
        Some(Err(e)) => {
            observability::record_error("execution_rejected");
            ctx.activity_log.record(ActivityEvent::Error {
                timestamp: now,
                kind: "execution_rejected".to_string(),
                msg: e.to_string(),
            });
        }
        None => {
            warn!(strategy_name, "strategy vanished between detect and fill");
        }
    }
}

/// Marks up a position's mark price by side: `Pair` positions (arbitrage)
/// were bought on the YES+NO sum, so they mark against that same sum;
/// single-sided positions mark against their own outcome's current price.
fn mark_price_for_side(side: Side, market: &crate::domain::Market) -> Option<Decimal> {
    match side {
        Side::Pair => Some(market.price_sum()),
        Side::Yes => market.price_for("YES"),
        Side::No => market.price_for("NO"),
    }
}

/// Evaluates every open position against its strategy's profit target, stop
/// loss, max hold duration, and time-to-close, closing any that trip.
/// Exits run unconditionally — paused/killed only stops *opening* new risk,
/// it must never trap a strategy in a position it can no longer close.
fn evaluate_exits(ctx: &RuntimeContext, now: DateTime<Utc>) {
    for strategy_name in ctx.strategy_manager.strategy_names() {
        let strategy_config = ctx
            .config
            .strategies
            .get(&strategy_name)
            .cloned()
            .unwrap_or_default();

        let closed = ctx.strategy_manager.with_tracker_mut(&strategy_name, |tracker| {
            let mut closed_trades = Vec::new();
            let positions: Vec<Position> = tracker.open_positions().to_vec();

            for position in positions {
                let Some(market) = ctx.market_cache.get(&position.market_id) else {
                    continue;
                };
                let Some(mark_price) = mark_price_for_side(position.side, &market) else {
                    continue;
                };

                let pct_change = ((mark_price - position.avg_entry_price) / position.avg_entry_price)
                    .to_f64()
                    .unwrap_or(0.0);
                let held_minutes = now.signed_duration_since(position.opened_at).num_minutes();
                let closes_soon = market.end_time.signed_duration_since(now) <= chrono::Duration::zero();

                let reason = if pct_change >= strategy_config.profit_target_pct {
                    Some("take_profit")
                } else if pct_change <= -strategy_config.stop_loss_pct {
                    Some("stop_loss")
                } else if held_minutes >= strategy_config.max_hold_minutes {
                    Some("max_hold")
                } else if closes_soon {
                    Some("expiry")
                } else {
                    None
                };

                let Some(reason) = reason else {
                    continue;
                };
                let Some(trade) = tracker.find_open_trade(&position.market_id, position.side) else {
                    continue;
                };
                let closed_trade =
                    ctx.paper_engine.close(tracker, trade, &position.market_id, position.side, mark_price, reason);
                closed_trades.push(closed_trade);
            }

            closed_trades
        });

        for trade in closed.into_iter().flatten() {
            let reason = trade.close_reason.as_deref().unwrap_or("unknown");
            observability::record_trade_closed(&strategy_name, reason);
            ctx.trade_log.record(&trade);
            let event = ActivityEvent::TradeClosed {
                timestamp: now,
                trade_id: trade.trade_id,
                strategy_name: strategy_name.clone(),
                realized_pnl_usd: trade.realized_pnl_usd,
            };
            ctx.activity_log.record(event.clone());
            ctx.observer_hub.publish(ObserverEvent::Activity(event));
        }
    }
}

fn run_health_checks(ctx: &RuntimeContext, now: DateTime<Utc>) {
    let scan_interval = ctx.config.scan_interval_seconds;
    let mark_price_for = mark_price_for_market(ctx);

    for strategy_name in ctx.strategy_manager.strategy_names() {
        let Some(meta) = ctx.strategy_manager.meta(&strategy_name) else {
            continue;
        };
        if !meta.enabled {
            continue;
        }

        let starting_capital = ctx.starting_capital_for(&strategy_name);
        let Some((metrics, daily_pnl)) = ctx.strategy_manager.with_tracker(&strategy_name, |tracker| {
            (tracker.metrics(scan_interval, &mark_price_for), tracker.daily_pnl_usd())
        }) else {
            continue;
        };

        if let Some(reason) = ctx
            .health_monitor
            .evaluate(&strategy_name, &metrics, daily_pnl, starting_capital)
        {
            ctx.strategy_manager.disable(&strategy_name, reason.clone());
            observability::record_error("strategy_auto_disabled");
            ctx.activity_log.record(ActivityEvent::Error {
                timestamp: now,
                kind: "strategy_auto_disabled".to_string(),
                msg: format!("{strategy_name}: {reason}"),
            });
            ctx.observer_hub.publish(ObserverEvent::StrategyStatusChanged {
                strategy_name: strategy_name.clone(),
                enabled: false,
                paused: meta.paused,
            });
            ctx.observer_hub.publish(ObserverEvent::Alert {
                message: format!("strategy {strategy_name} auto-disabled: {reason}"),
                severity: "critical".to_string(),
            });
        }
    }
}

/// Mark price lookup shared by the snapshot writer, health checks, and the
/// weekly selector: approximates every position's mark by its market's YES
/// price (falling back to the price sum for two-sided markets), since
/// `equity`/`metrics` take a single `market_id -> price` function with no
/// side parameter.
fn mark_price_for_market(ctx: &RuntimeContext) -> impl Fn(&str) -> Option<Decimal> + '_ {
    move |market_id: &str| {
        ctx.market_cache
            .get(market_id)
            .and_then(|m| m.price_for("YES").or_else(|| Some(m.price_sum())))
    }
}

fn write_snapshot(
    ctx: &RuntimeContext,
    driver_status: &str,
    last_cycle_started_at: DateTime<Utc>,
    last_cycle_duration_ms: i64,
) {
    let scan_interval = ctx.config.scan_interval_seconds;
    let mark_price_for = mark_price_for_market(ctx);

    let mut per_strategy = Vec::new();
    let mut aggregate_cash = Decimal::ZERO;
    let mut aggregate_equity = Decimal::ZERO;
    let mut aggregate_daily_pnl = Decimal::ZERO;
    let mut aggregate_positions = Vec::new();
    let mut total_trades: u32 = 0;
    let mut win_rate_weighted = 0.0;
    let mut sharpe_weighted = 0.0;
    let mut max_drawdown = 0.0_f64;
    let mut consecutive_losses: u32 = 0;

    for strategy_name in ctx.strategy_manager.strategy_names() {
        let Some(snapshot) = ctx.strategy_manager.with_tracker(&strategy_name, |tracker| {
            let equity = tracker.equity(&mark_price_for);
            crate::domain::PortfolioSnapshot {
                strategy_name: strategy_name.clone(),
                cash_usd: tracker.cash_usd(),
                positions: tracker.open_positions().to_vec(),
                equity_usd: equity,
                daily_pnl_usd: tracker.daily_pnl_usd(),
                metrics: tracker.metrics(scan_interval, &mark_price_for),
            }
        }) else {
            continue;
        };

        aggregate_cash += snapshot.cash_usd;
        aggregate_equity += snapshot.equity_usd;
        aggregate_daily_pnl += snapshot.daily_pnl_usd;
        aggregate_positions.extend(snapshot.positions.clone());
        if snapshot.metrics.total_trades > 0 {
            win_rate_weighted += snapshot.metrics.win_rate * snapshot.metrics.total_trades as f64;
            sharpe_weighted += snapshot.metrics.sharpe * snapshot.metrics.total_trades as f64;
        }
        total_trades += snapshot.metrics.total_trades;
        max_drawdown = max_drawdown.max(snapshot.metrics.max_drawdown);
        consecutive_losses = consecutive_losses.max(snapshot.metrics.consecutive_losses);
        per_strategy.push(snapshot);
    }

    let aggregate_metrics = RollingMetrics {
        win_rate: if total_trades > 0 { win_rate_weighted / total_trades as f64 } else { 0.0 },
        sharpe: if total_trades > 0 { sharpe_weighted / total_trades as f64 } else { 0.0 },
        sharpe_trades_per_year: 0.0,
        max_drawdown,
        consecutive_losses,
        total_trades,
    };

    let source_health = ctx
        .health_registry
        .snapshot()
        .into_iter()
        .map(|(source, status)| SourceHealthSnapshot { source, status: status.as_str().to_string() })
        .collect();

    let snapshot = EngineSnapshot {
        schema_version: SNAPSHOT_SCHEMA_VERSION,
        driver_status: driver_status.to_string(),
        aggregate: crate::domain::PortfolioSnapshot {
            strategy_name: "aggregate".to_string(),
            cash_usd: aggregate_cash,
            positions: aggregate_positions,
            equity_usd: aggregate_equity,
            daily_pnl_usd: aggregate_daily_pnl,
            metrics: aggregate_metrics,
        },
        per_strategy,
        control: ctx.control.current(),
        last_cycle_started_at,
        last_cycle_duration_ms,
        market_count: ctx.market_cache.len(),
        source_health,
        extra: serde_json::Map::new(),
    };

    ctx.snapshot_writer.write(&snapshot);
    ctx.observer_hub.publish(ObserverEvent::PortfolioUpdated {
        strategy_name: "aggregate".to_string(),
        equity_usd: aggregate_equity.to_string(),
    });
}

/// Scores every strategy's trailing week and proposes a reallocation.
/// Applies it only when `auto_reallocation` is on; otherwise the proposal is
/// only published for observers, exactly as `selector.rs` documents.
async fn run_weekly_reallocation(ctx: &RuntimeContext) {
    let scan_interval = ctx.config.scan_interval_seconds;
    let mark_price_for = mark_price_for_market(ctx);

    let summaries: Vec<StrategyWeekSummary> = ctx
        .strategy_manager
        .strategy_names()
        .into_iter()
        .filter_map(|strategy_name| {
            ctx.strategy_manager.with_tracker(&strategy_name, |tracker| {
                let equity = tracker.equity(&mark_price_for);
                StrategyWeekSummary {
                    strategy_name: strategy_name.clone(),
                    total_return_pct: tracker.total_return_pct(equity),
                    metrics: tracker.metrics(scan_interval, &mark_price_for),
                }
            })
        })
        .collect();

    let proposal = ctx.selector.propose(&summaries);
    info!(qualified = ?proposal.qualified, "weekly reallocation proposal computed");

    let applied = if ctx.config.auto_reallocation && !proposal.allocations.is_empty() {
        let allocation_map: HashMap<String, f64> = proposal
            .allocations
            .iter()
            .filter_map(|(name, weight)| weight.to_f64().map(|w| (name.clone(), w)))
            .collect();
        match ctx.strategy_manager.rebalance(&allocation_map) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "weekly reallocation rejected");
                false
            }
        }
    } else {
        false
    };

    ctx.observer_hub.publish(ObserverEvent::ReallocationProposed {
        allocations: proposal.allocations,
        qualified: proposal.qualified,
        applied,
    });
}
