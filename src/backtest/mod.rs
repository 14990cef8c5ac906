pub mod metrics;
pub mod monte_carlo;
pub mod result;

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use uuid::Uuid;

use crate::config::ModeConfig;
use crate::data_provider::{BacktestDataProvider, DataProvider};
use crate::engine::{Engine, EngineConfig};
use crate::event_log::EventLog;
use crate::execution::ExecutionConfig;
use crate::model::{PositionKey, PositionType, Status, Timestamp, Venue};
use crate::venue::{BacktestVenue, VenueInterface};

use metrics::BacktestMetrics;
use result::BacktestResult;

/// Configuration for a backtest run (§6 "Mode configuration" + CLI surface).
pub struct BacktestConfig {
    pub mode: ModeConfig,
    pub data_dir: PathBuf,
    pub run_dir: PathBuf,
    pub reference_asset: String,
    pub capital: f64,
    pub seed: u64,
    pub verbose: bool,
    pub output: Option<PathBuf>,
    pub start: Option<Timestamp>,
    pub end: Option<Timestamp>,
    pub execution: ExecutionConfig,
    pub monte_carlo: Option<monte_carlo::MonteCarloConfig>,
}

/// Run a backtest from the CLI.
pub async fn run(config: &BacktestConfig) -> Result<()> {
    let historical = run_single_backtest(config).await?;

    if let Some(ref mc_config) = config.monte_carlo {
        BacktestResult::print_table(&[historical.clone()]);
        let mc_result = monte_carlo::run(config, mc_config, historical).await?;
        monte_carlo::print_results(&mc_result);
    } else {
        BacktestResult::print_table(&[historical.clone()]);
    }

    if let Some(ref output_path) = config.output {
        let json = serde_json::to_string_pretty(&historical).context("serializing result")?;
        std::fs::write(output_path, json)
            .with_context(|| format!("writing {}", output_path.display()))?;
    }

    Ok(())
}

/// Run a single backtest and return the result (used by both historical and
/// Monte Carlo paths — grounded in the teacher's `run_single_backtest`).
pub async fn run_single_backtest(config: &BacktestConfig) -> Result<BacktestResult> {
    config
        .mode
        .validate()
        .map_err(|errors| {
            let msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            anyhow::anyhow!("mode config validation failed:\n  {}", msgs.join("\n  "))
        })?;

    let data_provider =
        BacktestDataProvider::load(&config.data_dir).context("loading backtest data")?;
    let mut timestamps = data_provider.available_timestamps();
    timestamps.sort_unstable();
    timestamps.dedup();
    let start = config.start.unwrap_or_else(|| timestamps.first().copied().unwrap_or(0));
    let end = config.end.unwrap_or_else(|| timestamps.last().copied().unwrap_or(0));
    let periods_per_year = estimate_periods_per_year(&timestamps);

    let engine_config = EngineConfig {
        reference_asset: config.reference_asset.clone(),
        share_class_asset: config.mode.share_class().asset().to_string(),
        risk_thresholds: config.mode.risk_thresholds(),
        execution: config.execution,
    };

    let venues = build_venues(config.seed);
    let event_log = EventLog::new(config.run_dir.clone(), Uuid::new_v4(), 4096);

    let mut engine = Engine::new(
        engine_config,
        config.mode.clone(),
        venues,
        Box::new(data_provider),
        event_log,
    );

    seed_wallet(&mut engine, config.capital, config.mode.share_class().asset(), start)?;

    if config.verbose {
        println!("[backtest] {} ticks from {} to {}", timestamps.len(), start, end);
    }

    let outcomes = engine.run_backtest(start, end).await.context("backtest run")?;
    engine.shutdown().await;

    let mut bt_metrics = BacktestMetrics::new(config.capital, periods_per_year);
    bt_metrics.record_tick(config.capital);

    let mut rebalances = 0u32;
    let mut critical_risk_ticks = 0u32;
    let mut yield_pnl = 0.0;
    let mut funding_pnl = 0.0;
    let mut price_pnl = 0.0;
    let mut fees_pnl = 0.0;

    for outcome in &outcomes {
        bt_metrics.record_tick(outcome.exposure.total_value.raw());
        if outcome.orders_emitted > 0 {
            rebalances += 1;
        }
        if outcome.risk.overall_status == Status::Critical {
            critical_risk_ticks += 1;
        }
        yield_pnl += outcome.pnl.attribution.yield_pnl;
        funding_pnl += outcome.pnl.attribution.funding_pnl;
        price_pnl += outcome.pnl.attribution.price_pnl;
        fees_pnl += outcome.pnl.attribution.fees_pnl;
    }

    Ok(bt_metrics.finalize(
        config.mode.name().to_string(),
        config.capital,
        rebalances,
        critical_risk_ticks,
        yield_pnl,
        funding_pnl,
        price_pnl,
        fees_pnl,
    ))
}

/// Seed the wallet with initial capital, in the mode's share-class asset.
fn seed_wallet(engine: &mut Engine, capital: f64, asset: &str, timestamp: Timestamp) -> Result<()> {
    engine
        .position_store_mut()
        .apply(
            &[(PositionKey::new(Venue::Wallet, PositionType::BaseToken, asset), capital)],
            "initial_capital",
            timestamp,
        )
        .context("seeding initial capital")?;
    Ok(())
}

/// One `BacktestVenue` per venue the model knows about; cost model is
/// uniform across modes since no mode config distinguishes per-venue fees.
pub(crate) fn build_venues(seed: u64) -> HashMap<String, Box<dyn VenueInterface>> {
    let all_venues = [
        Venue::AaveV3,
        Venue::Morpho,
        Venue::EtherFi,
        Venue::Lido,
        Venue::Binance,
        Venue::Bybit,
        Venue::Okx,
        Venue::Wallet,
    ];
    all_venues
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let venue: Box<dyn VenueInterface> = Box::new(BacktestVenue::new(seed.wrapping_add(i as u64)));
            (v.to_string(), venue)
        })
        .collect()
}

/// Periods-per-year from the median gap between consecutive timestamps,
/// falling back to daily cadence when there isn't enough history to infer one.
fn estimate_periods_per_year(timestamps: &[u64]) -> f64 {
    if timestamps.len() < 2 {
        return 365.0;
    }
    let mut gaps: Vec<u64> = timestamps
        .windows(2)
        .map(|w| w[1].saturating_sub(w[0]))
        .filter(|&g| g > 0)
        .collect();
    if gaps.is_empty() {
        return 365.0;
    }
    gaps.sort_unstable();
    let median = gaps[gaps.len() / 2] as f64;
    const SECONDS_PER_YEAR: f64 = 365.0 * 86_400.0;
    (SECONDS_PER_YEAR / median).max(1.0)
}
