use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use rand::prelude::*;

use crate::data_provider::{load_manifest, DataKind};

use super::result::BacktestResult;

/// Configuration for Monte Carlo simulation.
pub struct MonteCarloConfig {
    pub n_simulations: u32,
    pub block_size: usize,
    pub gbm_vol_scale: f64,
}

/// Monte Carlo results: historical baseline + all simulation results.
pub struct MonteCarloResult {
    pub historical: BacktestResult,
    pub simulations: Vec<BacktestResult>,
}

// ── Public API ────────────────────────────────────────────────────────

/// Run Monte Carlo simulations alongside the historical backtest: each run
/// resamples the market-data CSVs via block bootstrap + GBM perturbation
/// and re-drives the engine against the resampled series.
pub async fn run(
    config: &super::BacktestConfig,
    mc_config: &MonteCarloConfig,
    historical: BacktestResult,
) -> Result<MonteCarloResult> {
    let manifest = load_manifest(&config.data_dir).context("loading data manifest")?;

    let unique_files: HashSet<(String, DataKind)> =
        manifest.iter().map(|e| (e.file.clone(), e.kind)).collect();

    let mut sim_results = Vec::with_capacity(mc_config.n_simulations as usize);
    let pb = indicatif::ProgressBar::new(mc_config.n_simulations as u64);
    pb.set_style(
        indicatif::ProgressStyle::default_bar()
            .template("  Monte Carlo [{bar:40}] {pos}/{len} ({eta})")
            .unwrap(),
    );

    for i in 0..mc_config.n_simulations {
        let sim_seed = config.seed.wrapping_add(i as u64 + 1);

        let temp_dir = std::env::temp_dir().join(format!("basis-engine-mc-{}-{}", config.seed, i));
        std::fs::create_dir_all(&temp_dir)
            .with_context(|| format!("creating temp dir {}", temp_dir.display()))?;

        let mut rng = StdRng::seed_from_u64(sim_seed);
        for (file, kind) in &unique_files {
            resample_csv(
                &config.data_dir.join(file),
                &temp_dir.join(file),
                *kind,
                mc_config.block_size,
                mc_config.gbm_vol_scale,
                &mut rng,
            )
            .with_context(|| format!("resampling {}", file))?;
        }

        std::fs::copy(
            config.data_dir.join("manifest.json"),
            temp_dir.join("manifest.json"),
        )
        .context("copying manifest.json")?;

        let sim_run_dir = config.run_dir.join(format!("mc-{i}"));
        let sim_config = super::BacktestConfig {
            mode: config.mode.clone(),
            data_dir: temp_dir.clone(),
            run_dir: sim_run_dir,
            reference_asset: config.reference_asset.clone(),
            capital: config.capital,
            seed: sim_seed,
            verbose: false,
            output: None,
            start: config.start,
            end: config.end,
            execution: config.execution,
            monte_carlo: None,
        };

        match super::run_single_backtest(&sim_config).await {
            Ok(result) => sim_results.push(result),
            Err(e) => {
                eprintln!("  Warning: simulation {} failed: {}", i + 1, e);
            }
        }

        let _ = std::fs::remove_dir_all(&temp_dir);
        pb.inc(1);
    }
    pb.finish_and_clear();

    Ok(MonteCarloResult {
        historical,
        simulations: sim_results,
    })
}

/// Print Monte Carlo results summary.
pub fn print_results(mc: &MonteCarloResult) {
    let h = &mc.historical;
    let sims = &mc.simulations;

    if sims.is_empty() {
        println!("  No successful simulations.");
        return;
    }

    let mut twrrs: Vec<f64> = sims.iter().map(|r| r.twrr_pct).collect();
    let mut drawdowns: Vec<f64> = sims.iter().map(|r| r.max_drawdown_pct).collect();
    let mut sharpes: Vec<f64> = sims.iter().map(|r| r.sharpe).collect();
    let mut pnls: Vec<f64> = sims.iter().map(|r| r.net_pnl).collect();

    twrrs.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    drawdowns.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    sharpes.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    pnls.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    println!("\n{}", "═".repeat(68));
    println!("  Monte Carlo Results ({} simulations)", sims.len());
    println!("{}", "═".repeat(68));
    println!(
        "  Historical:  TWRR={:+.2}%  MxDD={:.2}%  Sharpe={:.3}",
        h.twrr_pct, h.max_drawdown_pct, h.sharpe
    );
    println!();
    println!(
        "  {:>12}  {:>8}  {:>8}  {:>8}  {:>10}",
        "Percentiles", "TWRR%", "MxDD%", "Sharpe", "NetPnL"
    );
    println!("  {}", "─".repeat(52));

    let pct_levels = [5.0, 25.0, 50.0, 75.0, 95.0];
    let pct_labels = ["5th", "25th", "50th", "75th", "95th"];

    for (label, pct) in pct_labels.iter().zip(pct_levels.iter()) {
        println!(
            "  {:>12}  {:>+8.2}  {:>8.2}  {:>8.3}  {:>+10.0}",
            label,
            percentile(&twrrs, *pct),
            percentile(&drawdowns, *pct),
            percentile(&sharpes, *pct),
            percentile(&pnls, *pct),
        );
    }

    println!();
    let var95 = percentile(&pnls, 5.0);
    let var99 = percentile(&pnls, 1.0);
    println!(
        "  VaR(95%): ${:+.0}   VaR(99%): ${:+.0}",
        var95, var99,
    );
    println!("{}", "═".repeat(68));
}

// ── CSV Resampling ────────────────────────────────────────────────────

/// Resample a single CSV file using block bootstrap + GBM perturbation.
/// Each row is its own period — none of this engine's data kinds group
/// multiple rows under one timestamp the way the old options chain did.
fn resample_csv(
    input_path: &Path,
    output_path: &Path,
    kind: DataKind,
    block_size: usize,
    gbm_vol_scale: f64,
    rng: &mut impl Rng,
) -> Result<()> {
    let mut reader = csv::Reader::from_path(input_path)
        .with_context(|| format!("opening {}", input_path.display()))?;
    let headers = reader.headers()?.clone();
    let records: Vec<csv::StringRecord> = reader
        .records()
        .collect::<Result<_, _>>()
        .with_context(|| format!("reading {}", input_path.display()))?;

    if records.len() < 3 {
        std::fs::copy(input_path, output_path)?;
        return Ok(());
    }

    let n_rows = records.len();
    let price_cols = price_column_indices(&headers, kind);

    let sigmas: Vec<f64> = price_cols
        .iter()
        .map(|&col| compute_volatility(&records, col))
        .collect();

    let bootstrapped_indices = block_bootstrap(n_rows, block_size, rng);

    let gbm_factors: Vec<Vec<f64>> = if gbm_vol_scale > 0.0 && !price_cols.is_empty() {
        sigmas
            .iter()
            .map(|sigma| generate_gbm_factors(n_rows, *sigma * gbm_vol_scale, rng))
            .collect()
    } else {
        price_cols.iter().map(|_| vec![1.0; n_rows]).collect()
    };

    let timestamp_col = headers.iter().position(|h| h == "timestamp");
    let original_timestamps: Vec<String> = records
        .iter()
        .map(|r| timestamp_col.map(|c| r[c].to_string()).unwrap_or_default())
        .collect();

    let mut writer = csv::Writer::from_path(output_path)
        .with_context(|| format!("writing {}", output_path.display()))?;
    writer.write_record(&headers)?;

    for (new_idx, &orig_idx) in bootstrapped_indices.iter().enumerate() {
        let mut fields: Vec<String> = (0..records[orig_idx].len())
            .map(|i| records[orig_idx][i].to_string())
            .collect();

        if let Some(ts_col) = timestamp_col {
            fields[ts_col] = original_timestamps[new_idx].clone();
        }

        for (price_idx, &col) in price_cols.iter().enumerate() {
            if let Ok(price) = fields[col].parse::<f64>() {
                if price > 0.0 {
                    let factor = gbm_factors[price_idx][new_idx];
                    fields[col] = format!("{}", price * factor);
                }
            }
        }

        writer.write_record(&csv::StringRecord::from(fields))?;
    }
    writer.flush()?;

    Ok(())
}

/// Columns that should receive GBM drift. Rate-based data (funding,
/// lending, risk params, staking rewards, ML signals) keeps its values
/// from the block-bootstrap reshuffle only — no independent price model
/// for a rate.
fn price_column_indices(headers: &csv::StringRecord, kind: DataKind) -> Vec<usize> {
    let price_names: &[&str] = match kind {
        DataKind::Price => &["usd_price", "reference_price"],
        DataKind::Oracle => &["price"],
        _ => &[],
    };

    price_names
        .iter()
        .filter_map(|name| headers.iter().position(|h| h == *name))
        .collect()
}

/// Per-row log-return volatility from a price column.
fn compute_volatility(records: &[csv::StringRecord], col: usize) -> f64 {
    let prices: Vec<f64> = records
        .iter()
        .filter_map(|r| r[col].parse::<f64>().ok())
        .filter(|p| *p > 0.0)
        .collect();

    if prices.len() < 3 {
        return 0.01;
    }

    let log_returns: Vec<f64> = prices.windows(2).map(|w| (w[1] / w[0]).ln()).collect();

    let mean = log_returns.iter().sum::<f64>() / log_returns.len() as f64;
    let variance = log_returns
        .iter()
        .map(|r| (r - mean).powi(2))
        .sum::<f64>()
        / (log_returns.len() - 1) as f64;

    variance.sqrt()
}

/// Block bootstrap: resample row indices using blocks of consecutive rows.
/// Blocks wrap around to preserve the full dataset length.
fn block_bootstrap(n_rows: usize, block_size: usize, rng: &mut impl Rng) -> Vec<usize> {
    let bs = block_size.max(1).min(n_rows);
    let n_blocks = (n_rows + bs - 1) / bs;
    let mut indices = Vec::with_capacity(n_blocks * bs);

    for _ in 0..n_blocks {
        let start = rng.random_range(0..n_rows);
        for j in 0..bs {
            indices.push((start + j) % n_rows);
        }
    }

    indices.truncate(n_rows);
    indices
}

/// Cumulative GBM scaling factors:
/// `S_t = exp(sum_{j=1..t} (-0.5*sigma^2 + sigma*Z_j))`, `Z_j ~ N(0,1)`.
fn generate_gbm_factors(n: usize, sigma: f64, rng: &mut impl Rng) -> Vec<f64> {
    let mut factors = Vec::with_capacity(n);
    let mut cumulative = 0.0_f64;

    for _ in 0..n {
        let z = standard_normal(rng);
        cumulative += -0.5 * sigma * sigma + sigma * z;
        factors.push(cumulative.exp());
    }

    factors
}

/// Box-Muller transform to generate N(0,1) samples.
fn standard_normal(rng: &mut impl Rng) -> f64 {
    let u1: f64 = rng.random_range(0.0001f64..1.0);
    let u2: f64 = rng.random_range(0.0f64..std::f64::consts::TAU);
    (-2.0 * u1.ln()).sqrt() * u2.cos()
}

// ── Percentile Utility ────────────────────────────────────────────────

/// Linear interpolation percentile on a sorted slice.
fn percentile(sorted: &[f64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = (pct / 100.0) * (sorted.len() - 1) as f64;
    let lo = idx.floor() as usize;
    let hi = idx.ceil() as usize;
    let frac = idx - lo as f64;

    if hi >= sorted.len() {
        sorted[sorted.len() - 1]
    } else {
        sorted[lo] * (1.0 - frac) + sorted[hi] * frac
    }
}
