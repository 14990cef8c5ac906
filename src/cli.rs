use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Unified backtest-and-live execution engine for yield/basis DeFi+CEX
/// strategies — validate mode configs, inspect the schema, and backtest.
#[derive(Parser)]
#[command(name = "basis-engine", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Output the JSON schema for mode configuration (for tooling/LLM consumption).
    Schema,

    /// Validate a mode config JSON file without running anything.
    ValidateConfig {
        /// Path to the mode config JSON file
        config: PathBuf,
    },

    /// Backtest a mode config against historical CSV data.
    Backtest {
        /// Path to the mode config JSON file
        config: PathBuf,

        /// Directory containing CSV data files and manifest.json
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,

        /// Directory event-log JSONL files are written under
        #[arg(long, default_value = "runs")]
        run_dir: PathBuf,

        /// Numeraire all exposure is converted through before share-class conversion
        #[arg(long, default_value = "USD")]
        reference_asset: String,

        /// Initial capital, in the mode's share-class asset
        #[arg(long, default_value = "10000.0")]
        capital: f64,

        /// Random seed for the backtest venues' slippage simulation
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Print a one-line summary before the run starts
        #[arg(long)]
        verbose: bool,

        /// Write the result as JSON to this file
        #[arg(long)]
        output: Option<PathBuf>,

        /// Restrict the run to timestamps >= this Unix timestamp
        #[arg(long)]
        start: Option<u64>,

        /// Restrict the run to timestamps <= this Unix timestamp
        #[arg(long)]
        end: Option<u64>,

        /// Run N Monte Carlo simulations (block bootstrap + GBM perturbation)
        #[arg(long)]
        monte_carlo: Option<u32>,

        /// Block size for bootstrap resampling
        #[arg(long, default_value = "10")]
        block_size: usize,

        /// GBM volatility scale factor (0.0 = no perturbation, 1.0 = full historical vol)
        #[arg(long, default_value = "1.0")]
        gbm_vol_scale: f64,
    },
}
