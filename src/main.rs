use clap::Parser;

use basis_engine::backtest::{self, monte_carlo::MonteCarloConfig, BacktestConfig};
use basis_engine::config::ModeConfig;
use basis_engine::execution::ExecutionConfig;
use basis_engine::{schema, validate_config};

mod cli;

fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    match cli.command {
        cli::Command::Schema => schema::run(),
        cli::Command::ValidateConfig { config } => validate_config::run(&config),
        cli::Command::Backtest {
            config,
            data_dir,
            run_dir,
            reference_asset,
            capital,
            seed,
            verbose,
            output,
            start,
            end,
            monte_carlo,
            block_size,
            gbm_vol_scale,
        } => {
            let mode = load_mode_config(&config)?;
            let backtest_config = BacktestConfig {
                mode,
                data_dir,
                run_dir,
                reference_asset,
                capital,
                seed,
                verbose,
                output,
                start,
                end,
                execution: ExecutionConfig::default(),
                monte_carlo: monte_carlo.map(|n| MonteCarloConfig {
                    n_simulations: n,
                    block_size,
                    gbm_vol_scale,
                }),
            };

            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(backtest::run(&backtest_config))
        }
    }
}

fn load_mode_config(path: &std::path::Path) -> anyhow::Result<ModeConfig> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("reading {}: {e}", path.display()))?;
    let mode: ModeConfig = serde_json::from_str(&text)
        .map_err(|e| anyhow::anyhow!("parsing {} as a mode config: {e}", path.display()))?;
    mode.validate().map_err(|errors| {
        let msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        anyhow::anyhow!("mode config validation failed:\n  {}", msgs.join("\n  "))
    })?;
    Ok(mode)
}
