use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub label: String,
    pub twrr_pct: f64,
    pub annualized_pct: f64,
    pub max_drawdown_pct: f64,
    pub sharpe: f64,
    pub net_pnl: f64,
    pub rebalances: u32,
    /// Number of ticks where the Risk Monitor reported `Critical` at
    /// decision time — a proxy for forced risk-reduction events, since
    /// this engine's venues never carry an actual on-chain liquidation.
    pub critical_risk_ticks: u32,
    pub yield_pnl: f64,
    pub funding_pnl: f64,
    pub price_pnl: f64,
    pub fees_pnl: f64,
    pub ticks: usize,
}

impl BacktestResult {
    pub fn print_table(results: &[Self]) {
        println!("\n{}", "═".repeat(120));
        println!("  Backtest Results");
        println!("{}", "═".repeat(120));
        println!(
            "  {:<26} {:>7} {:>7} {:>7} {:>7} {:>6} {:>5} {:>9} {:>9} {:>8} {:>8} {:>10}",
            "Strategy",
            "TWRR%",
            "Ann.%",
            "MxDD%",
            "Sharpe",
            "Rebal",
            "Crit.",
            "Yield",
            "Funding",
            "Price",
            "Fees",
            "NetPnL",
        );
        println!("  {}", "-".repeat(114));
        for r in results {
            println!(
                "  {:<26} {:>+7.2} {:>+7.2} {:>7.2} {:>7.3} {:>6} {:>5} {:>+9.2} {:>+9.2} {:>+8.2} {:>+8.2} {:>+10.2}",
                r.label,
                r.twrr_pct,
                r.annualized_pct,
                r.max_drawdown_pct,
                r.sharpe,
                r.rebalances,
                r.critical_risk_ticks,
                r.yield_pnl,
                r.funding_pnl,
                r.price_pnl,
                r.fees_pnl,
                r.net_pnl,
            );
        }
        println!("{}", "═".repeat(120));
        if let Some(r) = results.first() {
            println!("  {} ticks", r.ticks);
        }
    }
}
