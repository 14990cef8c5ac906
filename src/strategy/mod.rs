pub mod archetypes;
pub mod basis;
pub mod directional_staking;
pub mod hedged_leveraged_staking;
pub mod hedged_staking;
pub mod leveraged_staking;
pub mod ml_directional;
pub mod pure_lending;

use crate::config::ModeConfig;
use crate::model::{ExposureSnapshot, MarketSnapshot, Order, PnlSnapshot, PositionKey, RiskAssessment, Status, Timestamp};

/// Everything a decision module is allowed to read (§6 "Decision call").
/// Strategy may not mutate these or call venues directly — `decide` only
/// ever returns an order list.
pub struct DecisionInputs<'a> {
    pub timestamp: Timestamp,
    pub exposure: &'a ExposureSnapshot,
    pub risk: &'a RiskAssessment,
    pub pnl: &'a PnlSnapshot,
    pub market: &'a MarketSnapshot,
}

/// Contract: `decide(timestamp, exposure, risk, pnl, market) → [Order]`
/// (§4.6). Concrete modes implement `target_allocation`, and optionally
/// `risk_reduce`/`delta_adjust` where the mode supports leverage/hedging;
/// the default `decide` enforces the mandatory precedence order so no
/// mode can accidentally reorder it.
pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn position_deviation_threshold(&self) -> f64;

    /// Share-class currency symbol this mode reports equity in — used to
    /// size the wallet-transfer margin leg a perp order gets wrapped in
    /// (§4.7). Modes with no perp leg never consult this.
    fn share_class_asset(&self) -> &'static str {
        "USDT"
    }

    /// Equity-weighted target net delta this mode aims to hold, used by
    /// the engine to feed `RiskMonitor::compute`'s `target_delta` input
    /// before `decide` is even called.
    fn target_delta(&self, exposure: &ExposureSnapshot) -> f64 {
        let _ = exposure;
        0.0
    }

    /// Target underlying allocation per key given the current tick's
    /// inputs. Implementations read `inputs.exposure.total_value` for the
    /// equity base and may hold internal state (e.g. a captured initial
    /// equity) across ticks.
    fn target_allocation(&mut self, inputs: &DecisionInputs) -> Vec<(PositionKey, f64)>;

    /// Current underlying allocation, read from the exposure snapshot.
    fn current_allocation(&self, inputs: &DecisionInputs) -> Vec<(PositionKey, f64)> {
        inputs
            .exposure
            .per_key
            .iter()
            .map(|(key, exposure)| (key.clone(), exposure.signed_underlying()))
            .collect()
    }

    /// On Critical risk: emit deleveraging orders bringing the worst
    /// dimension back to Safe. Default: unwind entirely (safe for modes
    /// without their own deleveraging ladder); leveraged modes override
    /// with a partial-reduction ladder instead.
    fn risk_reduce(&mut self, inputs: &DecisionInputs) -> Vec<Order> {
        archetypes::exit_full(&self.current_allocation(inputs))
    }

    /// On a delta-drift status worse than Safe: adjust hedges. Default:
    /// no-op (modes with no hedge leg never see a non-Safe delta drift
    /// because `target_delta` tracks their natural exposure).
    fn delta_adjust(&mut self, inputs: &DecisionInputs) -> Vec<Order> {
        let _ = inputs;
        Vec::new()
    }

    /// Dust threshold above which an off-share-class residual is sold.
    /// `0.0` disables the dust sweep (most modes hold no incidental
    /// off-target tokens).
    fn dust_threshold(&self) -> f64 {
        0.0
    }

    fn dust_positions(&self, inputs: &DecisionInputs) -> Vec<(PositionKey, f64)> {
        let _ = inputs;
        Vec::new()
    }

    /// Mandatory decision order of precedence (§4.6): risk override, then
    /// delta adjust, then equity-deviation rebalance, then dust sweep,
    /// then nothing.
    fn decide(&mut self, inputs: &DecisionInputs) -> Vec<Order> {
        let orders = if inputs.risk.overall_status == Status::Critical {
            self.risk_reduce(inputs)
        } else if inputs.risk.delta_drift.status != Status::Safe {
            self.delta_adjust(inputs)
        } else {
            let target = self.target_allocation(inputs);
            let current = self.current_allocation(inputs);
            if equity_deviation(&current, &target) > self.position_deviation_threshold() {
                archetypes::rebalance_to_target(&current, &target)
            } else {
                let dust_threshold = self.dust_threshold();
                if dust_threshold > 0.0 {
                    archetypes::sell_dust(&self.dust_positions(inputs), dust_threshold)
                } else {
                    Vec::new()
                }
            }
        };

        archetypes::attach_perp_margin_transfers(orders, inputs.market, self.share_class_asset())
    }
}

/// Fractional equity deviation between a current and target allocation,
/// summed across keys and normalized by total target magnitude — the
/// trigger for `rebalance_to_target` (§4.6 step 3, §8 "exactly-at-threshold
/// ... does not trigger rebalance").
pub fn equity_deviation(current: &[(PositionKey, f64)], target: &[(PositionKey, f64)]) -> f64 {
    use std::collections::HashMap;

    let mut by_key: HashMap<&PositionKey, (f64, f64)> = HashMap::new();
    for (key, amount) in current {
        by_key.entry(key).or_insert((0.0, 0.0)).0 += amount;
    }
    for (key, amount) in target {
        by_key.entry(key).or_insert((0.0, 0.0)).1 += amount;
    }

    let total_target: f64 = by_key.values().map(|(_, t)| t.abs()).sum();
    if total_target < 1e-12 {
        return 0.0;
    }
    let total_gap: f64 = by_key.values().map(|(c, t)| (t - c).abs()).sum();
    total_gap / total_target
}

/// One variant per strategy mode, closed over its `ModeConfig` counterpart
/// (§4.6: "closed set of seven ... plus ML directional"). Dispatch is a
/// plain `match`, never a string lookup.
pub enum StrategyMode {
    PureLending(pure_lending::PureLendingStrategy),
    Basis(basis::BasisStrategy),
    DirectionalStaking(directional_staking::DirectionalStakingStrategy),
    LeveragedStaking(leveraged_staking::LeveragedStakingStrategy),
    HedgedStaking(hedged_staking::HedgedStakingStrategy),
    HedgedLeveragedStaking(hedged_leveraged_staking::HedgedLeveragedStakingStrategy),
    MlDirectional(ml_directional::MlDirectionalStrategy),
}

impl StrategyMode {
    pub fn from_config(config: ModeConfig) -> Self {
        match config {
            ModeConfig::PureLending(c) => StrategyMode::PureLending(pure_lending::PureLendingStrategy::new(c)),
            ModeConfig::Basis(c) => StrategyMode::Basis(basis::BasisStrategy::new(c)),
            ModeConfig::DirectionalStaking(c) => {
                StrategyMode::DirectionalStaking(directional_staking::DirectionalStakingStrategy::new(c))
            }
            ModeConfig::LeveragedStaking(c) => {
                StrategyMode::LeveragedStaking(leveraged_staking::LeveragedStakingStrategy::new(c))
            }
            ModeConfig::HedgedStaking(c) => StrategyMode::HedgedStaking(hedged_staking::HedgedStakingStrategy::new(c)),
            ModeConfig::HedgedLeveragedStaking(c) => StrategyMode::HedgedLeveragedStaking(
                hedged_leveraged_staking::HedgedLeveragedStakingStrategy::new(c),
            ),
            ModeConfig::MlDirectional(c) => StrategyMode::MlDirectional(ml_directional::MlDirectionalStrategy::new(c)),
        }
    }

    pub fn as_strategy_mut(&mut self) -> &mut dyn Strategy {
        match self {
            StrategyMode::PureLending(s) => s,
            StrategyMode::Basis(s) => s,
            StrategyMode::DirectionalStaking(s) => s,
            StrategyMode::LeveragedStaking(s) => s,
            StrategyMode::HedgedStaking(s) => s,
            StrategyMode::HedgedLeveragedStaking(s) => s,
            StrategyMode::MlDirectional(s) => s,
        }
    }
}
