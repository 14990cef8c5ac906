use crate::config::DirectionalStakingConfig;
use crate::model::{PositionKey, PositionType, Venue};

use super::{DecisionInputs, Strategy};

fn lst_venue(lst_type: &str) -> Venue {
    match lst_type {
        "stETH" | "wstETH" => Venue::Lido,
        _ => Venue::EtherFi,
    }
}

/// All equity staked via the chosen LST; no hedge leg (§4.6). Directionally
/// long the underlying — `net_delta` tracks the staked notional exactly.
pub struct DirectionalStakingStrategy {
    config: DirectionalStakingConfig,
}

impl DirectionalStakingStrategy {
    pub fn new(config: DirectionalStakingConfig) -> Self {
        Self { config }
    }

    fn stake_key(&self) -> PositionKey {
        PositionKey::new(lst_venue(&self.config.lst_type), PositionType::Staked, &self.config.asset)
    }
}

impl Strategy for DirectionalStakingStrategy {
    fn name(&self) -> &'static str {
        "directional_staking"
    }

    fn position_deviation_threshold(&self) -> f64 {
        self.config.position_deviation_threshold
    }

    fn target_delta(&self, exposure: &crate::model::ExposureSnapshot) -> f64 {
        exposure.net_delta.raw()
    }

    fn target_allocation(&mut self, inputs: &DecisionInputs) -> Vec<(PositionKey, f64)> {
        let equity = inputs.exposure.total_value.raw();
        vec![(self.stake_key(), equity)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ShareClass;
    use crate::model::{ExposureSnapshot, MarketSnapshot, PnlSnapshot, QuoteAmount, RiskAssessment};

    #[test]
    fn stakes_full_equity() {
        let config = DirectionalStakingConfig {
            share_class: ShareClass::Eth,
            asset: "ETH".to_string(),
            lst_type: "weETH".to_string(),
            position_deviation_threshold: 0.02,
            risk_thresholds: Default::default(),
        };
        let mut strategy = DirectionalStakingStrategy::new(config);
        let mut exposure = ExposureSnapshot::default();
        exposure.total_value = QuoteAmount(500.0);
        let risk = RiskAssessment::default();
        let pnl = PnlSnapshot::default();
        let market = MarketSnapshot::default();
        let inputs = DecisionInputs {
            timestamp: 0,
            exposure: &exposure,
            risk: &risk,
            pnl: &pnl,
            market: &market,
        };
        let target = strategy.target_allocation(&inputs);
        assert_eq!(target, vec![(
            PositionKey::new(Venue::EtherFi, PositionType::Staked, "ETH"),
            500.0
        )]);
    }
}
