use crate::config::PureLendingConfig;
use crate::model::{PositionKey, PositionType, Venue};

use super::{DecisionInputs, Strategy};

fn protocol_venue(protocol: &str) -> Venue {
    match protocol {
        "morpho" => Venue::Morpho,
        _ => Venue::AaveV3,
    }
}

/// Entire equity supplied to one lending protocol; never rebalances after
/// initial setup unless equity itself changes (§4.6: "never rebalances
/// after initial setup unless equity changes").
pub struct PureLendingStrategy {
    config: PureLendingConfig,
}

impl PureLendingStrategy {
    pub fn new(config: PureLendingConfig) -> Self {
        Self { config }
    }

    fn supply_key(&self) -> PositionKey {
        PositionKey::new(protocol_venue(&self.config.protocol), PositionType::AToken, &self.config.asset)
    }
}

impl Strategy for PureLendingStrategy {
    fn name(&self) -> &'static str {
        "pure_lending"
    }

    fn position_deviation_threshold(&self) -> f64 {
        self.config.position_deviation_threshold
    }

    /// No hedge leg — whatever directional exposure lending produces is
    /// tracked as its own target, so the delta-drift dimension never fires
    /// for a mode that was never meant to be delta-neutral.
    fn target_delta(&self, exposure: &crate::model::ExposureSnapshot) -> f64 {
        exposure.net_delta.raw()
    }

    fn target_allocation(&mut self, inputs: &DecisionInputs) -> Vec<(PositionKey, f64)> {
        let equity = inputs.exposure.total_value.raw();
        vec![(self.supply_key(), equity)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ExposureSnapshot, MarketSnapshot, PnlSnapshot, QuoteAmount, RiskAssessment};

    fn config() -> PureLendingConfig {
        PureLendingConfig {
            share_class: crate::config::ShareClass::Usdt,
            asset: "USDT".to_string(),
            protocol: "aave_v3".to_string(),
            position_deviation_threshold: 0.02,
            risk_thresholds: Default::default(),
        }
    }

    #[test]
    fn targets_full_equity_on_lending_asset() {
        let mut strategy = PureLendingStrategy::new(config());
        let mut exposure = ExposureSnapshot::default();
        exposure.total_value = QuoteAmount(1_000.0);
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
        assert_eq!(target.len(), 1);
        assert_eq!(target[0].1, 1_000.0);
    }
}
