use crate::config::HedgedStakingConfig;
use crate::model::{Order, PositionKey, PositionType, Venue};

use super::archetypes;
use super::{DecisionInputs, Strategy};

fn lst_venue(lst_type: &str) -> Venue {
    match lst_type {
        "stETH" | "wstETH" => Venue::Lido,
        _ => Venue::EtherFi,
    }
}

/// Hedged staking (USDT share class, §4.6): split equity by
/// `stake_allocation` — the stake fraction goes on-chain via the LST, the
/// remaining fraction is routed to CEX venues per `hedge_venues` and
/// opened as a perp short at each, canceling the staked leg's price delta
/// while retaining the staking yield and funding-rate differential.
pub struct HedgedStakingStrategy {
    config: HedgedStakingConfig,
}

impl HedgedStakingStrategy {
    pub fn new(config: HedgedStakingConfig) -> Self {
        Self { config }
    }

    fn stake_key(&self) -> PositionKey {
        PositionKey::new(lst_venue(&self.config.lst_type), PositionType::Staked, &self.config.asset)
    }

    fn hedge_key(&self, venue: Venue) -> PositionKey {
        PositionKey::new(venue, PositionType::Perp, &self.config.asset)
    }

    fn hedge_keys(&self) -> Vec<(PositionKey, f64)> {
        self.config
            .hedge_venues
            .iter()
            .map(|w| {
                let key = self.hedge_key(w.venue);
                let exposure_fraction = (1.0 - self.config.stake_allocation) * w.weight;
                (key, exposure_fraction)
            })
            .collect()
    }
}

impl Strategy for HedgedStakingStrategy {
    fn name(&self) -> &'static str {
        "hedged_staking"
    }

    fn position_deviation_threshold(&self) -> f64 {
        self.config.position_deviation_threshold
    }

    fn share_class_asset(&self) -> &'static str {
        self.config.share_class.asset()
    }

    fn target_allocation(&mut self, inputs: &DecisionInputs) -> Vec<(PositionKey, f64)> {
        let equity = inputs.exposure.total_value.raw();
        let mut targets = vec![(self.stake_key(), equity * self.config.stake_allocation)];
        for (key, fraction) in self.hedge_keys() {
            targets.push((key, -(equity * fraction)));
        }
        targets
    }

    fn delta_adjust(&mut self, inputs: &DecisionInputs) -> Vec<Order> {
        let correction = inputs.risk.delta_drift.target_delta - inputs.risk.delta_drift.net_delta;
        let current: Vec<(PositionKey, f64)> = self
            .hedge_keys()
            .into_iter()
            .map(|(key, _)| {
                let signed = inputs.exposure.get(&key).signed_underlying();
                (key, signed)
            })
            .collect();
        archetypes::delta_adjust(&current, correction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RiskThresholds, ShareClass, VenueWeight};
    use crate::model::{DeltaDrift, ExposureSnapshot, MarketSnapshot, PnlSnapshot, QuoteAmount, RiskAssessment};

    fn config() -> HedgedStakingConfig {
        HedgedStakingConfig {
            share_class: ShareClass::Usdt,
            asset: "ETH".to_string(),
            lst_type: "weETH".to_string(),
            stake_allocation: 0.7,
            hedge_venues: vec![VenueWeight { venue: Venue::Binance, weight: 1.0 }],
            position_deviation_threshold: 0.02,
            max_delta_drift: 0.02,
            risk_thresholds: RiskThresholds::default(),
        }
    }

    #[test]
    fn splits_by_stake_allocation() {
        let mut strategy = HedgedStakingStrategy::new(config());
        let mut exposure = ExposureSnapshot::default();
        exposure.total_value = QuoteAmount(1_000.0);
        let risk = RiskAssessment { delta_drift: DeltaDrift::default(), ..Default::default() };
        let pnl = PnlSnapshot::default();
        let market = MarketSnapshot::default();
        let inputs = DecisionInputs { timestamp: 0, exposure: &exposure, risk: &risk, pnl: &pnl, market: &market };

        let target = strategy.target_allocation(&inputs);
        let stake = target.iter().find(|(k, _)| k.position_type == PositionType::Staked).unwrap();
        assert!((stake.1 - 700.0).abs() < 1e-9);
        let hedge = target.iter().find(|(k, _)| k.position_type == PositionType::Perp).unwrap();
        assert!((hedge.1 - (-300.0)).abs() < 1e-9);
    }
}
