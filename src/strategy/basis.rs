use crate::config::BasisConfig;
use crate::model::{MarketSnapshot, Order, PositionKey, PositionType, Venue};

use super::{DecisionInputs, Strategy};

fn spot_key(asset: &str) -> PositionKey {
    PositionKey::new(Venue::Wallet, PositionType::Spot, asset)
}

fn perp_key(venue: Venue, asset: &str) -> PositionKey {
    PositionKey::new(venue, PositionType::Perp, asset)
}

fn asset_price(market: &MarketSnapshot, asset: &str) -> f64 {
    market.usd_price(asset).unwrap_or(1.0).max(1e-12)
}

/// Equal-notional long-spot / short-perp basis trade, perp leg split
/// across configured venues by weight (§4.6). Held "delta-neutral"
/// (`net_delta ≈ 0`); P&L comes from the funding-rate differential, not
/// from price movement of the underlying.
pub struct BasisStrategy {
    config: BasisConfig,
}

impl BasisStrategy {
    pub fn new(config: BasisConfig) -> Self {
        Self { config }
    }
}

impl Strategy for BasisStrategy {
    fn name(&self) -> &'static str {
        "basis"
    }

    fn position_deviation_threshold(&self) -> f64 {
        self.config.position_deviation_threshold
    }

    fn share_class_asset(&self) -> &'static str {
        self.config.share_class.asset()
    }

    fn target_delta(&self, _exposure: &crate::model::ExposureSnapshot) -> f64 {
        0.0
    }

    fn target_allocation(&mut self, inputs: &DecisionInputs) -> Vec<(PositionKey, f64)> {
        let equity = inputs.exposure.total_value.raw();
        let price = asset_price(inputs.market, &self.config.asset);
        let notional_underlying = equity / price;

        let mut targets = vec![(spot_key(&self.config.asset), notional_underlying)];
        for weight in &self.config.perp_venues {
            targets.push((
                perp_key(weight.venue, &self.config.asset),
                -(notional_underlying * weight.weight),
            ));
        }
        targets
    }

    fn delta_adjust(&mut self, inputs: &DecisionInputs) -> Vec<Order> {
        let correction = inputs.risk.delta_drift.target_delta - inputs.risk.delta_drift.net_delta;
        let current: Vec<(PositionKey, f64)> = self
            .config
            .perp_venues
            .iter()
            .map(|w| {
                let key = perp_key(w.venue, &self.config.asset);
                (key.clone(), inputs.exposure.get(&key).signed_underlying())
            })
            .collect();
        super::archetypes::delta_adjust(&current, correction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RiskThresholds, ShareClass, VenueWeight};
    use crate::model::{DeltaDrift, ExposureSnapshot, PnlSnapshot, QuoteAmount, RiskAssessment};

    fn config() -> BasisConfig {
        BasisConfig {
            share_class: ShareClass::Usdt,
            asset: "BTC".to_string(),
            market_neutral: true,
            perp_venues: vec![
                VenueWeight { venue: Venue::Binance, weight: 0.6 },
                VenueWeight { venue: Venue::Bybit, weight: 0.4 },
            ],
            position_deviation_threshold: 0.02,
            max_delta_drift: 0.02,
            risk_thresholds: RiskThresholds::default(),
        }
    }

    #[test]
    fn splits_perp_leg_across_venues_by_weight() {
        let mut strategy = BasisStrategy::new(config());
        let mut exposure = ExposureSnapshot::default();
        exposure.total_value = QuoteAmount(100_000.0);
        let mut market = MarketSnapshot::default();
        market.prices.insert("BTC".to_string(), (50_000.0, 50_000.0));
        let risk = RiskAssessment {
            delta_drift: DeltaDrift::default(),
            ..Default::default()
        };
        let pnl = PnlSnapshot::default();
        let inputs = DecisionInputs {
            timestamp: 0,
            exposure: &exposure,
            risk: &risk,
            pnl: &pnl,
            market: &market,
        };

        let target = strategy.target_allocation(&inputs);
        assert_eq!(target.len(), 3);
        let spot = target.iter().find(|(k, _)| k.position_type == PositionType::Spot).unwrap();
        assert!((spot.1 - 2.0).abs() < 1e-9);
        let binance_perp = target
            .iter()
            .find(|(k, _)| k.venue == Venue::Binance)
            .unwrap();
        assert!((binance_perp.1 - (-1.2)).abs() < 1e-9);
    }
}
