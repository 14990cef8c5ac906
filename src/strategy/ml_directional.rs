use crate::config::MlDirectionalConfig;
use crate::model::{ActionType, DeltaSpec, Order, OrderSide, PerpSide, PositionKey, PositionType};

use super::{DecisionInputs, Strategy};

/// ML directional (5-minute cadence, §4.6): at each candle open, consume
/// the ML signal; if `confidence >= signal_threshold` and the position
/// needs to flip (or none exists yet), close the old perp position and
/// open a new full-equity one in the signal's direction. Stop-loss /
/// take-profit are computed from the signal's standard deviation, floored
/// and capped at configured basis-points bounds — this mode does not use
/// the shared rebalance-to-target archetype at all; its `decide` is fully
/// overridden.
pub struct MlDirectionalStrategy {
    config: MlDirectionalConfig,
    current_side: Option<PerpSide>,
}

impl MlDirectionalStrategy {
    pub fn new(config: MlDirectionalConfig) -> Self {
        Self { config, current_side: None }
    }

    fn perp_key(&self) -> PositionKey {
        PositionKey::new(self.config.venue, PositionType::Perp, &self.config.asset)
    }

    /// Basis-point stop/take distances derived from the signal's standard
    /// deviation, clamped to `[sd_floor_bps, sd_cap_bps]`.
    fn stop_take_bps(&self, std_dev: f64) -> (f64, f64) {
        let ml = &self.config.ml_config;
        let stop_bps = (std_dev * ml.stop_loss_sd * 10_000.0).clamp(ml.sd_floor_bps, ml.sd_cap_bps);
        let take_bps = (std_dev * ml.take_profit_sd * 10_000.0).clamp(ml.sd_floor_bps, ml.sd_cap_bps);
        (stop_bps, take_bps)
    }
}

impl Strategy for MlDirectionalStrategy {
    fn name(&self) -> &'static str {
        "ml_directional"
    }

    fn position_deviation_threshold(&self) -> f64 {
        // This mode never rebalances incrementally — it flips the whole
        // position on a signal change, so the generic deviation trigger
        // in the default `decide` never fires for it.
        f64::INFINITY
    }

    fn target_delta(&self, exposure: &crate::model::ExposureSnapshot) -> f64 {
        exposure.net_delta.raw()
    }

    fn target_allocation(&mut self, _inputs: &DecisionInputs) -> Vec<(PositionKey, f64)> {
        Vec::new()
    }

    fn share_class_asset(&self) -> &'static str {
        self.config.share_class.asset()
    }

    /// Fully overridden: risk override still takes precedence, but
    /// everything below that is signal-driven rather than deviation-driven.
    /// Every return path is wrapped through `attach_perp_margin_transfers`
    /// so a closed/opened perp always carries its matching margin leg.
    fn decide(&mut self, inputs: &DecisionInputs) -> Vec<Order> {
        if inputs.risk.overall_status == crate::model::Status::Critical {
            let orders = self.risk_reduce(inputs);
            return super::archetypes::attach_perp_margin_transfers(orders, inputs.market, self.share_class_asset());
        }

        let signal = match inputs.market.ml_signal(&self.config.asset) {
            Some(s) => s,
            None => return Vec::new(),
        };
        if signal.confidence < self.config.ml_config.signal_threshold {
            return Vec::new();
        }

        let desired_side = if signal.direction >= 0.0 { PerpSide::Long } else { PerpSide::Short };
        let existing = inputs.exposure.get(&self.perp_key());
        let has_position = existing.underlying.raw().abs() > 1e-9;

        if has_position && self.current_side == Some(desired_side) {
            return Vec::new();
        }

        let mut orders = Vec::new();
        let key = self.perp_key();
        if has_position {
            orders.push(Order {
                order_id: format!("{key}-close"),
                venue: key.venue.to_string(),
                instrument: key.symbol.clone(),
                side: match self.current_side {
                    Some(PerpSide::Long) => OrderSide::Sell,
                    _ => OrderSide::Buy,
                },
                action_type: ActionType::PerpClose,
                amount: existing.underlying.raw(),
                limit_price: None,
                stop_loss: None,
                take_profit: None,
                atomic_group_id: None,
                expected_deltas: vec![DeltaSpec {
                    key: key.clone(),
                    signed_amount: -existing.underlying.raw(),
                }],
            });
        }

        let equity = inputs.exposure.total_value.raw();
        let price = inputs.market.usd_price(&self.config.asset).unwrap_or(1.0).max(1e-12);
        let notional = equity / price;
        let (stop_bps, take_bps) = self.stop_take_bps(signal.std_dev);
        let sign = if desired_side == PerpSide::Long { 1.0 } else { -1.0 };

        orders.push(Order {
            order_id: format!("{key}-open"),
            venue: key.venue.to_string(),
            instrument: key.symbol.clone(),
            side: if desired_side == PerpSide::Long { OrderSide::Buy } else { OrderSide::Sell },
            action_type: ActionType::PerpOpen,
            amount: notional,
            limit_price: None,
            stop_loss: Some(price * (1.0 - sign * stop_bps / 10_000.0)),
            take_profit: Some(price * (1.0 + sign * take_bps / 10_000.0)),
            atomic_group_id: None,
            expected_deltas: vec![DeltaSpec { key, signed_amount: notional }],
        });

        self.current_side = Some(desired_side);
        super::archetypes::attach_perp_margin_transfers(orders, inputs.market, self.share_class_asset())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MlConfig, RiskThresholds, ShareClass};
    use crate::model::{ExposureSnapshot, MarketSnapshot, MlSignal, PnlSnapshot, QuoteAmount, RiskAssessment, Venue};

    fn config() -> MlDirectionalConfig {
        MlDirectionalConfig {
            share_class: ShareClass::Usdt,
            asset: "BTC".to_string(),
            venue: Venue::Binance,
            ml_config: MlConfig {
                signal_threshold: 0.7,
                take_profit_sd: 2.0,
                stop_loss_sd: 1.0,
                sd_floor_bps: 20.0,
                sd_cap_bps: 500.0,
            },
            risk_thresholds: RiskThresholds::default(),
        }
    }

    #[test]
    fn below_threshold_confidence_emits_nothing() {
        let mut strategy = MlDirectionalStrategy::new(config());
        let mut exposure = ExposureSnapshot::default();
        exposure.total_value = QuoteAmount(1_000.0);
        let mut market = MarketSnapshot::default();
        market.prices.insert("BTC".to_string(), (50_000.0, 50_000.0));
        market.ml_signals.insert("BTC".to_string(), MlSignal { confidence: 0.4, direction: 1.0, std_dev: 0.02 });
        let risk = RiskAssessment::default();
        let pnl = PnlSnapshot::default();
        let inputs = DecisionInputs { timestamp: 0, exposure: &exposure, risk: &risk, pnl: &pnl, market: &market };

        assert!(strategy.decide(&inputs).is_empty());
    }

    #[test]
    fn confident_signal_opens_full_equity_position() {
        let mut strategy = MlDirectionalStrategy::new(config());
        let mut exposure = ExposureSnapshot::default();
        exposure.total_value = QuoteAmount(1_000.0);
        let mut market = MarketSnapshot::default();
        market.prices.insert("BTC".to_string(), (50_000.0, 50_000.0));
        market.ml_signals.insert("BTC".to_string(), MlSignal { confidence: 0.9, direction: 1.0, std_dev: 0.02 });
        let risk = RiskAssessment::default();
        let pnl = PnlSnapshot::default();
        let inputs = DecisionInputs { timestamp: 0, exposure: &exposure, risk: &risk, pnl: &pnl, market: &market };

        let orders = strategy.decide(&inputs);
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].action_type, ActionType::WalletTransfer);
        assert_eq!(orders[1].action_type, ActionType::PerpOpen);
        assert!((orders[1].amount - 0.02).abs() < 1e-9);
    }

    #[test]
    fn opposite_signal_closes_then_reopens() {
        let mut strategy = MlDirectionalStrategy::new(config());
        strategy.current_side = Some(PerpSide::Long);
        let mut exposure = ExposureSnapshot::default();
        exposure.total_value = QuoteAmount(1_000.0);
        exposure.per_key.insert(
            strategy.perp_key(),
            crate::model::Exposure { underlying: crate::model::UnderlyingAmount(0.02), ..Default::default() },
        );
        let mut market = MarketSnapshot::default();
        market.prices.insert("BTC".to_string(), (50_000.0, 50_000.0));
        market.ml_signals.insert("BTC".to_string(), MlSignal { confidence: 0.9, direction: -1.0, std_dev: 0.02 });
        let risk = RiskAssessment::default();
        let pnl = PnlSnapshot::default();
        let inputs = DecisionInputs { timestamp: 0, exposure: &exposure, risk: &risk, pnl: &pnl, market: &market };

        let orders = strategy.decide(&inputs);
        assert_eq!(orders.len(), 4);
        assert_eq!(orders[0].action_type, ActionType::PerpClose);
        assert_eq!(orders[1].action_type, ActionType::WalletTransfer);
        assert_eq!(orders[2].action_type, ActionType::WalletTransfer);
        assert_eq!(orders[3].action_type, ActionType::PerpOpen);
        assert_eq!(strategy.current_side, Some(PerpSide::Short));
    }
}
