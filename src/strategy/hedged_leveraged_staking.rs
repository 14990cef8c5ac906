use crate::config::HedgedLeveragedStakingConfig;
use crate::model::{ActionType, DeltaSpec, Order, OrderSide, PositionKey, PositionType, Status, Venue};

use super::archetypes;
use super::{DecisionInputs, Strategy};

fn lst_venue(lst_type: &str) -> Venue {
    match lst_type {
        "stETH" | "wstETH" => Venue::Lido,
        _ => Venue::EtherFi,
    }
}

fn lending_venue(protocol: &str) -> Venue {
    match protocol {
        "morpho" => Venue::Morpho,
        _ => Venue::AaveV3,
    }
}

const ATOMIC_GROUP: &str = "hedged-leveraged-stake";

/// Hedged leveraged staking (§4.6): `stake_allocation` of equity goes into
/// the same five-step atomic leverage build as `leveraged_staking`; the
/// remainder is hedged across CEX perp venues exactly as `hedged_staking`.
///
/// Unwind sequence (resolved open question, not inferred): on a risk
/// override, hedge legs unwind first — closing a CEX short is a single
/// reconciled perp order with no atomic dependency, and doing it first
/// shrinks the riskier, marginable leg before touching the on-chain
/// leverage, which needs its own atomic flash-loan wrapper regardless of
/// whether the hedge has already moved.
pub struct HedgedLeveragedStakingStrategy {
    config: HedgedLeveragedStakingConfig,
}

impl HedgedLeveragedStakingStrategy {
    pub fn new(config: HedgedLeveragedStakingConfig) -> Self {
        Self { config }
    }

    fn stake_key(&self) -> PositionKey {
        PositionKey::new(lst_venue(&self.config.lst_type), PositionType::Staked, &self.config.asset)
    }

    fn supply_key(&self) -> PositionKey {
        PositionKey::new(lending_venue(&self.config.lending_protocol), PositionType::AToken, &self.config.lst_type)
    }

    fn debt_key(&self) -> PositionKey {
        PositionKey::new(lending_venue(&self.config.lending_protocol), PositionType::VariableDebt, &self.config.asset)
    }

    fn hedge_key(&self, venue: Venue) -> PositionKey {
        PositionKey::new(venue, PositionType::Perp, &self.config.asset)
    }

    fn hedge_keys(&self, stake_equity: f64) -> Vec<(PositionKey, f64)> {
        self.config
            .hedge_venues
            .iter()
            .map(|w| (self.hedge_key(w.venue), -(stake_equity * w.weight)))
            .collect()
    }

    fn leveraged_group(&self, delta_supplied: f64, delta_borrowed: f64) -> Vec<Order> {
        if delta_supplied.abs() < 1e-9 && delta_borrowed.abs() < 1e-9 {
            return Vec::new();
        }
        let venue_name = lending_venue(&self.config.lending_protocol).to_string();
        let group = Some(ATOMIC_GROUP.to_string());
        let leg = |seq: usize, key: PositionKey, action: ActionType, amount: f64, signed: f64| Order {
            order_id: format!("{ATOMIC_GROUP}-{seq}"),
            venue: venue_name.clone(),
            instrument: key.symbol.clone(),
            side: if signed >= 0.0 { OrderSide::Buy } else { OrderSide::Sell },
            action_type: action,
            amount: amount.abs(),
            limit_price: None,
            stop_loss: None,
            take_profit: None,
            atomic_group_id: group.clone(),
            expected_deltas: vec![DeltaSpec { key, signed_amount: signed }],
        };

        if delta_borrowed >= 0.0 {
            vec![
                leg(0, self.debt_key(), ActionType::FlashBorrow, delta_borrowed, 0.0),
                leg(1, self.stake_key(), ActionType::Stake, delta_supplied, delta_supplied),
                leg(2, self.supply_key(), ActionType::Supply, delta_supplied, delta_supplied),
                leg(3, self.debt_key(), ActionType::Borrow, delta_borrowed, delta_borrowed),
                leg(4, self.debt_key(), ActionType::FlashRepay, delta_borrowed, 0.0),
            ]
        } else {
            let repay = delta_borrowed.abs();
            let withdraw = delta_supplied.abs();
            vec![
                leg(0, self.debt_key(), ActionType::FlashBorrow, repay, 0.0),
                leg(1, self.debt_key(), ActionType::Repay, repay, -repay),
                leg(2, self.supply_key(), ActionType::Withdraw, withdraw, -withdraw),
                leg(3, self.stake_key(), ActionType::Unstake, withdraw, -withdraw),
                leg(4, self.debt_key(), ActionType::FlashRepay, repay, 0.0),
            ]
        }
    }
}

impl Strategy for HedgedLeveragedStakingStrategy {
    fn name(&self) -> &'static str {
        "hedged_leveraged_staking"
    }

    fn position_deviation_threshold(&self) -> f64 {
        self.config.position_deviation_threshold
    }

    fn share_class_asset(&self) -> &'static str {
        self.config.share_class.asset()
    }

    fn target_allocation(&mut self, inputs: &DecisionInputs) -> Vec<(PositionKey, f64)> {
        let equity = inputs.exposure.total_value.raw();
        let stake_equity = equity * self.config.stake_allocation;
        let leverage = self.config.leverage();
        let mut targets = vec![
            (self.supply_key(), stake_equity * leverage),
            (self.debt_key(), stake_equity * (leverage - 1.0)),
        ];
        targets.extend(self.hedge_keys(stake_equity));
        targets
    }

    fn delta_adjust(&mut self, inputs: &DecisionInputs) -> Vec<Order> {
        let correction = inputs.risk.delta_drift.target_delta - inputs.risk.delta_drift.net_delta;
        let equity = inputs.exposure.total_value.raw();
        let stake_equity = equity * self.config.stake_allocation;
        let current: Vec<(PositionKey, f64)> = self
            .hedge_keys(stake_equity)
            .into_iter()
            .map(|(key, _)| (key.clone(), inputs.exposure.get(&key).signed_underlying()))
            .collect();
        archetypes::delta_adjust(&current, correction)
    }

    /// Hedge legs unwind first (see module doc); the on-chain leverage
    /// unwind only runs if risk is still Critical after the hedge alone
    /// cannot restore it (delta drift is a separate dimension from
    /// lending health, so both may need to move in the same tick).
    fn risk_reduce(&mut self, inputs: &DecisionInputs) -> Vec<Order> {
        let mut orders = self.delta_adjust(inputs);

        if let Some(worst) = inputs.risk.lending_health.values().map(|h| h.status).max() {
            if worst == Status::Critical {
                let current_supplied = inputs.exposure.get(&self.supply_key()).underlying.raw();
                let current_borrowed = inputs.exposure.get(&self.debt_key()).underlying.raw();
                orders.extend(self.leveraged_group(-(current_supplied * 0.25), -(current_borrowed * 0.25)));
            }
        }

        orders
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RiskThresholds, ShareClass, VenueWeight};
    use crate::model::{DeltaDrift, ExposureSnapshot, MarketSnapshot, PnlSnapshot, QuoteAmount, RiskAssessment};

    fn config() -> HedgedLeveragedStakingConfig {
        HedgedLeveragedStakingConfig {
            share_class: ShareClass::Usdt,
            asset: "ETH".to_string(),
            lst_type: "weETH".to_string(),
            lending_protocol: "aave_v3".to_string(),
            target_ltv: 0.8,
            stake_allocation: 0.6,
            hedge_venues: vec![VenueWeight { venue: Venue::Binance, weight: 1.0 }],
            position_deviation_threshold: 0.02,
            max_delta_drift: 0.02,
            risk_thresholds: RiskThresholds::default(),
        }
    }

    #[test]
    fn target_splits_stake_allocation_before_leveraging() {
        let mut strategy = HedgedLeveragedStakingStrategy::new(config());
        let mut exposure = ExposureSnapshot::default();
        exposure.total_value = QuoteAmount(1_000.0);
        let risk = RiskAssessment { delta_drift: DeltaDrift::default(), ..Default::default() };
        let pnl = PnlSnapshot::default();
        let market = MarketSnapshot::default();
        let inputs = DecisionInputs { timestamp: 0, exposure: &exposure, risk: &risk, pnl: &pnl, market: &market };

        let target = strategy.target_allocation(&inputs);
        // stake_equity = 600, leverage = 4 -> supplied 2400, borrowed 1800.
        let supply = target.iter().find(|(k, _)| k.position_type == PositionType::AToken).unwrap();
        assert!((supply.1 - 2_400.0).abs() < 1e-6);
        let hedge = target.iter().find(|(k, _)| k.position_type == PositionType::Perp).unwrap();
        assert!((hedge.1 - (-600.0)).abs() < 1e-9);
    }

    #[test]
    fn risk_reduce_unwinds_hedge_before_leverage() {
        let mut strategy = HedgedLeveragedStakingStrategy::new(config());
        let mut exposure = ExposureSnapshot::default();
        exposure.total_value = QuoteAmount(1_000.0);
        exposure.per_key.insert(
            strategy.supply_key(),
            crate::model::Exposure { underlying: crate::model::UnderlyingAmount(2_400.0), ..Default::default() },
        );
        exposure.per_key.insert(
            strategy.debt_key(),
            crate::model::Exposure { underlying: crate::model::UnderlyingAmount(1_800.0), ..Default::default() },
        );
        let mut risk = RiskAssessment { delta_drift: DeltaDrift::default(), ..Default::default() };
        risk.lending_health.insert(
            "aave_v3".to_string(),
            crate::model::LendingHealth {
                ltv: 0.9,
                health_factor: 1.01,
                liquidation_threshold: 0.85,
                buffer_to_liq: 0.01,
                pct_price_move_to_liq: (1.0 - 1.0 / 1.01) * 100.0,
                status: Status::Critical,
            },
        );
        let pnl = PnlSnapshot::default();
        let market = MarketSnapshot::default();
        let inputs = DecisionInputs { timestamp: 0, exposure: &exposure, risk: &risk, pnl: &pnl, market: &market };

        let orders = strategy.risk_reduce(&inputs);
        let hedge_idx = orders.iter().position(|o| o.action_type == ActionType::PerpClose || o.action_type == ActionType::PerpOpen);
        let unstake_idx = orders.iter().position(|o| o.action_type == ActionType::Unstake);
        assert!(hedge_idx.is_some());
        assert!(unstake_idx.is_some());
        assert!(hedge_idx.unwrap() < unstake_idx.unwrap());
    }
}
