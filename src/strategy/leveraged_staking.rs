use crate::config::LeveragedStakingConfig;
use crate::model::{ActionType, DeltaSpec, Order, OrderSide, PositionKey, PositionType, Venue};

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

const ATOMIC_GROUP: &str = "leveraged-stake";

/// Leveraged staking (§4.6): `leverage = target_ltv / (1 - target_ltv)`,
/// `supplied = equity × leverage`, `borrowed = equity × (leverage − 1)`.
/// Build-up and any resize of an existing position is a single five-step
/// atomic group (flash-borrow → stake → supply LST → borrow → flash-repay)
/// — all five share `ATOMIC_GROUP` and the Execution Manager routes them
/// through `route_atomic`, all-or-nothing.
pub struct LeveragedStakingStrategy {
    config: LeveragedStakingConfig,
}

impl LeveragedStakingStrategy {
    pub fn new(config: LeveragedStakingConfig) -> Self {
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

    /// Builds the five-step group moving `supplied`/`borrowed` by
    /// `delta_supplied`/`delta_borrowed` (positive = lever up, negative =
    /// delever). All legs reference asset amounts except stake/supply,
    /// which are in LST underlying — treated 1:1 with the reference asset
    /// at issuance (peg assumed at mint time, drift handled by the oracle
    /// conversion elsewhere).
    fn atomic_group(&self, delta_supplied: f64, delta_borrowed: f64) -> Vec<Order> {
        if delta_supplied.abs() < 1e-9 && delta_borrowed.abs() < 1e-9 {
            return Vec::new();
        }
        let venue_name = lending_venue(&self.config.lending_protocol).to_string();
        let group = Some(ATOMIC_GROUP.to_string());

        let leg = |seq: usize, key: PositionKey, action: ActionType, amount: f64, signed: f64| Order {
            order_id: format!("{}-{seq}", ATOMIC_GROUP),
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
            // Delever: reverse order — repay debt, withdraw LST collateral,
            // unstake, then repay the flash loan that funded the repay.
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

impl Strategy for LeveragedStakingStrategy {
    fn name(&self) -> &'static str {
        "leveraged_staking"
    }

    fn position_deviation_threshold(&self) -> f64 {
        self.config.position_deviation_threshold
    }

    /// Directional, not hedged — same self-tracking rationale as
    /// `directional_staking`; `decide` is fully overridden below anyway, but
    /// the engine still feeds this into the Risk Monitor ahead of it.
    fn target_delta(&self, exposure: &crate::model::ExposureSnapshot) -> f64 {
        exposure.net_delta.raw()
    }

    fn target_allocation(&mut self, inputs: &DecisionInputs) -> Vec<(PositionKey, f64)> {
        let equity = inputs.exposure.total_value.raw();
        let leverage = self.config.leverage();
        vec![
            (self.supply_key(), equity * leverage),
            (self.debt_key(), equity * (leverage - 1.0)),
        ]
    }

    /// Overridden in full: the generic `rebalance_to_target` archetype
    /// would emit independent Supply/Borrow orders with no flash-loan
    /// wrapper, violating the atomic build-up contract (§4.6).
    fn decide(&mut self, inputs: &DecisionInputs) -> Vec<Order> {
        let equity = inputs.exposure.total_value.raw();
        let leverage = self.config.leverage();
        let target_supplied = equity * leverage;
        let target_borrowed = equity * (leverage - 1.0);

        let current_supplied = inputs.exposure.get(&self.supply_key()).underlying.raw();
        let current_borrowed = inputs.exposure.get(&self.debt_key()).underlying.raw();

        if inputs.risk.overall_status == crate::model::Status::Critical {
            return self.atomic_group(
                -(current_supplied * 0.25),
                -(current_borrowed * 0.25),
            );
        }

        let deviation = if target_supplied.abs() > 1e-9 {
            ((target_supplied - current_supplied).abs() + (target_borrowed - current_borrowed).abs())
                / target_supplied.abs()
        } else {
            0.0
        };

        if deviation > self.position_deviation_threshold() {
            return self.atomic_group(
                target_supplied - current_supplied,
                target_borrowed - current_borrowed,
            );
        }

        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ShareClass;
    use crate::model::{ExposureSnapshot, MarketSnapshot, PnlSnapshot, QuoteAmount, RiskAssessment};

    fn config() -> LeveragedStakingConfig {
        LeveragedStakingConfig {
            share_class: ShareClass::Eth,
            asset: "ETH".to_string(),
            lst_type: "weETH".to_string(),
            lending_protocol: "aave_v3".to_string(),
            target_ltv: 0.8,
            position_deviation_threshold: 0.02,
            risk_thresholds: Default::default(),
        }
    }

    #[test]
    fn initial_build_up_is_one_atomic_group_of_five() {
        let mut strategy = LeveragedStakingStrategy::new(config());
        let mut exposure = ExposureSnapshot::default();
        exposure.total_value = QuoteAmount(100.0);
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

        let orders = strategy.decide(&inputs);
        assert_eq!(orders.len(), 5);
        assert!(orders.iter().all(|o| o.atomic_group_id.as_deref() == Some(ATOMIC_GROUP)));
        // leverage = 0.8 / 0.2 = 4; supplied = 400, borrowed = 300.
        let supply_leg = orders.iter().find(|o| o.action_type == ActionType::Supply).unwrap();
        assert!((supply_leg.amount - 400.0).abs() < 1e-6);
    }

    #[test]
    fn within_threshold_no_orders() {
        let mut strategy = LeveragedStakingStrategy::new(config());
        let mut exposure = ExposureSnapshot::default();
        exposure.total_value = QuoteAmount(100.0);
        exposure.per_key.insert(
            strategy.supply_key(),
            crate::model::Exposure {
                underlying: crate::model::UnderlyingAmount(400.0),
                ..Default::default()
            },
        );
        exposure.per_key.insert(
            strategy.debt_key(),
            crate::model::Exposure {
                underlying: crate::model::UnderlyingAmount(300.0),
                ..Default::default()
            },
        );
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
        assert!(strategy.decide(&inputs).is_empty());
    }
}
