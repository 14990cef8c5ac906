use std::collections::HashMap;

use crate::config::RiskThresholds;
use crate::model::position::{PositionType, Venue};
use crate::model::risk::LiquidationSimulation;
use crate::model::{CexMargin, DeltaDrift, ExposureSnapshot, LendingHealth, RiskAssessment, Status};

fn protocol_name(venue: Venue) -> &'static str {
    match venue {
        Venue::AaveV3 => "aave_v3",
        Venue::Morpho => "morpho",
        Venue::EtherFi => "etherfi",
        Venue::Lido => "lido",
        Venue::Binance => "binance",
        Venue::Bybit => "bybit",
        Venue::Okx => "okx",
        Venue::Wallet => "wallet",
    }
}

fn is_cex(venue: Venue) -> bool {
    matches!(venue, Venue::Binance | Venue::Bybit | Venue::Okx)
}

fn is_lending(venue: Venue) -> bool {
    matches!(venue, Venue::AaveV3 | Venue::Morpho)
}

/// Assumed initial-margin fraction absent a venue-specific value in the
/// market snapshot; `required_margin` is diagnostic, not enforced by the
/// core (the venue itself rejects under-margined orders).
const DEFAULT_INITIAL_MARGIN_FRACTION: f64 = 0.1;
const DEFAULT_MAINTENANCE_MARGIN_FRACTION: f64 = 0.05;
/// Liquidator's maximum single-pass debt repayment fraction (§4.4).
const DEFAULT_CLOSE_FACTOR: f64 = 0.5;

/// Computes lending health, CEX margin health, and delta drift from an
/// exposure snapshot (§4.4). Thresholds are applied uniformly regardless
/// of mode — "the component applies them without mode-branching logic".
pub struct RiskMonitor {
    pub thresholds: RiskThresholds,
}

impl RiskMonitor {
    pub fn new(thresholds: RiskThresholds) -> Self {
        Self { thresholds }
    }

    pub fn compute(
        &self,
        exposure: &ExposureSnapshot,
        risk_params: &HashMap<(String, String), crate::model::market::RiskParams>,
        target_delta: f64,
    ) -> RiskAssessment {
        let lending_health = self.compute_lending_health(exposure, risk_params);
        let cex_margin = self.compute_cex_margin(exposure);
        let delta_drift = self.compute_delta_drift(exposure, target_delta);

        let mut assessment = RiskAssessment {
            timestamp: exposure.timestamp,
            lending_health,
            cex_margin,
            delta_drift,
            overall_status: Status::Safe,
        };
        assessment.recompute_overall();
        assessment
    }

    fn compute_lending_health(
        &self,
        exposure: &ExposureSnapshot,
        risk_params: &HashMap<(String, String), crate::model::market::RiskParams>,
    ) -> HashMap<String, LendingHealth> {
        let mut collateral_u: HashMap<String, f64> = HashMap::new();
        let mut debt_u: HashMap<String, f64> = HashMap::new();
        let mut weighted_threshold: HashMap<String, f64> = HashMap::new();

        for (key, exp) in &exposure.per_key {
            if !is_lending(key.venue) {
                continue;
            }
            let protocol = protocol_name(key.venue).to_string();
            match key.position_type {
                PositionType::AToken | PositionType::BaseToken => {
                    let u = exp.underlying.raw();
                    *collateral_u.entry(protocol.clone()).or_insert(0.0) += u;
                    let threshold = risk_params
                        .get(&(protocol.clone(), key.symbol.clone()))
                        .map(|p| p.liquidation_threshold)
                        .unwrap_or(0.8);
                    *weighted_threshold.entry(protocol).or_insert(0.0) += u * threshold;
                }
                PositionType::VariableDebt => {
                    *debt_u.entry(protocol).or_insert(0.0) += exp.underlying.raw();
                }
                _ => {}
            }
        }

        let mut out = HashMap::new();
        let protocols: std::collections::HashSet<String> = collateral_u
            .keys()
            .chain(debt_u.keys())
            .cloned()
            .collect();

        for protocol in protocols {
            let collateral = collateral_u.get(&protocol).copied().unwrap_or(0.0);
            let debt = debt_u.get(&protocol).copied().unwrap_or(0.0);
            let liquidation_threshold = if collateral > 1e-12 {
                weighted_threshold.get(&protocol).copied().unwrap_or(0.0) / collateral
            } else {
                0.0
            };

            let ltv = if collateral > 1e-12 { debt / collateral } else { 0.0 };
            let health_factor = if debt <= 1e-12 {
                f64::INFINITY
            } else {
                (liquidation_threshold * collateral) / debt
            };
            let buffer_to_liq = liquidation_threshold - ltv;
            let pct_price_move_to_liq = if health_factor > 1.0 {
                (1.0 - 1.0 / health_factor) * 100.0
            } else {
                0.0
            };

            let status = if ltv >= self.thresholds.lending_ltv_critical {
                Status::Critical
            } else if ltv >= self.thresholds.lending_ltv_warning() {
                Status::Warning
            } else {
                Status::Safe
            };

            out.insert(
                protocol,
                LendingHealth {
                    ltv,
                    health_factor,
                    liquidation_threshold,
                    buffer_to_liq,
                    pct_price_move_to_liq,
                    status,
                },
            );
        }

        out
    }

    fn compute_cex_margin(&self, exposure: &ExposureSnapshot) -> HashMap<String, CexMargin> {
        let mut balance: HashMap<String, f64> = HashMap::new();
        let mut notional: HashMap<String, f64> = HashMap::new();

        for (key, exp) in &exposure.per_key {
            if !is_cex(key.venue) {
                continue;
            }
            let venue = protocol_name(key.venue).to_string();
            match key.position_type {
                PositionType::Perp => {
                    *notional.entry(venue).or_insert(0.0) += exp.quote.raw().abs();
                }
                PositionType::BaseToken | PositionType::Spot => {
                    *balance.entry(venue).or_insert(0.0) += exp.quote.raw();
                }
                _ => {}
            }
        }

        let mut out = HashMap::new();
        for (venue, exposure_notional) in &notional {
            if *exposure_notional < 1e-9 {
                continue;
            }
            let bal = balance.get(venue).copied().unwrap_or(0.0);
            let margin_ratio = bal / exposure_notional;
            let required_margin = exposure_notional * DEFAULT_INITIAL_MARGIN_FRACTION;
            let maintenance_margin = exposure_notional * DEFAULT_MAINTENANCE_MARGIN_FRACTION;

            let status = if margin_ratio <= self.thresholds.cex_margin_ratio_critical {
                Status::Critical
            } else if margin_ratio <= self.thresholds.cex_margin_ratio_warning() {
                Status::Warning
            } else {
                Status::Safe
            };

            out.insert(
                venue.clone(),
                CexMargin {
                    balance: bal,
                    exposure_notional: *exposure_notional,
                    margin_ratio,
                    required_margin,
                    maintenance_margin,
                    status,
                },
            );
        }
        out
    }

    fn compute_delta_drift(&self, exposure: &ExposureSnapshot, target_delta: f64) -> DeltaDrift {
        let net_delta = exposure.net_delta.raw();
        let drift_absolute = (net_delta - target_delta).abs();
        let equity_reference = exposure.token_equity_reference.raw().abs().max(1e-9);
        let drift_fraction = drift_absolute / equity_reference;

        let status = if drift_fraction >= self.thresholds.delta_drift_critical {
            Status::Critical
        } else if drift_fraction >= self.thresholds.delta_drift_warning() {
            Status::Warning
        } else {
            Status::Safe
        };

        DeltaDrift {
            net_delta,
            target_delta,
            drift_absolute,
            drift_fraction,
            status,
        }
    }

    /// Diagnostic liquidation simulation (§4.4): given a hypothetical
    /// `collateral_u`/`debt_u` after a price move, report whether the
    /// position would be liquidated and the resulting seizure. Not wired
    /// into the decision loop.
    pub fn simulate_liquidation(
        collateral_u: f64,
        debt_u: f64,
        liquidation_threshold: f64,
        liquidation_bonus: f64,
    ) -> LiquidationSimulation {
        let hypothetical_health_factor = if debt_u <= 1e-12 {
            f64::INFINITY
        } else {
            (liquidation_threshold * collateral_u) / debt_u
        };
        let would_liquidate = hypothetical_health_factor < 1.0;

        let (repaid_debt, seized_collateral, post_collateral_u, post_debt_u) = if would_liquidate {
            let repaid = debt_u * DEFAULT_CLOSE_FACTOR;
            let seized = (repaid * (1.0 + liquidation_bonus)).min(collateral_u);
            (repaid, seized, collateral_u - seized, debt_u - repaid)
        } else {
            (0.0, 0.0, collateral_u, debt_u)
        };

        LiquidationSimulation {
            hypothetical_health_factor,
            would_liquidate,
            repaid_debt,
            seized_collateral,
            post_collateral_u,
            post_debt_u,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_debt_is_infinite_health_factor_and_safe() {
        let monitor = RiskMonitor::new(RiskThresholds::default());
        let exposure = ExposureSnapshot {
            timestamp: 1,
            ..Default::default()
        };
        let assessment = monitor.compute(&exposure, &HashMap::new(), 0.0);
        assert!(assessment.lending_health.is_empty());
        assert_eq!(assessment.overall_status, Status::Safe);
    }

    #[test]
    fn pct_price_move_to_liq_matches_health_factor_identity() {
        let monitor = RiskMonitor::new(RiskThresholds::default());
        let mut exposure = ExposureSnapshot {
            timestamp: 1,
            ..Default::default()
        };
        exposure.per_key.insert(
            crate::model::PositionKey::new(crate::model::Venue::AaveV3, PositionType::AToken, "USDT"),
            crate::model::Exposure { underlying: crate::model::amount::UnderlyingAmount(100.0), ..Default::default() },
        );
        exposure.per_key.insert(
            crate::model::PositionKey::new(crate::model::Venue::AaveV3, PositionType::VariableDebt, "USDT"),
            crate::model::Exposure { underlying: crate::model::amount::UnderlyingAmount(50.0), ..Default::default() },
        );
        let assessment = monitor.compute(&exposure, &HashMap::new(), 0.0);
        let health = assessment.lending_health.get("aave_v3").unwrap();
        assert!(health.health_factor > 1.0);
        let expected = (1.0 - 1.0 / health.health_factor) * 100.0;
        assert!((health.pct_price_move_to_liq - expected).abs() < 1e-9);
    }

    #[test]
    fn liquidation_simulation_flags_sub_one_health_factor() {
        let sim = RiskMonitor::simulate_liquidation(100.0, 90.0, 0.85, 0.05);
        assert!(sim.would_liquidate);
        assert!(sim.seized_collateral > 0.0);
        assert!(sim.post_debt_u < 90.0);
    }

    #[test]
    fn healthy_position_simulation_does_not_liquidate() {
        let sim = RiskMonitor::simulate_liquidation(100.0, 10.0, 0.85, 0.05);
        assert!(!sim.would_liquidate);
        assert_eq!(sim.seized_collateral, 0.0);
    }
}
