use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::Venue;

/// Currency of P&L reporting and equity tracking (§6 "Mode configuration").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ShareClass {
    Usdt,
    Eth,
}

impl ShareClass {
    /// The underlying asset symbol equity is denominated in.
    pub fn asset(&self) -> &'static str {
        match self {
            ShareClass::Usdt => "USDT",
            ShareClass::Eth => "ETH",
        }
    }
}

/// Per-dimension Critical thresholds; Warning is derived as a fraction of
/// Critical (§4.4) rather than configured separately.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
pub struct RiskThresholds {
    pub lending_ltv_critical: f64,
    pub cex_margin_ratio_critical: f64,
    pub delta_drift_critical: f64,
    /// Fraction of each Critical threshold at which status becomes Warning.
    pub warning_fraction: f64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            lending_ltv_critical: 0.85,
            cex_margin_ratio_critical: 0.15,
            delta_drift_critical: 0.02,
            warning_fraction: 0.6,
        }
    }
}

impl RiskThresholds {
    pub fn lending_ltv_warning(&self) -> f64 {
        self.lending_ltv_critical * self.warning_fraction
    }

    pub fn cex_margin_ratio_warning(&self) -> f64 {
        self.cex_margin_ratio_critical / self.warning_fraction.max(1e-9)
    }

    pub fn delta_drift_warning(&self) -> f64 {
        self.delta_drift_critical * self.warning_fraction
    }
}

/// ML-directional mode specifics (§6).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
pub struct MlConfig {
    pub signal_threshold: f64,
    pub take_profit_sd: f64,
    pub stop_loss_sd: f64,
    pub sd_floor_bps: f64,
    pub sd_cap_bps: f64,
}

/// A venue paired with the fraction of the relevant side routed there.
/// Used for both basis-trade perp legs and hedge-side perp legs; fractions
/// within a single `Vec<VenueWeight>` must sum to 1.0.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct VenueWeight {
    pub venue: Venue,
    pub weight: f64,
}

fn weights_sum_to_one(weights: &[VenueWeight]) -> Result<(), String> {
    if weights.is_empty() {
        return Err("venue weight list is empty".to_string());
    }
    let total: f64 = weights.iter().map(|w| w.weight).sum();
    if (total - 1.0).abs() > 1e-6 {
        return Err(format!("venue weights sum to {total}, expected 1.0"));
    }
    if weights.iter().any(|w| w.weight < 0.0) {
        return Err("venue weight is negative".to_string());
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PureLendingConfig {
    pub share_class: ShareClass,
    pub asset: String,
    pub protocol: String,
    pub position_deviation_threshold: f64,
    pub risk_thresholds: RiskThresholds,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BasisConfig {
    pub share_class: ShareClass,
    pub asset: String,
    pub market_neutral: bool,
    pub perp_venues: Vec<VenueWeight>,
    pub position_deviation_threshold: f64,
    pub max_delta_drift: f64,
    pub risk_thresholds: RiskThresholds,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DirectionalStakingConfig {
    pub share_class: ShareClass,
    pub asset: String,
    pub lst_type: String,
    pub position_deviation_threshold: f64,
    pub risk_thresholds: RiskThresholds,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LeveragedStakingConfig {
    pub share_class: ShareClass,
    pub asset: String,
    pub lst_type: String,
    pub lending_protocol: String,
    pub target_ltv: f64,
    pub position_deviation_threshold: f64,
    pub risk_thresholds: RiskThresholds,
}

impl LeveragedStakingConfig {
    /// `leverage = target_ltv / (1 - target_ltv)` (§4.6).
    pub fn leverage(&self) -> f64 {
        self.target_ltv / (1.0 - self.target_ltv)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct HedgedStakingConfig {
    pub share_class: ShareClass,
    pub asset: String,
    pub lst_type: String,
    pub stake_allocation: f64,
    pub hedge_venues: Vec<VenueWeight>,
    pub position_deviation_threshold: f64,
    pub max_delta_drift: f64,
    pub risk_thresholds: RiskThresholds,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct HedgedLeveragedStakingConfig {
    pub share_class: ShareClass,
    pub asset: String,
    pub lst_type: String,
    pub lending_protocol: String,
    pub target_ltv: f64,
    pub stake_allocation: f64,
    pub hedge_venues: Vec<VenueWeight>,
    pub position_deviation_threshold: f64,
    pub max_delta_drift: f64,
    pub risk_thresholds: RiskThresholds,
}

impl HedgedLeveragedStakingConfig {
    pub fn leverage(&self) -> f64 {
        self.target_ltv / (1.0 - self.target_ltv)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MlDirectionalConfig {
    pub share_class: ShareClass,
    pub asset: String,
    pub venue: Venue,
    pub ml_config: MlConfig,
    pub risk_thresholds: RiskThresholds,
}

/// One variant per strategy mode (§4.6: "closed set of seven ... plus ML
/// directional"). Dispatch on this enum is exhaustive and compile-time
/// checked — there is no string-keyed mode lookup anywhere in the engine.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ModeConfig {
    PureLending(PureLendingConfig),
    Basis(BasisConfig),
    DirectionalStaking(DirectionalStakingConfig),
    LeveragedStaking(LeveragedStakingConfig),
    HedgedStaking(HedgedStakingConfig),
    HedgedLeveragedStaking(HedgedLeveragedStakingConfig),
    MlDirectional(MlDirectionalConfig),
}

impl ModeConfig {
    pub fn share_class(&self) -> ShareClass {
        match self {
            ModeConfig::PureLending(c) => c.share_class,
            ModeConfig::Basis(c) => c.share_class,
            ModeConfig::DirectionalStaking(c) => c.share_class,
            ModeConfig::LeveragedStaking(c) => c.share_class,
            ModeConfig::HedgedStaking(c) => c.share_class,
            ModeConfig::HedgedLeveragedStaking(c) => c.share_class,
            ModeConfig::MlDirectional(c) => c.share_class,
        }
    }

    pub fn risk_thresholds(&self) -> RiskThresholds {
        match self {
            ModeConfig::PureLending(c) => c.risk_thresholds,
            ModeConfig::Basis(c) => c.risk_thresholds,
            ModeConfig::DirectionalStaking(c) => c.risk_thresholds,
            ModeConfig::LeveragedStaking(c) => c.risk_thresholds,
            ModeConfig::HedgedStaking(c) => c.risk_thresholds,
            ModeConfig::HedgedLeveragedStaking(c) => c.risk_thresholds,
            ModeConfig::MlDirectional(c) => c.risk_thresholds,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ModeConfig::PureLending(_) => "pure_lending",
            ModeConfig::Basis(_) => "basis",
            ModeConfig::DirectionalStaking(_) => "directional_staking",
            ModeConfig::LeveragedStaking(_) => "leveraged_staking",
            ModeConfig::HedgedStaking(_) => "hedged_staking",
            ModeConfig::HedgedLeveragedStaking(_) => "hedged_leveraged_staking",
            ModeConfig::MlDirectional(_) => "ml_directional",
        }
    }

    /// Validate the mode's internal option combinations (§7 `ConfigError`:
    /// "mode config fails validation at construction"). Errors are
    /// collected rather than short-circuited, matching the teacher's
    /// validate-everything-then-report style.
    pub fn validate(&self) -> Result<(), Vec<ConfigError>> {
        let mut errors = Vec::new();

        let thresholds = self.risk_thresholds();
        if !(0.0..1.0).contains(&thresholds.lending_ltv_critical) {
            errors.push(ConfigError::OutOfRange {
                field: "risk_thresholds.lending_ltv_critical".to_string(),
                value: thresholds.lending_ltv_critical,
            });
        }
        if !(0.0..=1.0).contains(&thresholds.warning_fraction) {
            errors.push(ConfigError::OutOfRange {
                field: "risk_thresholds.warning_fraction".to_string(),
                value: thresholds.warning_fraction,
            });
        }

        match self {
            ModeConfig::PureLending(c) => {
                if !(0.0..1.0).contains(&c.position_deviation_threshold) {
                    errors.push(ConfigError::OutOfRange {
                        field: "position_deviation_threshold".to_string(),
                        value: c.position_deviation_threshold,
                    });
                }
            }
            ModeConfig::Basis(c) => {
                if let Err(msg) = weights_sum_to_one(&c.perp_venues) {
                    errors.push(ConfigError::InvalidCombination {
                        field: "perp_venues".to_string(),
                        message: msg,
                    });
                }
                if !(0.0..1.0).contains(&c.max_delta_drift) {
                    errors.push(ConfigError::OutOfRange {
                        field: "max_delta_drift".to_string(),
                        value: c.max_delta_drift,
                    });
                }
            }
            ModeConfig::DirectionalStaking(c) => {
                if !(0.0..1.0).contains(&c.position_deviation_threshold) {
                    errors.push(ConfigError::OutOfRange {
                        field: "position_deviation_threshold".to_string(),
                        value: c.position_deviation_threshold,
                    });
                }
            }
            ModeConfig::LeveragedStaking(c) => {
                if !(0.0..1.0).contains(&c.target_ltv) {
                    errors.push(ConfigError::OutOfRange {
                        field: "target_ltv".to_string(),
                        value: c.target_ltv,
                    });
                }
            }
            ModeConfig::HedgedStaking(c) => {
                if !(0.0..=1.0).contains(&c.stake_allocation) {
                    errors.push(ConfigError::OutOfRange {
                        field: "stake_allocation".to_string(),
                        value: c.stake_allocation,
                    });
                }
                if let Err(msg) = weights_sum_to_one(&c.hedge_venues) {
                    errors.push(ConfigError::InvalidCombination {
                        field: "hedge_venues".to_string(),
                        message: msg,
                    });
                }
                if !(0.0..1.0).contains(&c.max_delta_drift) {
                    errors.push(ConfigError::OutOfRange {
                        field: "max_delta_drift".to_string(),
                        value: c.max_delta_drift,
                    });
                }
            }
            ModeConfig::HedgedLeveragedStaking(c) => {
                if !(0.0..1.0).contains(&c.target_ltv) {
                    errors.push(ConfigError::OutOfRange {
                        field: "target_ltv".to_string(),
                        value: c.target_ltv,
                    });
                }
                if !(0.0..=1.0).contains(&c.stake_allocation) {
                    errors.push(ConfigError::OutOfRange {
                        field: "stake_allocation".to_string(),
                        value: c.stake_allocation,
                    });
                }
                if let Err(msg) = weights_sum_to_one(&c.hedge_venues) {
                    errors.push(ConfigError::InvalidCombination {
                        field: "hedge_venues".to_string(),
                        message: msg,
                    });
                }
                if !(0.0..1.0).contains(&c.max_delta_drift) {
                    errors.push(ConfigError::OutOfRange {
                        field: "max_delta_drift".to_string(),
                        value: c.max_delta_drift,
                    });
                }
            }
            ModeConfig::MlDirectional(c) => {
                if c.ml_config.sd_floor_bps > c.ml_config.sd_cap_bps {
                    errors.push(ConfigError::InvalidCombination {
                        field: "ml_config.sd_floor_bps/sd_cap_bps".to_string(),
                        message: format!(
                            "sd_floor_bps ({}) exceeds sd_cap_bps ({})",
                            c.ml_config.sd_floor_bps, c.ml_config.sd_cap_bps
                        ),
                    });
                }
                if !(0.0..=1.0).contains(&c.ml_config.signal_threshold) {
                    errors.push(ConfigError::OutOfRange {
                        field: "ml_config.signal_threshold".to_string(),
                        value: c.ml_config.signal_threshold,
                    });
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Mode config validation failures (§7 `ConfigError`). Grounded in the
/// teacher's `validate::ValidationError` enum shape — one variant per
/// failure class, collected into a `Vec` rather than failing on the first.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("`{field}` = {value} is out of its valid range")]
    OutOfRange { field: String, value: f64 },

    #[error("`{field}` is an invalid combination: {message}")]
    InvalidCombination { field: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basis() -> ModeConfig {
        ModeConfig::Basis(BasisConfig {
            share_class: ShareClass::Usdt,
            asset: "BTC".to_string(),
            market_neutral: true,
            perp_venues: vec![
                VenueWeight {
                    venue: Venue::Binance,
                    weight: 0.6,
                },
                VenueWeight {
                    venue: Venue::Bybit,
                    weight: 0.4,
                },
            ],
            position_deviation_threshold: 0.02,
            max_delta_drift: 0.02,
            risk_thresholds: RiskThresholds::default(),
        })
    }

    #[test]
    fn valid_basis_config_passes() {
        assert!(basis().validate().is_ok());
    }

    #[test]
    fn mismatched_weights_rejected() {
        let mut cfg = basis();
        if let ModeConfig::Basis(c) = &mut cfg {
            c.perp_venues[0].weight = 0.9;
        }
        let errors = cfg.validate().unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::InvalidCombination { field, .. } if field == "perp_venues")));
    }

    #[test]
    fn target_ltv_of_one_rejected() {
        let cfg = ModeConfig::LeveragedStaking(LeveragedStakingConfig {
            share_class: ShareClass::Eth,
            asset: "ETH".to_string(),
            lst_type: "weETH".to_string(),
            lending_protocol: "aave_v3".to_string(),
            target_ltv: 1.0,
            position_deviation_threshold: 0.02,
            risk_thresholds: RiskThresholds::default(),
        });
        assert!(cfg.validate().is_err());
    }
}
