use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::Timestamp;

/// Per-dimension / overall status. `Warning` is a configurable fraction
/// (typically 60%) of the `Critical` threshold — never a separate
/// mode-specific branch (§4.4: "the component applies them without
/// mode-branching logic").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Safe,
    Warning,
    Critical,
}

impl Status {
    /// Worst of two statuses (Critical > Warning > Safe).
    pub fn worst(self, other: Status) -> Status {
        self.max(other)
    }

    pub fn worst_of(statuses: impl IntoIterator<Item = Status>) -> Status {
        statuses
            .into_iter()
            .fold(Status::Safe, |acc, s| acc.worst(s))
    }
}

/// Per-protocol lending health. `health_factor` is `+∞` (represented as
/// `f64::INFINITY`) when `debt_u == 0`, per the zero-debt boundary case
/// (§8: "Zero debt: health_factor reported as +∞; risk status Safe").
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LendingHealth {
    pub ltv: f64,
    pub health_factor: f64,
    pub liquidation_threshold: f64,
    pub buffer_to_liq: f64,
    /// `(1 - 1/health_factor) * 100` if `health_factor > 1`, else `0` (§4.4,
    /// §8 "if health_factor > 1 then (1 − 1/hf) × 100 == pct_price_move_to_liq").
    pub pct_price_move_to_liq: f64,
    pub status: Status,
}

/// Per-venue CEX margin health.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CexMargin {
    pub balance: f64,
    pub exposure_notional: f64,
    pub margin_ratio: f64,
    pub required_margin: f64,
    pub maintenance_margin: f64,
    pub status: Status,
}

/// Net-delta drift relative to target, share-class aware.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DeltaDrift {
    pub net_delta: f64,
    pub target_delta: f64,
    pub drift_absolute: f64,
    pub drift_fraction: f64,
    pub status: Status,
}

impl Default for Status {
    fn default() -> Self {
        Status::Safe
    }
}

/// Composite risk assessment for a tick (§3). `overall_status` is the
/// worst of every per-dimension status present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub timestamp: Timestamp,
    /// Keyed by protocol name (e.g. "aave_v3").
    pub lending_health: HashMap<String, LendingHealth>,
    /// Keyed by CEX venue name (e.g. "binance").
    pub cex_margin: HashMap<String, CexMargin>,
    pub delta_drift: DeltaDrift,
    pub overall_status: Status,
}

impl RiskAssessment {
    pub fn recompute_overall(&mut self) {
        let mut worst = self.delta_drift.status;
        for h in self.lending_health.values() {
            worst = worst.worst(h.status);
        }
        for m in self.cex_margin.values() {
            worst = worst.worst(m.status);
        }
        self.overall_status = worst;
    }
}

/// Result of the diagnostic liquidation simulation (§4.4). Not wired into
/// the decision loop — exposed for risk reporting / what-if analysis.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LiquidationSimulation {
    pub hypothetical_health_factor: f64,
    pub would_liquidate: bool,
    pub repaid_debt: f64,
    pub seized_collateral: f64,
    pub post_collateral_u: f64,
    pub post_debt_u: f64,
}
