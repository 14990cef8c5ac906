use serde::{Deserialize, Serialize};

use super::position::PositionKey;

/// Absolute-plus-relative tolerance band used when comparing an expected
/// delta against an observed one (§4.9). Either component may apply per
/// key — debt positions typically use a tighter tolerance than staked LSTs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Tolerance {
    /// Smallest-unit absolute epsilon.
    pub absolute: f64,
    /// Fraction of the expected magnitude, e.g. `0.001` for 0.1%.
    pub relative: f64,
}

impl Tolerance {
    pub const fn new(absolute: f64, relative: f64) -> Self {
        Self { absolute, relative }
    }

    /// Debt positions carry a tighter band than staked/LST positions.
    pub fn for_position_type(position_type: super::position::PositionType) -> Self {
        use super::position::PositionType::*;
        match position_type {
            VariableDebt => Tolerance::new(1e-6, 0.0005),
            AToken | Staked => Tolerance::new(1e-6, 0.002),
            _ => Tolerance::new(1e-6, 0.001),
        }
    }

    pub fn within(&self, expected: f64, observed: f64) -> bool {
        let diff = (expected - observed).abs();
        let band = self.absolute.max(expected.abs() * self.relative);
        diff <= band
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Discrepancy {
    pub key: PositionKey,
    pub expected: f64,
    pub observed: f64,
}

/// `{ success, discrepancies, tolerance_used }` (§3, §4.9). Matching is
/// per-key; a key missing on one side is treated as zero on that side.
/// `tolerance_used` records the band actually applied to each key checked,
/// in case it later needs to be reproduced outside the engine (tolerance
/// varies by `PositionType`, see `Tolerance::for_position_type`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationResult {
    pub success: bool,
    pub discrepancies: Vec<Discrepancy>,
    pub tolerance_used: Vec<(PositionKey, Tolerance)>,
}
