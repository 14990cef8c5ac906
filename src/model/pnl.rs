use serde::{Deserialize, Serialize};

use super::Timestamp;

/// Four independently-computed P&L sources (§4.5), each in reference-asset
/// units until the final share-class conversion.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PnlAttribution {
    pub yield_pnl: f64,
    pub funding_pnl: f64,
    pub price_pnl: f64,
    pub fees_pnl: f64,
}

impl PnlAttribution {
    pub fn total(&self) -> f64 {
        self.yield_pnl + self.funding_pnl + self.price_pnl + self.fees_pnl
    }
}

/// Per-tick P&L snapshot in share-class currency. `reconciliation_drift` is
/// the non-fatal mismatch between `attribution.total()` and the observed
/// equity change since the prior tick (`PNL.ReconciliationDrift`, recorded
/// but not a failure).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PnlSnapshot {
    pub timestamp: Timestamp,
    pub attribution: PnlAttribution,
    pub equity_change: f64,
    pub reconciliation_drift: f64,
    pub cumulative_pnl: f64,
}
