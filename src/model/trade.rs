use serde::{Deserialize, Serialize};

use super::position::PositionKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandshakeStatus {
    Filled,
    Partial,
    Failed,
}

/// Returned by the Venue Interface (§3, §4.7): either `Filled` with
/// complete `actual_deltas`, `Partial` with a best-effort subset, or
/// `Failed`. `simulated` is `true` for backtest venues, `false` for live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionHandshake {
    pub order_id: String,
    pub status: HandshakeStatus,
    pub actual_deltas: Vec<(PositionKey, f64)>,
    pub fee_currency: String,
    pub fee_amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill_price: Option<f64>,
    pub duration_ms: u64,
    pub simulated: bool,
}

impl ExecutionHandshake {
    pub fn failed(order_id: impl Into<String>, duration_ms: u64, simulated: bool) -> Self {
        Self {
            order_id: order_id.into(),
            status: HandshakeStatus::Failed,
            actual_deltas: Vec::new(),
            fee_currency: "USDT".to_string(),
            fee_amount: 0.0,
            fill_price: None,
            duration_ms,
            simulated,
        }
    }
}
