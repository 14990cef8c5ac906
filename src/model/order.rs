use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::position::PositionKey;

/// What a routed order does. Mirrors the venue action vocabulary across
/// lending, staking, CEX and atomic-flash flows (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Supply,
    Withdraw,
    Borrow,
    Repay,
    Stake,
    Unstake,
    SpotTrade,
    PerpOpen,
    PerpClose,
    WalletTransfer,
    FlashBorrow,
    FlashRepay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

/// The delta a decision module predicts will materialize on a given key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DeltaSpec {
    pub key: PositionKey,
    pub signed_amount: f64,
}

/// `{ order_id, venue, instrument, side, action_type, amount, ...,
/// expected_deltas }` (§3). Strategy is not allowed to mutate these after
/// emission; the Execution Manager routes them in the order returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Order {
    pub order_id: String,
    pub venue: String,
    pub instrument: String,
    pub side: OrderSide,
    pub action_type: ActionType,
    pub amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub take_profit: Option<f64>,
    /// Orders sharing an `atomic_group_id` must all succeed or all fail —
    /// the venue interface reports one handshake per group (§4.7).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub atomic_group_id: Option<String>,
    pub expected_deltas: Vec<DeltaSpec>,
}

impl Order {
    /// A malformed order — unknown venue, ambiguous key, or no expected
    /// deltas — is a `StrategyContract` violation (§7), checked before the
    /// Execution Manager routes it.
    pub fn validate(&self) -> Result<(), String> {
        if self.venue.trim().is_empty() {
            return Err(format!("order {}: empty venue", self.order_id));
        }
        if self.expected_deltas.is_empty() {
            return Err(format!(
                "order {}: missing expected_deltas",
                self.order_id
            ));
        }
        if self.amount < 0.0 {
            return Err(format!("order {}: negative amount", self.order_id));
        }
        Ok(())
    }
}
