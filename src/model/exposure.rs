use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::amount::{QuoteAmount, ReferenceAmount, ScaledAmount, UnderlyingAmount};
use super::position::{PerpSide, PositionKey};
use super::Timestamp;

/// Per-key exposure quadruple (§3): `native` is what the wallet literally
/// holds, `underlying` is the index-converted economic quantity,
/// `reference_asset` is denominated in the strategy's reference asset, and
/// `quote` is in the share-class currency. `perp_side` carries the key's
/// `entry_context.side` through for `Perp` keys so strategies can read
/// signed notional (long positive, short negative) without re-deriving it
/// from the position store.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Exposure {
    pub native: ScaledAmount,
    pub underlying: UnderlyingAmount,
    pub reference_asset: ReferenceAmount,
    pub quote: QuoteAmount,
    pub perp_side: Option<PerpSide>,
}

impl Exposure {
    /// Underlying amount signed by perp direction: positive for long or
    /// any non-perp key, negative for short. The convention basis/hedge
    /// target-allocation math uses throughout (§4.6).
    pub fn signed_underlying(&self) -> f64 {
        match self.perp_side {
            Some(PerpSide::Short) => -self.underlying.raw(),
            _ => self.underlying.raw(),
        }
    }
}

/// Per-key exposures plus aggregates. `net_delta` is in the reference
/// asset; debts contribute negatively. `total_value`/`token_equity` are in
/// share-class units — `token_equity` nets assets against debts but
/// excludes perp notional (perps are margin-collateralized, not held).
/// `token_equity_reference` is the same net-of-debt aggregate expressed in
/// the reference asset, used by the Risk Monitor's delta-drift fraction
/// (§4.4) so it never has to re-derive a share-class conversion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExposureSnapshot {
    pub timestamp: Timestamp,
    pub per_key: HashMap<PositionKey, Exposure>,
    pub net_delta: ReferenceAmount,
    pub token_equity: QuoteAmount,
    pub token_equity_reference: ReferenceAmount,
    pub total_value: QuoteAmount,
}

impl ExposureSnapshot {
    pub fn get(&self, key: &PositionKey) -> Exposure {
        self.per_key.get(key).copied().unwrap_or_default()
    }
}
