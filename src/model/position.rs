use std::collections::HashMap;
use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::Timestamp;

/// Venues a position can live on. CEX venues hold spot/perp positions;
/// on-chain venues hold lending and staking positions; `wallet` is the
/// undeployed-capital venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Venue {
    AaveV3,
    Morpho,
    EtherFi,
    Lido,
    Binance,
    Bybit,
    Okx,
    Wallet,
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Venue::AaveV3 => "aave_v3",
            Venue::Morpho => "morpho",
            Venue::EtherFi => "etherfi",
            Venue::Lido => "lido",
            Venue::Binance => "binance",
            Venue::Bybit => "bybit",
            Venue::Okx => "okx",
            Venue::Wallet => "wallet",
        };
        write!(f, "{s}")
    }
}

/// What kind of position this is. Lending-protocol scaled-balance tokens
/// (`BaseToken`/`AToken`/`VariableDebt`) are distinct from CEX spot/perp and
/// LST `Staked` positions — the exposure monitor treats them differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum PositionType {
    BaseToken,
    AToken,
    VariableDebt,
    Spot,
    Perp,
    Staked,
}

impl fmt::Display for PositionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PositionType::BaseToken => "BaseToken",
            PositionType::AToken => "aToken",
            PositionType::VariableDebt => "variableDebt",
            PositionType::Spot => "spot",
            PositionType::Perp => "perp",
            PositionType::Staked => "staked",
        };
        write!(f, "{s}")
    }
}

/// Canonical position identifier: `venue : position_type : symbol`.
/// Value-typed, hashable, stable across a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct PositionKey {
    pub venue: Venue,
    pub position_type: PositionType,
    pub symbol: String,
}

impl PositionKey {
    pub fn new(venue: Venue, position_type: PositionType, symbol: impl Into<String>) -> Self {
        Self {
            venue,
            position_type,
            symbol: symbol.into(),
        }
    }
}

impl fmt::Display for PositionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.venue, self.position_type, self.symbol)
    }
}

/// Perp position side, carried on positions of `PositionType::Perp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PerpSide {
    Long,
    Short,
}

/// Entry context for positions whose P&L attribution needs an entry point
/// (CEX perps). Absent for lending/staking positions (accrual doesn't need it).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EntryContext {
    pub side: PerpSide,
    pub entry_price: f64,
}

/// `{ key, scaled_amount, entry_context? }`. `scaled_amount` is the raw
/// on-venue quantity — for lending-protocol scaled-balance tokens this is
/// **constant** under pure accrual (§3 invariant: changes only via applied
/// execution deltas, never by market re-pricing or mutating for index growth).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Position {
    pub key: PositionKey,
    pub scaled_amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_context: Option<EntryContext>,
}

impl Position {
    pub fn zero(key: PositionKey) -> Self {
        Self {
            key,
            scaled_amount: 0.0,
            entry_context: None,
        }
    }
}

/// Immutable copy of the Position Store, handed read-only to monitors and
/// discarded after the tick unless the event log captures a summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub timestamp: Timestamp,
    pub positions: HashMap<PositionKey, Position>,
}

impl PositionSnapshot {
    pub fn get(&self, key: &PositionKey) -> Position {
        self.positions
            .get(key)
            .cloned()
            .unwrap_or_else(|| Position::zero(key.clone()))
    }
}
