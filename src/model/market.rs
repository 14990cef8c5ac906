use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// `{ supply_rate, borrow_rate }` for a `(protocol, asset)` lending market.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LendingRate {
    pub supply_rate: f64,
    pub borrow_rate: f64,
}

/// Liquidity/borrow index pair for a `(protocol, token)` — both normalized
/// around 1.0 and monotonically non-decreasing under pure accrual (§4.3).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ProtocolIndex {
    pub liquidity_index: f64,
    pub borrow_index: f64,
}

/// `{ liquidation_threshold, liquidation_bonus, ltv_cap }` for a `(protocol,
/// asset)`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RiskParams {
    pub liquidation_threshold: f64,
    pub liquidation_bonus: f64,
    pub ltv_cap: f64,
}

/// One ML directional signal reading (§4.6): `confidence` is a raw `[0,1]`
/// score, `direction` is `+1`/`-1`, and `std_dev` is the basis for the
/// mode's stop-loss/take-profit bounds.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MlSignal {
    pub confidence: f64,
    pub direction: f64,
    pub std_dev: f64,
}

/// A time-indexed market/protocol-data snapshot — the contract of the
/// Clock & Data Provider collaborator (§4.1). Every field is keyed exactly
/// as spec.md prescribes; a required key missing at tick `t` fails the tick
/// with `EngineError::DataMissing`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub timestamp: u64,
    /// `prices[symbol] -> (usd_price, reference_asset_price)`.
    pub prices: HashMap<String, (f64, f64)>,
    /// `funding[(venue, instrument)] -> signed rate`.
    pub funding: HashMap<(String, String), f64>,
    /// `lending[(protocol, asset)] -> LendingRate`.
    pub lending: HashMap<(String, String), LendingRate>,
    /// `indices[(protocol, token)] -> ProtocolIndex`.
    pub indices: HashMap<(String, String), ProtocolIndex>,
    /// `oracles[(protocol, asset_pair)] -> price`.
    pub oracles: HashMap<(String, String), f64>,
    /// `risk_params[(protocol, asset)] -> RiskParams`.
    pub risk_params: HashMap<(String, String), RiskParams>,
    /// `staking_rewards[(protocol, asset)] -> accrual_rate`.
    pub staking_rewards: HashMap<(String, String), f64>,
    /// `ml_signals[asset] -> MlSignal`, consumed only by ML-directional mode.
    pub ml_signals: HashMap<String, MlSignal>,
}

impl MarketSnapshot {
    pub fn usd_price(&self, symbol: &str) -> Option<f64> {
        self.prices.get(symbol).map(|(usd, _)| *usd)
    }

    pub fn reference_price(&self, symbol: &str) -> Option<f64> {
        self.prices.get(symbol).map(|(_, reference)| *reference)
    }

    pub fn index(&self, protocol: &str, token: &str) -> Option<ProtocolIndex> {
        self.indices
            .get(&(protocol.to_string(), token.to_string()))
            .copied()
    }

    pub fn oracle(&self, protocol: &str, asset_pair: &str) -> Option<f64> {
        self.oracles
            .get(&(protocol.to_string(), asset_pair.to_string()))
            .copied()
    }

    pub fn risk_param(&self, protocol: &str, asset: &str) -> Option<RiskParams> {
        self.risk_params
            .get(&(protocol.to_string(), asset.to_string()))
            .copied()
    }

    pub fn funding_rate(&self, venue: &str, instrument: &str) -> Option<f64> {
        self.funding
            .get(&(venue.to_string(), instrument.to_string()))
            .copied()
    }

    pub fn lending_rate(&self, protocol: &str, asset: &str) -> Option<LendingRate> {
        self.lending
            .get(&(protocol.to_string(), asset.to_string()))
            .copied()
    }

    pub fn ml_signal(&self, asset: &str) -> Option<MlSignal> {
        self.ml_signals.get(asset).copied()
    }
}
