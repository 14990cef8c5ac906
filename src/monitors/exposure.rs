use std::collections::HashMap;

use crate::error::EngineError;
use crate::model::amount::{ReferenceAmount, ScaledAmount};
use crate::model::position::{PerpSide, PositionType, Venue};
use crate::model::{Exposure, ExposureSnapshot, MarketSnapshot, PositionKey, PositionSnapshot};

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

fn is_lst_venue(venue: Venue) -> bool {
    matches!(venue, Venue::EtherFi | Venue::Lido)
}

/// Sign applied to a key's reference-asset amount when folding it into the
/// aggregate `net_delta` (§3: "debts contribute negatively"). Perp sign
/// follows `entry_context.side`; everything else is long-only in this
/// model.
fn net_delta_sign(position_type: PositionType, side: Option<PerpSide>) -> f64 {
    match position_type {
        PositionType::VariableDebt => -1.0,
        PositionType::Perp => match side {
            Some(PerpSide::Long) | None => 1.0,
            Some(PerpSide::Short) => -1.0,
        },
        _ => 1.0,
    }
}

fn is_debt(position_type: PositionType) -> bool {
    matches!(position_type, PositionType::VariableDebt)
}

fn is_perp(position_type: PositionType) -> bool {
    matches!(position_type, PositionType::Perp)
}

/// Runs the conversion chain of §4.3: `scaled × index → underlying`,
/// `underlying × oracle/price → reference_asset`, `reference_asset × spot
/// → quote`. Collateral uses `liquidity_index`; debt uses `borrow_index`.
pub struct ExposureMonitor {
    pub reference_asset: String,
    pub share_class_asset: String,
}

impl ExposureMonitor {
    pub fn new(reference_asset: impl Into<String>, share_class_asset: impl Into<String>) -> Self {
        Self {
            reference_asset: reference_asset.into(),
            share_class_asset: share_class_asset.into(),
        }
    }

    pub fn compute(
        &self,
        snapshot: &PositionSnapshot,
        market: &MarketSnapshot,
    ) -> Result<ExposureSnapshot, EngineError> {
        let mut per_key: HashMap<PositionKey, Exposure> = HashMap::new();
        let mut net_delta = ReferenceAmount::ZERO;
        let mut token_equity = crate::model::amount::QuoteAmount::ZERO;
        let mut token_equity_reference = ReferenceAmount::ZERO;

        let share_class_spot = market
            .usd_price(&self.share_class_asset)
            .unwrap_or(1.0)
            .max(1e-12);

        for (key, position) in &snapshot.positions {
            if position.scaled_amount.abs() < 1e-12 {
                continue;
            }
            let native = ScaledAmount(position.scaled_amount);

            let underlying = match key.position_type {
                PositionType::AToken | PositionType::BaseToken => {
                    let index = market
                        .index(protocol_name(key.venue), &key.symbol)
                        .ok_or_else(|| EngineError::IndexInvalid {
                            protocol: protocol_name(key.venue).to_string(),
                            token: key.symbol.clone(),
                            reason: "missing".to_string(),
                        })?;
                    if index.liquidity_index <= 0.0 {
                        return Err(EngineError::IndexInvalid {
                            protocol: protocol_name(key.venue).to_string(),
                            token: key.symbol.clone(),
                            reason: format!("non-positive liquidity_index {}", index.liquidity_index),
                        });
                    }
                    native.to_underlying(index.liquidity_index)
                }
                PositionType::VariableDebt => {
                    let index = market
                        .index(protocol_name(key.venue), &key.symbol)
                        .ok_or_else(|| EngineError::IndexInvalid {
                            protocol: protocol_name(key.venue).to_string(),
                            token: key.symbol.clone(),
                            reason: "missing".to_string(),
                        })?;
                    if index.borrow_index <= 0.0 {
                        return Err(EngineError::IndexInvalid {
                            protocol: protocol_name(key.venue).to_string(),
                            token: key.symbol.clone(),
                            reason: format!("non-positive borrow_index {}", index.borrow_index),
                        });
                    }
                    native.to_underlying(index.borrow_index)
                }
                PositionType::Spot | PositionType::Perp | PositionType::Staked => {
                    crate::model::amount::UnderlyingAmount(native.raw())
                }
            };

            let reference_asset = if key.symbol == self.reference_asset {
                ReferenceAmount(underlying.raw())
            } else if is_lst_venue(key.venue) && key.position_type == PositionType::Staked {
                let pair = format!("{}/{}", key.symbol, self.reference_asset);
                let rate = market
                    .oracle(protocol_name(key.venue), &pair)
                    .ok_or_else(|| EngineError::OracleInvalid {
                        pair: pair.clone(),
                        reason: "missing".to_string(),
                    })?;
                if rate <= 0.0 {
                    return Err(EngineError::OracleInvalid {
                        pair,
                        reason: format!("non-positive rate {rate}"),
                    });
                }
                underlying.to_reference(rate)
            } else {
                let price = market.reference_price(&key.symbol).ok_or_else(|| {
                    EngineError::DataMissing {
                        timestamp: market.timestamp,
                        key: format!("price:{}", key.symbol),
                    }
                })?;
                underlying.to_reference(price)
            };

            let spot_for_quote = market.usd_price(&key.symbol).unwrap_or(share_class_spot);
            let quote = reference_asset.to_quote(spot_for_quote / share_class_spot);

            per_key.insert(
                key.clone(),
                Exposure {
                    native,
                    underlying,
                    reference_asset,
                    quote,
                    perp_side: position.entry_context.map(|c| c.side),
                },
            );

            let sign = net_delta_sign(
                key.position_type,
                position.entry_context.map(|c| c.side),
            );
            net_delta = net_delta + ReferenceAmount(reference_asset.raw() * sign);

            if !is_perp(key.position_type) {
                let equity_sign = if is_debt(key.position_type) { -1.0 } else { 1.0 };
                token_equity = token_equity + crate::model::amount::QuoteAmount(quote.raw() * equity_sign);
                token_equity_reference =
                    token_equity_reference + ReferenceAmount(reference_asset.raw() * equity_sign);
            }
        }

        Ok(ExposureSnapshot {
            timestamp: snapshot.timestamp,
            per_key,
            net_delta,
            token_equity,
            token_equity_reference,
            total_value: token_equity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Position, PositionType};
    use std::collections::HashMap as Map;

    fn market_with_index(protocol: &str, token: &str, liquidity_index: f64) -> MarketSnapshot {
        let mut market = MarketSnapshot {
            timestamp: 1,
            ..Default::default()
        };
        market.indices.insert(
            (protocol.to_string(), token.to_string()),
            crate::model::market::ProtocolIndex {
                liquidity_index,
                borrow_index: 1.0,
            },
        );
        market
            .prices
            .insert(token.to_string(), (1.0, 1.0));
        market
    }

    #[test]
    fn lending_collateral_grows_with_liquidity_index() {
        let monitor = ExposureMonitor::new("USDT", "USDT");
        let key = PositionKey::new(Venue::AaveV3, PositionType::AToken, "USDT");
        let mut positions = Map::new();
        positions.insert(key.clone(), Position { key: key.clone(), scaled_amount: 100.0, entry_context: None });
        let snapshot = PositionSnapshot { timestamp: 1, positions };
        let market = market_with_index("aave_v3", "USDT", 1.05);

        let exposure = monitor.compute(&snapshot, &market).unwrap();
        let e = exposure.get(&key);
        assert!((e.underlying.raw() - 105.0).abs() < 1e-9);
    }

    #[test]
    fn zero_liquidity_index_is_invalid() {
        let monitor = ExposureMonitor::new("USDT", "USDT");
        let key = PositionKey::new(Venue::AaveV3, PositionType::AToken, "USDT");
        let mut positions = Map::new();
        positions.insert(key.clone(), Position { key: key.clone(), scaled_amount: 100.0, entry_context: None });
        let snapshot = PositionSnapshot { timestamp: 1, positions };
        let market = market_with_index("aave_v3", "USDT", 0.0);

        assert!(monitor.compute(&snapshot, &market).is_err());
    }

    #[test]
    fn debt_reduces_token_equity() {
        let monitor = ExposureMonitor::new("USDT", "USDT");
        let collateral_key = PositionKey::new(Venue::AaveV3, PositionType::AToken, "USDT");
        let debt_key = PositionKey::new(Venue::AaveV3, PositionType::VariableDebt, "USDT");
        let mut positions = Map::new();
        positions.insert(
            collateral_key.clone(),
            Position { key: collateral_key.clone(), scaled_amount: 100.0, entry_context: None },
        );
        positions.insert(
            debt_key.clone(),
            Position { key: debt_key.clone(), scaled_amount: 40.0, entry_context: None },
        );
        let snapshot = PositionSnapshot { timestamp: 1, positions };
        let market = market_with_index("aave_v3", "USDT", 1.0);

        let exposure = monitor.compute(&snapshot, &market).unwrap();
        assert!((exposure.token_equity.raw() - 60.0).abs() < 1e-6);
    }
}
