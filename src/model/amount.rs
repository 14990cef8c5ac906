use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::ops::{Add, Neg, Sub};

/// Distinct numeric newtypes for each stage of the conversion chain
/// (§4.3): `scaled_balance × liquidity_index → underlying_amount →
/// (oracle) → reference_asset_amount → (spot) → quote_currency_amount`.
///
/// The only bridge between `ScaledAmount` and `UnderlyingAmount` is
/// `ScaledAmount::to_underlying`, which takes an index. Risk and
/// health-factor functions accept `UnderlyingAmount` only — this is the
/// type-level fix for the "scaled balances used as underlying" bug class
/// named in the design notes.
macro_rules! amount_newtype {
    ($name:ident) => {
        #[derive(
            Debug, Default, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize, JsonSchema,
        )]
        pub struct $name(pub f64);

        impl $name {
            pub const ZERO: $name = $name(0.0);

            pub fn raw(self) -> f64 {
                self.0
            }

            pub fn abs(self) -> $name {
                $name(self.0.abs())
            }

            pub fn is_zero(self) -> bool {
                self.0 == 0.0
            }
        }

        impl Add for $name {
            type Output = $name;
            fn add(self, rhs: $name) -> $name {
                $name(self.0 + rhs.0)
            }
        }

        impl Sub for $name {
            type Output = $name;
            fn sub(self, rhs: $name) -> $name {
                $name(self.0 - rhs.0)
            }
        }

        impl Neg for $name {
            type Output = $name;
            fn neg(self) -> $name {
                $name(-self.0)
            }
        }

        impl std::iter::Sum for $name {
            fn sum<I: Iterator<Item = $name>>(iter: I) -> $name {
                $name(iter.map(|v| v.0).sum())
            }
        }
    };
}

amount_newtype!(ScaledAmount);
amount_newtype!(UnderlyingAmount);
amount_newtype!(ReferenceAmount);
amount_newtype!(QuoteAmount);

impl ScaledAmount {
    /// Apply a liquidity/borrow index to convert a scaled balance to its
    /// underlying amount. The index must be positive (§4.3 `EXP.InvalidIndex`).
    pub fn to_underlying(self, index: f64) -> UnderlyingAmount {
        UnderlyingAmount(self.0 * index)
    }
}

impl UnderlyingAmount {
    /// Apply an oracle price to convert an underlying amount into the
    /// strategy's reference asset.
    pub fn to_reference(self, oracle_price: f64) -> ReferenceAmount {
        ReferenceAmount(self.0 * oracle_price)
    }
}

impl ReferenceAmount {
    /// Apply a spot price to convert a reference-asset amount into the
    /// share-class quote currency.
    pub fn to_quote(self, spot_price: f64) -> QuoteAmount {
        QuoteAmount(self.0 * spot_price)
    }
}
