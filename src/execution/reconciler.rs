use crate::model::{Discrepancy, Order, PositionKey, ReconciliationResult, Tolerance};

/// Pure check function (§4.9, resolving the source's two-tight-loop
/// ambiguity per §9: the Execution Manager owns the loop, the Reconciler
/// only compares expected vs actual). Stateless — every call is
/// independent of prior attempts.
pub struct Reconciler;

impl Reconciler {
    /// Compare `expected` against `actual` per key. A key present on only
    /// one side is treated as zero on the other (§4.9).
    pub fn check(
        expected: &[(PositionKey, f64)],
        actual: &[(PositionKey, f64)],
        tolerance_for: impl Fn(&PositionKey) -> Tolerance,
    ) -> ReconciliationResult {
        use std::collections::HashMap;

        let mut expected_by_key: HashMap<&PositionKey, f64> = HashMap::new();
        for (key, amount) in expected {
            *expected_by_key.entry(key).or_insert(0.0) += amount;
        }
        let mut actual_by_key: HashMap<&PositionKey, f64> = HashMap::new();
        for (key, amount) in actual {
            *actual_by_key.entry(key).or_insert(0.0) += amount;
        }

        let mut keys: Vec<&PositionKey> = expected_by_key.keys().copied().collect();
        for key in actual_by_key.keys() {
            if !expected_by_key.contains_key(key) {
                keys.push(key);
            }
        }

        let mut discrepancies = Vec::new();
        let mut tolerance_used = Vec::new();
        for key in keys {
            let expected_amount = expected_by_key.get(key).copied().unwrap_or(0.0);
            let actual_amount = actual_by_key.get(key).copied().unwrap_or(0.0);
            let tolerance = tolerance_for(key);
            tolerance_used.push(((*key).clone(), tolerance));
            if !tolerance.within(expected_amount, actual_amount) {
                discrepancies.push(Discrepancy {
                    key: (*key).clone(),
                    expected: expected_amount,
                    observed: actual_amount,
                });
            }
        }

        ReconciliationResult {
            success: discrepancies.is_empty(),
            discrepancies,
            tolerance_used,
        }
    }

    /// Convenience entry point from an `Order`'s `expected_deltas`.
    pub fn check_order(
        order: &Order,
        actual: &[(PositionKey, f64)],
        tolerance_for: impl Fn(&PositionKey) -> Tolerance,
    ) -> ReconciliationResult {
        let expected: Vec<(PositionKey, f64)> = order
            .expected_deltas
            .iter()
            .map(|d| (d.key.clone(), d.signed_amount))
            .collect();
        Self::check(&expected, actual, tolerance_for)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PositionType;
    use crate::model::Venue;

    fn key(symbol: &str) -> PositionKey {
        PositionKey::new(Venue::AaveV3, PositionType::AToken, symbol)
    }

    #[test]
    fn within_tolerance_succeeds() {
        let expected = vec![(key("USDT"), 1000.0)];
        let actual = vec![(key("USDT"), 999.5)];
        let result = Reconciler::check(&expected, &actual, |_| Tolerance::new(1.0, 0.0));
        assert!(result.success);
    }

    #[test]
    fn missing_key_on_actual_side_treated_as_zero() {
        let expected = vec![(key("USDT"), 1000.0)];
        let actual: Vec<(PositionKey, f64)> = vec![];
        let result = Reconciler::check(&expected, &actual, |_| Tolerance::new(1.0, 0.001));
        assert!(!result.success);
        assert_eq!(result.discrepancies[0].observed, 0.0);
    }

    #[test]
    fn outside_tolerance_fails() {
        let expected = vec![(key("USDT"), 1000.0)];
        let actual = vec![(key("USDT"), 900.0)];
        let result = Reconciler::check(&expected, &actual, |_| Tolerance::new(1e-6, 0.001));
        assert!(!result.success);
    }
}
