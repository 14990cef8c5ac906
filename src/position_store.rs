use std::collections::HashMap;

use serde::Serialize;

use crate::error::EngineError;
use crate::model::{Position, PositionKey, PositionSnapshot, PositionType, Timestamp};

/// One non-zero delta applied to a key, emitted to the `state_update` event
/// category (§4.2, §6) alongside the trigger that caused it (e.g. an order
/// id, `"initial_capital"`, a funding settlement).
#[derive(Debug, Clone, Serialize)]
pub struct PositionChangeEvent {
    pub key: PositionKey,
    pub delta: f64,
    pub resulting_amount: f64,
    pub trigger: String,
    pub timestamp: Timestamp,
}

/// The single mutable shared state across a tick (§5 "Shared-resource
/// policy"): a map from `PositionKey` to its current scaled balance,
/// mutated only by `apply` and read only via `snapshot` (value copies —
/// direct mutation from readers is disallowed). Adapted from the teacher's
/// `NodeBalances` get/add/deduct pattern, generalized from
/// `(node_id, token)` pairs to canonical `PositionKey`s and widened to
/// enforce the non-negative-unless-debt invariant on every write.
#[derive(Debug, Default)]
pub struct PositionStore {
    positions: HashMap<PositionKey, Position>,
}

impl PositionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &PositionKey) -> Position {
        self.positions
            .get(key)
            .cloned()
            .unwrap_or_else(|| Position::zero(key.clone()))
    }

    /// Read-only value-copy snapshot (§5: "all reads get snapshots").
    pub fn snapshot(&self, timestamp: Timestamp) -> PositionSnapshot {
        PositionSnapshot {
            timestamp,
            positions: self.positions.clone(),
        }
    }

    /// Apply a batch of signed scaled-amount deltas, e.g. from a
    /// reconciled handshake (§8: "`PositionStore.after(key) ==
    /// PositionStore.before(key) + sum(handshake.actual_deltas_for(key))`").
    /// `trigger` names what caused the batch (an order id, `"initial_capital"`,
    /// a funding settlement); `timestamp` is the tick it landed in. Returns
    /// one `PositionChangeEvent` per key whose net delta within this batch
    /// is non-zero.
    ///
    /// Multiple deltas against the same key within one batch are netted
    /// before the non-negativity check runs, so `[(k, -8.0), (k, -8.0)]`
    /// against a balance of `10.0` is rejected as a net `-6.0`, not waved
    /// through two `-8.0`s that each individually look in-bounds. Rejects
    /// a net delta that would drive a non-debt position negative
    /// (`EngineError::InvariantViolation`) before mutating anything —
    /// either the whole batch applies or none of it does.
    pub fn apply(
        &mut self,
        deltas: &[(PositionKey, f64)],
        trigger: &str,
        timestamp: Timestamp,
    ) -> Result<Vec<PositionChangeEvent>, EngineError> {
        let mut net: HashMap<PositionKey, f64> = HashMap::new();
        for (key, delta) in deltas {
            *net.entry(key.clone()).or_insert(0.0) += delta;
        }

        for (key, delta) in &net {
            let current = self.get(key).scaled_amount;
            let next = current + delta;
            if next < -1e-9 && key.position_type != PositionType::VariableDebt {
                return Err(EngineError::InvariantViolation(format!(
                    "applying delta {delta} to {key} would drive scaled_amount negative ({current} -> {next})"
                )));
            }
        }

        let mut events = Vec::new();
        for (key, delta) in &net {
            if delta.abs() < 1e-12 {
                continue;
            }
            let entry = self
                .positions
                .entry(key.clone())
                .or_insert_with(|| Position::zero(key.clone()));
            entry.scaled_amount += delta;
            events.push(PositionChangeEvent {
                key: key.clone(),
                delta: *delta,
                resulting_amount: entry.scaled_amount,
                trigger: trigger.to_string(),
                timestamp,
            });
        }

        Ok(events)
    }

    /// Set an entry-context tag (perp side/entry price) without touching
    /// the scaled amount — used after a fill establishes a new perp
    /// position's entry price.
    pub fn set_entry_context(
        &mut self,
        key: &PositionKey,
        entry_context: crate::model::position::EntryContext,
    ) {
        let entry = self
            .positions
            .entry(key.clone())
            .or_insert_with(|| Position::zero(key.clone()));
        entry.entry_context = Some(entry_context);
    }

    pub fn keys(&self) -> impl Iterator<Item = &PositionKey> {
        self.positions.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.values().all(|p| p.scaled_amount.abs() < 1e-12)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Venue;

    fn key(symbol: &str) -> PositionKey {
        PositionKey::new(Venue::AaveV3, PositionType::AToken, symbol)
    }

    #[test]
    fn apply_accumulates_deltas() {
        let mut store = PositionStore::new();
        store.apply(&[(key("USDC"), 100.0)], "seed", 0).unwrap();
        store.apply(&[(key("USDC"), 50.0)], "seed", 1).unwrap();
        assert_eq!(store.get(&key("USDC")).scaled_amount, 150.0);
    }

    #[test]
    fn apply_emits_one_event_per_nonzero_delta() {
        let mut store = PositionStore::new();
        let events = store.apply(&[(key("USDC"), 100.0)], "order:abc", 5).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].trigger, "order:abc");
        assert_eq!(events[0].timestamp, 5);
        assert_eq!(events[0].delta, 100.0);
        assert_eq!(events[0].resulting_amount, 100.0);
    }

    #[test]
    fn negative_non_debt_rejected_atomically() {
        let mut store = PositionStore::new();
        store.apply(&[(key("USDC"), 10.0)], "seed", 0).unwrap();
        let result = store.apply(&[(key("USDC"), -5.0), (key("USDC"), -20.0)], "order", 1);
        assert!(result.is_err());
        assert_eq!(store.get(&key("USDC")).scaled_amount, 10.0);
    }

    /// Same-key deltas within one batch must net before the bound check:
    /// two individually-in-bounds `-8.0`s against a `10.0` balance net to
    /// `-6.0`, which is out of bounds.
    #[test]
    fn same_key_deltas_net_before_bound_check() {
        let mut store = PositionStore::new();
        store.apply(&[(key("USDC"), 10.0)], "seed", 0).unwrap();
        let result = store.apply(&[(key("USDC"), -8.0), (key("USDC"), -8.0)], "order", 1);
        assert!(result.is_err());
        assert_eq!(store.get(&key("USDC")).scaled_amount, 10.0);
    }

    #[test]
    fn debt_position_may_go_negative() {
        let mut store = PositionStore::new();
        let debt_key = PositionKey::new(Venue::AaveV3, PositionType::VariableDebt, "USDC");
        store.apply(&[(debt_key.clone(), -100.0)], "order", 0).unwrap();
        assert_eq!(store.get(&debt_key).scaled_amount, -100.0);
    }
}
