pub mod reconciler;

use std::collections::HashMap;
use std::time::Duration;

use crate::error::EngineError;
use crate::model::{
    ActionType, EntryContext, ExecutionHandshake, HandshakeStatus, Order, PerpSide, ReconciliationResult, Timestamp,
    Tolerance,
};
use crate::position_store::{PositionChangeEvent, PositionStore};
use crate::venue::VenueInterface;

pub use reconciler::Reconciler;

#[derive(Debug, Clone, Copy)]
pub struct ExecutionConfig {
    /// §4.8: "typically 3".
    pub max_retries: u32,
    /// §4.8: base for `base_delay × 2^attempt` (1s, 2s, 4s at default).
    pub base_delay: Duration,
    /// §4.8/§5: hard ceiling on one order's reconcile-retry span (default 120s).
    pub tight_loop_timeout: Duration,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            tight_loop_timeout: Duration::from_secs(120),
        }
    }
}

/// Record of one order's (or one atomic group's) trip through the tight
/// loop, kept for the event log (§4.10 `operation_execution`/`reconciliation`
/// categories).
#[derive(Debug, Clone)]
pub struct OrderExecutionRecord {
    pub order_ids: Vec<String>,
    pub handshakes: Vec<ExecutionHandshake>,
    pub reconciliation: ReconciliationResult,
    pub attempts: u32,
    pub position_changes: Vec<PositionChangeEvent>,
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionReport {
    pub records: Vec<OrderExecutionRecord>,
}

impl ExecutionReport {
    pub fn any_applied(&self) -> bool {
        !self.records.is_empty()
    }
}

/// Orchestrates the per-order tight loop of §4.8: `route → reconcile →
/// retry (exponential backoff) → escalate on timeout`. Orders are strictly
/// sequential — the (i+1)-th does not begin routing until the i-th is
/// reconciled or escalated (§5). Atomic groups (orders sharing
/// `atomic_group_id`) are routed as one unit via `VenueInterface::route_atomic`
/// and reconciled as one unit.
pub struct ExecutionManager {
    venues: HashMap<String, Box<dyn VenueInterface>>,
    config: ExecutionConfig,
}

impl ExecutionManager {
    pub fn new(venues: HashMap<String, Box<dyn VenueInterface>>, config: ExecutionConfig) -> Self {
        Self { venues, config }
    }

    fn venue_for(&mut self, name: &str) -> Result<&mut Box<dyn VenueInterface>, EngineError> {
        self.venues
            .get_mut(name)
            .ok_or_else(|| EngineError::VenueFailure {
                order_id: String::new(),
                reason: format!("no venue interface registered for `{name}`"),
            })
    }

    /// Run the full decision's order list through the tight loop. On a
    /// run-fatal reconciliation timeout, halts immediately — no subsequent
    /// orders of this decision are routed (§8 S5).
    pub async fn execute(
        &mut self,
        orders: &[Order],
        timestamp: Timestamp,
        position_store: &mut PositionStore,
    ) -> Result<ExecutionReport, EngineError> {
        let mut report = ExecutionReport::default();

        for group in group_by_atomic_id(orders) {
            let record = self.execute_group(&group, timestamp, position_store).await?;
            report.records.push(record);
        }

        Ok(report)
    }

    /// Route (or re-route, on retry) the group to its venue. Routes every
    /// leg atomically via `route_atomic` when the group has more than one
    /// order, otherwise a single `route`.
    async fn route_group(&mut self, group: &[&Order], timestamp: Timestamp) -> Result<Vec<ExecutionHandshake>, EngineError> {
        let venue_name = group[0].venue.clone();
        let handshakes = if group.len() > 1 {
            let venue = self.venue_for(&venue_name)?;
            let owned: Vec<Order> = group.iter().map(|o| (*o).clone()).collect();
            venue.route_atomic(&owned, timestamp).await
        } else {
            let venue = self.venue_for(&venue_name)?;
            vec![venue.route(group[0], timestamp).await]
        };

        if handshakes.iter().any(|h| h.status == HandshakeStatus::Failed) {
            return Err(EngineError::VenueFailure {
                order_id: group[0].order_id.clone(),
                reason: "venue reported failed status".to_string(),
            });
        }

        Ok(handshakes)
    }

    async fn execute_group(
        &mut self,
        group: &[&Order],
        timestamp: Timestamp,
        position_store: &mut PositionStore,
    ) -> Result<OrderExecutionRecord, EngineError> {
        for order in group {
            order
                .validate()
                .map_err(EngineError::StrategyContract)?;
        }

        let t0 = tokio::time::Instant::now();

        let expected: Vec<(crate::model::PositionKey, f64)> = group
            .iter()
            .flat_map(|o| o.expected_deltas.iter().map(|d| (d.key.clone(), d.signed_amount)))
            .collect();

        let mut attempt = 0u32;
        let mut venue_failures = 0u32;
        let mut handshakes: Vec<ExecutionHandshake> = Vec::new();
        let mut reconciliation;
        let mut position_changes = Vec::new();

        // §4.8 retry: re-route the order to the venue on every attempt and
        // only touch the Position Store once a reconciled handshake lands,
        // so a live discrepancy never re-applies the same deltas twice. A
        // `VenueFailure` is itself recoverable — it shares the same
        // backoff/timeout budget as a reconciliation discrepancy, but is
        // tracked on its own counter so a venue that never comes back
        // escalates to run-fatal instead of looping forever.
        loop {
            match self.route_group(group, timestamp).await {
                Ok(h) => handshakes = h,
                Err(EngineError::VenueFailure { order_id, reason }) => {
                    venue_failures += 1;
                    if venue_failures > self.config.max_retries || t0.elapsed() > self.config.tight_loop_timeout {
                        return Err(EngineError::VenueUnrecoverable {
                            order_id,
                            reason,
                            attempts: venue_failures,
                        });
                    }
                    tokio::time::sleep(self.config.base_delay * 2u32.pow(venue_failures)).await;
                    continue;
                }
                Err(other) => return Err(other),
            }

            let actual: Vec<(crate::model::PositionKey, f64)> = handshakes
                .iter()
                .flat_map(|h| h.actual_deltas.clone())
                .collect();

            reconciliation = Reconciler::check(&expected, &actual, |key| {
                Tolerance::for_position_type(key.position_type)
            });

            if reconciliation.success {
                let trigger = format!("execution:{}", group[0].order_id);
                position_changes = position_store.apply(&actual, &trigger, timestamp)?;
                break;
            }

            attempt += 1;
            if attempt >= self.config.max_retries || t0.elapsed() > self.config.tight_loop_timeout {
                break;
            }
            tokio::time::sleep(self.config.base_delay * 2u32.pow(attempt)).await;
        }

        if !reconciliation.success {
            return Err(EngineError::ReconciliationTimeout {
                elapsed_ms: t0.elapsed().as_millis() as u64,
                attempts: attempt,
            });
        }

        // `scaled_amount` on a perp position is a magnitude (§3); direction
        // lives in `entry_context.side`, carried by the order's `OrderSide`
        // (Buy opens/adds to long, Sell opens/adds to short) rather than the
        // sign of the delta itself.
        for (order, handshake) in group.iter().zip(handshakes.iter()) {
            if order.action_type != ActionType::PerpOpen {
                continue;
            }
            let side = match order.side {
                crate::model::OrderSide::Buy => PerpSide::Long,
                crate::model::OrderSide::Sell => PerpSide::Short,
            };
            let entry_price = handshake.fill_price.unwrap_or(0.0);
            for delta in &order.expected_deltas {
                position_store.set_entry_context(&delta.key, EntryContext { side, entry_price });
            }
        }

        Ok(OrderExecutionRecord {
            order_ids: group.iter().map(|o| o.order_id.clone()).collect(),
            handshakes,
            reconciliation,
            attempts: attempt,
            position_changes,
        })
    }
}

/// Groups contiguous orders sharing a non-`None` `atomic_group_id` into one
/// unit; every other order is its own singleton group. Preserves original
/// sequencing.
fn group_by_atomic_id(orders: &[Order]) -> Vec<Vec<&Order>> {
    let mut groups: Vec<Vec<&Order>> = Vec::new();
    let mut i = 0;
    while i < orders.len() {
        match &orders[i].atomic_group_id {
            None => {
                groups.push(vec![&orders[i]]);
                i += 1;
            }
            Some(id) => {
                let mut group = vec![&orders[i]];
                let mut j = i + 1;
                while j < orders.len() && orders[j].atomic_group_id.as_deref() == Some(id.as_str()) {
                    group.push(&orders[j]);
                    j += 1;
                }
                groups.push(group);
                i = j;
            }
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ActionType, DeltaSpec, OrderSide, PositionKey, PositionType, Venue};
    use crate::venue::BacktestVenue;

    fn order(id: &str, group: Option<&str>) -> Order {
        Order {
            order_id: id.to_string(),
            venue: "aave_v3".to_string(),
            instrument: "USDT".to_string(),
            side: OrderSide::Buy,
            action_type: ActionType::Supply,
            amount: 100.0,
            limit_price: None,
            stop_loss: None,
            take_profit: None,
            atomic_group_id: group.map(|s| s.to_string()),
            expected_deltas: vec![DeltaSpec {
                key: PositionKey::new(Venue::AaveV3, PositionType::AToken, "USDT"),
                signed_amount: 100.0,
            }],
        }
    }

    #[test]
    fn groups_contiguous_atomic_ids() {
        let orders = vec![
            order("a", None),
            order("b", Some("g1")),
            order("c", Some("g1")),
            order("d", None),
        ];
        let groups = group_by_atomic_id(&orders);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[1].len(), 2);
    }

    /// Returns a half-sized delta on its first route, the correct delta on
    /// every route after — exercises the re-route-on-retry path.
    struct FlakyVenue {
        attempts: u32,
    }

    impl FlakyVenue {
        fn new() -> Self {
            Self { attempts: 0 }
        }
    }

    #[async_trait::async_trait]
    impl VenueInterface for FlakyVenue {
        async fn route(&mut self, order: &Order, _timestamp: Timestamp) -> ExecutionHandshake {
            self.attempts += 1;
            let fraction = if self.attempts == 1 { 0.5 } else { 1.0 };
            ExecutionHandshake {
                order_id: order.order_id.clone(),
                status: HandshakeStatus::Filled,
                actual_deltas: order
                    .expected_deltas
                    .iter()
                    .map(|d| (d.key.clone(), d.signed_amount * fraction))
                    .collect(),
                fee_currency: "USDT".to_string(),
                fee_amount: 0.0,
                fill_price: None,
                duration_ms: 1,
                simulated: true,
            }
        }
    }

    #[tokio::test]
    async fn retry_reroutes_and_applies_the_store_only_once() {
        let mut venues: HashMap<String, Box<dyn VenueInterface>> = HashMap::new();
        venues.insert("aave_v3".to_string(), Box::new(FlakyVenue::new()));
        let config = ExecutionConfig {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
            tight_loop_timeout: Duration::from_secs(5),
        };
        let mut manager = ExecutionManager::new(venues, config);
        let mut store = PositionStore::new();

        let orders = vec![order("a", None)];
        let report = manager.execute(&orders, 0, &mut store).await.unwrap();

        assert!(report.records[0].reconciliation.success);
        assert_eq!(report.records[0].attempts, 1);
        let key = PositionKey::new(Venue::AaveV3, PositionType::AToken, "USDT");
        // Had the first (discrepant) handshake also been applied, this
        // would read 150 (50 + 100) instead of 100.
        assert_eq!(store.get(&key).scaled_amount, 100.0);
        assert_eq!(report.records[0].position_changes.len(), 1);
    }

    /// Reports `Failed` on its first `attempts_before_ok` routes, `Filled`
    /// with the full expected delta after — exercises the venue-failure
    /// retry path.
    struct FailingThenOkVenue {
        attempts: u32,
        attempts_before_ok: u32,
    }

    #[async_trait::async_trait]
    impl VenueInterface for FailingThenOkVenue {
        async fn route(&mut self, order: &Order, _timestamp: Timestamp) -> ExecutionHandshake {
            self.attempts += 1;
            let status = if self.attempts <= self.attempts_before_ok {
                HandshakeStatus::Failed
            } else {
                HandshakeStatus::Filled
            };
            ExecutionHandshake {
                order_id: order.order_id.clone(),
                status,
                actual_deltas: order
                    .expected_deltas
                    .iter()
                    .map(|d| (d.key.clone(), d.signed_amount))
                    .collect(),
                fee_currency: "USDT".to_string(),
                fee_amount: 0.0,
                fill_price: None,
                duration_ms: 1,
                simulated: true,
            }
        }
    }

    #[tokio::test]
    async fn venue_failure_retries_then_succeeds() {
        let mut venues: HashMap<String, Box<dyn VenueInterface>> = HashMap::new();
        venues.insert(
            "aave_v3".to_string(),
            Box::new(FailingThenOkVenue { attempts: 0, attempts_before_ok: 2 }),
        );
        let config = ExecutionConfig {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
            tight_loop_timeout: Duration::from_secs(5),
        };
        let mut manager = ExecutionManager::new(venues, config);
        let mut store = PositionStore::new();

        let orders = vec![order("a", None)];
        let report = manager.execute(&orders, 0, &mut store).await.unwrap();

        assert!(report.records[0].reconciliation.success);
        let key = PositionKey::new(Venue::AaveV3, PositionType::AToken, "USDT");
        assert_eq!(store.get(&key).scaled_amount, 100.0);
    }

    #[tokio::test]
    async fn venue_failure_past_max_retries_escalates_run_fatal() {
        let mut venues: HashMap<String, Box<dyn VenueInterface>> = HashMap::new();
        venues.insert(
            "aave_v3".to_string(),
            Box::new(FailingThenOkVenue { attempts: 0, attempts_before_ok: u32::MAX }),
        );
        let config = ExecutionConfig {
            max_retries: 2,
            base_delay: Duration::from_millis(1),
            tight_loop_timeout: Duration::from_secs(5),
        };
        let mut manager = ExecutionManager::new(venues, config);
        let mut store = PositionStore::new();

        let orders = vec![order("a", None)];
        let err = manager.execute(&orders, 0, &mut store).await.unwrap_err();

        assert_eq!(err.severity(), crate::error::Severity::RunFatal);
        match err {
            EngineError::VenueUnrecoverable { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("expected VenueUnrecoverable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn single_order_executes_and_reconciles() {
        let mut venues: HashMap<String, Box<dyn VenueInterface>> = HashMap::new();
        venues.insert("aave_v3".to_string(), Box::new(BacktestVenue::new(7)));
        let mut manager = ExecutionManager::new(venues, ExecutionConfig::default());
        let mut store = PositionStore::new();

        let orders = vec![order("a", None)];
        let report = manager.execute(&orders, 0, &mut store).await.unwrap();

        assert_eq!(report.records.len(), 1);
        assert!(report.records[0].reconciliation.success);
        let key = PositionKey::new(Venue::AaveV3, PositionType::AToken, "USDT");
        assert_eq!(store.get(&key).scaled_amount, 100.0);
    }
}
