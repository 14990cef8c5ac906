use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::clock::{LiveClock, SimClock};
use crate::config::{ModeConfig, RiskThresholds};
use crate::data_provider::DataProvider;
use crate::error::{EngineError, Severity};
use crate::event_log::{EventCategory, EventLog};
use crate::execution::{ExecutionConfig, ExecutionManager, ExecutionReport};
use crate::health::{HealthChecker, HealthReport};
use crate::model::{
    ExposureSnapshot, MarketSnapshot, PerpSide, PnlSnapshot, PositionSnapshot, PositionType,
    RiskAssessment, Status, Timestamp,
};
use crate::monitors::{ExposureMonitor, PnlMonitor, RiskMonitor};
use crate::position_store::PositionStore;
use crate::strategy::{DecisionInputs, Strategy, StrategyMode};
use crate::venue::VenueInterface;

/// Everything the Engine needs besides the mode, venues, and data provider
/// — immutable for the life of a run (§5 "Run isolation": "config ...
/// may be shared by reference since both are immutable post-construction").
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub reference_asset: String,
    pub share_class_asset: String,
    pub risk_thresholds: RiskThresholds,
    pub execution: ExecutionConfig,
}

/// Everything one tick produces, handed back to the caller (`run_backtest`'s
/// accumulation, or discarded in `run_live`).
#[derive(Debug, Clone)]
pub struct TickOutcome {
    pub timestamp: Timestamp,
    pub exposure: ExposureSnapshot,
    pub risk: RiskAssessment,
    pub pnl: PnlSnapshot,
    pub orders_emitted: usize,
    pub execution: Option<ExecutionReport>,
}

/// Strategy Engine orchestrator (§4.11): owns the shared clock discipline
/// and every component, wired once at construction (§2 "all cross-component
/// wiring is via references captured at construction"). Adapted from the
/// teacher's `engine::Engine` — same owns-everything-drives-a-tick shape,
/// generalized from a workflow-DAG walk to the monitor-cascade / strategy /
/// execution tick of §4.11.
pub struct Engine {
    config: EngineConfig,
    position_store: PositionStore,
    exposure_monitor: ExposureMonitor,
    risk_monitor: RiskMonitor,
    pnl_monitor: PnlMonitor,
    strategy: StrategyMode,
    execution: ExecutionManager,
    data_provider: Box<dyn DataProvider>,
    event_log: EventLog,

    prev_positions: PositionSnapshot,
    prev_exposure: ExposureSnapshot,
    last_risk: Option<RiskAssessment>,
    cumulative_pnl: f64,
    last_run_fatal: Option<String>,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        mode_config: ModeConfig,
        venues: HashMap<String, Box<dyn VenueInterface>>,
        data_provider: Box<dyn DataProvider>,
        event_log: EventLog,
    ) -> Self {
        let exposure_monitor =
            ExposureMonitor::new(config.reference_asset.clone(), config.share_class_asset.clone());
        let risk_monitor = RiskMonitor::new(config.risk_thresholds);
        let execution = ExecutionManager::new(venues, config.execution);

        Self {
            config,
            position_store: PositionStore::new(),
            exposure_monitor,
            risk_monitor,
            pnl_monitor: PnlMonitor,
            strategy: StrategyMode::from_config(mode_config),
            execution,
            data_provider,
            event_log,
            prev_positions: PositionSnapshot {
                timestamp: 0,
                positions: HashMap::new(),
            },
            prev_exposure: ExposureSnapshot::default(),
            last_risk: None,
            cumulative_pnl: 0.0,
            last_run_fatal: None,
        }
    }

    /// Expose the position store for seeding an initial deposit before the
    /// first tick — the engine never injects capital on its own, it only
    /// reconciles execution deltas (§5 "the Position Store is the only
    /// mutable shared state across the tick").
    pub fn position_store_mut(&mut self) -> &mut PositionStore {
        &mut self.position_store
    }

    /// Drive steps 2-3 of §4.11's per-tick sequence: fetch this tick's
    /// market data is the caller's job (it's awaited once per tick and
    /// reused across the pre- and post-execution refresh), this runs the
    /// synchronous `PositionStore -> Exposure -> Risk` chain against it.
    fn run_cascade(
        &mut self,
        timestamp: Timestamp,
        market: &MarketSnapshot,
    ) -> Result<(PositionSnapshot, ExposureSnapshot, RiskAssessment), EngineError> {
        let positions = self.position_store.snapshot(timestamp);
        let exposure = self.exposure_monitor.compute(&positions, market)?;
        let target_delta = self.strategy.as_strategy_mut().target_delta(&exposure);
        let risk = self.risk_monitor.compute(&exposure, &market.risk_params, target_delta);
        Ok((positions, exposure, risk))
    }

    fn compute_pnl(
        &mut self,
        timestamp: Timestamp,
        positions: &PositionSnapshot,
        exposure: &ExposureSnapshot,
        fees_since_last_tick: f64,
        funding_since_last_tick: f64,
    ) -> PnlSnapshot {
        self.pnl_monitor.compute(
            timestamp,
            &self.prev_positions,
            positions,
            &self.prev_exposure,
            exposure,
            fees_since_last_tick,
            funding_since_last_tick,
            self.cumulative_pnl,
        )
    }

    /// Realized funding since the prior tick on every open perp (§4.5
    /// "Funding: realized funding paid/received on open perps"). Positive
    /// `funding_rate` means longs pay shorts, mirroring the convention of
    /// every perp venue this engine targets.
    fn funding_for_tick(&self, exposure: &ExposureSnapshot, market: &MarketSnapshot) -> f64 {
        let mut total = 0.0;
        for (key, exp) in &exposure.per_key {
            if key.position_type != PositionType::Perp {
                continue;
            }
            let Some(rate) = market.funding_rate(&key.venue.to_string(), &key.symbol) else {
                continue;
            };
            let sign = match exp.perp_side {
                Some(PerpSide::Short) => -1.0,
                _ => 1.0,
            };
            total += -sign * rate * exp.quote.raw().abs();
        }
        total
    }

    /// One full tick of §4.11's per-tick sequence (steps 2-7; step 1,
    /// advancing the clock, is the caller's responsibility so backtest and
    /// live can each drive their own clock discipline).
    pub async fn tick(&mut self, timestamp: Timestamp) -> Result<TickOutcome, EngineError> {
        self.event_log.begin_tick();
        let real_time = LiveClock::now_unix();

        let market = self.data_provider.get_data(timestamp).await?;

        let (positions, exposure, risk) = self.run_cascade(timestamp, &market)?;
        let funding = self.funding_for_tick(&exposure, &market);
        let pnl = self.compute_pnl(timestamp, &positions, &exposure, 0.0, funding);

        let inputs = DecisionInputs {
            timestamp,
            exposure: &exposure,
            risk: &risk,
            pnl: &pnl,
            market: &market,
        };
        let orders = self.strategy.as_strategy_mut().decide(&inputs);

        for order in &orders {
            self.event_log.emit("strategy", EventCategory::Order, timestamp, real_time, order);
        }

        let mut final_positions = positions;
        let mut final_exposure = exposure;
        let mut final_risk = risk;
        let mut final_pnl = pnl;
        let mut execution_report = None;

        if !orders.is_empty() {
            let report = self.execution.execute(&orders, timestamp, &mut self.position_store).await?;

            for record in &report.records {
                self.event_log.emit(
                    "execution",
                    EventCategory::OperationExecution,
                    timestamp,
                    real_time,
                    serde_json::json!({
                        "order_ids": record.order_ids,
                        "handshakes": record.handshakes,
                        "attempts": record.attempts,
                    }),
                );
                self.event_log.emit(
                    "execution",
                    EventCategory::Reconciliation,
                    timestamp,
                    real_time,
                    &record.reconciliation,
                );
                for change in &record.position_changes {
                    self.event_log.emit("execution", EventCategory::StateUpdate, timestamp, real_time, change);
                }
            }

            if report.any_applied() {
                let fees: f64 = report
                    .records
                    .iter()
                    .flat_map(|r| r.handshakes.iter())
                    .map(|h| h.fee_amount)
                    .sum();

                // Tight-loop post-update refresh (§4.11 step 6): re-run the
                // monitoring chain only, against the same market snapshot,
                // so this tick's orders are reflected in the reported P&L.
                let (positions2, exposure2, risk2) = self.run_cascade(timestamp, &market)?;
                let pnl2 = self.compute_pnl(timestamp, &positions2, &exposure2, fees, funding);
                final_positions = positions2;
                final_exposure = exposure2;
                final_risk = risk2;
                final_pnl = pnl2;
            }

            execution_report = Some(report);
        }

        self.cumulative_pnl = final_pnl.cumulative_pnl;
        self.prev_positions = final_positions.clone();
        self.prev_exposure = final_exposure.clone();
        self.last_risk = Some(final_risk.clone());

        self.event_log.emit(
            "engine",
            EventCategory::Timestep,
            timestamp,
            real_time,
            serde_json::json!({
                "orders_emitted": orders.len(),
                "equity": final_exposure.total_value.raw(),
                "overall_status": final_risk.overall_status,
            }),
        );
        self.event_log.emit("engine", EventCategory::Health, timestamp, real_time, self.health());

        Ok(TickOutcome {
            timestamp,
            exposure: final_exposure,
            risk: final_risk,
            pnl: final_pnl,
            orders_emitted: orders.len(),
            execution: execution_report,
        })
    }

    fn handle_tick_error(&mut self, timestamp: Timestamp, err: &EngineError) {
        let real_time = LiveClock::now_unix();
        self.event_log.emit(
            "engine",
            EventCategory::Error,
            timestamp,
            real_time,
            serde_json::json!({"error": err.to_string()}),
        );
        if err.severity() == Severity::RunFatal {
            self.last_run_fatal = Some(err.to_string());
            self.event_log.emit(
                "engine",
                EventCategory::SystemFailure,
                timestamp,
                real_time,
                serde_json::json!({"reason": err.to_string(), "exit_code": err.exit_code()}),
            );
        }
    }

    /// Replay every available timestamp in `[start, end]` through `tick`
    /// (§4.11 "`run_backtest(start, end)`"). A tick-fatal error halts that
    /// tick only, recorded as an `error` event; a run-fatal error emits
    /// `system_failure` and halts the run (§8 S5).
    pub async fn run_backtest(
        &mut self,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<Vec<TickOutcome>, EngineError> {
        let mut timestamps: Vec<Timestamp> = self
            .data_provider
            .available_timestamps()
            .into_iter()
            .filter(|t| *t >= start && *t <= end)
            .collect();
        timestamps.sort_unstable();
        timestamps.dedup();

        let mut clock = SimClock::new(timestamps);
        let mut outcomes = Vec::with_capacity(clock.total_ticks());

        loop {
            let timestamp = clock.current_timestamp();
            match self.tick(timestamp).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => {
                    self.handle_tick_error(timestamp, &err);
                    if err.severity() == Severity::RunFatal {
                        return Err(err);
                    }
                }
            }
            if !clock.advance() {
                break;
            }
        }

        Ok(outcomes)
    }

    /// Drive ticks on `cadence` until cancelled (§4.11 "`run_live()`", §5
    /// "Run-level cancellation ... flushes the event log, lets the current
    /// tight-loop order complete or time out, and halts before the next
    /// decision"). `ctrlc` wires SIGINT/SIGTERM to a flag checked between
    /// ticks; the signal never interrupts a tick already in flight.
    pub async fn run_live(&mut self, cadence: Duration) -> Result<(), EngineError> {
        let cancelled = Arc::new(AtomicBool::new(false));
        {
            let flag = cancelled.clone();
            let _ = ctrlc::set_handler(move || {
                flag.store(true, Ordering::SeqCst);
            });
        }

        let mut clock = LiveClock::new(cadence);
        loop {
            if cancelled.load(Ordering::SeqCst) {
                break;
            }

            let timestamp = clock.current_timestamp();
            match self.tick(timestamp).await {
                Ok(_) => {}
                Err(err) => {
                    self.handle_tick_error(timestamp, &err);
                    if err.severity() == Severity::RunFatal {
                        return Err(err);
                    }
                }
            }

            if cancelled.load(Ordering::SeqCst) {
                break;
            }
            clock.wait_for_next_tick().await;
        }

        Ok(())
    }

    /// Flush the event log and write its terminal marker. Call once after
    /// `run_backtest`/`run_live` returns, clean or not.
    pub async fn shutdown(self) {
        self.event_log.shutdown().await;
    }
}

impl HealthChecker for Engine {
    fn health(&self) -> HealthReport {
        let timestamp = self.prev_exposure.timestamp;
        if let Some(reason) = &self.last_run_fatal {
            return HealthReport::safe(timestamp).with_component("engine", Status::Critical, reason.clone());
        }

        let mut report = HealthReport::safe(timestamp);
        if let Some(risk) = &self.last_risk {
            report = report.with_component(
                "risk",
                risk.overall_status,
                format!("overall status {:?}", risk.overall_status),
            );
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PureLendingConfig, ShareClass};
    use crate::data_provider::FixtureDataProvider;
    use crate::model::market::ProtocolIndex;
    use crate::model::{PositionKey, Venue};
    use crate::venue::BacktestVenue;
    use uuid::Uuid;

    fn snapshot(timestamp: u64, liquidity_index: f64, usd_price: f64) -> MarketSnapshot {
        let mut market = MarketSnapshot {
            timestamp,
            ..Default::default()
        };
        market.indices.insert(
            ("aave_v3".to_string(), "USDT".to_string()),
            ProtocolIndex {
                liquidity_index,
                borrow_index: 1.0,
            },
        );
        market.indices.insert(
            ("wallet".to_string(), "USDT".to_string()),
            ProtocolIndex {
                liquidity_index: 1.0,
                borrow_index: 1.0,
            },
        );
        market.prices.insert("USDT".to_string(), (usd_price, usd_price));
        market
    }

    fn test_engine(dir: &std::path::Path) -> Engine {
        let mode = ModeConfig::PureLending(PureLendingConfig {
            share_class: ShareClass::Usdt,
            asset: "USDT".to_string(),
            protocol: "aave_v3".to_string(),
            position_deviation_threshold: 0.02,
            risk_thresholds: RiskThresholds::default(),
        });
        let mut venues: HashMap<String, Box<dyn VenueInterface>> = HashMap::new();
        venues.insert("aave_v3".to_string(), Box::new(BacktestVenue::new(1)));
        venues.insert("wallet".to_string(), Box::new(BacktestVenue::new(2)));

        let provider = FixtureDataProvider::new(vec![
            snapshot(0, 1.0, 1.0),
            snapshot(1, 1.0, 1.0),
            snapshot(2, 1.0, 1.0),
        ]);
        let event_log = EventLog::new(dir, Uuid::new_v4(), 64);

        let config = EngineConfig {
            reference_asset: "USDT".to_string(),
            share_class_asset: "USDT".to_string(),
            risk_thresholds: RiskThresholds::default(),
            execution: ExecutionConfig::default(),
        };

        let mut engine = Engine::new(config, mode, venues, Box::new(provider), event_log);
        engine
            .position_store_mut()
            .apply(
                &[(PositionKey::new(Venue::Wallet, PositionType::BaseToken, "USDT"), 1_000.0)],
                "initial_capital",
                0,
            )
            .unwrap();
        engine
    }

    #[tokio::test]
    async fn first_tick_supplies_idle_capital_to_lending() {
        let dir = std::env::temp_dir().join(format!("basis-engine-test-{}", Uuid::new_v4()));
        let mut engine = test_engine(&dir);

        let outcomes = engine.run_backtest(0, 2).await.unwrap();
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].orders_emitted > 0);

        let key = PositionKey::new(Venue::AaveV3, PositionType::AToken, "USDT");
        assert!(engine.position_store.get(&key).scaled_amount > 0.0);

        engine.shutdown().await;
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn health_reflects_last_tick_risk_status() {
        let dir = std::env::temp_dir().join(format!("basis-engine-test-{}", Uuid::new_v4()));
        let mut engine = test_engine(&dir);
        engine.run_backtest(0, 0).await.unwrap();

        let health = engine.health();
        assert_eq!(health.overall_status, Status::Safe);

        engine.shutdown().await;
        let _ = std::fs::remove_dir_all(&dir);
    }
}
