use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::EngineError;
use crate::model::market::{LendingRate, MlSignal, ProtocolIndex, RiskParams};
use crate::model::MarketSnapshot;

/// Core-to-data-provider contract (§4.1, §6 "Data query"): a timestamp in,
/// a fully-populated `MarketSnapshot` out. Missing required data is a typed
/// error, never a silent zero. Backtest providers load lazily from disk;
/// live providers may block briefly on an upstream fetch — both cross an
/// `await` point, so the trait is async even though the backtest
/// implementation never actually suspends.
#[async_trait]
pub trait DataProvider: Send + Sync {
    async fn get_data(&mut self, timestamp: u64) -> Result<MarketSnapshot, EngineError>;

    /// The full sorted tick series this provider can serve, used to drive
    /// `SimClock`. Live providers return an empty vec (their clock is
    /// wall-clock driven, not series driven).
    fn available_timestamps(&self) -> Vec<u64>;
}

/// One entry in `manifest.json`: which CSV file backs a market-data
/// category and how its rows should be merged into the snapshot.
#[derive(Debug, Clone, Deserialize)]
pub struct ManifestEntry {
    pub file: String,
    pub kind: DataKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataKind {
    Price,
    Funding,
    Lending,
    Index,
    Oracle,
    RiskParams,
    StakingRewards,
    MlSignal,
}

pub fn load_manifest(data_dir: &Path) -> Result<Vec<ManifestEntry>, EngineError> {
    let path = data_dir.join("manifest.json");
    let contents = std::fs::read_to_string(&path)?;
    let entries: Vec<ManifestEntry> = serde_json::from_str(&contents)?;
    Ok(entries)
}

pub fn load_csv<T: for<'de> Deserialize<'de>>(
    data_dir: &Path,
    filename: &str,
) -> Result<Vec<T>, EngineError> {
    let path = data_dir.join(filename);
    let mut reader = csv::Reader::from_path(&path)?;
    let rows: Vec<T> = reader.deserialize().collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[derive(Debug, Clone, Deserialize)]
struct PriceRow {
    timestamp: u64,
    symbol: String,
    usd_price: f64,
    reference_price: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct FundingRow {
    timestamp: u64,
    venue: String,
    instrument: String,
    rate: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct LendingRow {
    timestamp: u64,
    protocol: String,
    asset: String,
    supply_rate: f64,
    borrow_rate: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct IndexRow {
    timestamp: u64,
    protocol: String,
    token: String,
    liquidity_index: f64,
    borrow_index: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct OracleRow {
    timestamp: u64,
    protocol: String,
    asset_pair: String,
    price: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct RiskParamRow {
    timestamp: u64,
    protocol: String,
    asset: String,
    liquidation_threshold: f64,
    liquidation_bonus: f64,
    ltv_cap: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct StakingRewardRow {
    timestamp: u64,
    protocol: String,
    asset: String,
    accrual_rate: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct MlSignalRow {
    timestamp: u64,
    asset: String,
    confidence: f64,
    direction: f64,
    std_dev: f64,
}

/// Forward-fill cursor over one CSV category: advances to the last row at
/// or before the requested timestamp and merges it into `dest`. Adapted
/// from the yield-token simulator's cursor-advance pattern, generalized
/// from a single-series cursor to one-cursor-per-category.
struct Cursor<T> {
    rows: Vec<T>,
    idx: usize,
}

impl<T> Cursor<T> {
    fn new(mut rows: Vec<T>, ts_of: impl Fn(&T) -> u64) -> Self {
        rows.sort_by_key(|r| ts_of(r));
        Self { rows, idx: 0 }
    }

    fn advance_to(&mut self, timestamp: u64, ts_of: impl Fn(&T) -> u64) {
        while self.idx + 1 < self.rows.len() && ts_of(&self.rows[self.idx + 1]) <= timestamp {
            self.idx += 1;
        }
    }

    fn has_reached(&self, timestamp: u64, ts_of: impl Fn(&T) -> u64) -> bool {
        self.rows
            .first()
            .map(|r| ts_of(r) <= timestamp)
            .unwrap_or(false)
    }

    fn current(&self) -> Option<&T> {
        self.rows.get(self.idx)
    }
}

/// Backtest-mode data provider: reads a `manifest.json` describing one CSV
/// file per category, forward-fills each category independently up to the
/// requested timestamp, and accumulates into a single running
/// `MarketSnapshot` (categories never un-know a key once seen). Grounded
/// in the teacher's `data::load_manifest`/`load_csv` loaders.
pub struct BacktestDataProvider {
    snapshot: MarketSnapshot,
    prices: Cursor<PriceRow>,
    funding: Cursor<FundingRow>,
    lending: Cursor<LendingRow>,
    indices: Cursor<IndexRow>,
    oracles: Cursor<OracleRow>,
    risk_params: Cursor<RiskParamRow>,
    staking_rewards: Cursor<StakingRewardRow>,
    ml_signals: Cursor<MlSignalRow>,
    all_timestamps: Vec<u64>,
}

impl BacktestDataProvider {
    pub fn load(data_dir: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let data_dir = data_dir.into();
        let manifest = load_manifest(&data_dir)?;

        let mut prices = Vec::new();
        let mut funding = Vec::new();
        let mut lending = Vec::new();
        let mut indices = Vec::new();
        let mut oracles = Vec::new();
        let mut risk_params = Vec::new();
        let mut staking_rewards = Vec::new();
        let mut ml_signals = Vec::new();
        let mut all_ts = Vec::new();

        for entry in &manifest {
            match entry.kind {
                DataKind::Price => {
                    let rows: Vec<PriceRow> = load_csv(&data_dir, &entry.file)?;
                    all_ts.extend(rows.iter().map(|r| r.timestamp));
                    prices.extend(rows);
                }
                DataKind::Funding => {
                    let rows: Vec<FundingRow> = load_csv(&data_dir, &entry.file)?;
                    all_ts.extend(rows.iter().map(|r| r.timestamp));
                    funding.extend(rows);
                }
                DataKind::Lending => {
                    let rows: Vec<LendingRow> = load_csv(&data_dir, &entry.file)?;
                    all_ts.extend(rows.iter().map(|r| r.timestamp));
                    lending.extend(rows);
                }
                DataKind::Index => {
                    let rows: Vec<IndexRow> = load_csv(&data_dir, &entry.file)?;
                    all_ts.extend(rows.iter().map(|r| r.timestamp));
                    indices.extend(rows);
                }
                DataKind::Oracle => {
                    let rows: Vec<OracleRow> = load_csv(&data_dir, &entry.file)?;
                    all_ts.extend(rows.iter().map(|r| r.timestamp));
                    oracles.extend(rows);
                }
                DataKind::RiskParams => {
                    let rows: Vec<RiskParamRow> = load_csv(&data_dir, &entry.file)?;
                    all_ts.extend(rows.iter().map(|r| r.timestamp));
                    risk_params.extend(rows);
                }
                DataKind::StakingRewards => {
                    let rows: Vec<StakingRewardRow> = load_csv(&data_dir, &entry.file)?;
                    all_ts.extend(rows.iter().map(|r| r.timestamp));
                    staking_rewards.extend(rows);
                }
                DataKind::MlSignal => {
                    let rows: Vec<MlSignalRow> = load_csv(&data_dir, &entry.file)?;
                    all_ts.extend(rows.iter().map(|r| r.timestamp));
                    ml_signals.extend(rows);
                }
            }
        }

        all_ts.sort_unstable();
        all_ts.dedup();

        Ok(Self {
            snapshot: MarketSnapshot::default(),
            prices: Cursor::new(prices, |r| r.timestamp),
            funding: Cursor::new(funding, |r| r.timestamp),
            lending: Cursor::new(lending, |r| r.timestamp),
            indices: Cursor::new(indices, |r| r.timestamp),
            oracles: Cursor::new(oracles, |r| r.timestamp),
            risk_params: Cursor::new(risk_params, |r| r.timestamp),
            staking_rewards: Cursor::new(staking_rewards, |r| r.timestamp),
            ml_signals: Cursor::new(ml_signals, |r| r.timestamp),
            all_timestamps: all_ts,
        })
    }
}

#[async_trait]
impl DataProvider for BacktestDataProvider {
    async fn get_data(&mut self, timestamp: u64) -> Result<MarketSnapshot, EngineError> {
        self.prices.advance_to(timestamp, |r| r.timestamp);
        if self.prices.has_reached(timestamp, |r| r.timestamp) {
            if let Some(row) = self.prices.current() {
                self.snapshot
                    .prices
                    .insert(row.symbol.clone(), (row.usd_price, row.reference_price));
            }
        }

        self.funding.advance_to(timestamp, |r| r.timestamp);
        if let Some(row) = self.funding.current() {
            self.snapshot
                .funding
                .insert((row.venue.clone(), row.instrument.clone()), row.rate);
        }

        self.lending.advance_to(timestamp, |r| r.timestamp);
        if let Some(row) = self.lending.current() {
            self.snapshot.lending.insert(
                (row.protocol.clone(), row.asset.clone()),
                LendingRate {
                    supply_rate: row.supply_rate,
                    borrow_rate: row.borrow_rate,
                },
            );
        }

        self.indices.advance_to(timestamp, |r| r.timestamp);
        if let Some(row) = self.indices.current() {
            self.snapshot.indices.insert(
                (row.protocol.clone(), row.token.clone()),
                ProtocolIndex {
                    liquidity_index: row.liquidity_index,
                    borrow_index: row.borrow_index,
                },
            );
        }

        self.oracles.advance_to(timestamp, |r| r.timestamp);
        if let Some(row) = self.oracles.current() {
            self.snapshot
                .oracles
                .insert((row.protocol.clone(), row.asset_pair.clone()), row.price);
        }

        self.risk_params.advance_to(timestamp, |r| r.timestamp);
        if let Some(row) = self.risk_params.current() {
            self.snapshot.risk_params.insert(
                (row.protocol.clone(), row.asset.clone()),
                RiskParams {
                    liquidation_threshold: row.liquidation_threshold,
                    liquidation_bonus: row.liquidation_bonus,
                    ltv_cap: row.ltv_cap,
                },
            );
        }

        self.staking_rewards.advance_to(timestamp, |r| r.timestamp);
        if let Some(row) = self.staking_rewards.current() {
            self.snapshot
                .staking_rewards
                .insert((row.protocol.clone(), row.asset.clone()), row.accrual_rate);
        }

        self.ml_signals.advance_to(timestamp, |r| r.timestamp);
        if let Some(row) = self.ml_signals.current() {
            self.snapshot.ml_signals.insert(
                row.asset.clone(),
                MlSignal {
                    confidence: row.confidence,
                    direction: row.direction,
                    std_dev: row.std_dev,
                },
            );
        }

        self.snapshot.timestamp = timestamp;
        Ok(self.snapshot.clone())
    }

    fn available_timestamps(&self) -> Vec<u64> {
        self.all_timestamps.clone()
    }
}

/// In-memory provider for tests and scenario fixtures: a pre-built series
/// of snapshots keyed by timestamp, served as-is with no forward-fill.
pub struct FixtureDataProvider {
    snapshots: HashMap<u64, MarketSnapshot>,
    timestamps: Vec<u64>,
}

impl FixtureDataProvider {
    pub fn new(mut snapshots: Vec<MarketSnapshot>) -> Self {
        snapshots.sort_by_key(|s| s.timestamp);
        let timestamps = snapshots.iter().map(|s| s.timestamp).collect();
        let snapshots = snapshots.into_iter().map(|s| (s.timestamp, s)).collect();
        Self {
            snapshots,
            timestamps,
        }
    }
}

#[async_trait]
impl DataProvider for FixtureDataProvider {
    async fn get_data(&mut self, timestamp: u64) -> Result<MarketSnapshot, EngineError> {
        self.snapshots
            .get(&timestamp)
            .cloned()
            .ok_or(EngineError::DataMissing {
                timestamp,
                key: "fixture snapshot".to_string(),
            })
    }

    fn available_timestamps(&self) -> Vec<u64> {
        self.timestamps.clone()
    }
}
