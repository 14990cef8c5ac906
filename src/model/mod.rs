pub mod amount;
pub mod exposure;
pub mod market;
pub mod order;
pub mod pnl;
pub mod position;
pub mod reconciliation;
pub mod risk;
pub mod trade;

pub use amount::{QuoteAmount, ReferenceAmount, ScaledAmount, UnderlyingAmount};
pub use exposure::{Exposure, ExposureSnapshot};
pub use market::{MarketSnapshot, MlSignal};
pub use order::{ActionType, DeltaSpec, Order, OrderSide};
pub use pnl::{PnlAttribution, PnlSnapshot};
pub use position::{EntryContext, PerpSide, Position, PositionKey, PositionSnapshot, PositionType, Venue};
pub use reconciliation::{Discrepancy, ReconciliationResult, Tolerance};
pub use risk::{CexMargin, DeltaDrift, LendingHealth, RiskAssessment, Status};
pub use trade::{ExecutionHandshake, HandshakeStatus};

/// A tick identifier. Monotonic non-decreasing across a run; in backtest
/// this is a unix timestamp drawn from historical data, in live mode it is
/// the wall-clock unix timestamp at the moment the tick was advanced.
pub type Timestamp = u64;
