pub mod exposure;
pub mod pnl;
pub mod risk;

pub use exposure::ExposureMonitor;
pub use pnl::PnlMonitor;
pub use risk::RiskMonitor;
