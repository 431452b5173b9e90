pub mod cache;
pub mod engine;
pub mod error;
pub mod risk;
pub mod scheduler;

pub use cache::{MarketSnapshot, MarketSnapshotCache};
pub use engine::{EngineSettings, TradeStats, TradingEngine};
pub use error::EngineError;
pub use risk::{RiskCheckResult, RiskLimits, RiskManager, RiskRejection};
