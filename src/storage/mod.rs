// src/storage/mod.rs
//! Persistence boundary. The engine only talks to [`Repository`].
pub mod memory;

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::types::{AccountInfo, MarketDataRecord, Order, Position, PositionSide, RiskMetric, Trade};

pub use memory::MemoryStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("snapshot io: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot encoding: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn not_found(kind: &'static str, key: impl Into<String>) -> Self {
        StoreError::NotFound { kind, key: key.into() }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait Repository: Send + Sync {
    /// Stores a new order and returns it with its assigned id.
    async fn create_order(&self, order: Order) -> StoreResult<Order>;
    async fn update_order(&self, order: &Order) -> StoreResult<()>;
    async fn get_order(&self, id: &str) -> StoreResult<Order>;
    async fn get_order_by_exchange_id(&self, exchange_order_id: &str) -> StoreResult<Order>;

    /// Fails with `Conflict` if an OPEN position already exists for the same
    /// symbol and side.
    async fn create_position(&self, position: Position) -> StoreResult<Position>;
    async fn update_position(&self, position: &Position) -> StoreResult<()>;
    async fn get_position(&self, id: &str) -> StoreResult<Position>;
    async fn get_open_position(&self, symbol: &str, side: PositionSide) -> StoreResult<Position>;
    async fn list_open_positions(&self) -> StoreResult<Vec<Position>>;
    async fn close_position(&self, id: &str, close_price: Decimal, realized_pnl: Decimal) -> StoreResult<Position>;

    async fn create_trade(&self, trade: Trade) -> StoreResult<Trade>;
    async fn list_trades(&self, symbol: Option<&str>) -> StoreResult<Vec<Trade>>;

    async fn save_account(&self, account: &AccountInfo) -> StoreResult<()>;
    async fn latest_account(&self) -> StoreResult<AccountInfo>;

    async fn save_market_data(&self, record: MarketDataRecord) -> StoreResult<()>;
    async fn latest_market_data(&self, symbol: &str) -> StoreResult<MarketDataRecord>;

    async fn save_risk_metric(&self, metric: RiskMetric) -> StoreResult<()>;
    async fn latest_risk_metric(&self) -> StoreResult<RiskMetric>;
}
