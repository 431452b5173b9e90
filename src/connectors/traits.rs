// src/connectors/traits.rs
use crate::types::{AccountInfo, Kline, MarginType, OrderRequest, OrderResponse};
use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("exchange rejected request ({code}): {message}")]
    Api { code: i64, message: String },

    #[error("malformed exchange response: {0}")]
    Parse(String),

    #[error("request signing failed: {0}")]
    Signing(String),

    #[error("{0}")]
    Other(String),
}

pub type ExchangeResult<T> = Result<T, ExchangeError>;

/// Venue operations the engine depends on. Every call either yields a typed
/// result or a descriptive error; callers never retry.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    async fn get_price(&self, symbol: &str) -> ExchangeResult<Decimal>;

    /// Most recent `limit` candles, oldest first.
    async fn get_klines(&self, symbol: &str, interval: &str, limit: u16) -> ExchangeResult<Vec<Kline>>;

    async fn place_order(&self, request: &OrderRequest) -> ExchangeResult<OrderResponse>;

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> ExchangeResult<()>;

    async fn set_margin_type(&self, symbol: &str, margin_type: MarginType) -> ExchangeResult<()>;

    async fn get_account(&self) -> ExchangeResult<AccountInfo>;
}
