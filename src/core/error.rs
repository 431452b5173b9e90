// src/core/error.rs
use thiserror::Error;

use crate::connectors::ExchangeError;
use crate::storage::StoreError;
use crate::strategies::StrategyError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("trading engine is already running")]
    AlreadyRunning,

    #[error("strategy setup failed: {0}")]
    Strategy(#[from] StrategyError),

    #[error("exchange: {0}")]
    Exchange(#[from] ExchangeError),

    #[error("storage: {0}")]
    Store(#[from] StoreError),
}
