pub mod binance;
pub mod messages;
pub mod traits;

pub use binance::BinanceFuturesClient;
pub use traits::{ExchangeClient, ExchangeError, ExchangeResult};
