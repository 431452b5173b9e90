// src/config.rs

use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::types::MarginType;

#[derive(Debug, Error)]
pub enum ConfigValidationError {
    #[error("exchange API key is required")]
    MissingApiKey,
    #[error("exchange secret key is required")]
    MissingSecretKey,
    #[error("at least one trading symbol is required")]
    NoSymbols,
    #[error("{field} out of range: {reason}")]
    OutOfRange { field: &'static str, reason: &'static str },
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Source(#[from] ConfigError),
    #[error("configuration validation failed: {0}")]
    Invalid(#[from] ConfigValidationError),
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExchangeConfig {
    pub name: String,
    pub api_key: String,
    pub secret_key: String,
    pub testnet: bool,
    /// Overrides the REST endpoint picked from `testnet` when non-empty.
    pub base_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StrategyConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TradingConfig {
    pub symbols: Vec<String>,
    pub max_position_size: Decimal,
    pub stop_loss_percent: Decimal,
    pub take_profit_percent: Decimal,
    pub max_daily_loss: Decimal,
    pub trading_interval_seconds: u64,
    pub min_order_value: Decimal,
    pub max_leverage: u32,
    pub risk_per_trade_percent: Decimal,
    pub enable_paper_trading: bool,
    pub kline_interval: String,
    pub kline_limit: u16,
    pub quantity_step_size: Decimal,
    pub margin_type: MarginType,
    pub strategy: StrategyConfig,
}

impl TradingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.trading_interval_seconds)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RiskSettings {
    /// `0` disables the upper order-value bound.
    pub max_order_value: Decimal,
    /// Defaults to ten times `max_position_size` when absent.
    pub max_exposure: Option<Decimal>,
    /// `0` means unlimited.
    pub max_daily_trades: u32,
    /// Fractional 95% VaR ceiling used by the portfolio assessment.
    pub var_limit: Decimal,
    pub max_drawdown_percent: Decimal,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StorageConfig {
    pub snapshot_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggerConfig {
    pub level: String,
    pub format: String,
    /// `stdout`, or a directory receiving a daily-rotated log file.
    pub output: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub exchange: ExchangeConfig,
    pub trading: TradingConfig,
    pub risk: RiskSettings,
    #[serde(default)]
    pub storage: StorageConfig,
    pub logger: LoggerConfig,
}

impl AppConfig {
    /// Defaults, then `Settings.{toml,yaml,json}`, then `TRADER__*` variables.
    pub fn new() -> Result<Self, LoadError> {
        let builder = with_defaults(Config::builder())?
            .add_source(File::with_name("Settings").required(false))
            .add_source(
                Environment::with_prefix("TRADER")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("trading.symbols")
                    .try_parsing(true),
            );

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        let t = &self.trading;

        // Public market data needs no credentials; order placement does.
        if !t.enable_paper_trading {
            if self.exchange.api_key.is_empty() {
                return Err(ConfigValidationError::MissingApiKey);
            }
            if self.exchange.secret_key.is_empty() {
                return Err(ConfigValidationError::MissingSecretKey);
            }
        }

        if t.symbols.is_empty() {
            return Err(ConfigValidationError::NoSymbols);
        }
        if t.max_position_size <= Decimal::ZERO {
            return Err(out_of_range("max_position_size", "must be positive"));
        }
        if t.stop_loss_percent <= Decimal::ZERO || t.stop_loss_percent > Decimal::from(50) {
            return Err(out_of_range("stop_loss_percent", "must be between 0 and 50"));
        }
        if t.take_profit_percent <= Decimal::ZERO || t.take_profit_percent > Decimal::from(100) {
            return Err(out_of_range("take_profit_percent", "must be between 0 and 100"));
        }
        if !(1..=125).contains(&t.max_leverage) {
            return Err(out_of_range("max_leverage", "must be between 1 and 125"));
        }
        if t.risk_per_trade_percent < Decimal::new(1, 1) || t.risk_per_trade_percent > Decimal::from(10) {
            return Err(out_of_range("risk_per_trade_percent", "must be between 0.1 and 10"));
        }
        if t.trading_interval_seconds == 0 {
            return Err(out_of_range("trading_interval_seconds", "must be at least 1"));
        }
        Ok(())
    }
}

fn out_of_range(field: &'static str, reason: &'static str) -> ConfigValidationError {
    ConfigValidationError::OutOfRange { field, reason }
}

fn with_defaults<St: config::builder::BuilderState>(
    builder: config::ConfigBuilder<St>,
) -> Result<config::ConfigBuilder<St>, ConfigError> {
    builder
        .set_default("exchange.name", "binance")?
        .set_default("exchange.api_key", "")?
        .set_default("exchange.secret_key", "")?
        .set_default("exchange.testnet", true)?
        .set_default("exchange.base_url", "")?
        .set_default("trading.symbols", vec!["BTCUSDT", "ETHUSDT"])?
        .set_default("trading.max_position_size", 1000.0)?
        .set_default("trading.stop_loss_percent", 2.0)?
        .set_default("trading.take_profit_percent", 5.0)?
        .set_default("trading.max_daily_loss", 500.0)?
        .set_default("trading.trading_interval_seconds", 60)?
        .set_default("trading.min_order_value", 10.0)?
        .set_default("trading.max_leverage", 5)?
        .set_default("trading.risk_per_trade_percent", 1.0)?
        .set_default("trading.enable_paper_trading", true)?
        .set_default("trading.kline_interval", "1m")?
        .set_default("trading.kline_limit", 100)?
        .set_default("trading.quantity_step_size", 0.001)?
        .set_default("trading.margin_type", "CROSSED")?
        .set_default("trading.strategy.type", "simple_moving_average")?
        .set_default("risk.max_order_value", 0.0)?
        .set_default("risk.max_daily_trades", 0)?
        .set_default("risk.var_limit", 0.05)?
        .set_default("risk.max_drawdown_percent", 20.0)?
        .set_default("logger.level", "info")?
        .set_default("logger.format", "text")?
        .set_default("logger.output", "stdout")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> AppConfig {
        with_defaults(Config::builder())
            .and_then(|b| b.build())
            .and_then(|c| c.try_deserialize())
            .expect("defaults deserialize")
    }

    #[test]
    fn test_defaults_are_valid_in_paper_mode() {
        let cfg = defaults();
        assert!(cfg.trading.enable_paper_trading);
        assert_eq!(cfg.trading.symbols, vec!["BTCUSDT", "ETHUSDT"]);
        assert_eq!(cfg.trading.interval(), Duration::from_secs(60));
        assert_eq!(cfg.trading.margin_type, MarginType::Crossed);
        assert_eq!(cfg.trading.strategy.kind, "simple_moving_average");
        assert!(cfg.risk.max_exposure.is_none());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_live_mode_requires_credentials() {
        let mut cfg = defaults();
        cfg.trading.enable_paper_trading = false;
        assert!(matches!(cfg.validate(), Err(ConfigValidationError::MissingApiKey)));

        cfg.exchange.api_key = "key".into();
        assert!(matches!(cfg.validate(), Err(ConfigValidationError::MissingSecretKey)));

        cfg.exchange.secret_key = "secret".into();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_range_checks() {
        let mut cfg = defaults();
        cfg.trading.max_leverage = 200;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigValidationError::OutOfRange { field: "max_leverage", .. })
        ));

        let mut cfg = defaults();
        cfg.trading.stop_loss_percent = Decimal::from(60);
        assert!(matches!(
            cfg.validate(),
            Err(ConfigValidationError::OutOfRange { field: "stop_loss_percent", .. })
        ));

        let mut cfg = defaults();
        cfg.trading.symbols.clear();
        assert!(matches!(cfg.validate(), Err(ConfigValidationError::NoSymbols)));
    }
}
