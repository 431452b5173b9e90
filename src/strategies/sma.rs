// src/strategies/sma.rs
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::history::{history_capacity, PriceHistory};
use super::params::{StrategyParams, MAX_LOOKBACK};
use super::traits::{fixed_exit, gate, quantity_for, scaled_confidence, Strategy, StrategyError};
use crate::core::cache::MarketSnapshot;
use crate::types::{Position, Signal};

const HISTORY_BUFFER: usize = 10;

/// Short/long moving-average crossover.
pub struct SmaStrategy {
    short_period: usize,
    long_period: usize,
    min_confidence: f64,
    position_value: Decimal,
    history: PriceHistory,
}

impl Default for SmaStrategy {
    fn default() -> Self {
        Self::new(10, 20, 0.7)
    }
}

impl SmaStrategy {
    pub fn new(short_period: usize, long_period: usize, min_confidence: f64) -> Self {
        Self {
            short_period,
            long_period,
            min_confidence,
            position_value: dec!(1000),
            history: PriceHistory::new(long_period + HISTORY_BUFFER),
        }
    }

    /// Returns `(short mean, long mean)` once enough samples are held.
    fn means(&mut self, symbol: &str, price: Decimal) -> Option<(Decimal, Decimal)> {
        let window = self.history.record(symbol, price);
        let short = window.mean_of_last(self.short_period)?;
        let long = window.mean_of_last(self.long_period)?;
        Some((short, long))
    }
}

impl Strategy for SmaStrategy {
    fn name(&self) -> String {
        "Simple Moving Average".to_string()
    }

    fn initialize(&mut self, params: &StrategyParams) -> Result<(), StrategyError> {
        let short = params.bounded_usize("short_period", self.short_period, MAX_LOOKBACK)?;
        let long = params.bounded_usize("long_period", self.long_period, MAX_LOOKBACK)?;
        let min_confidence = params.min_confidence(self.min_confidence)?;
        let position_value = params.positive_decimal("position_value", self.position_value)?;

        if short == 0 {
            return Err(StrategyError::Constraint("short period must be at least 1".into()));
        }
        if short >= long {
            return Err(StrategyError::Constraint(
                "short period must be less than long period".into(),
            ));
        }

        let capacity = history_capacity(long, HISTORY_BUFFER)?;

        self.short_period = short;
        self.long_period = long;
        self.min_confidence = min_confidence;
        self.position_value = position_value;
        self.history = PriceHistory::new(capacity);
        Ok(())
    }

    fn should_buy(&mut self, symbol: &str, snapshot: &MarketSnapshot) -> Signal {
        let price = snapshot.price;
        if price <= Decimal::ZERO {
            return Signal::hold("No valid price");
        }
        let Some((short, long)) = self.means(symbol, price) else {
            return Signal::hold("Insufficient data");
        };

        if short > long {
            let confidence = scaled_confidence((short - long) / long);
            let signal = Signal::buy(
                quantity_for(self.position_value, price),
                price,
                confidence,
                format!("SMA crossover: short={:.2}, long={:.2}", short, long),
            );
            return gate(signal, self.min_confidence);
        }

        Signal::hold("No buy signal")
    }

    fn should_sell(&mut self, symbol: &str, snapshot: &MarketSnapshot, position: &Position) -> Signal {
        let price = snapshot.price;
        if price <= Decimal::ZERO {
            return Signal::hold("No valid price");
        }
        let Some((short, long)) = self.means(symbol, price) else {
            return Signal::hold("Insufficient data");
        };

        if short < long {
            let confidence = scaled_confidence((long - short) / long);
            let signal = gate(
                Signal::sell(
                    position.size,
                    price,
                    confidence,
                    format!("SMA crossover: short={:.2}, long={:.2}", short, long),
                ),
                self.min_confidence,
            );
            if signal.is_actionable() {
                return signal;
            }
        }

        fixed_exit(price, position).unwrap_or_else(|| Signal::hold("No sell signal"))
    }
}
