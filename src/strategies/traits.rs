// src/strategies/traits.rs
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use thiserror::Error;

use super::params::StrategyParams;
use crate::core::cache::MarketSnapshot;
use crate::types::{Position, Signal};
use crate::utils::precision::percent_change;

#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("invalid parameter `{key}`: {reason}")]
    InvalidParameter { key: String, reason: String },

    #[error("{0}")]
    Constraint(String),
}

/// Pluggable decision logic. Implementations keep their own per-symbol price
/// history, updated on every evaluation.
pub trait Strategy: Send {
    fn name(&self) -> String;

    /// Applies configuration overrides. On error the previous settings stay.
    fn initialize(&mut self, params: &StrategyParams) -> Result<(), StrategyError>;

    fn should_buy(&mut self, symbol: &str, snapshot: &MarketSnapshot) -> Signal;

    fn should_sell(&mut self, symbol: &str, snapshot: &MarketSnapshot, position: &Position) -> Signal;

    /// Position state change (Some = opened, None = closed)
    fn update_position(&mut self, _symbol: &str, _position: Option<&Position>) {}
}

const FIXED_STOP_LOSS_PERCENT: Decimal = dec!(-2);
const FIXED_TAKE_PROFIT_PERCENT: Decimal = dec!(5);

/// Forces HOLD when an actionable signal is below `min_confidence`.
pub fn gate(signal: Signal, min_confidence: f64) -> Signal {
    if signal.is_actionable() && signal.confidence < min_confidence {
        return Signal::hold(format!(
            "{} suppressed: confidence {:.2} < {:.2} ({})",
            signal.action, signal.confidence, min_confidence, signal.reason
        ));
    }
    signal
}

/// `min(strength * 10, 1)` as used by crossover-style confidence.
pub fn scaled_confidence(strength: Decimal) -> f64 {
    (strength * Decimal::TEN)
        .min(Decimal::ONE)
        .max(Decimal::ZERO)
        .to_f64()
        .unwrap_or(0.0)
}

/// Fixed -2% stop-loss / +5% take-profit exit shared by SMA and RSI.
pub fn fixed_exit(price: Decimal, position: &Position) -> Option<Signal> {
    let pnl_percent = percent_change(position.entry_price, price);

    if pnl_percent <= FIXED_STOP_LOSS_PERCENT {
        return Some(Signal::sell(
            position.size,
            price,
            1.0,
            format!("Stop loss triggered: {:.2}%", pnl_percent),
        ));
    }
    if pnl_percent >= FIXED_TAKE_PROFIT_PERCENT {
        return Some(Signal::sell(
            position.size,
            price,
            1.0,
            format!("Take profit triggered: {:.2}%", pnl_percent),
        ));
    }
    None
}

/// Quantity worth `value` at `price`; zero when the price is not positive.
pub fn quantity_for(value: Decimal, price: Decimal) -> Decimal {
    if price <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    value / price
}
