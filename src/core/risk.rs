// src/core/risk.rs
//! Pre-trade risk gate and daily risk counters.
//!
//! Counters live behind an internal mutex, so concurrent `record_*` calls are
//! serialized. `validate_order` only reads them, apart from the calendar-day
//! reset it performs first.

use chrono::{Local, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::config::{RiskSettings, TradingConfig};
use crate::types::{Position, PositionSide, Side};

#[derive(Debug, Clone)]
pub struct RiskLimits {
    pub max_position_size: Decimal,
    pub max_daily_loss: Decimal,
    pub min_order_value: Decimal,
    pub max_order_value: Option<Decimal>,
    pub max_exposure: Decimal,
    pub max_daily_trades: Option<u32>,
    pub risk_per_trade_percent: Decimal,
    pub stop_loss_percent: Decimal,
    pub take_profit_percent: Decimal,
    /// Fraction, e.g. `0.05`.
    pub var_limit: Decimal,
    pub max_drawdown_percent: Decimal,
}

impl RiskLimits {
    pub fn from_config(trading: &TradingConfig, risk: &RiskSettings) -> Self {
        Self {
            max_position_size: trading.max_position_size,
            max_daily_loss: trading.max_daily_loss,
            min_order_value: trading.min_order_value,
            max_order_value: Some(risk.max_order_value).filter(|v| *v > Decimal::ZERO),
            max_exposure: risk
                .max_exposure
                .unwrap_or(trading.max_position_size * Decimal::TEN),
            max_daily_trades: Some(risk.max_daily_trades).filter(|v| *v > 0),
            risk_per_trade_percent: trading.risk_per_trade_percent,
            stop_loss_percent: trading.stop_loss_percent,
            take_profit_percent: trading.take_profit_percent,
            var_limit: risk.var_limit,
            max_drawdown_percent: risk.max_drawdown_percent,
        }
    }
}

/// An order proposed for validation.
#[derive(Debug, Clone)]
pub struct OrderInfo {
    pub symbol: String,
    pub side: Side,
    pub quantity: Decimal,
    pub price: Decimal,
}

impl OrderInfo {
    pub fn value(&self) -> Decimal {
        self.quantity * self.price
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RiskRejection {
    #[error("daily trade limit reached ({trades}/{max})")]
    DailyTradeLimit { trades: u32, max: u32 },

    #[error("trading halted: daily loss {loss} >= {max}")]
    TradingHalted { loss: Decimal, max: Decimal },

    #[error("order value {value} below minimum {min}")]
    BelowMinOrderValue { value: Decimal, min: Decimal },

    #[error("order value {value} above maximum {max}")]
    AboveMaxOrderValue { value: Decimal, max: Decimal },

    #[error("position value {value} exceeds maximum {max}")]
    PositionSizeExceeded { value: Decimal, max: Decimal },

    #[error("daily loss {loss} exceeds limit {max}")]
    DailyLossLimit { loss: Decimal, max: Decimal },

    #[error("projected exposure {projected} exceeds limit {max}")]
    ExposureLimit { projected: Decimal, max: Decimal },

    #[error("risk amount {risk} exceeds per-trade budget {budget}")]
    RiskPerTrade { risk: Decimal, budget: Decimal },
}

#[derive(Debug, Clone, PartialEq)]
pub enum RiskCheckResult {
    Approved,
    Rejected(RiskRejection),
}

impl RiskCheckResult {
    pub fn is_approved(&self) -> bool {
        matches!(self, RiskCheckResult::Approved)
    }
}

#[derive(Debug, Clone)]
struct RiskState {
    daily_loss: Decimal,
    daily_trades: u32,
    total_exposure: Decimal,
    last_reset: NaiveDate,
}

/// Snapshot returned by [`RiskManager::metrics`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskMetrics {
    pub daily_loss: Decimal,
    pub daily_trades: u32,
    pub total_exposure: Decimal,
    pub max_exposure: Decimal,
    pub exposure_ratio: Decimal,
    pub remaining_risk: Decimal,
    pub trading_allowed: bool,
    pub last_reset_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioPosition {
    pub symbol: String,
    pub side: PositionSide,
    pub size: Decimal,
    pub entry_price: Decimal,
    pub current_price: Decimal,
    pub value: Decimal,
    pub unrealized_pnl: Decimal,
    pub leverage: u32,
}

impl From<&Position> for PortfolioPosition {
    fn from(p: &Position) -> Self {
        Self {
            symbol: p.symbol.clone(),
            side: p.side,
            size: p.size,
            entry_price: p.entry_price,
            current_price: p.mark_price,
            value: p.notional(),
            unrealized_pnl: p.unrealized_pnl(),
            leverage: p.leverage,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskViolation {
    Exposure,
    ValueAtRisk,
    Drawdown,
}

impl fmt::Display for RiskViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RiskViolation::Exposure => "Total exposure exceeds limit",
            RiskViolation::ValueAtRisk => "VaR exceeds limit",
            RiskViolation::Drawdown => "Drawdown exceeds limit",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioRisk {
    pub total_value: Decimal,
    pub total_pnl: Decimal,
    pub total_exposure: Decimal,
    /// Percent.
    pub portfolio_return: Decimal,
    pub var_95: Decimal,
    pub is_valid: bool,
    pub violations: Vec<RiskViolation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    StopLoss,
    TakeProfit,
    MaxLoss,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CloseReason::StopLoss => "Stop loss triggered",
            CloseReason::TakeProfit => "Take profit triggered",
            CloseReason::MaxLoss => "Maximum loss exceeded",
        })
    }
}

pub struct RiskManager {
    limits: RiskLimits,
    state: Mutex<RiskState>,
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

impl RiskManager {
    pub fn new(limits: RiskLimits) -> Self {
        Self::starting_on(limits, today())
    }

    pub fn starting_on(limits: RiskLimits, date: NaiveDate) -> Self {
        Self {
            limits,
            state: Mutex::new(RiskState {
                daily_loss: Decimal::ZERO,
                daily_trades: 0,
                total_exposure: Decimal::ZERO,
                last_reset: date,
            }),
        }
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    fn state(&self) -> MutexGuard<'_, RiskState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn roll_locked(state: &mut RiskState, date: NaiveDate) -> bool {
        if date <= state.last_reset {
            return false;
        }
        state.daily_loss = Decimal::ZERO;
        state.daily_trades = 0;
        state.last_reset = date;
        info!(%date, "Daily risk counters reset");
        true
    }

    /// Resets the daily counters if `date` is a later calendar day than the
    /// last reset. Returns whether a reset happened.
    pub fn roll_day(&self, date: NaiveDate) -> bool {
        Self::roll_locked(&mut self.state(), date)
    }

    pub fn validate_order(&self, order: &OrderInfo) -> RiskCheckResult {
        self.validate_order_on(order, today())
    }

    /// Runs the check pipeline as of `date`; the first failing check wins.
    pub fn validate_order_on(&self, order: &OrderInfo, date: NaiveDate) -> RiskCheckResult {
        let mut state = self.state();
        Self::roll_locked(&mut state, date);

        let result = self.run_checks(&state, order);
        match &result {
            RiskCheckResult::Approved => debug!(symbol = %order.symbol, "Order validation passed"),
            RiskCheckResult::Rejected(reason) => {
                debug!(symbol = %order.symbol, %reason, "Order validation failed")
            }
        }
        result
    }

    fn run_checks(&self, state: &RiskState, order: &OrderInfo) -> RiskCheckResult {
        use RiskCheckResult::Rejected;
        let l = &self.limits;
        let value = order.value();

        // 1. trading allowed
        if let Some(max) = l.max_daily_trades {
            if state.daily_trades >= max {
                return Rejected(RiskRejection::DailyTradeLimit {
                    trades: state.daily_trades,
                    max,
                });
            }
        }
        if state.daily_loss >= l.max_daily_loss {
            return Rejected(RiskRejection::TradingHalted {
                loss: state.daily_loss,
                max: l.max_daily_loss,
            });
        }

        // 2. order size
        if value < l.min_order_value {
            return Rejected(RiskRejection::BelowMinOrderValue {
                value,
                min: l.min_order_value,
            });
        }
        if let Some(max) = l.max_order_value {
            if value > max {
                return Rejected(RiskRejection::AboveMaxOrderValue { value, max });
            }
        }

        // 3. position size
        if value > l.max_position_size {
            return Rejected(RiskRejection::PositionSizeExceeded {
                value,
                max: l.max_position_size,
            });
        }

        // 4. daily loss
        if state.daily_loss >= l.max_daily_loss {
            return Rejected(RiskRejection::DailyLossLimit {
                loss: state.daily_loss,
                max: l.max_daily_loss,
            });
        }

        // 5. exposure
        let projected = state.total_exposure + value;
        if projected > l.max_exposure {
            return Rejected(RiskRejection::ExposureLimit {
                projected,
                max: l.max_exposure,
            });
        }

        // 6. risk per trade, against a budget derived from the position cap
        // rather than the stop distance
        let pct = l.risk_per_trade_percent / Decimal::ONE_HUNDRED;
        let risk = value * pct;
        let budget = l.max_position_size * pct;
        if risk > budget {
            return Rejected(RiskRejection::RiskPerTrade { risk, budget });
        }

        RiskCheckResult::Approved
    }

    pub fn record_trade(&self) {
        let mut state = self.state();
        Self::roll_locked(&mut state, today());
        state.daily_trades += 1;
        debug!(daily_trades = state.daily_trades, "Daily trades updated");
    }

    pub fn record_loss(&self, loss: Decimal) {
        let mut state = self.state();
        Self::roll_locked(&mut state, today());
        state.daily_loss += loss;
        debug!(daily_loss = %state.daily_loss, "Daily loss updated");
    }

    /// Replaces the tracked total exposure.
    pub fn update_exposure(&self, exposure: Decimal) {
        self.state().total_exposure = exposure;
        debug!(%exposure, "Total exposure updated");
    }

    /// Latches trading off until the next daily reset.
    pub fn emergency_stop(&self, reason: &str) {
        error!(reason, "EMERGENCY STOP TRIGGERED");
        self.state().daily_loss = self.limits.max_daily_loss;
    }

    pub fn metrics(&self) -> RiskMetrics {
        let mut state = self.state();
        Self::roll_locked(&mut state, today());
        let l = &self.limits;

        let exposure_ratio = if l.max_exposure.is_zero() {
            Decimal::ZERO
        } else {
            state.total_exposure / l.max_exposure
        };
        let trading_allowed = state.daily_loss < l.max_daily_loss
            && l.max_daily_trades.map_or(true, |max| state.daily_trades < max);

        RiskMetrics {
            daily_loss: state.daily_loss,
            daily_trades: state.daily_trades,
            total_exposure: state.total_exposure,
            max_exposure: l.max_exposure,
            exposure_ratio,
            remaining_risk: (l.max_daily_loss - state.daily_loss).max(Decimal::ZERO),
            trading_allowed,
            last_reset_date: state.last_reset,
        }
    }

    /// Quantity risking `risk_per_trade_percent` of `account_balance` between
    /// `entry_price` and `stop_loss`, capped at `max_position_size`.
    pub fn position_size(&self, account_balance: Decimal, entry_price: Decimal, stop_loss: Decimal) -> Decimal {
        if entry_price <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let max_quantity = self.limits.max_position_size / entry_price;
        let distance = (entry_price - stop_loss).abs() / entry_price;
        if distance.is_zero() {
            return max_quantity;
        }
        let risk_amount = account_balance * self.limits.risk_per_trade_percent / Decimal::ONE_HUNDRED;
        let quantity = risk_amount / distance / entry_price;
        quantity.min(max_quantity)
    }

    pub fn stop_loss_price(&self, entry_price: Decimal, side: PositionSide) -> Decimal {
        let pct = self.limits.stop_loss_percent / Decimal::ONE_HUNDRED;
        match side {
            PositionSide::Short => entry_price * (Decimal::ONE + pct),
            _ => entry_price * (Decimal::ONE - pct),
        }
    }

    pub fn take_profit_price(&self, entry_price: Decimal, side: PositionSide) -> Decimal {
        let pct = self.limits.take_profit_percent / Decimal::ONE_HUNDRED;
        match side {
            PositionSide::Short => entry_price * (Decimal::ONE - pct),
            _ => entry_price * (Decimal::ONE + pct),
        }
    }

    pub fn validate_portfolio(&self, positions: &[PortfolioPosition]) -> PortfolioRisk {
        let total_value: Decimal = positions.iter().map(|p| p.value).sum();
        let total_pnl: Decimal = positions.iter().map(|p| p.unrealized_pnl).sum();
        let total_exposure: Decimal = positions.iter().map(|p| p.value.abs()).sum();

        let portfolio_return = if total_value > Decimal::ZERO {
            total_pnl / total_value * Decimal::ONE_HUNDRED
        } else {
            Decimal::ZERO
        };

        let returns: Vec<Decimal> = positions
            .iter()
            .filter(|p| p.value > Decimal::ZERO)
            .map(|p| p.unrealized_pnl / p.value)
            .collect();
        let var_95 = value_at_risk_95(returns);

        let mut violations = Vec::new();
        if total_exposure > self.limits.max_exposure {
            violations.push(RiskViolation::Exposure);
        }
        if var_95 > self.limits.var_limit {
            violations.push(RiskViolation::ValueAtRisk);
        }
        if portfolio_return.abs() > self.limits.max_drawdown_percent {
            violations.push(RiskViolation::Drawdown);
        }

        PortfolioRisk {
            total_value,
            total_pnl,
            total_exposure,
            portfolio_return,
            var_95,
            is_valid: violations.is_empty(),
            violations,
        }
    }

    /// First matching exit condition: stop-loss, take-profit, then the
    /// emergency maximum loss of twice the stop-loss percent.
    pub fn should_close_position(&self, position: &PortfolioPosition) -> Option<CloseReason> {
        let price = position.current_price;
        let stop = self.stop_loss_price(position.entry_price, position.side);
        let target = self.take_profit_price(position.entry_price, position.side);
        let short = position.side == PositionSide::Short;

        if (!short && price <= stop) || (short && price >= stop) {
            return Some(CloseReason::StopLoss);
        }
        if (!short && price >= target) || (short && price <= target) {
            return Some(CloseReason::TakeProfit);
        }

        if position.unrealized_pnl < Decimal::ZERO && position.value > Decimal::ZERO {
            let loss_percent = (position.unrealized_pnl / position.value).abs() * Decimal::ONE_HUNDRED;
            if loss_percent > self.limits.stop_loss_percent * Decimal::TWO {
                return Some(CloseReason::MaxLoss);
            }
        }
        None
    }
}

/// Absolute 5th-percentile return (empirical, no interpolation).
fn value_at_risk_95(mut returns: Vec<Decimal>) -> Decimal {
    if returns.is_empty() {
        return Decimal::ZERO;
    }
    returns.sort();
    let index = (returns.len() * 5 / 100).min(returns.len() - 1);
    returns[index].abs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn limits() -> RiskLimits {
        RiskLimits {
            max_position_size: dec!(1000),
            max_daily_loss: dec!(500),
            min_order_value: dec!(10),
            max_order_value: None,
            max_exposure: dec!(1000),
            max_daily_trades: None,
            risk_per_trade_percent: dec!(1),
            stop_loss_percent: dec!(2),
            take_profit_percent: dec!(5),
            var_limit: dec!(0.05),
            max_drawdown_percent: dec!(20),
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn order(value: Decimal) -> OrderInfo {
        OrderInfo {
            symbol: "BTCUSDT".into(),
            side: Side::Buy,
            quantity: value / dec!(100),
            price: dec!(100),
        }
    }

    #[test]
    fn test_projected_exposure_over_limit_rejected() {
        let rm = RiskManager::starting_on(limits(), day(1));
        rm.update_exposure(dec!(900));
        assert_eq!(
            rm.validate_order_on(&order(dec!(150)), day(1)),
            RiskCheckResult::Rejected(RiskRejection::ExposureLimit {
                projected: dec!(1050),
                max: dec!(1000),
            })
        );
        assert!(rm.validate_order_on(&order(dec!(100)), day(1)).is_approved());
    }

    #[test]
    fn test_below_min_order_value_rejected() {
        let rm = RiskManager::starting_on(limits(), day(1));
        assert!(matches!(
            rm.validate_order_on(&order(dec!(5)), day(1)),
            RiskCheckResult::Rejected(RiskRejection::BelowMinOrderValue { .. })
        ));
        assert!(rm.validate_order_on(&order(dec!(10)), day(1)).is_approved());
    }

    #[test]
    fn test_max_order_value_and_position_size() {
        let mut l = limits();
        l.max_order_value = Some(dec!(200));
        let rm = RiskManager::starting_on(l, day(1));
        assert!(matches!(
            rm.validate_order_on(&order(dec!(250)), day(1)),
            RiskCheckResult::Rejected(RiskRejection::AboveMaxOrderValue { .. })
        ));

        let mut l = limits();
        l.max_exposure = dec!(10_000);
        let rm = RiskManager::starting_on(l, day(1));
        assert!(matches!(
            rm.validate_order_on(&order(dec!(1500)), day(1)),
            RiskCheckResult::Rejected(RiskRejection::PositionSizeExceeded { .. })
        ));
    }

    #[test]
    fn test_daily_loss_halts_trading() {
        let rm = RiskManager::starting_on(limits(), day(1));
        rm.state().daily_loss = dec!(500);
        assert!(matches!(
            rm.validate_order_on(&order(dec!(100)), day(1)),
            RiskCheckResult::Rejected(RiskRejection::TradingHalted { .. })
        ));
    }

    #[test]
    fn test_daily_trade_cap() {
        let mut l = limits();
        l.max_daily_trades = Some(2);
        let rm = RiskManager::starting_on(l, day(1));
        rm.state().daily_trades = 2;
        assert!(matches!(
            rm.validate_order_on(&order(dec!(100)), day(1)),
            RiskCheckResult::Rejected(RiskRejection::DailyTradeLimit { trades: 2, max: 2 })
        ));
    }

    #[test]
    fn test_emergency_stop_latches_until_next_day() {
        let rm = RiskManager::starting_on(limits(), day(1));
        rm.emergency_stop("exchange outage");
        assert!(!rm.validate_order_on(&order(dec!(100)), day(1)).is_approved());
        assert!(!rm.validate_order_on(&order(dec!(100)), day(1)).is_approved());

        assert!(rm.validate_order_on(&order(dec!(100)), day(2)).is_approved());
    }

    #[test]
    fn test_daily_reset_happens_once_per_day() {
        let rm = RiskManager::starting_on(limits(), day(1));
        rm.state().daily_trades = 7;
        rm.state().daily_loss = dec!(42);

        assert!(!rm.roll_day(day(1)));
        assert!(rm.roll_day(day(2)));
        assert!(!rm.roll_day(day(2)));
        // an earlier date never resets again
        assert!(!rm.roll_day(day(1)));

        let state = rm.state();
        assert_eq!(state.daily_trades, 0);
        assert_eq!(state.daily_loss, Decimal::ZERO);
        assert_eq!(state.last_reset, day(2));
    }

    #[test]
    fn test_validation_does_not_touch_counters() {
        let rm = RiskManager::starting_on(limits(), day(1));
        rm.update_exposure(dec!(300));
        for _ in 0..3 {
            rm.validate_order_on(&order(dec!(100)), day(1));
        }
        let state = rm.state();
        assert_eq!(state.daily_trades, 0);
        assert_eq!(state.total_exposure, dec!(300));
    }

    #[test]
    fn test_concurrent_updates_are_serialized() {
        let rm = Arc::new(RiskManager::new(limits()));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let rm = rm.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        rm.record_trade();
                        rm.record_loss(dec!(0.01));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let metrics = rm.metrics();
        assert_eq!(metrics.daily_trades, 8000);
        assert_eq!(metrics.daily_loss, dec!(80));
    }

    #[test]
    fn test_metrics_snapshot() {
        let rm = RiskManager::new(limits());
        rm.update_exposure(dec!(250));
        rm.record_loss(dec!(100));
        let m = rm.metrics();
        assert_eq!(m.exposure_ratio, dec!(0.25));
        assert_eq!(m.remaining_risk, dec!(400));
        assert!(m.trading_allowed);

        rm.emergency_stop("test");
        let m = rm.metrics();
        assert_eq!(m.remaining_risk, Decimal::ZERO);
        assert!(!m.trading_allowed);
    }

    #[test]
    fn test_price_helpers() {
        let rm = RiskManager::new(limits());
        assert_eq!(rm.stop_loss_price(dec!(100), PositionSide::Long), dec!(98));
        assert_eq!(rm.stop_loss_price(dec!(100), PositionSide::Short), dec!(102));
        assert_eq!(rm.take_profit_price(dec!(100), PositionSide::Long), dec!(105));
        assert_eq!(rm.take_profit_price(dec!(100), PositionSide::Short), dec!(95));

        // 1% of 10_000 = 100 at risk over a 2% stop -> 5_000 notional, capped at 1_000
        assert_eq!(rm.position_size(dec!(10_000), dec!(100), dec!(98)), dec!(10));
        // 1% of 1_000 = 10 over 2% -> 500 notional -> 5 units
        assert_eq!(rm.position_size(dec!(1_000), dec!(100), dec!(98)), dec!(5));
    }

    fn holding(entry: Decimal, current: Decimal, side: PositionSide) -> PortfolioPosition {
        let size = dec!(1);
        let diff = (current - entry) * size;
        PortfolioPosition {
            symbol: "BTCUSDT".into(),
            side,
            size,
            entry_price: entry,
            current_price: current,
            value: current * size,
            unrealized_pnl: if side == PositionSide::Short { -diff } else { diff },
            leverage: 1,
        }
    }

    #[test]
    fn test_should_close_position_order() {
        let rm = RiskManager::new(limits());
        assert_eq!(
            rm.should_close_position(&holding(dec!(100), dec!(97), PositionSide::Long)),
            Some(CloseReason::StopLoss)
        );
        assert_eq!(
            rm.should_close_position(&holding(dec!(100), dec!(106), PositionSide::Long)),
            Some(CloseReason::TakeProfit)
        );
        assert_eq!(
            rm.should_close_position(&holding(dec!(100), dec!(103), PositionSide::Short)),
            Some(CloseReason::StopLoss)
        );
        assert_eq!(rm.should_close_position(&holding(dec!(100), dec!(101), PositionSide::Long)), None);
    }

    #[test]
    fn test_max_loss_exit_only_for_losing_positions() {
        let mut l = limits();
        // stop and target far away so only the max-loss rule can fire
        l.stop_loss_percent = dec!(2);
        l.take_profit_percent = dec!(50);
        let rm = RiskManager::new(l);

        // price is above the 98 stop, but the booked loss is over 4% of value
        let mut pos = holding(dec!(100), dec!(99), PositionSide::Long);
        pos.unrealized_pnl = dec!(-5);
        assert_eq!(rm.should_close_position(&pos), Some(CloseReason::MaxLoss));

        let mut winner = holding(dec!(100), dec!(120), PositionSide::Long);
        winner.unrealized_pnl = dec!(20);
        assert_eq!(rm.should_close_position(&winner), None);
    }

    #[test]
    fn test_portfolio_var_and_violations() {
        let rm = RiskManager::new(limits());
        let positions = vec![
            holding(dec!(100), dec!(90), PositionSide::Long),  // -10/90
            holding(dec!(100), dec!(110), PositionSide::Long), // +10/110
            holding(dec!(100), dec!(100), PositionSide::Long), // 0
        ];
        let risk = rm.validate_portfolio(&positions);
        assert_eq!(risk.total_value, dec!(300));
        assert_eq!(risk.total_pnl, Decimal::ZERO);
        assert_eq!(risk.portfolio_return, Decimal::ZERO);
        // floor(3 * 0.05) = 0 -> worst return
        assert_eq!(risk.var_95, (dec!(-10) / dec!(90)).abs());
        assert_eq!(risk.violations, vec![RiskViolation::ValueAtRisk]);
        assert!(!risk.is_valid);

        let mut tight = limits();
        tight.max_exposure = dec!(100);
        let rm = RiskManager::new(tight);
        let risk = rm.validate_portfolio(&[holding(dec!(100), dec!(101), PositionSide::Long)]);
        assert_eq!(risk.violations, vec![RiskViolation::Exposure]);
    }

    #[test]
    fn test_empty_portfolio_is_valid() {
        let rm = RiskManager::new(limits());
        let risk = rm.validate_portfolio(&[]);
        assert!(risk.is_valid);
        assert_eq!(risk.var_95, Decimal::ZERO);
    }
}
