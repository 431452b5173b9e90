// src/strategies/rsi.rs
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::history::{history_capacity, PriceHistory, RollingWindow};
use super::params::{StrategyParams, MAX_LOOKBACK};
use super::traits::{fixed_exit, gate, quantity_for, Strategy, StrategyError};
use crate::core::cache::MarketSnapshot;
use crate::types::{Position, Signal};

const HISTORY_BUFFER: usize = 20;
const NEUTRAL: Decimal = dec!(50);

/// Oversold/overbought RSI thresholds.
pub struct RsiStrategy {
    period: usize,
    oversold: Decimal,
    overbought: Decimal,
    min_confidence: f64,
    position_value: Decimal,
    history: PriceHistory,
}

impl Default for RsiStrategy {
    fn default() -> Self {
        Self {
            period: 14,
            oversold: dec!(30),
            overbought: dec!(70),
            min_confidence: 0.6,
            position_value: dec!(1000),
            history: PriceHistory::new(14 + HISTORY_BUFFER),
        }
    }
}

/// RSI over the newest `period` price changes of `window`, recomputed from
/// scratch (simple averages, no Wilder smoothing). `50` when fewer than
/// `period + 1` prices are held, `100` when there were no losses.
pub fn relative_strength_index(window: &RollingWindow, period: usize) -> Decimal {
    if period == 0 || window.len() < period + 1 {
        return NEUTRAL;
    }

    let prices: Vec<Decimal> = window.iter().copied().collect();
    let changes: Vec<Decimal> = prices.windows(2).map(|w| w[1] - w[0]).collect();
    let recent = &changes[changes.len() - period..];

    let (gains, losses) = recent.iter().fold((Decimal::ZERO, Decimal::ZERO), |(g, l), c| {
        if *c > Decimal::ZERO {
            (g + c, l)
        } else {
            (g, l - c)
        }
    });
    let n = Decimal::from(period);
    let avg_gain = gains / n;
    let avg_loss = losses / n;

    if avg_loss.is_zero() {
        return Decimal::ONE_HUNDRED;
    }
    let rs = avg_gain / avg_loss;
    Decimal::ONE_HUNDRED - Decimal::ONE_HUNDRED / (Decimal::ONE + rs)
}

impl RsiStrategy {
    /// `None` while fewer than `period + 1` samples are held.
    fn rsi(&mut self, symbol: &str, price: Decimal) -> Option<Decimal> {
        let period = self.period;
        let window = self.history.record(symbol, price);
        if window.len() < period + 1 {
            return None;
        }
        Some(relative_strength_index(window, period))
    }
}

fn ratio(numerator: Decimal, denominator: Decimal) -> f64 {
    if denominator <= Decimal::ZERO {
        return 0.0;
    }
    (numerator / denominator).to_f64().unwrap_or(0.0).clamp(0.0, 1.0)
}

impl Strategy for RsiStrategy {
    fn name(&self) -> String {
        "RSI Strategy".to_string()
    }

    fn initialize(&mut self, params: &StrategyParams) -> Result<(), StrategyError> {
        let period = params.bounded_usize("period", self.period, MAX_LOOKBACK)?;
        let oversold = params.get_decimal("oversold")?.unwrap_or(self.oversold);
        let overbought = params.get_decimal("overbought")?.unwrap_or(self.overbought);
        let min_confidence = params.min_confidence(self.min_confidence)?;
        let position_value = params.positive_decimal("position_value", self.position_value)?;

        if period == 0 {
            return Err(StrategyError::Constraint("RSI period must be at least 1".into()));
        }
        if oversold <= Decimal::ZERO || overbought >= Decimal::ONE_HUNDRED || oversold >= overbought {
            return Err(StrategyError::Constraint(
                "thresholds must satisfy 0 < oversold < overbought < 100".into(),
            ));
        }

        let capacity = history_capacity(period, HISTORY_BUFFER)?;

        self.period = period;
        self.oversold = oversold;
        self.overbought = overbought;
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
        let Some(rsi) = self.rsi(symbol, price) else {
            return Signal::hold("Insufficient data for RSI");
        };

        if rsi < self.oversold {
            let confidence = ratio(self.oversold - rsi, self.oversold);
            let signal = Signal::buy(
                quantity_for(self.position_value, price),
                price,
                confidence,
                format!("RSI oversold: {:.2}", rsi),
            );
            return gate(signal, self.min_confidence);
        }

        Signal::hold(format!("RSI: {:.2}", rsi))
    }

    fn should_sell(&mut self, symbol: &str, snapshot: &MarketSnapshot, position: &Position) -> Signal {
        let price = snapshot.price;
        if price <= Decimal::ZERO {
            return Signal::hold("No valid price");
        }
        let Some(rsi) = self.rsi(symbol, price) else {
            return Signal::hold("Insufficient data for RSI");
        };

        if rsi > self.overbought {
            let confidence = ratio(rsi - self.overbought, Decimal::ONE_HUNDRED - self.overbought);
            let signal = gate(
                Signal::sell(position.size, price, confidence, format!("RSI overbought: {:.2}", rsi)),
                self.min_confidence,
            );
            if signal.is_actionable() {
                return signal;
            }
        }

        fixed_exit(price, position).unwrap_or_else(|| Signal::hold(format!("RSI: {:.2}", rsi)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Action;

    fn snap(price: Decimal) -> MarketSnapshot {
        MarketSnapshot::from_price("ETHUSDT", price)
    }

    fn window(prices: &[i64]) -> RollingWindow {
        let mut w = RollingWindow::new(100);
        for p in prices {
            w.push(Decimal::from(*p));
        }
        w
    }

    #[test]
    fn test_neutral_with_too_few_samples() {
        let w = window(&(1..=14).collect::<Vec<_>>());
        assert_eq!(relative_strength_index(&w, 14), dec!(50));

        let mut rsi = RsiStrategy::default();
        for p in (1..=14).rev() {
            let signal = rsi.should_buy("ETHUSDT", &snap(Decimal::from(p)));
            assert_eq!(signal.action, Action::Hold);
        }
    }

    #[test]
    fn test_no_losses_is_one_hundred() {
        let w = window(&(1..=15).collect::<Vec<_>>());
        assert_eq!(relative_strength_index(&w, 14), dec!(100));
    }

    #[test]
    fn test_simple_average_recomputation() {
        // changes over the last 2: +2, -1 -> avg gain 1, avg loss 0.5, RS 2
        let w = window(&[10, 8, 10, 9]);
        let rsi = relative_strength_index(&w, 2);
        assert_eq!(rsi.round_dp(6), dec!(66.666667));
    }

    #[test]
    fn test_fifteen_descending_prices_buy_with_full_confidence() {
        let mut rsi = RsiStrategy::default();
        let mut last = Signal::hold("");
        for p in (86..=100).rev() {
            last = rsi.should_buy("ETHUSDT", &snap(Decimal::from(p)));
        }
        assert_eq!(last.action, Action::Buy);
        assert_eq!(last.confidence, 1.0);
        assert!(last.reason.contains("0.00"));
    }

    #[test]
    fn test_overbought_sell() {
        let mut rsi = RsiStrategy::default();
        let position = Position::open("ETHUSDT", dec!(3), dec!(90), 1, "rsi");
        let mut last = Signal::hold("");
        for p in 86..=100 {
            last = rsi.should_sell("ETHUSDT", &snap(Decimal::from(p)), &position);
        }
        // RSI 100 -> confidence (100 - 70) / 30 = 1
        assert_eq!(last.action, Action::Sell);
        assert_eq!(last.quantity, dec!(3));
        assert!(last.reason.starts_with("RSI overbought"));
    }

    #[test]
    fn test_invalid_thresholds_rejected() {
        let mut rsi = RsiStrategy::default();
        let params = StrategyParams::new().with("oversold", 80).with("overbought", 70);
        assert!(rsi.initialize(&params).is_err());
        assert_eq!(rsi.oversold, dec!(30));
    }

    #[test]
    fn test_oversized_period_is_rejected() {
        let mut rsi = RsiStrategy::default();
        let params = StrategyParams::new().with("period", serde_json::Value::from(u64::MAX));
        assert!(rsi.initialize(&params).is_err());
        assert_eq!(rsi.period, 14);
    }

    #[test]
    fn test_history_capped_at_period_plus_buffer() {
        let mut rsi = RsiStrategy::default();
        rsi.initialize(&StrategyParams::new().with("period", 5)).unwrap();
        for p in 1..=200 {
            rsi.should_buy("ETHUSDT", &snap(Decimal::from(p)));
        }
        assert_eq!(rsi.history.get("ETHUSDT").map(|w| w.len()), Some(25));
    }
}
