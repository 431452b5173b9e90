// src/strategies/history.rs
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};

use super::traits::StrategyError;

/// `period + buffer`, rejecting sums that do not fit a `usize`.
pub fn history_capacity(period: usize, buffer: usize) -> Result<usize, StrategyError> {
    period
        .checked_add(buffer)
        .ok_or_else(|| StrategyError::Constraint("look-back period too large".into()))
}

/// Bounded FIFO of prices; the oldest sample is evicted once `capacity` is reached.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    capacity: usize,
    values: VecDeque<Decimal>,
}

impl RollingWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            values: VecDeque::new(),
        }
    }

    pub fn push(&mut self, value: Decimal) {
        while self.values.len() >= self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<Decimal> {
        self.values.back().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Decimal> {
        self.values.iter()
    }

    /// Arithmetic mean of the newest `period` values, `None` if fewer are held.
    pub fn mean_of_last(&self, period: usize) -> Option<Decimal> {
        if period == 0 || self.values.len() < period {
            return None;
        }
        let sum: Decimal = self.values.iter().skip(self.values.len() - period).sum();
        Some(sum / Decimal::from(period))
    }
}

/// One [`RollingWindow`] per symbol, all with the same capacity.
#[derive(Debug, Clone)]
pub struct PriceHistory {
    capacity: usize,
    windows: HashMap<String, RollingWindow>,
}

impl PriceHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            windows: HashMap::new(),
        }
    }

    /// Appends `price` to the symbol's window and returns the updated window.
    pub fn record(&mut self, symbol: &str, price: Decimal) -> &RollingWindow {
        let capacity = self.capacity;
        let window = self
            .windows
            .entry(symbol.to_string())
            .or_insert_with(|| RollingWindow::new(capacity));
        window.push(price);
        window
    }

    pub fn get(&self, symbol: &str) -> Option<&RollingWindow> {
        self.windows.get(symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_window_never_exceeds_capacity() {
        let mut window = RollingWindow::new(3);
        for i in 1..=10 {
            window.push(Decimal::from(i));
            assert!(window.len() <= 3);
        }
        let kept: Vec<Decimal> = window.iter().copied().collect();
        assert_eq!(kept, vec![dec!(8), dec!(9), dec!(10)]);
    }

    #[test]
    fn test_mean_of_last() {
        let mut window = RollingWindow::new(10);
        for p in [dec!(1), dec!(2), dec!(3), dec!(4)] {
            window.push(p);
        }
        assert_eq!(window.mean_of_last(2), Some(dec!(3.5)));
        assert_eq!(window.mean_of_last(4), Some(dec!(2.5)));
        assert_eq!(window.mean_of_last(5), None);
    }

    #[test]
    fn test_history_is_per_symbol() {
        let mut history = PriceHistory::new(5);
        history.record("BTCUSDT", dec!(1));
        history.record("BTCUSDT", dec!(2));
        history.record("ETHUSDT", dec!(3));
        assert_eq!(history.get("BTCUSDT").map(|w| w.len()), Some(2));
        assert_eq!(history.get("ETHUSDT").and_then(|w| w.latest()), Some(dec!(3)));
        assert!(history.get("SOLUSDT").is_none());
    }
}
