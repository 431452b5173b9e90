// src/strategies/passthrough.rs
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::params::StrategyParams;
use super::traits::{gate, quantity_for, Strategy, StrategyError};
use crate::core::cache::MarketSnapshot;
use crate::types::{Position, Signal};

/// Placeholder for an external decision model: always recommends entering
/// when flat and exiting when holding.
pub struct PassthroughStrategy {
    confidence: f64,
    min_confidence: f64,
    position_value: Decimal,
}

impl Default for PassthroughStrategy {
    fn default() -> Self {
        Self {
            confidence: 1.0,
            min_confidence: 0.0,
            position_value: dec!(1000),
        }
    }
}

impl Strategy for PassthroughStrategy {
    fn name(&self) -> String {
        "AIStrategy".to_string()
    }

    fn initialize(&mut self, params: &StrategyParams) -> Result<(), StrategyError> {
        let confidence = params.get_f64("confidence")?.unwrap_or(self.confidence);
        if !(0.0..=1.0).contains(&confidence) {
            return Err(StrategyError::InvalidParameter {
                key: "confidence".into(),
                reason: "must be between 0 and 1".into(),
            });
        }
        self.min_confidence = params.min_confidence(self.min_confidence)?;
        self.position_value = params.positive_decimal("position_value", self.position_value)?;
        self.confidence = confidence;
        Ok(())
    }

    fn should_buy(&mut self, _symbol: &str, snapshot: &MarketSnapshot) -> Signal {
        if snapshot.price <= Decimal::ZERO {
            return Signal::hold("No valid price");
        }
        let signal = Signal::buy(
            quantity_for(self.position_value, snapshot.price),
            snapshot.price,
            self.confidence,
            "external model: enter",
        );
        gate(signal, self.min_confidence)
    }

    fn should_sell(&mut self, _symbol: &str, snapshot: &MarketSnapshot, position: &Position) -> Signal {
        let signal = Signal::sell(position.size, snapshot.price, self.confidence, "external model: exit");
        gate(signal, self.min_confidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Action;

    #[test]
    fn test_always_enters_and_exits() {
        let mut ai = PassthroughStrategy::default();
        let snap = MarketSnapshot::from_price("BTCUSDT", dec!(50));

        let buy = ai.should_buy("BTCUSDT", &snap);
        assert_eq!(buy.action, Action::Buy);
        assert_eq!(buy.quantity, dec!(20));

        let position = Position::open("BTCUSDT", dec!(20), dec!(50), 1, "ai");
        let sell = ai.should_sell("BTCUSDT", &snap, &position);
        assert_eq!(sell.action, Action::Sell);
        assert_eq!(sell.quantity, dec!(20));
    }

    #[test]
    fn test_low_confidence_is_gated() {
        let mut ai = PassthroughStrategy::default();
        ai.initialize(&StrategyParams::new().with("confidence", 0.3).with("min_confidence", 0.5))
            .unwrap();
        let snap = MarketSnapshot::from_price("BTCUSDT", dec!(50));
        assert_eq!(ai.should_buy("BTCUSDT", &snap).action, Action::Hold);
    }
}
