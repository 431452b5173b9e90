// src/strategies/params.rs
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;

use super::traits::StrategyError;

/// Upper bound for look-back periods and grid level counts.
pub const MAX_LOOKBACK: usize = 10_000;

/// Opaque per-strategy overrides from `trading.strategy.parameters`.
/// Values may be JSON numbers or numeric strings.
#[derive(Debug, Clone, Default)]
pub struct StrategyParams(HashMap<String, Value>);

impl From<HashMap<String, Value>> for StrategyParams {
    fn from(map: HashMap<String, Value>) -> Self {
        Self(map)
    }
}

impl StrategyParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn get_decimal(&self, key: &str) -> Result<Option<Decimal>, StrategyError> {
        let Some(value) = self.0.get(key) else {
            return Ok(None);
        };
        let text = match value {
            Value::Number(n) => n.to_string(),
            Value::String(s) => s.trim().to_string(),
            _ => return Err(invalid(key, "expected a number")),
        };
        Decimal::from_str(&text)
            .or_else(|_| Decimal::from_scientific(&text))
            .map(Some)
            .map_err(|_| invalid(key, "not a decimal number"))
    }

    pub fn get_usize(&self, key: &str) -> Result<Option<usize>, StrategyError> {
        match self.get_decimal(key)? {
            None => Ok(None),
            Some(d) if d.is_sign_negative() || d.fract() != Decimal::ZERO => {
                Err(invalid(key, "expected a non-negative integer"))
            }
            Some(d) => d.to_usize().map(Some).ok_or_else(|| invalid(key, "integer too large")),
        }
    }

    /// Reads an integer no larger than `max`, falling back to `default`.
    pub fn bounded_usize(&self, key: &str, default: usize, max: usize) -> Result<usize, StrategyError> {
        let value = self.get_usize(key)?.unwrap_or(default);
        if value > max {
            return Err(StrategyError::InvalidParameter {
                key: key.to_string(),
                reason: format!("must be at most {}", max),
            });
        }
        Ok(value)
    }

    pub fn get_f64(&self, key: &str) -> Result<Option<f64>, StrategyError> {
        match self.get_decimal(key)? {
            None => Ok(None),
            Some(d) => d.to_f64().map(Some).ok_or_else(|| invalid(key, "not representable as f64")),
        }
    }

    /// Reads `min_confidence`, which must lie in `[0, 1]`.
    pub fn min_confidence(&self, default: f64) -> Result<f64, StrategyError> {
        let value = self.get_f64("min_confidence")?.unwrap_or(default);
        if !(0.0..=1.0).contains(&value) {
            return Err(invalid("min_confidence", "must be between 0 and 1"));
        }
        Ok(value)
    }

    /// Reads a strictly positive decimal, falling back to `default`.
    pub fn positive_decimal(&self, key: &str, default: Decimal) -> Result<Decimal, StrategyError> {
        let value = self.get_decimal(key)?.unwrap_or(default);
        if value <= Decimal::ZERO {
            return Err(invalid(key, "must be positive"));
        }
        Ok(value)
    }
}

fn invalid(key: &str, reason: &str) -> StrategyError {
    StrategyError::InvalidParameter {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_numbers_and_numeric_strings() {
        let params = StrategyParams::new()
            .with("short_period", 5)
            .with("grid_size", 0.02)
            .with("oversold", "25.5");

        assert_eq!(params.get_usize("short_period").unwrap(), Some(5));
        assert_eq!(params.get_decimal("grid_size").unwrap(), Some(dec!(0.02)));
        assert_eq!(params.get_f64("oversold").unwrap(), Some(25.5));
        assert_eq!(params.get_usize("missing").unwrap(), None);
    }

    #[test]
    fn test_rejects_wrong_types() {
        let params = StrategyParams::new()
            .with("period", true)
            .with("num_grids", 2.5)
            .with("long_period", -3);

        assert!(params.get_decimal("period").is_err());
        assert!(params.get_usize("num_grids").is_err());
        assert!(params.get_usize("long_period").is_err());
    }

    #[test]
    fn test_bounded_usize() {
        let params = StrategyParams::new().with("period", 20).with("num_grids", 20_000);
        assert_eq!(params.bounded_usize("period", 14, MAX_LOOKBACK).unwrap(), 20);
        assert_eq!(params.bounded_usize("missing", 14, MAX_LOOKBACK).unwrap(), 14);
        assert!(matches!(
            params.bounded_usize("num_grids", 10, MAX_LOOKBACK),
            Err(StrategyError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_min_confidence_bounds() {
        assert_eq!(StrategyParams::new().min_confidence(0.7).unwrap(), 0.7);
        let params = StrategyParams::new().with("min_confidence", 1.5);
        assert!(params.min_confidence(0.7).is_err());
    }
}
