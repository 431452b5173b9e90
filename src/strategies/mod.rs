// src/strategies/mod.rs
pub mod grid;
pub mod history;
pub mod params;
pub mod passthrough;
pub mod rsi;
pub mod sma;
pub mod traits;

use tracing::{info, warn};

use crate::config::StrategyConfig;
pub use grid::GridStrategy;
pub use params::StrategyParams;
pub use passthrough::PassthroughStrategy;
pub use rsi::RsiStrategy;
pub use sma::SmaStrategy;
pub use traits::{Strategy, StrategyError};

/// Picks the variant named by `strategy.type` and applies its parameters.
/// Unknown names fall back to the moving-average crossover.
pub fn build_strategy(config: &StrategyConfig) -> Result<Box<dyn Strategy>, StrategyError> {
    let mut strategy: Box<dyn Strategy> = match config.kind.to_ascii_lowercase().as_str() {
        "simple_moving_average" | "sma" => Box::new(SmaStrategy::default()),
        "rsi" => Box::new(RsiStrategy::default()),
        "grid" => Box::new(GridStrategy::default()),
        "ai" | "passthrough" => Box::new(PassthroughStrategy::default()),
        other => {
            warn!(strategy = other, "Unknown strategy type, falling back to simple_moving_average");
            Box::new(SmaStrategy::default())
        }
    };

    strategy.initialize(&StrategyParams::from(config.parameters.clone()))?;
    info!(strategy = %strategy.name(), "Strategy initialised");
    Ok(strategy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(kind: &str) -> StrategyConfig {
        StrategyConfig {
            kind: kind.to_string(),
            parameters: HashMap::new(),
        }
    }

    #[test]
    fn test_known_types() {
        assert_eq!(build_strategy(&config("simple_moving_average")).unwrap().name(), "Simple Moving Average");
        assert_eq!(build_strategy(&config("rsi")).unwrap().name(), "RSI Strategy");
        assert_eq!(build_strategy(&config("grid")).unwrap().name(), "Grid Strategy");
        assert_eq!(build_strategy(&config("ai")).unwrap().name(), "AIStrategy");
    }

    #[test]
    fn test_unknown_type_falls_back_to_sma() {
        assert_eq!(build_strategy(&config("macd")).unwrap().name(), "Simple Moving Average");
    }

    #[test]
    fn test_parameter_errors_surface() {
        let mut cfg = config("simple_moving_average");
        cfg.parameters.insert("short_period".into(), serde_json::json!(30));
        assert!(build_strategy(&cfg).is_err());
    }
}
