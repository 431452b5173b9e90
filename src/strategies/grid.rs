// src/strategies/grid.rs
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use tracing::debug;

use super::params::{StrategyParams, MAX_LOOKBACK};
use super::traits::{gate, quantity_for, Strategy, StrategyError};
use crate::core::cache::MarketSnapshot;
use crate::types::{Position, Signal};

#[derive(Debug, Clone, PartialEq)]
struct GridLevel {
    price: Decimal,
    active: bool,
}

/// Levels are laid out once around the first observed price and never
/// re-centred.
#[derive(Debug, Clone)]
struct SymbolGrid {
    base_price: Decimal,
    levels: Vec<GridLevel>,
    held_level: Option<usize>,
}

pub struct GridStrategy {
    grid_size: Decimal,
    num_grids: usize,
    min_confidence: f64,
    order_value: Decimal,
    grids: HashMap<String, SymbolGrid>,
}

impl Default for GridStrategy {
    fn default() -> Self {
        Self {
            grid_size: dec!(0.01),
            num_grids: 10,
            min_confidence: 0.8,
            order_value: dec!(100),
            grids: HashMap::new(),
        }
    }
}

impl GridStrategy {
    fn layout(&self, base_price: Decimal) -> SymbolGrid {
        let center = (self.num_grids / 2) as i64;
        let levels = (0..self.num_grids)
            .map(|i| {
                let offset = Decimal::from(i as i64 - center) * self.grid_size;
                GridLevel {
                    price: base_price * (Decimal::ONE + offset),
                    active: false,
                }
            })
            .collect();
        SymbolGrid {
            base_price,
            levels,
            held_level: None,
        }
    }

    /// Index of the level `price` falls into, `None` outside the grid.
    fn find_level(&self, grid: &SymbolGrid, price: Decimal) -> Option<usize> {
        if grid.base_price.is_zero() {
            return None;
        }
        let offset = (price - grid.base_price)
            .checked_div(grid.base_price)?
            .checked_div(self.grid_size)?
            .trunc();
        let level = offset.to_i64()?.checked_add((self.num_grids / 2) as i64)?;
        usize::try_from(level).ok().filter(|l| *l < grid.levels.len())
    }
}

impl Strategy for GridStrategy {
    fn name(&self) -> String {
        "Grid Strategy".to_string()
    }

    fn initialize(&mut self, params: &StrategyParams) -> Result<(), StrategyError> {
        let grid_size = params.positive_decimal("grid_size", self.grid_size)?;
        let num_grids = params.bounded_usize("num_grids", self.num_grids, MAX_LOOKBACK)?;
        let min_confidence = params.min_confidence(self.min_confidence)?;
        let order_value = params.positive_decimal("grid_order_value", self.order_value)?;

        if num_grids < 2 {
            return Err(StrategyError::Constraint("a grid needs at least 2 levels".into()));
        }
        // Lowest level price must stay positive.
        let span = Decimal::from((num_grids / 2) as u64).checked_mul(grid_size);
        if span.map_or(true, |s| s >= Decimal::ONE) {
            return Err(StrategyError::Constraint(
                "grid_size * num_grids / 2 must be below 1".into(),
            ));
        }

        self.grid_size = grid_size;
        self.num_grids = num_grids;
        self.min_confidence = min_confidence;
        self.order_value = order_value;
        self.grids.clear();
        Ok(())
    }

    fn should_buy(&mut self, symbol: &str, snapshot: &MarketSnapshot) -> Signal {
        let price = snapshot.price;
        if price <= Decimal::ZERO {
            return Signal::hold("No valid price");
        }

        if !self.grids.contains_key(symbol) {
            let grid = self.layout(price);
            debug!(symbol, base_price = %price, levels = grid.levels.len(), "Grid initialised");
            self.grids.insert(symbol.to_string(), grid);
        }
        let Some(grid) = self.grids.get(symbol) else {
            return Signal::hold("Grid not initialized");
        };

        let Some(index) = self.find_level(grid, price) else {
            return Signal::hold("Price outside grid range");
        };
        let level = &grid.levels[index];

        if price <= level.price && !level.active {
            let signal = Signal::buy(
                quantity_for(self.order_value, price),
                price,
                self.min_confidence,
                format!("Grid buy at level {}", index),
            );
            return gate(signal, self.min_confidence);
        }

        Signal::hold("No grid buy signal")
    }

    fn should_sell(&mut self, symbol: &str, snapshot: &MarketSnapshot, position: &Position) -> Signal {
        if !self.grids.contains_key(symbol) {
            return Signal::hold("Grid not initialized");
        }
        let price = snapshot.price;

        let profit_target = position.entry_price * (Decimal::ONE + self.grid_size);
        if price >= profit_target {
            let signal = Signal::sell(
                position.size,
                price,
                self.min_confidence,
                format!("Grid sell target reached: {:.2}", profit_target),
            );
            return gate(signal, self.min_confidence);
        }

        let stop_loss = position.entry_price * (Decimal::ONE - self.grid_size * Decimal::TWO);
        if price <= stop_loss {
            return Signal::sell(position.size, price, 1.0, format!("Grid stop loss: {:.2}", stop_loss));
        }

        Signal::hold("No grid sell signal")
    }

    fn update_position(&mut self, symbol: &str, position: Option<&Position>) {
        let Some(grid) = self.grids.get(symbol) else {
            return;
        };
        let entry_level = position.and_then(|p| self.find_level(grid, p.entry_price));

        let Some(grid) = self.grids.get_mut(symbol) else {
            return;
        };
        match position {
            Some(_) => {
                if let Some(index) = entry_level {
                    grid.levels[index].active = true;
                    grid.held_level = Some(index);
                }
            }
            None => {
                if let Some(index) = grid.held_level.take() {
                    grid.levels[index].active = false;
                }
            }
        }
    }
}
