#![allow(dead_code)]

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use perp_pilot::connectors::{ExchangeClient, ExchangeError, ExchangeResult};
use perp_pilot::core::{EngineSettings, RiskLimits, RiskManager, TradingEngine};
use perp_pilot::storage::MemoryStore;
use perp_pilot::strategies::{PassthroughStrategy, Strategy};
use perp_pilot::types::{
    AccountInfo, Kline, MarginType, OrderRequest, OrderResponse, OrderStatus, PositionSide,
};

/// Scripted venue: fills market orders at the configured price unless told
/// otherwise, and records every call.
#[derive(Default)]
pub struct MockExchange {
    prices: Mutex<HashMap<String, Decimal>>,
    statuses: Mutex<VecDeque<(OrderStatus, Option<Decimal>)>>,
    failing_orders: Mutex<HashSet<String>>,
    failing_leverage: Mutex<HashSet<String>>,
    orders: Mutex<Vec<OrderRequest>>,
    leverage_calls: Mutex<Vec<(String, u32)>>,
    margin_calls: Mutex<Vec<(String, MarginType)>>,
    next_order_id: AtomicI64,
}

impl MockExchange {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_price(&self, symbol: &str, price: Decimal) {
        self.prices.lock().unwrap().insert(symbol.to_string(), price);
    }

    /// Status reported by the next order instead of `FILLED`.
    pub fn script_status(&self, status: OrderStatus) {
        self.statuses.lock().unwrap().push_back((status, None));
    }

    /// Status and executed quantity reported by the next order.
    pub fn script_fill(&self, status: OrderStatus, executed: Decimal) {
        self.statuses.lock().unwrap().push_back((status, Some(executed)));
    }

    pub fn fail_orders_for(&self, symbol: &str) {
        self.failing_orders.lock().unwrap().insert(symbol.to_string());
    }

    pub fn fail_leverage_for(&self, symbol: &str) {
        self.failing_leverage.lock().unwrap().insert(symbol.to_string());
    }

    pub fn orders(&self) -> Vec<OrderRequest> {
        self.orders.lock().unwrap().clone()
    }

    pub fn leverage_calls(&self) -> Vec<(String, u32)> {
        self.leverage_calls.lock().unwrap().clone()
    }

    pub fn margin_calls(&self) -> Vec<(String, MarginType)> {
        self.margin_calls.lock().unwrap().clone()
    }

    fn price(&self, symbol: &str) -> ExchangeResult<Decimal> {
        self.prices
            .lock()
            .unwrap()
            .get(symbol)
            .copied()
            .ok_or_else(|| ExchangeError::Api {
                code: -1121,
                message: "Invalid symbol.".into(),
            })
    }
}

#[async_trait]
impl ExchangeClient for MockExchange {
    async fn get_price(&self, symbol: &str) -> ExchangeResult<Decimal> {
        self.price(symbol)
    }

    async fn get_klines(&self, symbol: &str, _interval: &str, _limit: u16) -> ExchangeResult<Vec<Kline>> {
        let price = self.price(symbol)?;
        Ok(vec![Kline {
            open_time: 0,
            open: price,
            high: price + dec!(1),
            low: price - dec!(1),
            close: price,
            volume: dec!(42),
            close_time: 59_999,
        }])
    }

    async fn place_order(&self, request: &OrderRequest) -> ExchangeResult<OrderResponse> {
        self.orders.lock().unwrap().push(request.clone());
        if self.failing_orders.lock().unwrap().contains(&request.symbol) {
            return Err(ExchangeError::Api {
                code: -2019,
                message: "Margin is insufficient.".into(),
            });
        }

        let (status, scripted) = self
            .statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or((OrderStatus::Filled, None));
        let price = self.price(&request.symbol).unwrap_or_default();
        let executed = scripted.unwrap_or(if status.is_filled() { request.quantity } else { Decimal::ZERO });
        let filled = executed > Decimal::ZERO;
        Ok(OrderResponse {
            order_id: self.next_order_id.fetch_add(1, Ordering::SeqCst) + 1,
            client_order_id: request.client_order_id.clone().unwrap_or_default(),
            symbol: request.symbol.clone(),
            side: request.side,
            order_type: request.order_type,
            status,
            price: Decimal::ZERO,
            avg_price: if filled { price } else { Decimal::ZERO },
            orig_qty: request.quantity,
            executed_qty: executed,
            cum_quote: executed * price,
            reduce_only: request.reduce_only,
            position_side: PositionSide::Both,
            update_time: 0,
        })
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> ExchangeResult<()> {
        self.leverage_calls.lock().unwrap().push((symbol.to_string(), leverage));
        if self.failing_leverage.lock().unwrap().contains(symbol) {
            return Err(ExchangeError::Api {
                code: -4028,
                message: "Leverage 0 is not valid".into(),
            });
        }
        Ok(())
    }

    async fn set_margin_type(&self, symbol: &str, margin_type: MarginType) -> ExchangeResult<()> {
        self.margin_calls.lock().unwrap().push((symbol.to_string(), margin_type));
        Ok(())
    }

    async fn get_account(&self) -> ExchangeResult<AccountInfo> {
        Ok(AccountInfo {
            total_wallet_balance: dec!(10000),
            available_balance: dec!(9000),
            can_trade: true,
            ..AccountInfo::default()
        })
    }
}

pub fn settings(symbols: &[&str], paper_trading: bool) -> EngineSettings {
    EngineSettings {
        symbols: symbols.iter().map(|s| s.to_string()).collect(),
        trading_interval: Duration::from_secs(3600),
        risk_metrics_interval: Duration::from_secs(3600),
        account_interval: Duration::from_secs(3600),
        kline_interval: "1m".into(),
        kline_limit: 50,
        quantity_step_size: dec!(0.001),
        leverage: 5,
        margin_type: MarginType::Crossed,
        paper_trading,
    }
}

pub fn limits() -> RiskLimits {
    RiskLimits {
        max_position_size: dec!(1000),
        max_daily_loss: dec!(500),
        min_order_value: dec!(10),
        max_order_value: None,
        max_exposure: dec!(10000),
        max_daily_trades: None,
        risk_per_trade_percent: dec!(1),
        stop_loss_percent: dec!(2),
        take_profit_percent: dec!(5),
        var_limit: dec!(0.05),
        max_drawdown_percent: dec!(20),
    }
}

pub struct Harness {
    pub exchange: Arc<MockExchange>,
    pub store: Arc<MemoryStore>,
    pub engine: TradingEngine,
}

pub fn harness(settings: EngineSettings, limits: RiskLimits, strategy: Box<dyn Strategy>) -> Harness {
    let exchange = MockExchange::new();
    let store = Arc::new(MemoryStore::new());
    let engine = TradingEngine::new(
        settings,
        exchange.clone(),
        store.clone(),
        strategy,
        RiskManager::new(limits),
    );
    Harness { exchange, store, engine }
}

/// Always-enter/always-exit strategy sized at 1000 quote per entry.
pub fn passthrough() -> Box<dyn Strategy> {
    Box::new(PassthroughStrategy::default())
}
