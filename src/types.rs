// src/types.rs
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionSide {
    Long,
    Short,
    Both,
}

impl PositionSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionSide::Long => "LONG",
            PositionSide::Short => "SHORT",
            PositionSide::Both => "BOTH",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Market,
    Limit,
    StopMarket,
    TakeProfitMarket,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Market => "MARKET",
            OrderType::Limit => "LIMIT",
            OrderType::StopMarket => "STOP_MARKET",
            OrderType::TakeProfitMarket => "TAKE_PROFIT_MARKET",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInForce {
    #[serde(rename = "GTC")]
    GoodTillCancel,
    #[serde(rename = "IOC")]
    ImmediateOrCancel,
    #[serde(rename = "FOK")]
    FillOrKill,
}

impl TimeInForce {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeInForce::GoodTillCancel => "GTC",
            TimeInForce::ImmediateOrCancel => "IOC",
            TimeInForce::FillOrKill => "FOK",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
    Expired,
    #[serde(other)]
    Unknown,
}

impl OrderStatus {
    pub fn is_filled(&self) -> bool {
        matches!(self, OrderStatus::Filled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MarginType {
    Crossed,
    Isolated,
}

impl MarginType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarginType::Crossed => "CROSSED",
            MarginType::Isolated => "ISOLATED",
        }
    }
}

// --- Signals ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::Buy => "BUY",
            Action::Sell => "SELL",
            Action::Hold => "HOLD",
        };
        f.write_str(s)
    }
}

/// A strategy's recommendation for one symbol on one evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub action: Action,
    pub quantity: Decimal,
    pub price: Decimal,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    /// Self-reported certainty in `[0, 1]`.
    pub confidence: f64,
    pub reason: String,
    pub position_side: PositionSide,
}

impl Signal {
    pub fn hold(reason: impl Into<String>) -> Self {
        Self {
            action: Action::Hold,
            quantity: Decimal::ZERO,
            price: Decimal::ZERO,
            stop_loss: None,
            take_profit: None,
            confidence: 0.0,
            reason: reason.into(),
            position_side: PositionSide::Both,
        }
    }

    pub fn buy(quantity: Decimal, price: Decimal, confidence: f64, reason: impl Into<String>) -> Self {
        Self {
            action: Action::Buy,
            quantity,
            price,
            stop_loss: None,
            take_profit: None,
            confidence: confidence.clamp(0.0, 1.0),
            reason: reason.into(),
            position_side: PositionSide::Long,
        }
    }

    pub fn sell(quantity: Decimal, price: Decimal, confidence: f64, reason: impl Into<String>) -> Self {
        Self {
            action: Action::Sell,
            quantity,
            price,
            stop_loss: None,
            take_profit: None,
            confidence: confidence.clamp(0.0, 1.0),
            reason: reason.into(),
            position_side: PositionSide::Both,
        }
    }

    pub fn is_actionable(&self) -> bool {
        self.action != Action::Hold
    }
}

// --- Market data ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kline {
    pub open_time: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub close_time: i64,
}

// --- Venue requests / responses ---

#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub time_in_force: Option<TimeInForce>,
    pub reduce_only: bool,
    pub close_position: bool,
    pub position_side: PositionSide,
    pub client_order_id: Option<String>,
}

impl OrderRequest {
    pub fn market(symbol: &str, side: Side, quantity: Decimal) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            order_type: OrderType::Market,
            quantity,
            price: None,
            stop_price: None,
            time_in_force: None,
            reduce_only: false,
            close_position: false,
            position_side: PositionSide::Both,
            client_order_id: None,
        }
    }

    pub fn reduce_only(mut self) -> Self {
        self.reduce_only = true;
        self
    }

    pub fn with_client_order_id(mut self, id: impl Into<String>) -> Self {
        self.client_order_id = Some(id.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderResponse {
    pub order_id: i64,
    pub client_order_id: String,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub status: OrderStatus,
    pub price: Decimal,
    pub avg_price: Decimal,
    pub orig_qty: Decimal,
    pub executed_qty: Decimal,
    pub cum_quote: Decimal,
    pub reduce_only: bool,
    pub position_side: PositionSide,
    pub update_time: i64,
}

impl OrderResponse {
    /// Any quantity executed, whatever the final status (a market order can
    /// come back `PARTIALLY_FILLED` or `EXPIRED` with a partial fill).
    pub fn has_fill(&self) -> bool {
        self.executed_qty > Decimal::ZERO
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub total_wallet_balance: Decimal,
    pub total_unrealized_pnl: Decimal,
    pub total_margin_balance: Decimal,
    pub total_position_initial_margin: Decimal,
    pub total_open_order_initial_margin: Decimal,
    pub total_cross_wallet_balance: Decimal,
    pub available_balance: Decimal,
    pub max_withdraw_amount: Decimal,
    pub can_trade: bool,
    pub can_withdraw: bool,
    pub can_deposit: bool,
    pub update_time: i64,
}

// --- Persisted records ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionStatus {
    Open,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub symbol: String,
    pub side: PositionSide,
    pub size: Decimal,
    pub entry_price: Decimal,
    pub mark_price: Decimal,
    pub leverage: u32,
    pub status: PositionStatus,
    pub open_time: DateTime<Utc>,
    pub close_time: Option<DateTime<Utc>>,
    pub close_price: Option<Decimal>,
    pub closed_pnl: Decimal,
    pub strategy: String,
}

impl Position {
    pub fn open(symbol: &str, size: Decimal, entry_price: Decimal, leverage: u32, strategy: &str) -> Self {
        Self {
            id: String::new(),
            symbol: symbol.to_string(),
            side: PositionSide::Long,
            size,
            entry_price,
            mark_price: entry_price,
            leverage,
            status: PositionStatus::Open,
            open_time: Utc::now(),
            close_time: None,
            close_price: None,
            closed_pnl: Decimal::ZERO,
            strategy: strategy.to_string(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    /// Notional at the last known mark price.
    pub fn notional(&self) -> Decimal {
        self.size * self.mark_price
    }

    pub fn unrealized_pnl(&self) -> Decimal {
        let diff = self.mark_price - self.entry_price;
        match self.side {
            PositionSide::Short => -diff * self.size,
            _ => diff * self.size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub exchange_order_id: String,
    pub client_order_id: String,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub status: OrderStatus,
    pub quantity: Decimal,
    pub price: Decimal,
    pub executed_qty: Decimal,
    pub cumulative_quote: Decimal,
    pub reduce_only: bool,
    pub position_side: PositionSide,
    pub strategy: String,
    pub reason: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn from_response(response: &OrderResponse, strategy: &str, reason: &str) -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            exchange_order_id: response.order_id.to_string(),
            client_order_id: response.client_order_id.clone(),
            symbol: response.symbol.clone(),
            side: response.side,
            order_type: response.order_type,
            status: response.status.clone(),
            quantity: response.orig_qty,
            price: response.price,
            executed_qty: response.executed_qty,
            cumulative_quote: response.cum_quote,
            reduce_only: response.reduce_only,
            position_side: response.position_side,
            strategy: strategy.to_string(),
            reason: reason.to_string(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    pub order_id: String,
    pub symbol: String,
    pub side: Side,
    pub quantity: Decimal,
    pub price: Decimal,
    pub quote_qty: Decimal,
    pub realized_pnl: Decimal,
    pub position_side: PositionSide,
    pub strategy: String,
    pub trade_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketDataRecord {
    pub symbol: String,
    pub price: Decimal,
    pub volume: Decimal,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskMetric {
    pub date: DateTime<Utc>,
    pub daily_pnl: Decimal,
    pub total_trades: u64,
    pub winning_trades: u64,
    pub losing_trades: u64,
    /// Percentage, `0` when no trades were closed yet.
    pub win_rate: f64,
    pub total_exposure: Decimal,
    pub daily_loss: Decimal,
}
