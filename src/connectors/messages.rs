// src/connectors/messages.rs
//! Wire formats of the Binance USDⓈ-M futures REST API.
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::types::{AccountInfo, OrderResponse, OrderStatus, OrderType, PositionSide, Side};

/// Error body: `{"code":-2019,"msg":"Margin is insufficient."}`
#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    pub code: i64,
    pub msg: String,
}

/// `GET /fapi/v1/ticker/price`
#[derive(Debug, Deserialize)]
pub struct PriceTicker {
    pub symbol: String,
    pub price: Decimal,
}

/// `POST /fapi/v1/order` with `newOrderRespType=RESULT`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FuturesOrder {
    pub order_id: i64,
    pub symbol: String,
    pub status: OrderStatus,
    pub client_order_id: String,
    pub price: Decimal,
    pub avg_price: Decimal,
    pub orig_qty: Decimal,
    pub executed_qty: Decimal,
    pub cum_quote: Decimal,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub reduce_only: bool,
    pub side: Side,
    pub position_side: PositionSide,
    pub update_time: i64,
}

impl From<FuturesOrder> for OrderResponse {
    fn from(o: FuturesOrder) -> Self {
        Self {
            order_id: o.order_id,
            client_order_id: o.client_order_id,
            symbol: o.symbol,
            side: o.side,
            order_type: o.order_type,
            status: o.status,
            price: o.price,
            avg_price: o.avg_price,
            orig_qty: o.orig_qty,
            executed_qty: o.executed_qty,
            cum_quote: o.cum_quote,
            reduce_only: o.reduce_only,
            position_side: o.position_side,
            update_time: o.update_time,
        }
    }
}

/// `GET /fapi/v2/account` (only the fields the engine keeps).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FuturesAccount {
    pub total_wallet_balance: Decimal,
    pub total_unrealized_profit: Decimal,
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

impl From<FuturesAccount> for AccountInfo {
    fn from(a: FuturesAccount) -> Self {
        Self {
            total_wallet_balance: a.total_wallet_balance,
            total_unrealized_pnl: a.total_unrealized_profit,
            total_margin_balance: a.total_margin_balance,
            total_position_initial_margin: a.total_position_initial_margin,
            total_open_order_initial_margin: a.total_open_order_initial_margin,
            total_cross_wallet_balance: a.total_cross_wallet_balance,
            available_balance: a.available_balance,
            max_withdraw_amount: a.max_withdraw_amount,
            can_trade: a.can_trade,
            can_withdraw: a.can_withdraw,
            can_deposit: a.can_deposit,
            update_time: a.update_time,
        }
    }
}

/// Klines arrive as positional arrays:
/// `[openTime, "open", "high", "low", "close", "volume", closeTime, ...]`
pub type RawKline = Vec<serde_json::Value>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_order_response_parses() {
        let body = r#"{
            "orderId": 22542179, "symbol": "BTCUSDT", "status": "FILLED",
            "clientOrderId": "buy_BTCUSDT_1", "price": "0", "avgPrice": "50010.10",
            "origQty": "0.020", "executedQty": "0.020", "cumQuote": "1000.202",
            "timeInForce": "GTC", "type": "MARKET", "reduceOnly": false,
            "closePosition": false, "side": "BUY", "positionSide": "BOTH",
            "stopPrice": "0", "workingType": "CONTRACT_PRICE", "priceProtect": false,
            "origType": "MARKET", "updateTime": 1566818724722
        }"#;

        let order: FuturesOrder = serde_json::from_str(body).unwrap();
        let resp = OrderResponse::from(order);
        assert_eq!(resp.status, OrderStatus::Filled);
        assert_eq!(resp.avg_price, dec!(50010.10));
        assert_eq!(resp.executed_qty, dec!(0.020));
        assert_eq!(resp.side, Side::Buy);
        assert_eq!(resp.order_type, OrderType::Market);
    }

    #[test]
    fn test_unknown_status_is_tolerated() {
        let status: OrderStatus = serde_json::from_str("\"EXPIRED_IN_MATCH\"").unwrap();
        assert_eq!(status, OrderStatus::Unknown);
    }
}
