// src/connectors/binance.rs
use crate::config::ExchangeConfig;
use crate::connectors::messages::{ApiErrorBody, FuturesAccount, FuturesOrder, PriceTicker, RawKline};
use crate::connectors::traits::{ExchangeClient, ExchangeError, ExchangeResult};
use crate::types::{AccountInfo, Kline, MarginType, OrderRequest, OrderResponse};
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, Response};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use sha2::Sha256;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

type HmacSha256 = Hmac<Sha256>;

const MAINNET_URL: &str = "https://fapi.binance.com";
const TESTNET_URL: &str = "https://testnet.binancefuture.com";
const RECV_WINDOW_MS: &str = "5000";
/// -4046: "No need to change margin type."
const MARGIN_TYPE_UNCHANGED: i64 = -4046;

/// Binance USDⓈ-M futures REST client.
pub struct BinanceFuturesClient {
    api_key: String,
    secret_key: String,
    http_client: Client,
    base_rest_url: String,
}

impl BinanceFuturesClient {
    pub fn new(config: &ExchangeConfig) -> ExchangeResult<Self> {
        let base_rest_url = if !config.base_url.is_empty() {
            config.base_url.trim_end_matches('/').to_string()
        } else if config.testnet {
            TESTNET_URL.to_string()
        } else {
            MAINNET_URL.to_string()
        };

        let http_client = Client::builder().timeout(Duration::from_secs(10)).build()?;

        info!(base_url = %base_rest_url, "Binance futures client configured");
        Ok(Self {
            api_key: config.api_key.clone(),
            secret_key: config.secret_key.clone(),
            http_client,
            base_rest_url,
        })
    }

    fn sign_and_build_query(&self, params: Vec<(&str, String)>) -> ExchangeResult<String> {
        let mut params = params;
        params.push(("recvWindow", RECV_WINDOW_MS.to_string()));
        params.push(("timestamp", Utc::now().timestamp_millis().to_string()));

        let query_string =
            serde_urlencoded::to_string(&params).map_err(|e| ExchangeError::Signing(e.to_string()))?;

        let mut mac = HmacSha256::new_from_slice(self.secret_key.as_bytes())
            .map_err(|e| ExchangeError::Signing(e.to_string()))?;
        mac.update(query_string.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        Ok(format!("{}&signature={}", query_string, signature))
    }

    async fn send_signed_request<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        params: Vec<(&str, String)>,
    ) -> ExchangeResult<T> {
        let full_query = self.sign_and_build_query(params)?;
        let url = format!("{}{}?{}", self.base_rest_url, endpoint, full_query);

        let response = self
            .http_client
            .request(method, &url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await?;

        Self::decode(response).await
    }

    async fn send_public_request<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> ExchangeResult<T> {
        let url = format!("{}{}", self.base_rest_url, endpoint);
        let response = self.http_client.get(&url).query(params).send().await?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> ExchangeResult<T> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(match serde_json::from_str::<ApiErrorBody>(&body) {
                Ok(err) => ExchangeError::Api {
                    code: err.code,
                    message: err.msg,
                },
                Err(_) => ExchangeError::Api {
                    code: i64::from(status.as_u16()),
                    message: body,
                },
            });
        }

        serde_json::from_str(&body).map_err(|e| ExchangeError::Parse(e.to_string()))
    }
}

fn decimal_at(raw: &RawKline, idx: usize) -> ExchangeResult<Decimal> {
    let value = raw
        .get(idx)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ExchangeError::Parse(format!("kline field {} missing", idx)))?;
    Decimal::from_str(value).map_err(|e| ExchangeError::Parse(e.to_string()))
}

fn millis_at(raw: &RawKline, idx: usize) -> ExchangeResult<i64> {
    raw.get(idx)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| ExchangeError::Parse(format!("kline field {} missing", idx)))
}

pub(crate) fn parse_kline(raw: &RawKline) -> ExchangeResult<Kline> {
    Ok(Kline {
        open_time: millis_at(raw, 0)?,
        open: decimal_at(raw, 1)?,
        high: decimal_at(raw, 2)?,
        low: decimal_at(raw, 3)?,
        close: decimal_at(raw, 4)?,
        volume: decimal_at(raw, 5)?,
        close_time: millis_at(raw, 6)?,
    })
}

fn order_params(request: &OrderRequest) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("symbol", request.symbol.clone()),
        ("side", request.side.as_str().to_string()),
        ("type", request.order_type.as_str().to_string()),
        ("positionSide", request.position_side.as_str().to_string()),
        ("newOrderRespType", "RESULT".to_string()),
    ];

    // closePosition orders must not carry a quantity.
    if !request.close_position {
        params.push(("quantity", request.quantity.normalize().to_string()));
    }
    if let Some(p) = request.price {
        params.push(("price", p.normalize().to_string()));
    }
    if let Some(sp) = request.stop_price {
        params.push(("stopPrice", sp.normalize().to_string()));
    }
    if let Some(tif) = request.time_in_force {
        params.push(("timeInForce", tif.as_str().to_string()));
    }
    if request.reduce_only {
        params.push(("reduceOnly", "true".to_string()));
    }
    if request.close_position {
        params.push(("closePosition", "true".to_string()));
    }
    if let Some(id) = &request.client_order_id {
        params.push(("newClientOrderId", id.clone()));
    }
    params
}

#[async_trait]
impl ExchangeClient for BinanceFuturesClient {
    async fn get_price(&self, symbol: &str) -> ExchangeResult<Decimal> {
        let ticker: PriceTicker = self
            .send_public_request("/fapi/v1/ticker/price", &[("symbol", symbol.to_string())])
            .await?;
        debug!(symbol = %ticker.symbol, price = %ticker.price, "price fetched");
        Ok(ticker.price)
    }

    async fn get_klines(&self, symbol: &str, interval: &str, limit: u16) -> ExchangeResult<Vec<Kline>> {
        let raw: Vec<RawKline> = self
            .send_public_request(
                "/fapi/v1/klines",
                &[
                    ("symbol", symbol.to_string()),
                    ("interval", interval.to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;

        raw.iter().map(parse_kline).collect()
    }

    async fn place_order(&self, request: &OrderRequest) -> ExchangeResult<OrderResponse> {
        info!(
            symbol = %request.symbol,
            side = request.side.as_str(),
            order_type = request.order_type.as_str(),
            quantity = %request.quantity,
            reduce_only = request.reduce_only,
            "Sending order"
        );

        let order: FuturesOrder = self
            .send_signed_request(Method::POST, "/fapi/v1/order", order_params(request))
            .await?;

        Ok(order.into())
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> ExchangeResult<()> {
        let _: serde_json::Value = self
            .send_signed_request(
                Method::POST,
                "/fapi/v1/leverage",
                vec![("symbol", symbol.to_string()), ("leverage", leverage.to_string())],
            )
            .await?;
        info!(symbol, leverage, "Leverage set");
        Ok(())
    }

    async fn set_margin_type(&self, symbol: &str, margin_type: MarginType) -> ExchangeResult<()> {
        let result: ExchangeResult<serde_json::Value> = self
            .send_signed_request(
                Method::POST,
                "/fapi/v1/marginType",
                vec![
                    ("symbol", symbol.to_string()),
                    ("marginType", margin_type.as_str().to_string()),
                ],
            )
            .await;

        match result {
            Ok(_) => {}
            Err(ExchangeError::Api { code, .. }) if code == MARGIN_TYPE_UNCHANGED => {
                debug!(symbol, "Margin type already {}", margin_type.as_str());
            }
            Err(e) => return Err(e),
        }
        info!(symbol, margin_type = margin_type.as_str(), "Margin type set");
        Ok(())
    }

    async fn get_account(&self) -> ExchangeResult<AccountInfo> {
        let account: FuturesAccount = self
            .send_signed_request(Method::GET, "/fapi/v2/account", vec![])
            .await?;
        Ok(account.into())
    }
}
