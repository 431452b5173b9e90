// src/core/engine.rs
use chrono::{Local, NaiveDate, Utc};
use futures::future::join_all;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::cache::{MarketSnapshot, MarketSnapshotCache};
use super::error::EngineError;
use super::risk::{OrderInfo, PortfolioPosition, PortfolioRisk, RiskCheckResult, RiskLimits, RiskManager};
use super::scheduler::spawn_periodic;
use crate::config::{AppConfig, TradingConfig};
use crate::connectors::ExchangeClient;
use crate::storage::Repository;
use crate::strategies::{build_strategy, Strategy};
use crate::types::{
    Action, MarginType, Order, OrderRequest, OrderResponse, Position, PositionSide, RiskMetric, Side, Signal, Trade,
};
use crate::utils::precision::normalize_quantity;

pub const RISK_METRICS_INTERVAL: Duration = Duration::from_secs(300);
pub const ACCOUNT_INTERVAL: Duration = Duration::from_secs(60);

/// Runtime knobs the engine reads on every tick.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub symbols: Vec<String>,
    pub trading_interval: Duration,
    pub risk_metrics_interval: Duration,
    pub account_interval: Duration,
    pub kline_interval: String,
    pub kline_limit: u16,
    pub quantity_step_size: Decimal,
    pub leverage: u32,
    pub margin_type: MarginType,
    pub paper_trading: bool,
}

impl EngineSettings {
    pub fn from_config(trading: &TradingConfig) -> Self {
        Self {
            symbols: trading.symbols.clone(),
            trading_interval: trading.interval(),
            risk_metrics_interval: RISK_METRICS_INTERVAL,
            account_interval: ACCOUNT_INTERVAL,
            kline_interval: trading.kline_interval.clone(),
            kline_limit: trading.kline_limit,
            quantity_step_size: trading.quantity_step_size,
            leverage: trading.max_leverage,
            margin_type: trading.margin_type,
            paper_trading: trading.enable_paper_trading,
        }
    }
}

/// Fill counters behind the persisted risk metric. `total_trades` counts
/// entries, wins and losses are counted when a position is closed.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeStats {
    pub total_trades: u64,
    pub winning_trades: u64,
    pub losing_trades: u64,
    pub daily_pnl: Decimal,
    pub pnl_date: NaiveDate,
}

impl TradeStats {
    fn new() -> Self {
        Self {
            total_trades: 0,
            winning_trades: 0,
            losing_trades: 0,
            daily_pnl: Decimal::ZERO,
            pnl_date: Local::now().date_naive(),
        }
    }

    fn record_close(&mut self, pnl: Decimal) {
        let today = Local::now().date_naive();
        if today > self.pnl_date {
            self.daily_pnl = Decimal::ZERO;
            self.pnl_date = today;
        }
        self.daily_pnl += pnl;
        if pnl > Decimal::ZERO {
            self.winning_trades += 1;
        } else {
            self.losing_trades += 1;
        }
    }

    pub fn win_rate(&self) -> f64 {
        if self.total_trades == 0 {
            return 0.0;
        }
        self.winning_trades as f64 / self.total_trades as f64 * 100.0
    }
}

#[derive(Default)]
struct Lifecycle {
    running: bool,
    shutdown: Option<watch::Sender<bool>>,
    tasks: Vec<JoinHandle<()>>,
}

/// State shared by the periodic tasks.
struct EngineShared {
    settings: EngineSettings,
    exchange: Arc<dyn ExchangeClient>,
    store: Arc<dyn Repository>,
    cache: MarketSnapshotCache,
    strategy: Mutex<Box<dyn Strategy>>,
    strategy_name: String,
    risk: RiskManager,
    stats: Mutex<TradeStats>,
    /// Snapshot sequence last handed to the strategy, per symbol.
    evaluated: Mutex<HashMap<String, u64>>,
}

pub struct TradingEngine {
    inner: Arc<EngineShared>,
    lifecycle: AsyncMutex<Lifecycle>,
}

impl TradingEngine {
    pub fn new(
        settings: EngineSettings,
        exchange: Arc<dyn ExchangeClient>,
        store: Arc<dyn Repository>,
        strategy: Box<dyn Strategy>,
        risk: RiskManager,
    ) -> Self {
        let strategy_name = strategy.name();
        let cache = MarketSnapshotCache::new(usize::from(settings.kline_limit));
        Self {
            inner: Arc::new(EngineShared {
                settings,
                exchange,
                store,
                cache,
                strategy: Mutex::new(strategy),
                strategy_name,
                risk,
                stats: Mutex::new(TradeStats::new()),
                evaluated: Mutex::new(HashMap::new()),
            }),
            lifecycle: AsyncMutex::new(Lifecycle::default()),
        }
    }

    /// Builds the configured strategy and risk limits. Strategy parameter
    /// errors are fatal here.
    pub fn from_config(
        config: &AppConfig,
        exchange: Arc<dyn ExchangeClient>,
        store: Arc<dyn Repository>,
    ) -> Result<Self, EngineError> {
        let strategy = build_strategy(&config.trading.strategy)?;
        let risk = RiskManager::new(RiskLimits::from_config(&config.trading, &config.risk));
        Ok(Self::new(
            EngineSettings::from_config(&config.trading),
            exchange,
            store,
            strategy,
            risk,
        ))
    }

    pub async fn start(&self) -> Result<(), EngineError> {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.running {
            return Err(EngineError::AlreadyRunning);
        }

        let settings = &self.inner.settings;
        info!(
            strategy = %self.inner.strategy_name,
            symbols = ?settings.symbols,
            paper_trading = settings.paper_trading,
            "Starting trading engine"
        );
        self.inner.initialize_symbols().await;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let market = self.inner.clone();
        let decisions = self.inner.clone();
        let metrics = self.inner.clone();
        let account = self.inner.clone();

        lifecycle.tasks = vec![
            spawn_periodic("market-data", settings.trading_interval, shutdown_rx.clone(), move || {
                let shared = market.clone();
                async move { shared.collect_market_data().await }
            }),
            spawn_periodic("decisions", settings.trading_interval, shutdown_rx.clone(), move || {
                let shared = decisions.clone();
                async move { shared.process_signals().await }
            }),
            spawn_periodic("risk-metrics", settings.risk_metrics_interval, shutdown_rx.clone(), move || {
                let shared = metrics.clone();
                async move {
                    if let Err(e) = shared.update_risk_metrics().await {
                        error!(error = %e, "Failed to update risk metrics");
                    }
                }
            }),
            spawn_periodic("account", settings.account_interval, shutdown_rx, move || {
                let shared = account.clone();
                async move {
                    if let Err(e) = shared.update_account().await {
                        error!(error = %e, "Failed to update account info");
                    }
                }
            }),
        ];
        lifecycle.shutdown = Some(shutdown_tx);
        lifecycle.running = true;

        info!("Trading engine started");
        Ok(())
    }

    /// Signals every task, waits for in-flight iterations, then liquidates
    /// open positions. Stopping an idle engine is a no-op.
    pub async fn stop(&self) -> Result<(), EngineError> {
        let mut lifecycle = self.lifecycle.lock().await;
        if !lifecycle.running {
            return Ok(());
        }
        info!("Stopping trading engine");

        if let Some(shutdown) = lifecycle.shutdown.take() {
            let _ = shutdown.send(true);
        }
        let tasks = std::mem::take(&mut lifecycle.tasks);
        for result in join_all(tasks).await {
            if let Err(e) = result {
                error!(error = %e, "Periodic task ended abnormally");
            }
        }

        self.inner.close_all_positions().await;
        lifecycle.running = false;

        info!("Trading engine stopped");
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.lifecycle.lock().await.running
    }

    pub fn risk(&self) -> &RiskManager {
        &self.inner.risk
    }

    pub fn cache(&self) -> &MarketSnapshotCache {
        &self.inner.cache
    }

    pub fn strategy_name(&self) -> &str {
        &self.inner.strategy_name
    }

    pub fn stats(&self) -> TradeStats {
        self.inner.stats().clone()
    }

    /// Blocks every further entry until the next daily reset.
    pub fn emergency_stop(&self, reason: &str) {
        self.inner.risk.emergency_stop(reason);
    }

    // One iteration of each periodic task, callable directly.

    pub async fn collect_market_data(&self) {
        self.inner.collect_market_data().await
    }

    pub async fn process_signals(&self) {
        self.inner.process_signals().await
    }

    pub async fn update_risk_metrics(&self) -> Result<RiskMetric, EngineError> {
        self.inner.update_risk_metrics().await
    }

    pub async fn update_account(&self) -> Result<(), EngineError> {
        self.inner.update_account().await
    }

    pub async fn portfolio_risk(&self) -> Result<PortfolioRisk, EngineError> {
        self.inner.portfolio_risk().await
    }
}

impl EngineShared {
    fn strategy(&self) -> MutexGuard<'_, Box<dyn Strategy>> {
        self.strategy.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stats(&self) -> MutexGuard<'_, TradeStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claims `sequence` for evaluation; false if it was already evaluated.
    fn claim_snapshot(&self, symbol: &str, sequence: u64) -> bool {
        let mut evaluated = self.evaluated.lock().unwrap_or_else(PoisonError::into_inner);
        let last = evaluated.entry(symbol.to_string()).or_insert(0);
        if sequence <= *last {
            return false;
        }
        *last = sequence;
        true
    }

    async fn initialize_symbols(&self) {
        let settings = &self.settings;
        for symbol in &settings.symbols {
            if let Err(e) = self.exchange.set_leverage(symbol, settings.leverage).await {
                warn!(symbol = %symbol, error = %e, "Failed to set leverage");
            }
            if let Err(e) = self.exchange.set_margin_type(symbol, settings.margin_type).await {
                warn!(symbol = %symbol, error = %e, "Failed to set margin type");
            }
            info!(
                symbol = %symbol,
                leverage = settings.leverage,
                margin_type = settings.margin_type.as_str(),
                "Symbol initialized"
            );
        }
    }

    // --- market data ---

    async fn collect_market_data(&self) {
        for symbol in &self.settings.symbols {
            if let Err(e) = self.update_market_data(symbol).await {
                error!(symbol = %symbol, error = %e, "Failed to update market data");
            }
        }
    }

    async fn update_market_data(&self, symbol: &str) -> Result<(), EngineError> {
        let price = self.exchange.get_price(symbol).await?;
        let klines = self
            .exchange
            .get_klines(symbol, &self.settings.kline_interval, self.settings.kline_limit)
            .await?;

        let snapshot = self.cache.update(symbol, price, klines.last()).await;
        debug!(symbol, price = %snapshot.price, "Market data updated");
        self.store.save_market_data(snapshot.to_record()).await?;
        Ok(())
    }

    // --- decisions ---

    async fn process_signals(&self) {
        for symbol in &self.settings.symbols {
            if let Err(e) = self.process_symbol(symbol).await {
                error!(symbol = %symbol, error = %e, "Failed to process symbol");
            }
        }
    }

    async fn process_symbol(&self, symbol: &str) -> Result<(), EngineError> {
        let Some(snapshot) = self.cache.get(symbol).await else {
            debug!(symbol, "No market data yet");
            return Ok(());
        };
        if !self.claim_snapshot(symbol, snapshot.sequence) {
            debug!(symbol, "No fresh market data since last decision");
            return Ok(());
        }

        match self.store.get_open_position(symbol, PositionSide::Long).await {
            Ok(position) => self.evaluate_exit(symbol, &snapshot, position).await,
            Err(e) if e.is_not_found() => self.evaluate_entry(symbol, &snapshot).await,
            Err(e) => Err(e.into()),
        }
    }

    async fn evaluate_exit(
        &self,
        symbol: &str,
        snapshot: &MarketSnapshot,
        mut position: Position,
    ) -> Result<(), EngineError> {
        if position.mark_price != snapshot.price {
            position.mark_price = snapshot.price;
            if !self.settings.paper_trading {
                if let Err(e) = self.store.update_position(&position).await {
                    error!(symbol, error = %e, "Failed to refresh position mark price");
                }
            }
        }

        let mut signal = self.strategy().should_sell(symbol, snapshot, &position);
        if signal.action != Action::Sell {
            if let Some(reason) = self.risk.should_close_position(&PortfolioPosition::from(&position)) {
                signal = Signal::sell(position.size, snapshot.price, 1.0, reason.to_string());
            }
        }

        if signal.action != Action::Sell {
            debug!(symbol, reason = %signal.reason, "Holding position");
            return Ok(());
        }
        if position.size <= Decimal::ZERO {
            warn!(symbol, "Open position has no size, skipping sell");
            return Ok(());
        }

        if self.settings.paper_trading {
            info!(
                symbol,
                quantity = %position.size,
                price = %signal.price,
                reason = %signal.reason,
                "Paper trading: would SELL"
            );
            return Ok(());
        }
        self.execute_sell(symbol, &signal, &position).await
    }

    async fn evaluate_entry(&self, symbol: &str, snapshot: &MarketSnapshot) -> Result<(), EngineError> {
        let mut signal = self.strategy().should_buy(symbol, snapshot);
        if signal.action != Action::Buy {
            debug!(symbol, reason = %signal.reason, "No entry");
            return Ok(());
        }

        if signal.stop_loss.is_none() {
            signal.stop_loss = Some(self.risk.stop_loss_price(signal.price, PositionSide::Long));
        }
        if signal.take_profit.is_none() {
            signal.take_profit = Some(self.risk.take_profit_price(signal.price, PositionSide::Long));
        }

        let quantity = normalize_quantity(signal.quantity, self.settings.quantity_step_size);
        if quantity.is_zero() {
            warn!(symbol, raw_quantity = %signal.quantity, "Quantity is zero after normalization");
            return Ok(());
        }

        let order = OrderInfo {
            symbol: symbol.to_string(),
            side: Side::Buy,
            quantity,
            price: signal.price,
        };
        if let RiskCheckResult::Rejected(reason) = self.risk.validate_order(&order) {
            warn!(symbol, %reason, "Order rejected by risk manager");
            return Ok(());
        }

        if self.settings.paper_trading {
            info!(
                symbol,
                %quantity,
                price = %signal.price,
                confidence = signal.confidence,
                reason = %signal.reason,
                "Paper trading: would BUY"
            );
            return Ok(());
        }
        self.execute_buy(symbol, &signal, quantity).await
    }

    async fn execute_buy(&self, symbol: &str, signal: &Signal, quantity: Decimal) -> Result<(), EngineError> {
        let request = OrderRequest::market(symbol, Side::Buy, quantity)
            .with_client_order_id(format!("buy_{}_{}", symbol, Utc::now().timestamp()));

        info!(
            symbol,
            %quantity,
            price = %signal.price,
            stop_loss = ?signal.stop_loss,
            take_profit = ?signal.take_profit,
            reason = %signal.reason,
            "Executing BUY order"
        );
        let response = self.exchange.place_order(&request).await?;
        self.record_order(&response, &signal.reason).await;
        self.stats().total_trades += 1;

        if !response.has_fill() {
            warn!(symbol, status = ?response.status, "Buy order not filled");
            return Ok(());
        }
        if !response.status.is_filled() {
            warn!(
                symbol,
                status = ?response.status,
                executed = %response.executed_qty,
                requested = %quantity,
                "Buy order partially filled"
            );
        }

        let fill_price = fill_price(&response, signal.price);
        let position = Position::open(
            symbol,
            response.executed_qty,
            fill_price,
            self.settings.leverage,
            &self.strategy_name,
        );
        match self.store.create_position(position).await {
            Ok(position) => self.strategy().update_position(symbol, Some(&position)),
            Err(e) => error!(symbol, error = %e, "Failed to create position"),
        }

        self.record_trade(&response, fill_price, Decimal::ZERO, PositionSide::Long).await;
        self.risk.record_trade();
        self.refresh_exposure().await;

        info!(symbol, quantity = %response.executed_qty, price = %fill_price, "Buy order filled");
        Ok(())
    }

    async fn execute_sell(&self, symbol: &str, signal: &Signal, position: &Position) -> Result<(), EngineError> {
        let request = OrderRequest::market(symbol, Side::Sell, position.size)
            .reduce_only()
            .with_client_order_id(format!("sell_{}_{}", symbol, Utc::now().timestamp()));

        info!(
            symbol,
            quantity = %position.size,
            price = %signal.price,
            reason = %signal.reason,
            "Executing SELL order"
        );
        let response = self.exchange.place_order(&request).await?;
        self.record_order(&response, &signal.reason).await;

        if !response.has_fill() {
            warn!(symbol, status = ?response.status, "Sell order not filled");
            return Ok(());
        }
        let pnl = self.settle_sell(position, &response, signal.price).await;
        info!(symbol, pnl = %pnl, "Sell order settled");
        Ok(())
    }

    /// Books the executed part of a reduce-only sell. A full fill closes the
    /// stored position; a partial one shrinks it and keeps it open. Writes
    /// the trade and feeds the counters. Returns the PnL of this fill.
    async fn settle_sell(&self, position: &Position, response: &OrderResponse, reference_price: Decimal) -> Decimal {
        let fill_price = fill_price(response, reference_price);
        let executed = response.executed_qty.min(position.size);
        let pnl = (fill_price - position.entry_price) * executed;
        let remaining = position.size - executed;

        if remaining > Decimal::ZERO {
            let mut reduced = position.clone();
            reduced.size = remaining;
            reduced.mark_price = fill_price;
            reduced.closed_pnl += pnl;
            if let Err(e) = self.store.update_position(&reduced).await {
                error!(symbol = %position.symbol, error = %e, "Failed to reduce position in store");
            }
            self.strategy().update_position(&position.symbol, Some(&reduced));
            warn!(symbol = %position.symbol, %executed, %remaining, "Position partially closed");
        } else {
            let total = position.closed_pnl + pnl;
            if let Err(e) = self.store.close_position(&position.id, fill_price, total).await {
                error!(symbol = %position.symbol, error = %e, "Failed to close position in store");
            }
            self.strategy().update_position(&position.symbol, None);
            self.stats().record_close(total);
        }
        self.record_trade(response, fill_price, pnl, position.side).await;

        self.risk.record_trade();
        if pnl < Decimal::ZERO {
            self.risk.record_loss(-pnl);
        }
        self.refresh_exposure().await;
        pnl
    }

    async fn record_order(&self, response: &OrderResponse, reason: &str) {
        let order = Order::from_response(response, &self.strategy_name, reason);
        if let Err(e) = self.store.create_order(order).await {
            error!(symbol = %response.symbol, error = %e, "Failed to save order");
        }
    }

    async fn record_trade(&self, response: &OrderResponse, price: Decimal, pnl: Decimal, side: PositionSide) {
        let trade = Trade {
            id: String::new(),
            order_id: response.order_id.to_string(),
            symbol: response.symbol.clone(),
            side: response.side,
            quantity: response.executed_qty,
            price,
            quote_qty: response.cum_quote,
            realized_pnl: pnl,
            position_side: side,
            strategy: self.strategy_name.clone(),
            trade_time: Utc::now(),
        };
        if let Err(e) = self.store.create_trade(trade).await {
            error!(symbol = %response.symbol, error = %e, "Failed to save trade");
        }
    }

    async fn refresh_exposure(&self) {
        match self.store.list_open_positions().await {
            Ok(positions) => {
                let exposure: Decimal = positions.iter().map(Position::notional).sum();
                self.risk.update_exposure(exposure);
            }
            Err(e) => error!(error = %e, "Failed to refresh exposure"),
        }
    }

    // --- shutdown ---

    async fn close_all_positions(&self) {
        let positions = match self.store.list_open_positions().await {
            Ok(positions) => positions,
            Err(e) => {
                error!(error = %e, "Failed to load open positions");
                return;
            }
        };
        if positions.is_empty() {
            return;
        }
        if self.settings.paper_trading {
            info!(count = positions.len(), "Paper trading: leaving open positions untouched");
            return;
        }

        info!(count = positions.len(), "Closing all open positions");
        for position in positions {
            let symbol = position.symbol.clone();
            let request = OrderRequest::market(&symbol, Side::Sell, position.size)
                .reduce_only()
                .with_client_order_id(format!("close_{}_{}", symbol, Utc::now().timestamp()));

            let response = match self.exchange.place_order(&request).await {
                Ok(response) => response,
                Err(e) => {
                    error!(symbol = %symbol, error = %e, "Failed to close position");
                    continue;
                }
            };
            self.record_order(&response, "engine shutdown").await;
            if response.has_fill() {
                let pnl = self.settle_sell(&position, &response, position.mark_price).await;
                info!(symbol = %symbol, pnl = %pnl, "Position settled on shutdown");
            } else {
                warn!(symbol = %symbol, status = ?response.status, "Shutdown close not filled");
            }
        }
    }

    // --- reporting ---

    async fn update_risk_metrics(&self) -> Result<RiskMetric, EngineError> {
        let stats = self.stats().clone();
        let risk = self.risk.metrics();

        let metric = RiskMetric {
            date: Utc::now(),
            daily_pnl: stats.daily_pnl,
            total_trades: stats.total_trades,
            winning_trades: stats.winning_trades,
            losing_trades: stats.losing_trades,
            win_rate: stats.win_rate(),
            total_exposure: risk.total_exposure,
            daily_loss: risk.daily_loss,
        };
        self.store.save_risk_metric(metric.clone()).await?;

        let portfolio = self.portfolio_risk().await?;
        if !portfolio.is_valid {
            let violations: Vec<String> = portfolio.violations.iter().map(ToString::to_string).collect();
            warn!(
                ?violations,
                exposure = %portfolio.total_exposure,
                var_95 = %portfolio.var_95,
                "Portfolio risk limits breached"
            );
        }

        info!(
            total_trades = metric.total_trades,
            win_rate = metric.win_rate,
            daily_pnl = %metric.daily_pnl,
            exposure = %metric.total_exposure,
            trading_allowed = risk.trading_allowed,
            "Risk metrics updated"
        );
        Ok(metric)
    }

    async fn portfolio_risk(&self) -> Result<PortfolioRisk, EngineError> {
        let positions: Vec<PortfolioPosition> = self
            .store
            .list_open_positions()
            .await?
            .iter()
            .map(PortfolioPosition::from)
            .collect();
        Ok(self.risk.validate_portfolio(&positions))
    }

    async fn update_account(&self) -> Result<(), EngineError> {
        let account = self.exchange.get_account().await?;
        self.store.save_account(&account).await?;
        debug!(
            balance = %account.total_wallet_balance,
            available = %account.available_balance,
            "Account info updated"
        );
        Ok(())
    }
}

/// Average fill price when the venue reports one, otherwise `fallback`.
fn fill_price(response: &OrderResponse, fallback: Decimal) -> Decimal {
    if response.avg_price > Decimal::ZERO {
        response.avg_price
    } else {
        fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_win_rate_over_entries() {
        let mut stats = TradeStats::new();
        assert_eq!(stats.win_rate(), 0.0);

        stats.total_trades = 4;
        stats.record_close(dec!(10));
        stats.record_close(dec!(-5));
        stats.record_close(dec!(0));
        assert_eq!(stats.winning_trades, 1);
        assert_eq!(stats.losing_trades, 2);
        assert_eq!(stats.daily_pnl, dec!(5));
        assert_eq!(stats.win_rate(), 25.0);
    }

    #[test]
    fn test_stale_daily_pnl_resets_on_new_day() {
        let mut stats = TradeStats::new();
        stats.daily_pnl = dec!(100);
        stats.pnl_date = stats.pnl_date.pred_opt().unwrap();
        stats.record_close(dec!(7));
        assert_eq!(stats.daily_pnl, dec!(7));
    }
}
