// src/storage/memory.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info};
use uuid::Uuid;

use super::{Repository, StoreError, StoreResult};
use crate::config::StorageConfig;
use crate::types::{AccountInfo, MarketDataRecord, Order, Position, PositionSide, PositionStatus, RiskMetric, Trade};

const MARKET_DATA_HISTORY: usize = 1_000;
const RISK_METRIC_HISTORY: usize = 2_016;
const ORDER_HISTORY: usize = 5_000;
const TRADE_HISTORY: usize = 5_000;
const CLOSED_POSITION_HISTORY: usize = 1_000;

/// State written to the snapshot file. Market data is kept in memory only.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreState {
    orders: BTreeMap<String, Order>,
    positions: BTreeMap<String, Position>,
    trades: VecDeque<Trade>,
    account: Option<AccountInfo>,
    risk_metrics: VecDeque<RiskMetric>,
    #[serde(skip)]
    market_data: HashMap<String, VecDeque<MarketDataRecord>>,
    /// Bumped on every change that is written to the snapshot.
    #[serde(skip)]
    generation: u64,
}

impl StoreState {
    /// Drops the oldest orders, trades and closed positions beyond their caps.
    fn prune(&mut self) {
        while self.trades.len() > TRADE_HISTORY {
            self.trades.pop_front();
        }

        if self.orders.len() > ORDER_HISTORY {
            let mut by_age: Vec<(DateTime<Utc>, String)> =
                self.orders.values().map(|o| (o.created_at, o.id.clone())).collect();
            by_age.sort();
            let excess = self.orders.len() - ORDER_HISTORY;
            for (_, id) in by_age.into_iter().take(excess) {
                self.orders.remove(&id);
            }
        }

        let mut closed: Vec<(Option<DateTime<Utc>>, String)> = self
            .positions
            .values()
            .filter(|p| !p.is_open())
            .map(|p| (p.close_time, p.id.clone()))
            .collect();
        if closed.len() > CLOSED_POSITION_HISTORY {
            closed.sort();
            let excess = closed.len() - CLOSED_POSITION_HISTORY;
            for (_, id) in closed.into_iter().take(excess) {
                self.positions.remove(&id);
            }
        }
    }
}

struct SnapshotFile {
    path: PathBuf,
    /// Generation of the snapshot currently on disk.
    written: Mutex<u64>,
}

/// Encoded state waiting to be written once the state lock is released.
struct PendingSnapshot {
    generation: u64,
    data: String,
}

/// In-process repository with an optional pretty-JSON snapshot file.
///
/// Snapshots are encoded under the state lock and written after it is
/// released, through a temporary file renamed over the previous snapshot.
/// Mark-price refreshes alone are not written.
pub struct MemoryStore {
    state: RwLock<StoreState>,
    snapshot: Option<SnapshotFile>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            snapshot: None,
        }
    }

    pub async fn open(config: &StorageConfig) -> StoreResult<Self> {
        match &config.snapshot_path {
            Some(path) => Self::with_snapshot(path).await,
            None => Ok(Self::new()),
        }
    }

    /// Restores state from `path` if the file exists; later mutations are
    /// written back to it. An unreadable snapshot is moved aside to
    /// `<path>.corrupt` and the store starts empty.
    pub async fn with_snapshot(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let state = match tokio::fs::read_to_string(&path).await {
            Ok(data) => match serde_json::from_str::<StoreState>(&data) {
                Ok(state) => {
                    info!(
                        path = %path.display(),
                        positions = state.positions.len(),
                        orders = state.orders.len(),
                        "Restored store snapshot"
                    );
                    state
                }
                Err(e) => {
                    let aside = sibling(&path, "corrupt");
                    tokio::fs::rename(&path, &aside).await?;
                    error!(
                        path = %path.display(),
                        moved_to = %aside.display(),
                        error = %e,
                        "Store snapshot unreadable, starting empty"
                    );
                    StoreState::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreState::default(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            state: RwLock::new(state),
            snapshot: Some(SnapshotFile {
                path,
                written: Mutex::new(0),
            }),
        })
    }

    /// Encodes `state` for writing; call while still holding the write lock.
    fn encode(&self, state: &mut StoreState) -> Option<PendingSnapshot> {
        self.snapshot.as_ref()?;
        state.generation += 1;
        match serde_json::to_string_pretty(&*state) {
            Ok(data) => Some(PendingSnapshot {
                generation: state.generation,
                data,
            }),
            Err(e) => {
                error!(error = %e, "Failed to encode store snapshot");
                None
            }
        }
    }

    /// Writes `pending` unless a newer snapshot already reached the disk.
    async fn flush(&self, pending: Option<PendingSnapshot>) {
        let (Some(file), Some(pending)) = (&self.snapshot, pending) else {
            return;
        };
        let mut written = file.written.lock().await;
        if pending.generation <= *written {
            return;
        }
        match write_atomic(&file.path, pending.data.as_bytes()).await {
            Ok(()) => *written = pending.generation,
            Err(e) => error!(path = %file.path.display(), error = %e, "Failed to write store snapshot"),
        }
    }
}

/// `path` with `.suffix` appended to its file name.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

async fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let tmp = sibling(path, "tmp");
    tokio::fs::write(&tmp, data).await?;
    tokio::fs::rename(&tmp, path).await
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

#[async_trait]
impl Repository for MemoryStore {
    async fn create_order(&self, mut order: Order) -> StoreResult<Order> {
        if order.id.is_empty() {
            order.id = new_id();
        }
        let pending = {
            let mut state = self.state.write().await;
            if state.orders.contains_key(&order.id) {
                return Err(StoreError::Conflict(format!("order {} already exists", order.id)));
            }
            state.orders.insert(order.id.clone(), order.clone());
            state.prune();
            self.encode(&mut state)
        };
        self.flush(pending).await;
        Ok(order)
    }

    async fn update_order(&self, order: &Order) -> StoreResult<()> {
        let pending = {
            let mut state = self.state.write().await;
            let slot = state
                .orders
                .get_mut(&order.id)
                .ok_or_else(|| StoreError::not_found("order", &order.id))?;
            *slot = order.clone();
            slot.updated_at = Utc::now();
            self.encode(&mut state)
        };
        self.flush(pending).await;
        Ok(())
    }

    async fn get_order(&self, id: &str) -> StoreResult<Order> {
        self.state
            .read()
            .await
            .orders
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("order", id))
    }

    async fn get_order_by_exchange_id(&self, exchange_order_id: &str) -> StoreResult<Order> {
        self.state
            .read()
            .await
            .orders
            .values()
            .find(|o| o.exchange_order_id == exchange_order_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("order", exchange_order_id))
    }

    async fn create_position(&self, mut position: Position) -> StoreResult<Position> {
        if position.id.is_empty() {
            position.id = new_id();
        }
        let pending = {
            let mut state = self.state.write().await;
            if position.is_open()
                && state
                    .positions
                    .values()
                    .any(|p| p.is_open() && p.symbol == position.symbol && p.side == position.side)
            {
                return Err(StoreError::Conflict(format!(
                    "open {} position already exists for {}",
                    position.side.as_str(),
                    position.symbol
                )));
            }
            state.positions.insert(position.id.clone(), position.clone());
            self.encode(&mut state)
        };
        self.flush(pending).await;
        Ok(position)
    }

    async fn update_position(&self, position: &Position) -> StoreResult<()> {
        let pending = {
            let mut state = self.state.write().await;
            let slot = state
                .positions
                .get_mut(&position.id)
                .ok_or_else(|| StoreError::not_found("position", &position.id))?;
            let mut repriced = slot.clone();
            repriced.mark_price = position.mark_price;
            let mark_only = repriced == *position;
            *slot = position.clone();
            if mark_only {
                None
            } else {
                self.encode(&mut state)
            }
        };
        self.flush(pending).await;
        Ok(())
    }

    async fn get_position(&self, id: &str) -> StoreResult<Position> {
        self.state
            .read()
            .await
            .positions
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("position", id))
    }

    async fn get_open_position(&self, symbol: &str, side: PositionSide) -> StoreResult<Position> {
        self.state
            .read()
            .await
            .positions
            .values()
            .find(|p| p.is_open() && p.symbol == symbol && p.side == side)
            .cloned()
            .ok_or_else(|| StoreError::not_found("open position", format!("{}/{}", symbol, side.as_str())))
    }

    async fn list_open_positions(&self) -> StoreResult<Vec<Position>> {
        let state = self.state.read().await;
        let mut open: Vec<Position> = state.positions.values().filter(|p| p.is_open()).cloned().collect();
        open.sort_by_key(|p| p.open_time);
        Ok(open)
    }

    async fn close_position(&self, id: &str, close_price: Decimal, realized_pnl: Decimal) -> StoreResult<Position> {
        let (closed, pending) = {
            let mut state = self.state.write().await;
            let position = state
                .positions
                .get_mut(id)
                .ok_or_else(|| StoreError::not_found("position", id))?;
            if !position.is_open() {
                return Err(StoreError::Conflict(format!("position {} is already closed", id)));
            }
            position.status = PositionStatus::Closed;
            position.close_time = Some(Utc::now());
            position.close_price = Some(close_price);
            position.mark_price = close_price;
            position.closed_pnl = realized_pnl;
            let closed = position.clone();
            state.prune();
            (closed, self.encode(&mut state))
        };
        self.flush(pending).await;
        Ok(closed)
    }

    async fn create_trade(&self, mut trade: Trade) -> StoreResult<Trade> {
        if trade.id.is_empty() {
            trade.id = new_id();
        }
        let pending = {
            let mut state = self.state.write().await;
            state.trades.push_back(trade.clone());
            state.prune();
            self.encode(&mut state)
        };
        self.flush(pending).await;
        Ok(trade)
    }

    async fn list_trades(&self, symbol: Option<&str>) -> StoreResult<Vec<Trade>> {
        let state = self.state.read().await;
        Ok(state
            .trades
            .iter()
            .filter(|t| symbol.map_or(true, |s| t.symbol == s))
            .cloned()
            .collect())
    }

    async fn save_account(&self, account: &AccountInfo) -> StoreResult<()> {
        let pending = {
            let mut state = self.state.write().await;
            state.account = Some(account.clone());
            self.encode(&mut state)
        };
        self.flush(pending).await;
        Ok(())
    }

    async fn latest_account(&self) -> StoreResult<AccountInfo> {
        self.state
            .read()
            .await
            .account
            .clone()
            .ok_or_else(|| StoreError::not_found("account", "latest"))
    }

    async fn save_market_data(&self, record: MarketDataRecord) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let history = state.market_data.entry(record.symbol.clone()).or_default();
        if history.len() >= MARKET_DATA_HISTORY {
            history.pop_front();
        }
        history.push_back(record);
        Ok(())
    }

    async fn latest_market_data(&self, symbol: &str) -> StoreResult<MarketDataRecord> {
        self.state
            .read()
            .await
            .market_data
            .get(symbol)
            .and_then(|h| h.back())
            .cloned()
            .ok_or_else(|| StoreError::not_found("market data", symbol))
    }

    async fn save_risk_metric(&self, metric: RiskMetric) -> StoreResult<()> {
        let pending = {
            let mut state = self.state.write().await;
            if state.risk_metrics.len() >= RISK_METRIC_HISTORY {
                state.risk_metrics.pop_front();
            }
            state.risk_metrics.push_back(metric);
            self.encode(&mut state)
        };
        self.flush(pending).await;
        Ok(())
    }

    async fn latest_risk_metric(&self) -> StoreResult<RiskMetric> {
        self.state
            .read()
            .await
            .risk_metrics
            .back()
            .cloned()
            .ok_or_else(|| StoreError::not_found("risk metric", "latest"))
    }
}
