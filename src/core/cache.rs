// src/core/cache.rs
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;

use crate::types::{Kline, MarketDataRecord};

/// Latest sample for one symbol plus a bounded window of recent prices.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketSnapshot {
    pub symbol: String,
    pub price: Decimal,
    pub volume: Decimal,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    /// Milliseconds since the epoch.
    pub timestamp: i64,
    pub recent_prices: VecDeque<Decimal>,
    /// Number of updates stored for this symbol.
    pub sequence: u64,
}

impl MarketSnapshot {
    /// Snapshot carrying only a price, OHLC collapsed onto it.
    pub fn from_price(symbol: &str, price: Decimal) -> Self {
        Self {
            symbol: symbol.to_string(),
            price,
            volume: Decimal::ZERO,
            open: price,
            high: price,
            low: price,
            close: price,
            timestamp: Utc::now().timestamp_millis(),
            recent_prices: VecDeque::from([price]),
            sequence: 0,
        }
    }

    pub fn to_record(&self) -> MarketDataRecord {
        MarketDataRecord {
            symbol: self.symbol.clone(),
            price: self.price,
            volume: self.volume,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            timestamp: self.timestamp,
        }
    }
}

/// Written by the market-data task, read by the decision task.
pub struct MarketSnapshotCache {
    window: usize,
    snapshots: RwLock<HashMap<String, MarketSnapshot>>,
}

impl MarketSnapshotCache {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            snapshots: RwLock::new(HashMap::new()),
        }
    }

    /// Stores a fresh sample. OHLC and volume come from `candle` when given.
    pub async fn update(&self, symbol: &str, price: Decimal, candle: Option<&Kline>) -> MarketSnapshot {
        let mut snapshots = self.snapshots.write().await;
        let entry = snapshots.entry(symbol.to_string()).or_insert_with(|| {
            let mut fresh = MarketSnapshot::from_price(symbol, price);
            fresh.recent_prices.clear();
            fresh
        });

        entry.price = price;
        match candle {
            Some(k) => {
                entry.open = k.open;
                entry.high = k.high;
                entry.low = k.low;
                entry.close = k.close;
                entry.volume = k.volume;
                entry.timestamp = k.close_time;
            }
            None => {
                entry.open = price;
                entry.high = price;
                entry.low = price;
                entry.close = price;
                entry.volume = Decimal::ZERO;
                entry.timestamp = Utc::now().timestamp_millis();
            }
        }

        entry.sequence += 1;
        entry.recent_prices.push_back(price);
        while entry.recent_prices.len() > self.window {
            entry.recent_prices.pop_front();
        }
        entry.clone()
    }

    pub async fn get(&self, symbol: &str) -> Option<MarketSnapshot> {
        self.snapshots.read().await.get(symbol).cloned()
    }

    pub async fn len(&self) -> usize {
        self.snapshots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.snapshots.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candle(close: Decimal) -> Kline {
        Kline {
            open_time: 0,
            open: dec!(1),
            high: dec!(3),
            low: dec!(0.5),
            close,
            volume: dec!(42),
            close_time: 59_999,
        }
    }

    #[tokio::test]
    async fn test_update_takes_ohlc_from_candle() {
        let cache = MarketSnapshotCache::new(10);
        let snap = cache.update("BTCUSDT", dec!(2), Some(&candle(dec!(2)))).await;
        assert_eq!(snap.high, dec!(3));
        assert_eq!(snap.volume, dec!(42));
        assert_eq!(snap.timestamp, 59_999);
        assert_eq!(snap.recent_prices, VecDeque::from([dec!(2)]));
        assert_eq!(cache.get("BTCUSDT").await, Some(snap));
        assert!(cache.get("ETHUSDT").await.is_none());
    }

    #[tokio::test]
    async fn test_recent_prices_are_capped_fifo() {
        let cache = MarketSnapshotCache::new(3);
        for i in 1..=5 {
            cache.update("BTCUSDT", Decimal::from(i), None).await;
        }
        let snap = cache.get("BTCUSDT").await.unwrap();
        assert_eq!(snap.recent_prices, VecDeque::from([dec!(3), dec!(4), dec!(5)]));
        assert_eq!(snap.price, dec!(5));
        assert_eq!(snap.sequence, 5);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_readers_during_writes() {
        let cache = std::sync::Arc::new(MarketSnapshotCache::new(50));
        let writer = {
            let cache = cache.clone();
            tokio::spawn(async move {
                for i in 1..=100 {
                    cache.update("BTCUSDT", Decimal::from(i), None).await;
                }
            })
        };
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move {
                    for _ in 0..100 {
                        if let Some(snap) = cache.get("BTCUSDT").await {
                            assert!(snap.recent_prices.len() <= 50);
                            assert_eq!(snap.recent_prices.back(), Some(&snap.price));
                        }
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        writer.await.unwrap();
        for r in readers {
            r.await.unwrap();
        }
        assert_eq!(cache.get("BTCUSDT").await.unwrap().price, dec!(100));
    }
}
