// src/main.rs
use dotenvy::dotenv;
use std::sync::Arc;
use tracing::{error, info, warn};

use perp_pilot::config::AppConfig;
use perp_pilot::connectors::BinanceFuturesClient;
use perp_pilot::core::TradingEngine;
use perp_pilot::storage::MemoryStore;
use perp_pilot::telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = AppConfig::new()?;
    let _log_guard = telemetry::init(&config.logger)?;

    info!(
        exchange = %config.exchange.name,
        testnet = config.exchange.testnet,
        symbols = ?config.trading.symbols,
        strategy = %config.trading.strategy.kind,
        "perp_pilot starting"
    );
    if config.trading.enable_paper_trading {
        info!("Mode: PAPER TRADING");
    } else {
        warn!("Mode: LIVE TRADING");
    }

    let client = Arc::new(BinanceFuturesClient::new(&config.exchange)?);
    let store = Arc::new(MemoryStore::open(&config.storage).await?);
    let engine = TradingEngine::from_config(&config, client, store)?;

    engine.start().await?;

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutdown signal received");

    engine.stop().await?;
    Ok(())
}
