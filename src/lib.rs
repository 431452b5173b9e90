pub mod config;
pub mod connectors;
pub mod core;
pub mod storage;
pub mod strategies;
pub mod telemetry;
pub mod types;
pub mod utils;
