pub mod adapters;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod exchange;
pub mod services;
pub mod strategy;

pub use config::AppConfig;
pub use error::{Result, ScalpError};
pub use exchange::{Exchange, MarketFeed, PaperExchange};
pub use strategy::{StrategyKind, TradingEngine};
