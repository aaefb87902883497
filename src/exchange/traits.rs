use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::domain::{MarketData, Order, Position};
use crate::error::{Result, ScalpError};

/// Where OHLCV windows come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedKind {
    Bybit,
    Synthetic,
}

impl Default for FeedKind {
    fn default() -> Self {
        Self::Bybit
    }
}

impl FeedKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bybit => "bybit",
            Self::Synthetic => "synthetic",
        }
    }
}

impl std::fmt::Display for FeedKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FeedKind {
    type Err = &'static str;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "bybit" => Ok(Self::Bybit),
            "synthetic" | "sim" => Ok(Self::Synthetic),
            _ => Err("invalid feed; expected bybit|synthetic"),
        }
    }
}

pub fn parse_feed_kind(raw: &str) -> Result<FeedKind> {
    FeedKind::from_str(raw).map_err(|e| ScalpError::Validation(e.to_string()))
}

/// Exchange capability consumed by the engine.
///
/// Every call may fail; callers treat failures as transient for the current
/// symbol and tick.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Latest OHLCV window for `symbol`, oldest bar first
    async fn get_market_data(&self, symbol: &str) -> Result<MarketData>;

    /// Submit an order; on success the returned copy carries the exchange id
    async fn place_order(&self, order: Order) -> Result<Order>;

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<()>;

    /// Open positions with nonzero quantity
    async fn get_open_positions(&self, symbol: &str) -> Result<Vec<Position>>;

    /// Reduce-only market close of the whole position
    async fn close_position(&self, position: &Position) -> Result<()>;

    /// Wallet balance in USDT
    async fn get_account_balance(&self) -> Result<f64>;
}

/// Source of OHLCV windows
#[async_trait]
pub trait MarketFeed: Send + Sync {
    async fn fetch_ohlcv(&self, symbol: &str) -> Result<MarketData>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_feed_kind_accepts_aliases() {
        assert_eq!(parse_feed_kind("bybit").unwrap(), FeedKind::Bybit);
        assert_eq!(parse_feed_kind(" SIM ").unwrap(), FeedKind::Synthetic);
    }

    #[test]
    fn parse_feed_kind_rejects_unknown_value() {
        assert!(parse_feed_kind("binance").is_err());
    }
}
