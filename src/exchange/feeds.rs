//! OHLCV feeds for the paper exchange.
//!
//! - `BybitKlineFeed`: public v5 kline endpoint, no credentials needed
//! - `SyntheticFeed`: seeded random walk for offline runs
//! - `ScriptedFeed`: replays fixed windows (tests, demos)

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use reqwest::Client;
use serde::Deserialize;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

use super::MarketFeed;
use crate::domain::{Candle, MarketData};
use crate::error::{Result, ScalpError};

pub const DEFAULT_BYBIT_REST_URL: &str = "https://api.bybit.com";

// ============================================================================
// Bybit
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KlineEnvelope {
    ret_code: i64,
    ret_msg: String,
    result: Option<KlineResult>,
}

#[derive(Debug, Deserialize)]
struct KlineResult {
    #[serde(default)]
    list: Vec<Vec<String>>,
}

/// Public kline reader for Bybit v5
#[derive(Clone)]
pub struct BybitKlineFeed {
    http: Client,
    base_url: String,
    category: String,
    interval: String,
    limit: usize,
}

impl BybitKlineFeed {
    pub fn new(
        base_url: &str,
        category: &str,
        interval: &str,
        limit: usize,
        timeout_ms: u64,
    ) -> Result<Self> {
        let http = Client::builder()
            .user_agent("scalper/0.1")
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| ScalpError::Internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            category: category.to_string(),
            interval: interval.to_string(),
            limit,
        })
    }
}

/// Bybit returns newest-first rows of `[start, open, high, low, close, volume, turnover]`
fn parse_kline_rows(rows: &[Vec<String>]) -> Result<MarketData> {
    let mut candles = Vec::with_capacity(rows.len());
    for row in rows.iter().rev() {
        if row.len() < 6 {
            return Err(ScalpError::InvalidMarketData(format!(
                "kline row has {} fields",
                row.len()
            )));
        }
        let field = |i: usize| -> Result<f64> {
            row[i].parse::<f64>().map_err(|e| {
                ScalpError::InvalidMarketData(format!("bad kline field '{}': {}", row[i], e))
            })
        };
        candles.push(Candle {
            open: field(1)?,
            high: field(2)?,
            low: field(3)?,
            close: field(4)?,
            volume: field(5)?,
        });
    }
    Ok(MarketData::from_candles(&candles))
}

#[async_trait]
impl MarketFeed for BybitKlineFeed {
    async fn fetch_ohlcv(&self, symbol: &str) -> Result<MarketData> {
        let url = format!("{}/v5/market/kline", self.base_url);
        let limit = self.limit.to_string();
        let envelope: KlineEnvelope = self
            .http
            .get(&url)
            .query(&[
                ("category", self.category.as_str()),
                ("symbol", symbol),
                ("interval", self.interval.as_str()),
                ("limit", limit.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if envelope.ret_code != 0 {
            return Err(ScalpError::MarketDataUnavailable(format!(
                "{}: bybit retCode={} {}",
                symbol, envelope.ret_code, envelope.ret_msg
            )));
        }

        let rows = envelope.result.map(|r| r.list).unwrap_or_default();
        if rows.is_empty() {
            return Err(ScalpError::MarketDataUnavailable(format!(
                "{}: empty kline list",
                symbol
            )));
        }

        let data = parse_kline_rows(&rows)?;
        debug!("{}: fetched {} bars from bybit", symbol, data.len());
        Ok(data)
    }
}

// ============================================================================
// Synthetic
// ============================================================================

struct SyntheticState {
    rng: StdRng,
    series: HashMap<String, VecDeque<Candle>>,
}

/// Random-walk bars, one new bar per fetch
pub struct SyntheticFeed {
    lookback: usize,
    start_price: f64,
    volatility: f64,
    state: Mutex<SyntheticState>,
}

impl SyntheticFeed {
    /// A non-finite `volatility` yields a flat series; its sign is ignored
    pub fn new(lookback: usize, start_price: f64, volatility: f64, seed: u64) -> Self {
        Self {
            lookback: lookback.max(2),
            start_price,
            volatility: if volatility.is_finite() { volatility.abs() } else { 0.0 },
            state: Mutex::new(SyntheticState {
                rng: StdRng::seed_from_u64(seed),
                series: HashMap::new(),
            }),
        }
    }

    fn next_candle(rng: &mut StdRng, prev_close: f64, volatility: f64) -> Candle {
        let step: f64 = rng.gen_range(-volatility..=volatility);
        let close = (prev_close * (1.0 + step)).max(f64::EPSILON);
        let wick: f64 = rng.gen_range(0.0..=volatility / 2.0);
        Candle {
            open: prev_close,
            high: prev_close.max(close) * (1.0 + wick),
            low: prev_close.min(close) * (1.0 - wick),
            close,
            volume: rng.gen_range(100.0..1000.0),
        }
    }
}

#[async_trait]
impl MarketFeed for SyntheticFeed {
    async fn fetch_ohlcv(&self, symbol: &str) -> Result<MarketData> {
        let mut guard = self.state.lock().await;
        let SyntheticState { rng, series } = &mut *guard;

        let bars = series.entry(symbol.to_string()).or_default();
        if bars.is_empty() {
            let mut close = self.start_price;
            for _ in 0..self.lookback {
                let candle = Self::next_candle(rng, close, self.volatility);
                close = candle.close;
                bars.push_back(candle);
            }
        } else {
            let prev = bars.back().map(|c| c.close).unwrap_or(self.start_price);
            bars.push_back(Self::next_candle(rng, prev, self.volatility));
            while bars.len() > self.lookback {
                bars.pop_front();
            }
        }

        let candles: Vec<Candle> = bars.iter().copied().collect();
        Ok(MarketData::from_candles(&candles))
    }
}

// ============================================================================
// Scripted
// ============================================================================

/// Replays queued windows per symbol; the last window repeats once the queue drains
#[derive(Default)]
pub struct ScriptedFeed {
    windows: Mutex<HashMap<String, VecDeque<MarketData>>>,
}

impl ScriptedFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push_window(&self, symbol: &str, data: MarketData) {
        self.windows
            .lock()
            .await
            .entry(symbol.to_string())
            .or_default()
            .push_back(data);
    }

    pub async fn push_closes(&self, symbol: &str, closes: &[f64]) {
        self.push_window(symbol, MarketData::from_closes(closes)).await;
    }
}

#[async_trait]
impl MarketFeed for ScriptedFeed {
    async fn fetch_ohlcv(&self, symbol: &str) -> Result<MarketData> {
        let mut windows = self.windows.lock().await;
        let queue = windows
            .get_mut(symbol)
            .ok_or_else(|| ScalpError::MarketDataUnavailable(format!("{}: no script", symbol)))?;

        if queue.len() > 1 {
            queue
                .pop_front()
                .ok_or_else(|| ScalpError::MarketDataUnavailable(symbol.to_string()))
        } else {
            queue
                .front()
                .cloned()
                .ok_or_else(|| ScalpError::MarketDataUnavailable(format!("{}: script drained", symbol)))
        }
    }
}
