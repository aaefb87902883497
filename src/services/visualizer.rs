//! Visualization sink.
//!
//! Strategies push one `SymbolSnapshot` per analysis; consumers read the latest
//! per symbol. Pushing never waits on a renderer.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

use crate::domain::PositionSide;

/// Position panel shown next to the indicator chart
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionSummary {
    pub side: PositionSide,
    pub quantity: f64,
    pub entry_price: f64,
    pub current_price: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    /// Candidate averaging price (momentum-reversal only)
    pub averaging_price: Option<f64>,
    /// Price at which the partial close fires (momentum-reversal only)
    pub partial_close_level: Option<f64>,
}

/// Latest indicator values and positions for one symbol
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolSnapshot {
    pub symbol: String,
    pub strategy: String,
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub volume: f64,
    /// Variant-dependent: rsi, atr, trend, mean_pct_change_5, bb_*, macd_*, ema
    pub indicators: BTreeMap<String, f64>,
    pub positions: Vec<PositionSummary>,
}

impl SymbolSnapshot {
    pub fn new(symbol: &str, strategy: &str, price: f64, volume: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            strategy: strategy.to_string(),
            timestamp: Utc::now(),
            price,
            volume,
            indicators: BTreeMap::new(),
            positions: Vec::new(),
        }
    }

    /// Record an indicator if it is defined
    pub fn with_indicator(mut self, name: &str, value: Option<f64>) -> Self {
        if let Some(v) = value.filter(|v| v.is_finite()) {
            self.indicators.insert(name.to_string(), v);
        }
        self
    }

    pub fn indicator(&self, name: &str) -> Option<f64> {
        self.indicators.get(name).copied()
    }
}

/// Passive consumer of per-symbol snapshots
pub trait VisualizationSink: Send + Sync {
    fn push(&self, snapshot: SymbolSnapshot);
}

/// Keeps the most recent snapshot per symbol for the command interface
#[derive(Default)]
pub struct SnapshotBoard {
    latest: DashMap<String, SymbolSnapshot>,
}

impl SnapshotBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self, symbol: &str) -> Option<SymbolSnapshot> {
        self.latest.get(symbol).map(|s| s.clone())
    }

    /// All snapshots ordered by symbol
    pub fn all(&self) -> Vec<SymbolSnapshot> {
        let mut all: Vec<SymbolSnapshot> = self.latest.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        all
    }

    pub fn clear(&self) {
        self.latest.clear();
    }
}

impl VisualizationSink for SnapshotBoard {
    fn push(&self, snapshot: SymbolSnapshot) {
        self.latest.insert(snapshot.symbol.clone(), snapshot);
    }
}

/// Emits snapshots as debug log lines
pub struct LogSink;

impl VisualizationSink for LogSink {
    fn push(&self, snapshot: SymbolSnapshot) {
        debug!(
            "[viz] {} {} price={:.4} {:?} positions={}",
            snapshot.symbol,
            snapshot.strategy,
            snapshot.price,
            snapshot.indicators,
            snapshot.positions.len()
        );
    }
}

/// Forwards each snapshot to several sinks
pub struct FanoutSink {
    sinks: Vec<std::sync::Arc<dyn VisualizationSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<std::sync::Arc<dyn VisualizationSink>>) -> Self {
        Self { sinks }
    }
}

impl VisualizationSink for FanoutSink {
    fn push(&self, snapshot: SymbolSnapshot) {
        for sink in &self.sinks {
            sink.push(snapshot.clone());
        }
    }
}
