//! Core strategy traits and types
//!
//! Defines the contract every variant implements, the closed set of variants
//! with their configuration names, and the shared trend helper.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

use crate::adapters::Notifier;
use crate::config::{AppConfig, BandReversionConfig, MomentumReversalConfig, TrendMomentumConfig};
use crate::domain::{MarketData, Position, PositionSide};
use crate::error::{Result, ScalpError};
use crate::exchange::Exchange;
use crate::services::{SymbolSnapshot, VisualizationSink};

use super::indicators::trend_change;
use super::lifecycle::ManagedPosition;
use super::risk::RiskManager;
use super::{BandReversion, MomentumReversal, TrendMomentum};

// ============================================================================
// Strategy Trait
// ============================================================================

/// Per-symbol decision engine
#[async_trait]
pub trait Strategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    fn symbol(&self) -> &str;

    /// Reconcile positions with the exchange, compute indicators over `data`
    /// and publish a snapshot. Never places orders.
    async fn analyze_market(&mut self, data: &MarketData) -> Result<SymbolSnapshot>;

    /// Evaluate entries (when `entries_enabled` and below capacity), then
    /// manage every open position.
    async fn execute_strategy(&mut self, entries_enabled: bool) -> Result<TickOutcome>;

    /// Positions as of the last reconciliation, with lifecycle state
    fn managed_positions(&self) -> &[ManagedPosition];

    /// Price seen by the last `analyze_market`
    fn last_price(&self) -> Option<f64>;

    fn open_positions(&self) -> Vec<Position> {
        self.managed_positions()
            .iter()
            .map(|m| m.position.clone())
            .collect()
    }

    /// Unrealised P&L of all open positions at the last price
    fn unrealized_pnl(&self) -> f64 {
        match self.last_price() {
            Some(price) => self
                .managed_positions()
                .iter()
                .map(|m| m.position.pnl_at(price))
                .sum(),
            None => 0.0,
        }
    }
}

/// Collaborators shared by every strategy instance
#[derive(Clone)]
pub struct StrategyContext {
    pub exchange: Arc<dyn Exchange>,
    pub risk: Arc<RiskManager>,
    pub sink: Arc<dyn VisualizationSink>,
    pub notifier: Arc<dyn Notifier>,
}

// ============================================================================
// Outcomes
// ============================================================================

/// What happened to the entry decision this tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EntryOutcome {
    NoSignal,
    /// Engine disabled; entries suppressed
    Disabled,
    AtCapacity,
    /// Risk gate declined
    Blocked,
    /// Exchange refused the order
    Rejected,
    Opened {
        side: PositionSide,
        quantity: f64,
        price: f64,
    },
}

impl EntryOutcome {
    pub fn is_opened(&self) -> bool {
        matches!(self, EntryOutcome::Opened { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickOutcome {
    pub entry: EntryOutcome,
    /// P&L realised by partial and full closes during this tick
    pub realized_pnl: f64,
    pub closed: usize,
}

// ============================================================================
// Variant registry
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// RSI + trend confirmation, trailing stop, partial close
    MomentumReversal,
    /// Bollinger band fade back to the mean
    BandReversion,
    /// MACD histogram + EMA filter
    TrendMomentum,
}

/// Configuration name → variant
const STRATEGY_NAMES: &[(&str, StrategyKind)] = &[
    ("momentum_reversal", StrategyKind::MomentumReversal),
    ("band_reversion", StrategyKind::BandReversion),
    ("trend_momentum", StrategyKind::TrendMomentum),
    ("ScalpingStrategy1", StrategyKind::MomentumReversal),
    ("ScalpingStrategy2", StrategyKind::BandReversion),
    ("ScalpingStrategy3", StrategyKind::TrendMomentum),
];

impl StrategyKind {
    pub const ALL: [StrategyKind; 3] = [
        StrategyKind::MomentumReversal,
        StrategyKind::BandReversion,
        StrategyKind::TrendMomentum,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::MomentumReversal => "momentum_reversal",
            StrategyKind::BandReversion => "band_reversion",
            StrategyKind::TrendMomentum => "trend_momentum",
        }
    }

    /// Resolve a configured name; unknown names are a usage error
    pub fn from_name(name: &str) -> Result<Self> {
        let trimmed = name.trim();
        STRATEGY_NAMES
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(trimmed))
            .map(|(_, kind)| *kind)
            .ok_or_else(|| ScalpError::UnsupportedStrategy(name.to_string()))
    }

    /// Every accepted name, canonical first
    pub fn names() -> impl Iterator<Item = &'static str> {
        STRATEGY_NAMES.iter().map(|(n, _)| *n)
    }

    /// Construct a fresh instance for `symbol`
    pub fn build(
        &self,
        symbol: &str,
        params: &StrategyParams,
        ctx: StrategyContext,
    ) -> Box<dyn Strategy> {
        match self {
            StrategyKind::MomentumReversal => {
                Box::new(MomentumReversal::new(symbol, params.momentum_reversal, ctx))
            }
            StrategyKind::BandReversion => {
                Box::new(BandReversion::new(symbol, params.band_reversion, ctx))
            }
            StrategyKind::TrendMomentum => {
                Box::new(TrendMomentum::new(symbol, params.trend_momentum, ctx))
            }
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = ScalpError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s)
    }
}

/// Per-variant thresholds, fixed for the lifetime of an instance
#[derive(Debug, Clone, Copy, Default)]
pub struct StrategyParams {
    pub momentum_reversal: MomentumReversalConfig,
    pub band_reversion: BandReversionConfig,
    pub trend_momentum: TrendMomentumConfig,
}

impl From<&AppConfig> for StrategyParams {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            momentum_reversal: cfg.momentum_reversal,
            band_reversion: cfg.band_reversion,
            trend_momentum: cfg.trend_momentum,
        }
    }
}

// ============================================================================
// Trend confirmation
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendDirection {
    Up,
    Down,
}

impl FromStr for TrendDirection {
    type Err = ScalpError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" => Ok(TrendDirection::Up),
            "down" => Ok(TrendDirection::Down),
            _ => Err(ScalpError::InvalidTrendDirection(s.to_string())),
        }
    }
}

/// Whether the move over the last `lookback` bars exceeds `threshold` in `direction`
pub fn confirms_trend(closes: &[f64], direction: TrendDirection, lookback: usize, threshold: f64) -> bool {
    match trend_change(closes, lookback) {
        Some(change) => match direction {
            TrendDirection::Up => change > threshold,
            TrendDirection::Down => change < -threshold,
        },
        None => false,
    }
}

/// String-typed form of [`confirms_trend`]
pub fn check_trend(closes: &[f64], direction: &str, lookback: usize, threshold: f64) -> Result<bool> {
    let direction: TrendDirection = direction.parse()?;
    Ok(confirms_trend(closes, direction, lookback, threshold))
}
