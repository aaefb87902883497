//! Strategy module
//!
//! Indicator math, the risk gate, the shared position lifecycle and the three
//! strategy variants, plus the engine that drives them per symbol.
//!
//! ## Variants
//!
//! - `momentum_reversal` - RSI extremes inside a confirmed trend, trailing stop, partial close
//! - `band_reversion` - Bollinger band fade back to the mean
//! - `trend_momentum` - MACD histogram with an EMA filter

pub mod indicators;
pub mod lifecycle;
pub mod orchestrator;
pub mod risk;
pub mod traits;

pub mod band_reversion;
pub mod momentum_reversal;
pub mod trend_momentum;

pub use band_reversion::BandReversion;
pub use lifecycle::{averaging_price, EntryPlan, ManagedPosition, PositionManager};
pub use momentum_reversal::MomentumReversal;
pub use orchestrator::{
    AggregateStatus, OrchestratorConfig, ProfitReport, SymbolStatus, TickReport, TradingEngine,
};
pub use risk::{RiskManager, RiskState};
pub use traits::{
    check_trend, confirms_trend, EntryOutcome, Strategy, StrategyContext, StrategyKind,
    StrategyParams, TickOutcome, TrendDirection,
};
pub use trend_momentum::TrendMomentum;
