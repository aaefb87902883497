//! RSI + trend momentum-reversal scalper.
//!
//! Longs when RSI is oversold inside a confirmed up-trend, shorts when RSI is
//! overbought inside a confirmed down-trend. Open positions trail their stop,
//! take half off once price moves `partial_close_trigger_pct` beyond entry, and
//! expose an ATR-based averaging price on the snapshot.

use async_trait::async_trait;
use tracing::debug;

use crate::config::MomentumReversalConfig;
use crate::domain::{MarketData, PositionSide};
use crate::error::{Result, ScalpError};
use crate::services::{PositionSummary, SymbolSnapshot};

use super::indicators::{latest_atr, latest_rsi, mean_pct_change, trend_change};
use super::lifecycle::{averaging_price, EntryPlan, ManagedPosition, PositionManager};
use super::traits::{
    confirms_trend, EntryOutcome, Strategy, StrategyContext, StrategyKind, TickOutcome,
    TrendDirection,
};

/// Bars used for the snapshot's short-term trend readout
const SNAPSHOT_TREND_BARS: usize = 5;

pub struct MomentumReversal {
    symbol: String,
    params: MomentumReversalConfig,
    ctx: StrategyContext,
    book: PositionManager,
    last_price: Option<f64>,
    rsi: Option<f64>,
    atr: Option<f64>,
    trend_up: bool,
    trend_down: bool,
}

impl MomentumReversal {
    pub fn new(symbol: &str, params: MomentumReversalConfig, ctx: StrategyContext) -> Self {
        Self {
            symbol: symbol.to_string(),
            params,
            ctx,
            book: PositionManager::new(symbol),
            last_price: None,
            rsi: None,
            atr: None,
            trend_up: false,
            trend_down: false,
        }
    }

    pub fn rsi(&self) -> Option<f64> {
        self.rsi
    }

    pub fn atr(&self) -> Option<f64> {
        self.atr
    }

    fn entry_signal(&self) -> Option<PositionSide> {
        let rsi = self.rsi?;
        if rsi < self.params.oversold && self.trend_up {
            Some(PositionSide::Long)
        } else if rsi > self.params.overbought && self.trend_down {
            Some(PositionSide::Short)
        } else {
            None
        }
    }

    fn summary(&self, managed: &ManagedPosition, price: f64) -> PositionSummary {
        let p = &managed.position;
        PositionSummary {
            side: p.side,
            quantity: p.quantity,
            entry_price: p.entry_price,
            current_price: price,
            stop_loss: p.stop_loss,
            take_profit: p.take_profit,
            averaging_price: self.atr.map(|atr| averaging_price(p, atr, price)),
            partial_close_level: Some(
                p.entry_price * (1.0 + p.side.sign() * self.params.partial_close_trigger_pct),
            ),
        }
    }
}

#[async_trait]
impl Strategy for MomentumReversal {
    fn kind(&self) -> StrategyKind {
        StrategyKind::MomentumReversal
    }

    fn symbol(&self) -> &str {
        &self.symbol
    }

    async fn analyze_market(&mut self, data: &MarketData) -> Result<SymbolSnapshot> {
        data.validate()?;
        let price = data
            .latest_close()
            .ok_or_else(|| ScalpError::InvalidMarketData("empty window".to_string()))?;

        self.book.reconcile(self.ctx.exchange.as_ref(), Some(price)).await?;

        self.last_price = Some(price);
        self.rsi = latest_rsi(&data.close, self.params.rsi_period);
        self.atr = latest_atr(&data.high, &data.low, &data.close, self.params.atr_period);
        let lookback = self.params.trend_lookback;
        let threshold = self.params.trend_threshold;
        self.trend_up = confirms_trend(&data.close, TrendDirection::Up, lookback, threshold);
        self.trend_down = confirms_trend(&data.close, TrendDirection::Down, lookback, threshold);

        let mut snapshot = SymbolSnapshot::new(
            &self.symbol,
            self.kind().as_str(),
            price,
            data.latest_volume().unwrap_or(0.0),
        )
        .with_indicator("rsi", self.rsi)
        .with_indicator("atr", self.atr)
        .with_indicator("trend", trend_change(&data.close, lookback))
        .with_indicator(
            "mean_pct_change_5",
            mean_pct_change(&data.close, SNAPSHOT_TREND_BARS).map(|v| v * 100.0),
        );
        snapshot.positions = self
            .book
            .positions()
            .iter()
            .map(|m| self.summary(m, price))
            .collect();

        self.ctx.sink.push(snapshot.clone());
        Ok(snapshot)
    }

    async fn execute_strategy(&mut self, entries_enabled: bool) -> Result<TickOutcome> {
        let price = self.last_price.ok_or_else(|| {
            ScalpError::Internal(format!("{}: execute before analyze", self.symbol))
        })?;

        let entry = if !entries_enabled {
            EntryOutcome::Disabled
        } else if self.book.open_count() >= self.params.max_positions {
            EntryOutcome::AtCapacity
        } else {
            match self.entry_signal() {
                Some(side) => {
                    let plan = EntryPlan {
                        side,
                        price,
                        allocation: self.params.allocation,
                        stop_loss_pct: self.params.stop_loss_pct,
                        take_profit_pct: self.params.take_profit_pct,
                    };
                    self.book.open_position(&self.ctx, plan).await
                }
                None => EntryOutcome::NoSignal,
            }
        };

        self.book
            .partial_close(
                &self.ctx,
                price,
                self.params.partial_close_trigger_pct,
                self.params.partial_close_pct,
            )
            .await;
        self.book
            .update_trailing_stops(&self.ctx, price, self.params.trailing_stop_pct)
            .await;

        let (realized_pnl, closed) = self.book.take_realized();
        debug!(
            "{}: rsi={:?} up={} down={} entry={:?}",
            self.symbol, self.rsi, self.trend_up, self.trend_down, entry
        );
        Ok(TickOutcome {
            entry,
            realized_pnl,
            closed,
        })
    }

    fn managed_positions(&self) -> &[ManagedPosition] {
        self.book.positions()
    }

    fn last_price(&self) -> Option<f64> {
        self.last_price
    }
}
