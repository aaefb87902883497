//! MACD histogram + EMA trend follower.

use async_trait::async_trait;

use crate::config::TrendMomentumConfig;
use crate::domain::{MarketData, Position, PositionSide};
use crate::error::{Result, ScalpError};
use crate::services::{PositionSummary, SymbolSnapshot};

use super::indicators::{latest_ema, macd, Macd};
use super::lifecycle::{EntryPlan, ManagedPosition, PositionManager};
use super::traits::{EntryOutcome, Strategy, StrategyContext, StrategyKind, TickOutcome};

pub struct TrendMomentum {
    symbol: String,
    params: TrendMomentumConfig,
    ctx: StrategyContext,
    book: PositionManager,
    last_price: Option<f64>,
    macd: Option<Macd>,
    ema: Option<f64>,
}

impl TrendMomentum {
    pub fn new(symbol: &str, params: TrendMomentumConfig, ctx: StrategyContext) -> Self {
        Self {
            symbol: symbol.to_string(),
            params,
            ctx,
            book: PositionManager::new(symbol),
            last_price: None,
            macd: None,
            ema: None,
        }
    }

    pub fn histogram(&self) -> Option<f64> {
        self.macd.map(|m| m.histogram)
    }
}

/// Histogram sign has flipped against the held side
fn momentum_lost(position: &Position, histogram: f64) -> bool {
    match position.side {
        PositionSide::Long => histogram < 0.0,
        PositionSide::Short => histogram > 0.0,
    }
}

#[async_trait]
impl Strategy for TrendMomentum {
    fn kind(&self) -> StrategyKind {
        StrategyKind::TrendMomentum
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
        self.macd = macd(&data.close, self.params.fast, self.params.slow, self.params.signal);
        self.ema = latest_ema(&data.close, self.params.ema_period);

        let mut snapshot = SymbolSnapshot::new(
            &self.symbol,
            self.kind().as_str(),
            price,
            data.latest_volume().unwrap_or(0.0),
        )
        .with_indicator("macd", self.macd.map(|m| m.macd))
        .with_indicator("macd_signal", self.macd.map(|m| m.signal))
        .with_indicator("macd_histogram", self.histogram())
        .with_indicator("ema", self.ema);
        snapshot.positions = self
            .book
            .positions()
            .iter()
            .map(|m| PositionSummary {
                side: m.position.side,
                quantity: m.position.quantity,
                entry_price: m.position.entry_price,
                current_price: price,
                stop_loss: m.position.stop_loss,
                take_profit: m.position.take_profit,
                averaging_price: None,
                partial_close_level: None,
            })
            .collect();

        self.ctx.sink.push(snapshot.clone());
        Ok(snapshot)
    }

    async fn execute_strategy(&mut self, entries_enabled: bool) -> Result<TickOutcome> {
        let price = self.last_price.ok_or_else(|| {
            ScalpError::Internal(format!("{}: execute before analyze", self.symbol))
        })?;
        let (Some(histogram), Some(ema)) = (self.histogram(), self.ema) else {
            return Ok(TickOutcome {
                entry: EntryOutcome::NoSignal,
                realized_pnl: 0.0,
                closed: 0,
            });
        };

        let signal = if histogram > 0.0 && price > ema {
            Some(PositionSide::Long)
        } else if histogram < 0.0 && price < ema {
            Some(PositionSide::Short)
        } else {
            None
        };

        let entry = match signal {
            None => EntryOutcome::NoSignal,
            Some(_) if !entries_enabled => EntryOutcome::Disabled,
            Some(_) if self.book.open_count() >= self.params.max_positions => {
                EntryOutcome::AtCapacity
            }
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
        };

        self.book
            .close_where(&self.ctx, price, |p| momentum_lost(p, histogram))
            .await;

        let (realized_pnl, closed) = self.book.take_realized();
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
