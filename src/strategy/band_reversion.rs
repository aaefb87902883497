//! Bollinger band mean-reversion.
//!
//! Fades closes outside the bands and exits the whole position once price is
//! back at the moving average. No trailing, no partial closes.

use async_trait::async_trait;
use tracing::debug;

use crate::config::BandReversionConfig;
use crate::domain::{MarketData, Position, PositionSide};
use crate::error::{Result, ScalpError};
use crate::services::{PositionSummary, SymbolSnapshot};

use super::indicators::{bollinger, BollingerBands};
use super::lifecycle::{EntryPlan, ManagedPosition, PositionManager};
use super::traits::{EntryOutcome, Strategy, StrategyContext, StrategyKind, TickOutcome};

pub struct BandReversion {
    symbol: String,
    params: BandReversionConfig,
    ctx: StrategyContext,
    book: PositionManager,
    last_price: Option<f64>,
    bands: Option<BollingerBands>,
}

impl BandReversion {
    pub fn new(symbol: &str, params: BandReversionConfig, ctx: StrategyContext) -> Self {
        Self {
            symbol: symbol.to_string(),
            params,
            ctx,
            book: PositionManager::new(symbol),
            last_price: None,
            bands: None,
        }
    }

    pub fn bands(&self) -> Option<BollingerBands> {
        self.bands
    }
}

/// Price has come back to the mean from the side the position was opened on
fn reverted(position: &Position, price: f64, middle: f64) -> bool {
    match position.side {
        PositionSide::Long => price >= middle,
        PositionSide::Short => price <= middle,
    }
}

#[async_trait]
impl Strategy for BandReversion {
    fn kind(&self) -> StrategyKind {
        StrategyKind::BandReversion
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
        self.bands = bollinger(&data.close, self.params.period, self.params.std_dev);

        let mut snapshot = SymbolSnapshot::new(
            &self.symbol,
            self.kind().as_str(),
            price,
            data.latest_volume().unwrap_or(0.0),
        )
        .with_indicator("bb_upper", self.bands.map(|b| b.upper))
        .with_indicator("bb_middle", self.bands.map(|b| b.middle))
        .with_indicator("bb_lower", self.bands.map(|b| b.lower));
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
        let Some(bands) = self.bands else {
            debug!("{}: not enough bars for bands", self.symbol);
            return Ok(TickOutcome {
                entry: EntryOutcome::NoSignal,
                realized_pnl: 0.0,
                closed: 0,
            });
        };

        let signal = if price < bands.lower {
            Some(PositionSide::Long)
        } else if price > bands.upper {
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
            .close_where(&self.ctx, price, |p| reverted(p, price, bands.middle))
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::RecordingNotifier;
    use crate::config::RiskConfig;
    use crate::exchange::{Exchange, PaperExchange, ScriptedFeed};
    use crate::services::SnapshotBoard;
    use crate::strategy::RiskManager;
    use std::sync::Arc;

    fn setup() -> (Arc<PaperExchange>, BandReversion) {
        let ex = Arc::new(PaperExchange::new(Arc::new(ScriptedFeed::new()), 10_000.0));
        let ctx = StrategyContext {
            exchange: ex.clone(),
            risk: Arc::new(RiskManager::new(RiskConfig {
                max_position_size: 5_000.0,
                ..RiskConfig::default()
            })),
            sink: Arc::new(SnapshotBoard::new()),
            notifier: Arc::new(RecordingNotifier::new()),
        };
        let strategy = BandReversion::new("ETHUSDT", BandReversionConfig::default(), ctx);
        (ex, strategy)
    }

    #[test]
    fn test_reverted_is_side_aware() {
        let long = Position::new("ETHUSDT", PositionSide::Long, 1.0, 99.0);
        let short = Position::new("ETHUSDT", PositionSide::Short, 1.0, 101.0);
        assert!(reverted(&long, 100.0, 100.0));
        assert!(!reverted(&long, 99.9, 100.0));
        assert!(reverted(&short, 100.0, 100.0));
        assert!(!reverted(&short, 100.1, 100.0));
    }

    #[tokio::test]
    async fn test_spike_above_upper_band_opens_short_then_closes_at_mean() {
        let (ex, mut strategy) = setup();

        let mut spike = vec![100.0; 39];
        spike.push(100.3);
        ex.set_price("ETHUSDT", 100.3).await;
        strategy
            .analyze_market(&MarketData::from_closes(&spike))
            .await
            .unwrap();
        assert!(100.3 > strategy.bands().unwrap().upper);

        let outcome = strategy.execute_strategy(true).await.unwrap();
        assert!(matches!(
            outcome.entry,
            EntryOutcome::Opened {
                side: PositionSide::Short,
                ..
            }
        ));
        let opened = ex.position("ETHUSDT", PositionSide::Short).await.unwrap();
        assert!((opened.stop_loss.unwrap() - 100.3 * 1.003).abs() < 1e-9);
        assert!((opened.take_profit.unwrap() - 100.3 * 0.994).abs() < 1e-9);

        // back to 100.0, below the 100.015 mean but above the take-profit
        let mut revert = spike.clone();
        revert.push(100.0);
        ex.set_price("ETHUSDT", 100.0).await;
        strategy
            .analyze_market(&MarketData::from_closes(&revert))
            .await
            .unwrap();
        assert_eq!(strategy.open_positions().len(), 1);

        let outcome = strategy.execute_strategy(true).await.unwrap();
        assert_eq!(outcome.entry, EntryOutcome::NoSignal);
        assert_eq!(outcome.closed, 1);
        assert!(outcome.realized_pnl > 0.0);
        assert!(strategy.open_positions().is_empty());
        assert!(ex.get_open_positions("ETHUSDT").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_second_spike_is_at_capacity() {
        let (ex, mut strategy) = setup();
        let mut spike = vec![100.0; 39];
        spike.push(100.3);
        ex.set_price("ETHUSDT", 100.3).await;
        let data = MarketData::from_closes(&spike);

        strategy.analyze_market(&data).await.unwrap();
        strategy.execute_strategy(true).await.unwrap();
        strategy.analyze_market(&data).await.unwrap();
        let outcome = strategy.execute_strategy(true).await.unwrap();
        assert_eq!(outcome.entry, EntryOutcome::AtCapacity);
        assert_eq!(outcome.closed, 0);
    }
}
