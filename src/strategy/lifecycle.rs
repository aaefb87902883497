//! Position lifecycle shared by every strategy variant.
//!
//! One `PositionManager` per (symbol, strategy instance). The exchange is the
//! source of truth: `reconcile` overwrites quantity, entry and the resting
//! stop order id at the start of every analysis, keeping only lifecycle
//! bookkeeping (state, ratcheted stop level) from the previous tick.

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::adapters::notifier::{format_close, format_entry};
use crate::domain::{LifecycleState, Order, Position, PositionSide};
use crate::error::Result;
use crate::exchange::paper::QTY_EPSILON;
use crate::exchange::Exchange;

use super::traits::{EntryOutcome, StrategyContext};

/// Position plus where it is in its lifecycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManagedPosition {
    pub position: Position,
    pub state: LifecycleState,
    /// A protective stop order was expected on the exchange but is gone
    pub stop_missing: bool,
}

impl ManagedPosition {
    fn new(position: Position, state: LifecycleState) -> Self {
        Self {
            position,
            state,
            stop_missing: false,
        }
    }

    fn transition(&mut self, next: LifecycleState) {
        if self.state.can_transition_to(next) && self.state != next {
            debug!(
                "{} {}: {} -> {}",
                self.position.symbol,
                self.position.side,
                self.state.as_str(),
                next.as_str()
            );
            self.state = next;
        }
    }
}

/// Entry request built by a variant from its signal
#[derive(Debug, Clone, Copy)]
pub struct EntryPlan {
    pub side: PositionSide,
    pub price: f64,
    /// Fraction of available balance committed
    pub allocation: f64,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
}

impl EntryPlan {
    /// (stop-loss, take-profit) as fixed offsets from the entry price
    pub fn protective_levels(&self) -> (f64, f64) {
        let sign = self.side.sign();
        (
            self.price * (1.0 - sign * self.stop_loss_pct),
            self.price * (1.0 + sign * self.take_profit_pct),
        )
    }
}

/// Re-entry price for averaging: ATR away from entry, bounded at 2% from price
pub fn averaging_price(position: &Position, atr: f64, current_price: f64) -> f64 {
    match position.side {
        PositionSide::Long => {
            let candidate = position.entry_price * (1.0 - atr / position.entry_price);
            candidate.max(current_price * 0.98)
        }
        PositionSide::Short => {
            let candidate = position.entry_price * (1.0 + atr / position.entry_price);
            candidate.min(current_price * 1.02)
        }
    }
}

pub struct PositionManager {
    symbol: String,
    positions: Vec<ManagedPosition>,
    /// Realised since the last `take_realized`
    realized: f64,
    closed: usize,
}

impl PositionManager {
    pub fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            positions: Vec::new(),
            realized: 0.0,
            closed: 0,
        }
    }

    pub fn positions(&self) -> &[ManagedPosition] {
        &self.positions
    }

    pub fn open_count(&self) -> usize {
        self.positions.len()
    }

    /// Drain realised P&L and close count accumulated since the last call
    pub fn take_realized(&mut self) -> (f64, usize) {
        let out = (self.realized, self.closed);
        self.realized = 0.0;
        self.closed = 0;
        out
    }

    /// Replace the local view with exchange-reported positions.
    ///
    /// Positions missing from the exchange (stopped out, closed manually) are
    /// dropped silently.
    pub async fn reconcile(&mut self, exchange: &dyn Exchange, price: Option<f64>) -> Result<()> {
        let reported = exchange.get_open_positions(&self.symbol).await?;
        let previous = std::mem::take(&mut self.positions);

        for mut position in reported.into_iter().filter(|p| p.quantity > QTY_EPSILON) {
            if position.symbol != self.symbol {
                continue;
            }
            let mut managed = match previous.iter().find(|m| m.position.side == position.side) {
                Some(local) => {
                    position.stop_loss = tighter_stop(position.side, position.stop_loss, local.position.stop_loss);
                    if position.take_profit.is_none() {
                        position.take_profit = local.position.take_profit;
                    }
                    let lost = position.stop_order_id.is_none()
                        && (local.position.stop_order_id.is_some() || local.stop_missing);
                    if lost && !local.stop_missing {
                        warn!(
                            "{}: protective stop {} for {} is gone from the exchange",
                            self.symbol,
                            local.position.stop_order_id.as_deref().unwrap_or("-"),
                            position.side
                        );
                    }
                    ManagedPosition {
                        position,
                        state: local.state,
                        stop_missing: lost,
                    }
                }
                None => {
                    debug!("{}: discovered {} on exchange", self.symbol, position);
                    ManagedPosition::new(position, LifecycleState::Open)
                }
            };
            if let Some(p) = price {
                managed.position.update_unrealized_pnl(p);
            }
            self.positions.push(managed);
        }

        for gone in previous
            .iter()
            .filter(|m| !self.positions.iter().any(|p| p.position.side == m.position.side))
        {
            debug!("{}: {} no longer on exchange", self.symbol, gone.position);
        }
        Ok(())
    }

    /// Gate, size and submit a market entry.
    ///
    /// Failures are logged and reported as `Rejected`; nothing is added locally.
    pub async fn open_position(&mut self, ctx: &StrategyContext, plan: EntryPlan) -> EntryOutcome {
        let balance = match ctx.exchange.get_account_balance().await {
            Ok(b) => b,
            Err(e) => {
                warn!("{}: balance unavailable, skipping entry: {}", self.symbol, e);
                return EntryOutcome::Rejected;
            }
        };
        ctx.risk.update_balance(balance).await;

        if plan.price <= 0.0 {
            return EntryOutcome::Rejected;
        }
        let notional = (balance * plan.allocation).min(ctx.risk.config().max_position_size);
        let quantity = notional / plan.price;
        if quantity <= QTY_EPSILON || !ctx.risk.can_open_position(notional).await {
            debug!("{}: {} entry blocked by risk gate", self.symbol, plan.side);
            return EntryOutcome::Blocked;
        }

        let (stop_loss, take_profit) = plan.protective_levels();
        let mut pending = ManagedPosition::new(
            Position::new(&self.symbol, plan.side, quantity, plan.price).with_levels(stop_loss, take_profit),
            LifecycleState::Opening,
        );

        let order = Order::market_entry(&self.symbol, plan.side, quantity, stop_loss, take_profit);
        match ctx.exchange.place_order(order).await {
            Ok(accepted) => {
                info!(
                    "{}: opened {} qty={:.6} @ {:.4} SL={:.4} TP={:.4} ({})",
                    self.symbol,
                    plan.side,
                    quantity,
                    plan.price,
                    stop_loss,
                    take_profit,
                    accepted.order_id.as_deref().unwrap_or("-")
                );
                ctx.notifier.notify(format_entry(
                    &self.symbol,
                    plan.side,
                    quantity,
                    plan.price,
                    stop_loss,
                    take_profit,
                ));
                pending.transition(LifecycleState::Open);
                self.merge_entry(pending);
                EntryOutcome::Opened {
                    side: plan.side,
                    quantity,
                    price: plan.price,
                }
            }
            Err(e) => {
                pending.transition(LifecycleState::Rejected);
                error!("{}: {} entry rejected: {}", self.symbol, plan.side, e);
                EntryOutcome::Rejected
            }
        }
    }

    /// Venues net same-side entries into one position.
    ///
    /// Added quantity re-arms the partial close: a partially closed position
    /// goes back to trailing.
    fn merge_entry(&mut self, entry: ManagedPosition) {
        match self
            .positions
            .iter_mut()
            .find(|m| m.position.side == entry.position.side)
        {
            Some(existing) => {
                let p = &mut existing.position;
                let total = p.quantity + entry.position.quantity;
                p.entry_price = (p.entry_price * p.quantity
                    + entry.position.entry_price * entry.position.quantity)
                    / total;
                p.quantity = total;
                if existing.state == LifecycleState::PartiallyClosed {
                    debug!(
                        "{} {}: averaged into partial remainder, partial close re-armed",
                        self.symbol, p.side
                    );
                    existing.state = if p.stop_order_id.is_some() {
                        LifecycleState::Trailing
                    } else {
                        LifecycleState::Open
                    };
                }
            }
            None => self.positions.push(entry),
        }
    }

    /// Ratchet each protective stop toward `price`; never loosens.
    ///
    /// A stop that vanished from the exchange is re-placed at the tighter of
    /// its last level and the new candidate.
    pub async fn update_trailing_stops(&mut self, ctx: &StrategyContext, price: f64, trailing_pct: f64) {
        for managed in &mut self.positions {
            let side = managed.position.side;
            let candidate = price * (1.0 - side.sign() * trailing_pct);
            let target = match managed.position.stop_loss {
                Some(current) if side.is_tighter_stop(candidate, current) => candidate,
                Some(current) if managed.stop_missing => current,
                Some(_) => continue,
                None => candidate,
            };

            let prior = managed.position.stop_order_id.take();
            if let Some(prior) = prior.as_deref() {
                if let Err(e) = ctx.exchange.cancel_order(&self.symbol, prior).await {
                    warn!("{}: failed to cancel stop {}: {}", self.symbol, prior, e);
                }
            }

            let order = Order::protective_stop(&self.symbol, side, managed.position.quantity, target);
            match ctx.exchange.place_order(order).await {
                Ok(accepted) => {
                    debug!(
                        "{}: {} stop {:?} -> {:.4}",
                        self.symbol, side, managed.position.stop_loss, target
                    );
                    managed.position.stop_loss = Some(target);
                    managed.position.stop_order_id = accepted.order_id;
                    managed.stop_missing = false;
                    managed.transition(LifecycleState::Trailing);
                }
                Err(e) => {
                    managed.stop_missing |= prior.is_some();
                    error!("{}: failed to place trailing stop {:.4}: {}", self.symbol, target, e);
                }
            }
        }
    }

    /// Close `fraction` of each position whose favourable move reached
    /// `trigger_pct`. Fires at most once per position.
    pub async fn partial_close(&mut self, ctx: &StrategyContext, price: f64, trigger_pct: f64, fraction: f64) {
        let mut idx = 0;
        while idx < self.positions.len() {
            let (side, held) = {
                let managed = &self.positions[idx];
                if managed.state.partial_taken() || managed.position.favorable_move(price) < trigger_pct {
                    idx += 1;
                    continue;
                }
                (managed.position.side, managed.position.quantity)
            };

            let quantity = held * fraction;
            let remaining = held - quantity;
            if remaining <= QTY_EPSILON {
                if !self.close_at(ctx, idx, price).await {
                    idx += 1;
                }
                continue;
            }

            let order = Order::market_reduce(&self.symbol, side, quantity);
            match ctx.exchange.place_order(order).await {
                Ok(_) => {
                    let managed = &mut self.positions[idx];
                    let pnl = managed.position.realized_pnl(quantity, price);
                    managed.position.quantity = remaining;
                    managed.transition(LifecycleState::PartiallyClosed);
                    info!(
                        "{}: partially closed {} qty={:.6} @ {:.4} pnl={:.4}",
                        self.symbol, side, quantity, price, pnl
                    );
                    ctx.notifier
                        .notify(format_close(&managed.position, quantity, price, pnl, true));
                    self.record(ctx, pnl).await;
                }
                Err(e) => error!("{}: partial close failed: {}", self.symbol, e),
            }
            idx += 1;
        }
    }

    /// Fully close every position matching `should_close`; returns how many closed
    pub async fn close_where<F>(&mut self, ctx: &StrategyContext, price: f64, should_close: F) -> usize
    where
        F: Fn(&Position) -> bool,
    {
        let mut closed = 0;
        let mut idx = 0;
        while idx < self.positions.len() {
            if should_close(&self.positions[idx].position) && self.close_at(ctx, idx, price).await {
                closed += 1;
                continue;
            }
            idx += 1;
        }
        closed
    }

    /// Close the position at `idx` in full; removes it on success
    async fn close_at(&mut self, ctx: &StrategyContext, idx: usize, price: f64) -> bool {
        let position = self.positions[idx].position.clone();

        if let Some(stop_id) = &position.stop_order_id {
            if let Err(e) = ctx.exchange.cancel_order(&self.symbol, stop_id).await {
                debug!("{}: stop {} not cancelled before close: {}", self.symbol, stop_id, e);
            }
        }

        match ctx.exchange.close_position(&position).await {
            Ok(()) => {
                let pnl = position.realized_pnl(position.quantity, price);
                let mut removed = self.positions.remove(idx);
                removed.transition(LifecycleState::Closed);
                info!("{}: closed {} @ {:.4} pnl={:.4}", self.symbol, position, price, pnl);
                ctx.notifier
                    .notify(format_close(&position, position.quantity, price, pnl, false));
                self.record(ctx, pnl).await;
                self.closed += 1;
                true
            }
            Err(e) => {
                error!("{}: close of {} failed: {}", self.symbol, position, e);
                false
            }
        }
    }

    async fn record(&mut self, ctx: &StrategyContext, pnl: f64) {
        self.realized += pnl;
        ctx.risk.check_daily_loss(pnl).await;
    }
}

fn tighter_stop(side: PositionSide, a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(x), Some(y)) => Some(if side.is_tighter_stop(x, y) { x } else { y }),
        (x, None) => x,
        (None, y) => y,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::RecordingNotifier;
    use crate::config::RiskConfig;
    use crate::error::ScalpError;
    use crate::exchange::{MockExchange, PaperExchange, ScriptedFeed};
    use crate::services::SnapshotBoard;
    use crate::strategy::RiskManager;
    use std::sync::Arc;

    fn context(exchange: Arc<dyn Exchange>) -> StrategyContext {
        StrategyContext {
            exchange,
            risk: Arc::new(RiskManager::new(RiskConfig {
                max_position_size: 5_000.0,
                max_daily_loss: 500.0,
                max_drawdown: 0.5,
            })),
            sink: Arc::new(SnapshotBoard::new()),
            notifier: Arc::new(RecordingNotifier::new()),
        }
    }

    async fn paper_at(price: f64) -> Arc<PaperExchange> {
        let ex = Arc::new(PaperExchange::new(Arc::new(ScriptedFeed::new()), 10_000.0));
        ex.set_price("BTCUSDT", price).await;
        ex
    }

    fn long_plan(price: f64) -> EntryPlan {
        EntryPlan {
            side: PositionSide::Long,
            price,
            allocation: 0.1,
            stop_loss_pct: 0.005,
            take_profit_pct: 0.01,
        }
    }

    #[test]
    fn test_protective_levels_are_symmetric() {
        let (sl, tp) = long_plan(100.0).protective_levels();
        assert!((sl - 99.5).abs() < 1e-9);
        assert!((tp - 101.0).abs() < 1e-9);

        let short = EntryPlan {
            side: PositionSide::Short,
            ..long_plan(100.0)
        };
        let (sl, tp) = short.protective_levels();
        assert!((sl - 100.5).abs() < 1e-9);
        assert!((tp - 99.0).abs() < 1e-9);
    }

    #[test]
    fn test_averaging_price_is_bounded() {
        let long = Position::new("BTCUSDT", PositionSide::Long, 1.0, 100.0);
        // entry - atr = 99 is above the 2% floor (97.02)
        assert!((averaging_price(&long, 1.0, 99.0) - 99.0).abs() < 1e-9);
        // entry - atr = 90 would chase too far: floored at 98% of price
        assert!((averaging_price(&long, 10.0, 99.0) - 97.02).abs() < 1e-9);

        let short = Position::new("BTCUSDT", PositionSide::Short, 1.0, 100.0);
        assert!((averaging_price(&short, 1.0, 101.0) - 101.0).abs() < 1e-9);
        assert!((averaging_price(&short, 10.0, 101.0) - 103.02).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_open_position_sizes_from_balance() {
        let ex = paper_at(100.0).await;
        let ctx = context(ex.clone());
        let mut pm = PositionManager::new("BTCUSDT");

        let outcome = pm.open_position(&ctx, long_plan(100.0)).await;
        assert_eq!(
            outcome,
            EntryOutcome::Opened {
                side: PositionSide::Long,
                quantity: 10.0,
                price: 100.0
            }
        );
        assert_eq!(pm.open_count(), 1);
        assert_eq!(pm.positions()[0].state, LifecycleState::Open);
        assert_eq!(pm.positions()[0].position.stop_loss, Some(99.5));
    }

    #[tokio::test]
    async fn test_gate_blocks_without_placing() {
        let mut mock = MockExchange::new();
        mock.expect_get_account_balance().returning(|| Ok(10_000.0));
        mock.expect_place_order().never();
        let ctx = context(Arc::new(mock));
        ctx.risk.check_daily_loss(-600.0).await;
        let mut pm = PositionManager::new("BTCUSDT");

        assert_eq!(pm.open_position(&ctx, long_plan(100.0)).await, EntryOutcome::Blocked);
        assert_eq!(pm.open_count(), 0);
    }

    #[tokio::test]
    async fn test_entry_notional_is_capped_at_max_position_size() {
        let ex = paper_at(100.0).await;
        let ctx = context(ex.clone());
        let mut pm = PositionManager::new("BTCUSDT");

        // 100% allocation = 10_000 notional, sized down to the 5_000 max
        let plan = EntryPlan {
            allocation: 1.0,
            ..long_plan(100.0)
        };
        assert_eq!(
            pm.open_position(&ctx, plan).await,
            EntryOutcome::Opened {
                side: PositionSide::Long,
                quantity: 50.0,
                price: 100.0
            }
        );
    }

    #[tokio::test]
    async fn test_default_risk_keeps_trading_after_a_win() {
        let ex = paper_at(100.0).await;
        let ctx = StrategyContext {
            risk: Arc::new(RiskManager::new(RiskConfig::default())),
            ..context(ex.clone())
        };
        let mut pm = PositionManager::new("BTCUSDT");

        assert!(matches!(
            pm.open_position(&ctx, long_plan(100.0)).await,
            EntryOutcome::Opened { .. }
        ));
        ex.set_price("BTCUSDT", 100.5).await;
        assert_eq!(pm.close_where(&ctx, 100.5, |_| true).await, 1);
        assert!(ex.get_account_balance().await.unwrap() > 10_000.0);

        match pm.open_position(&ctx, long_plan(100.5)).await {
            EntryOutcome::Opened { quantity, .. } => {
                assert!((quantity * 100.5 - ctx.risk.config().max_position_size).abs() < 1e-9)
            }
            other => panic!("expected an entry, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rejected_order_creates_no_position() {
        let mut mock = MockExchange::new();
        mock.expect_get_account_balance().returning(|| Ok(10_000.0));
        mock.expect_place_order()
            .returning(|_| Err(ScalpError::OrderRejected("venue down".into())));
        let ctx = context(Arc::new(mock));
        let mut pm = PositionManager::new("BTCUSDT");

        assert_eq!(pm.open_position(&ctx, long_plan(100.0)).await, EntryOutcome::Rejected);
        assert_eq!(pm.open_count(), 0);
    }

    #[tokio::test]
    async fn test_trailing_stop_never_loosens() {
        let ex = paper_at(100.0).await;
        let ctx = context(ex.clone());
        let mut pm = PositionManager::new("BTCUSDT");
        pm.open_position(&ctx, long_plan(100.0)).await;

        // TP sits at 101; stay below it
        pm.update_trailing_stops(&ctx, 100.8, 0.003).await;
        let stop = pm.positions()[0].position.stop_loss.unwrap();
        assert!((stop - 100.8 * 0.997).abs() < 1e-9);
        assert_eq!(pm.positions()[0].state, LifecycleState::Trailing);

        for price in [100.8, 100.7, 100.6, 100.55] {
            ex.set_price("BTCUSDT", price).await;
            pm.reconcile(ex.as_ref(), Some(price)).await.unwrap();
            pm.update_trailing_stops(&ctx, price, 0.003).await;
            assert!(pm.positions()[0].position.stop_loss.unwrap() >= stop);
        }
        assert_eq!(ex.resting_order_count("BTCUSDT").await, 1);
    }

    #[tokio::test]
    async fn test_stop_cancelled_on_exchange_is_replaced_at_ratcheted_level() {
        let ex = paper_at(100.0).await;
        let ctx = context(ex.clone());
        let mut pm = PositionManager::new("BTCUSDT");
        pm.open_position(&ctx, long_plan(100.0)).await;

        ex.set_price("BTCUSDT", 100.8).await;
        pm.update_trailing_stops(&ctx, 100.8, 0.003).await;
        let level = 100.8 * 0.997;
        let id = pm.positions()[0].position.stop_order_id.clone().unwrap();

        // someone removes the stop directly on the venue
        ex.cancel_order("BTCUSDT", &id).await.unwrap();
        pm.reconcile(ex.as_ref(), Some(100.6)).await.unwrap();
        let managed = &pm.positions()[0];
        assert_eq!(managed.position.stop_order_id, None);
        assert!(managed.stop_missing);
        assert_eq!(ex.resting_order_count("BTCUSDT").await, 0);

        // candidate at 100.6 is looser, the old level is restored
        ex.set_price("BTCUSDT", 100.6).await;
        pm.update_trailing_stops(&ctx, 100.6, 0.003).await;
        assert_eq!(ex.resting_order_count("BTCUSDT").await, 1);
        let managed = &pm.positions()[0];
        assert!(!managed.stop_missing);
        assert!((managed.position.stop_loss.unwrap() - level).abs() < 1e-9);
        let on_exchange = ex.position("BTCUSDT", PositionSide::Long).await.unwrap();
        assert_eq!(on_exchange.stop_order_id, managed.position.stop_order_id);

        pm.reconcile(ex.as_ref(), Some(100.6)).await.unwrap();
        assert!(!pm.positions()[0].stop_missing);
    }

    #[tokio::test]
    async fn test_failed_cancel_still_replaces_stop() {
        let mut mock = MockExchange::new();
        mock.expect_cancel_order()
            .returning(|_, _| Err(ScalpError::Exchange("timeout".into())));
        mock.expect_place_order()
            .times(1)
            .returning(|o| Ok(o.accepted("stop-2")));
        let ctx = context(Arc::new(mock));

        let mut pm = PositionManager::new("BTCUSDT");
        let mut position =
            Position::new("BTCUSDT", PositionSide::Short, 1.0, 100.0).with_levels(100.5, 99.0);
        position.stop_order_id = Some("stop-1".into());
        pm.positions.push(ManagedPosition::new(position, LifecycleState::Open));

        pm.update_trailing_stops(&ctx, 99.0, 0.003).await;
        let p = &pm.positions()[0].position;
        assert!((p.stop_loss.unwrap() - 99.297).abs() < 1e-9);
        assert_eq!(p.stop_order_id.as_deref(), Some("stop-2"));
    }

    #[tokio::test]
    async fn test_partial_close_fires_once() {
        let ex = paper_at(100.0).await;
        let ctx = context(ex.clone());
        let mut pm = PositionManager::new("BTCUSDT");
        pm.open_position(&ctx, long_plan(100.0)).await;

        ex.set_price("BTCUSDT", 100.6).await;
        pm.partial_close(&ctx, 100.6, 0.005, 0.5).await;
        assert_eq!(pm.positions()[0].position.quantity, 5.0);
        assert_eq!(pm.positions()[0].state, LifecycleState::PartiallyClosed);

        pm.reconcile(ex.as_ref(), Some(100.7)).await.unwrap();
        pm.partial_close(&ctx, 100.7, 0.005, 0.5).await;
        assert_eq!(pm.positions()[0].position.quantity, 5.0);

        let (realized, closed) = pm.take_realized();
        assert!((realized - 3.0).abs() < 1e-9);
        assert_eq!(closed, 0);
        assert_eq!(ctx.risk.snapshot().await.daily_loss, -realized);
    }

    #[tokio::test]
    async fn test_averaging_into_partial_remainder_rearms_partial_close() {
        let ex = paper_at(100.0).await;
        let ctx = context(ex.clone());
        let mut pm = PositionManager::new("BTCUSDT");
        pm.open_position(&ctx, long_plan(100.0)).await;

        ex.set_price("BTCUSDT", 100.6).await;
        pm.partial_close(&ctx, 100.6, 0.005, 0.5).await;
        assert_eq!(pm.positions()[0].state, LifecycleState::PartiallyClosed);

        pm.open_position(&ctx, long_plan(100.6)).await;
        assert_eq!(pm.open_count(), 1);
        assert_eq!(pm.positions()[0].state, LifecycleState::Open);
        let held = pm.positions()[0].position.quantity;
        assert!(held > 5.0);

        // entry is now ~100.3, so 101 is a fresh favourable move
        ex.set_price("BTCUSDT", 101.0).await;
        pm.partial_close(&ctx, 101.0, 0.005, 0.5).await;
        assert!((pm.positions()[0].position.quantity - held / 2.0).abs() < 1e-9);
        assert_eq!(pm.positions()[0].state, LifecycleState::PartiallyClosed);
    }

    #[tokio::test]
    async fn test_partial_close_of_everything_removes_position() {
        let ex = paper_at(100.0).await;
        let ctx = context(ex.clone());
        let mut pm = PositionManager::new("BTCUSDT");
        pm.open_position(&ctx, long_plan(100.0)).await;

        pm.partial_close(&ctx, 101.0, 0.005, 1.0).await;
        assert_eq!(pm.open_count(), 0);
        pm.partial_close(&ctx, 102.0, 0.005, 1.0).await;
        assert_eq!(pm.take_realized().1, 1);
        assert!(ex.get_open_positions("BTCUSDT").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reconcile_drops_positions_closed_on_exchange() {
        let ex = paper_at(100.0).await;
        let ctx = context(ex.clone());
        let mut pm = PositionManager::new("BTCUSDT");
        pm.open_position(&ctx, long_plan(100.0)).await;

        // SL at 99.5 triggers inside the paper book
        ex.set_price("BTCUSDT", 99.0).await;
        pm.reconcile(ex.as_ref(), Some(99.0)).await.unwrap();
        assert_eq!(pm.open_count(), 0);
        assert_eq!(pm.take_realized(), (0.0, 0));
    }

    #[tokio::test]
    async fn test_close_where_full_close() {
        let ex = paper_at(100.0).await;
        let ctx = context(ex.clone());
        let mut pm = PositionManager::new("BTCUSDT");
        pm.open_position(&ctx, long_plan(100.0)).await;

        assert_eq!(pm.close_where(&ctx, 100.0, |p| p.side == PositionSide::Short).await, 0);
        assert_eq!(pm.close_where(&ctx, 100.0, |_| true).await, 1);
        assert_eq!(pm.open_count(), 0);
        assert!(ex.position("BTCUSDT", PositionSide::Long).await.is_none());
    }
}
