//! In-process paper exchange.
//!
//! Hedge-mode book (one position per symbol and side), market fills at the
//! latest close, resting stop/limit orders, and position-level SL/TP that
//! trigger whenever fresh market data is pulled.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use super::{Exchange, MarketFeed};
use crate::domain::{MarketData, Order, OrderSide, OrderType, Position, PositionSide};
use crate::error::{Result, ScalpError};

/// Quantities below this are treated as flat
pub const QTY_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone)]
struct RestingOrder {
    id: String,
    order: Order,
}

#[derive(Debug, Default)]
struct PaperBook {
    balance: f64,
    last_prices: HashMap<String, f64>,
    positions: HashMap<(String, PositionSide), Position>,
    resting: Vec<RestingOrder>,
}

impl PaperBook {
    fn last_price(&self, symbol: &str) -> Result<f64> {
        self.last_prices
            .get(symbol)
            .copied()
            .ok_or_else(|| ScalpError::MarketDataUnavailable(format!("{}: no price yet", symbol)))
    }

    /// Add to or open a position; averaging moves entry and quantity, never side
    fn open(&mut self, order: &Order, side: PositionSide, price: f64, leverage: f64) -> Result<()> {
        let margin = order.quantity * price / leverage;
        if margin > self.balance {
            return Err(ScalpError::OrderRejected(format!(
                "{}: insufficient margin ({:.2} > {:.2})",
                order.symbol, margin, self.balance
            )));
        }

        let key = (order.symbol.clone(), side);
        match self.positions.get_mut(&key) {
            Some(position) => {
                let total = position.quantity + order.quantity;
                position.entry_price =
                    (position.entry_price * position.quantity + price * order.quantity) / total;
                position.quantity = total;
                if order.stop_loss.is_some() {
                    position.stop_loss = order.stop_loss;
                }
                if order.take_profit.is_some() {
                    position.take_profit = order.take_profit;
                }
            }
            None => {
                let mut position = Position::new(&order.symbol, side, order.quantity, price);
                position.stop_loss = order.stop_loss;
                position.take_profit = order.take_profit;
                position.leverage = Some(leverage);
                position.liquidation_price = Some(price * (1.0 - side.sign() / leverage));
                self.positions.insert(key, position);
            }
        }
        Ok(())
    }

    /// Reduce a position at `price`, returning realised P&L
    fn reduce(&mut self, symbol: &str, side: PositionSide, quantity: f64, price: f64) -> Result<f64> {
        let key = (symbol.to_string(), side);
        let position = self.positions.get_mut(&key).ok_or_else(|| {
            ScalpError::OrderRejected(format!("{}: no {} position to reduce", symbol, side))
        })?;

        let qty = quantity.min(position.quantity);
        let realized = position.realized_pnl(qty, price);
        position.quantity -= qty;
        self.balance += realized;

        if position.quantity <= QTY_EPSILON {
            self.positions.remove(&key);
            // Protective orders die with the position
            let closing = OrderSide::closing(side);
            self.resting.retain(|r| {
                !(r.order.symbol == symbol && r.order.reduce_only && r.order.side == closing)
            });
        }
        Ok(realized)
    }

    fn fill(&mut self, order: &Order, price: f64, leverage: f64) -> Result<f64> {
        if order.reduce_only {
            let side = match order.side {
                OrderSide::Sell => PositionSide::Long,
                OrderSide::Buy => PositionSide::Short,
            };
            self.reduce(&order.symbol, side, order.quantity, price)
        } else {
            let side = match order.side {
                OrderSide::Buy => PositionSide::Long,
                OrderSide::Sell => PositionSide::Short,
            };
            self.open(order, side, price, leverage).map(|_| 0.0)
        }
    }

    /// Apply a new price: resting orders first, then position-level SL/TP
    fn mark(&mut self, symbol: &str, price: f64, leverage: f64) {
        self.last_prices.insert(symbol.to_string(), price);

        let (due, keep): (Vec<RestingOrder>, Vec<RestingOrder>) =
            std::mem::take(&mut self.resting).into_iter().partition(|r| {
                r.order.symbol == symbol && resting_triggered(&r.order, price)
            });
        self.resting = keep;

        for r in due {
            let fill_price = r.order.price.unwrap_or(price);
            match self.fill(&r.order, fill_price, leverage) {
                Ok(pnl) => info!("[paper] {} triggered at {:.4} (pnl {:.4})", r.order, fill_price, pnl),
                Err(e) => debug!("[paper] triggered order {} dropped: {}", r.id, e),
            }
        }

        let hits: Vec<(PositionSide, f64, f64)> = self
            .positions
            .values()
            .filter(|p| p.symbol == symbol)
            .filter_map(|p| position_exit(p, price).map(|exit| (p.side, p.quantity, exit)))
            .collect();

        for (side, quantity, exit) in hits {
            if let Ok(pnl) = self.reduce(symbol, side, quantity, exit) {
                info!("[paper] {} {} closed by SL/TP at {:.4} (pnl {:.4})", symbol, side, exit, pnl);
            }
        }
    }
}

fn resting_triggered(order: &Order, price: f64) -> bool {
    let Some(level) = order.price else {
        return false;
    };
    match (order.order_type, order.side) {
        (OrderType::Stop, OrderSide::Sell) => price <= level,
        (OrderType::Stop, OrderSide::Buy) => price >= level,
        (OrderType::Limit, OrderSide::Buy) => price <= level,
        (OrderType::Limit, OrderSide::Sell) => price >= level,
        (OrderType::Market, _) => false,
    }
}

fn position_exit(position: &Position, price: f64) -> Option<f64> {
    match position.side {
        PositionSide::Long => {
            if let Some(sl) = position.stop_loss.filter(|sl| price <= *sl) {
                return Some(sl);
            }
            position.take_profit.filter(|tp| price >= *tp)
        }
        PositionSide::Short => {
            if let Some(sl) = position.stop_loss.filter(|sl| price >= *sl) {
                return Some(sl);
            }
            position.take_profit.filter(|tp| price <= *tp)
        }
    }
}

/// Paper trading venue backed by a market feed
pub struct PaperExchange {
    feed: Arc<dyn MarketFeed>,
    leverage: f64,
    book: Mutex<PaperBook>,
}

impl PaperExchange {
    pub fn new(feed: Arc<dyn MarketFeed>, initial_balance: f64) -> Self {
        Self {
            feed,
            leverage: 1.0,
            book: Mutex::new(PaperBook {
                balance: initial_balance,
                ..Default::default()
            }),
        }
    }

    pub fn with_leverage(mut self, leverage: f64) -> Self {
        self.leverage = leverage.max(1.0);
        self
    }

    /// Force a price without pulling from the feed
    pub async fn set_price(&self, symbol: &str, price: f64) {
        self.book.lock().await.mark(symbol, price, self.leverage);
    }

    pub async fn resting_order_count(&self, symbol: &str) -> usize {
        self.book
            .lock()
            .await
            .resting
            .iter()
            .filter(|r| r.order.symbol == symbol)
            .count()
    }

    pub async fn position(&self, symbol: &str, side: PositionSide) -> Option<Position> {
        self.book
            .lock()
            .await
            .positions
            .get(&(symbol.to_string(), side))
            .cloned()
    }
}

#[async_trait]
impl Exchange for PaperExchange {
    async fn get_market_data(&self, symbol: &str) -> Result<MarketData> {
        let data = self.feed.fetch_ohlcv(symbol).await?;
        data.validate()?;
        if let Some(price) = data.latest_close() {
            self.book.lock().await.mark(symbol, price, self.leverage);
        }
        Ok(data)
    }

    async fn place_order(&self, order: Order) -> Result<Order> {
        if !order.quantity.is_finite() || order.quantity <= 0.0 {
            return Err(ScalpError::OrderRejected(format!(
                "{}: quantity must be positive",
                order
            )));
        }

        let id = Uuid::new_v4().to_string();
        let mut book = self.book.lock().await;

        match order.order_type {
            OrderType::Market => {
                let price = match book.last_price(&order.symbol) {
                    Ok(p) => p,
                    Err(e) => order.price.ok_or(e)?,
                };
                let pnl = book.fill(&order, price, self.leverage)?;
                debug!("[paper] filled {} at {:.4} (pnl {:.4})", order, price, pnl);
            }
            OrderType::Stop => {
                let trigger = order.price.ok_or_else(|| {
                    ScalpError::OrderRejected(format!("{}: stop without trigger", order))
                })?;
                if !order.reduce_only {
                    return Err(ScalpError::OrderRejected(format!(
                        "{}: stop orders must be reduce-only",
                        order
                    )));
                }
                let side = match order.side {
                    OrderSide::Sell => PositionSide::Long,
                    OrderSide::Buy => PositionSide::Short,
                };
                let position = book
                    .positions
                    .get_mut(&(order.symbol.clone(), side))
                    .ok_or_else(|| {
                        ScalpError::OrderRejected(format!("{}: nothing to protect", order))
                    })?;
                position.stop_loss = Some(trigger);
                position.stop_order_id = Some(id.clone());
                book.resting.push(RestingOrder {
                    id: id.clone(),
                    order: order.clone(),
                });
            }
            OrderType::Limit => {
                if order.price.is_none() {
                    return Err(ScalpError::OrderRejected(format!("{}: limit without price", order)));
                }
                book.resting.push(RestingOrder {
                    id: id.clone(),
                    order: order.clone(),
                });
            }
        }

        Ok(order.accepted(id))
    }

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<()> {
        let mut book = self.book.lock().await;
        let before = book.resting.len();
        book.resting
            .retain(|r| !(r.id == order_id && r.order.symbol == symbol));
        if book.resting.len() == before {
            return Err(ScalpError::OrderNotFound(format!("{} {}", symbol, order_id)));
        }

        for position in book.positions.values_mut() {
            if position.stop_order_id.as_deref() == Some(order_id) {
                position.stop_order_id = None;
            }
        }
        Ok(())
    }

    async fn get_open_positions(&self, symbol: &str) -> Result<Vec<Position>> {
        let book = self.book.lock().await;
        let price = book.last_prices.get(symbol).copied();
        let mut positions: Vec<Position> = book
            .positions
            .values()
            .filter(|p| p.symbol == symbol && p.quantity > QTY_EPSILON)
            .cloned()
            .collect();
        if let Some(price) = price {
            for p in &mut positions {
                p.update_unrealized_pnl(price);
            }
        }
        positions.sort_by_key(|p| p.side.as_str());
        Ok(positions)
    }

    async fn close_position(&self, position: &Position) -> Result<()> {
        let mut book = self.book.lock().await;
        let price = book.last_price(&position.symbol)?;
        let held = book
            .positions
            .get(&(position.symbol.clone(), position.side))
            .map(|p| p.quantity)
            .unwrap_or(0.0);
        let pnl = book.reduce(&position.symbol, position.side, held, price)?;
        debug!("[paper] closed {} at {:.4} (pnl {:.4})", position, price, pnl);
        Ok(())
    }

    async fn get_account_balance(&self) -> Result<f64> {
        Ok(self.book.lock().await.balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::ScriptedFeed;

    fn exchange() -> PaperExchange {
        PaperExchange::new(Arc::new(ScriptedFeed::new()), 10_000.0)
    }

    #[tokio::test]
    async fn test_market_entry_and_close_realises_pnl() {
        let ex = exchange();
        ex.set_price("BTCUSDT", 100.0).await;

        let order = Order::market_entry("BTCUSDT", PositionSide::Long, 10.0, 90.0, 120.0);
        let accepted = ex.place_order(order).await.unwrap();
        assert!(accepted.is_accepted());

        ex.set_price("BTCUSDT", 110.0).await;
        let positions = ex.get_open_positions("BTCUSDT").await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].unrealized_pnl, Some(100.0));

        ex.close_position(&positions[0]).await.unwrap();
        assert!(ex.get_open_positions("BTCUSDT").await.unwrap().is_empty());
        assert_eq!(ex.get_account_balance().await.unwrap(), 10_100.0);
    }

    #[tokio::test]
    async fn test_averaging_keeps_side() {
        let ex = exchange();
        ex.set_price("ETHUSDT", 100.0).await;
        ex.place_order(Order::market_entry("ETHUSDT", PositionSide::Short, 1.0, 101.0, 99.0))
            .await
            .unwrap();
        ex.set_price("ETHUSDT", 100.5).await;
        ex.place_order(Order::market_entry("ETHUSDT", PositionSide::Short, 1.0, 101.5, 99.0))
            .await
            .unwrap();

        let p = ex.position("ETHUSDT", PositionSide::Short).await.unwrap();
        assert_eq!(p.side, PositionSide::Short);
        assert_eq!(p.quantity, 2.0);
        assert!((p.entry_price - 100.25).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_stop_order_replaces_and_triggers() {
        let ex = exchange();
        ex.set_price("BTCUSDT", 100.0).await;
        ex.place_order(Order::market_entry("BTCUSDT", PositionSide::Long, 1.0, 95.0, 200.0))
            .await
            .unwrap();

        let stop = ex
            .place_order(Order::protective_stop("BTCUSDT", PositionSide::Long, 1.0, 99.0))
            .await
            .unwrap();
        let id = stop.order_id.clone().unwrap();
        assert_eq!(ex.resting_order_count("BTCUSDT").await, 1);
        let p = ex.position("BTCUSDT", PositionSide::Long).await.unwrap();
        assert_eq!(p.stop_order_id.as_deref(), Some(id.as_str()));

        ex.set_price("BTCUSDT", 98.5).await;
        assert!(ex.position("BTCUSDT", PositionSide::Long).await.is_none());
        assert_eq!(ex.resting_order_count("BTCUSDT").await, 0);
        assert_eq!(ex.get_account_balance().await.unwrap(), 9_999.0);

        assert!(matches!(
            ex.cancel_order("BTCUSDT", &id).await,
            Err(ScalpError::OrderNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_reduce_without_position_is_rejected() {
        let ex = exchange();
        ex.set_price("BTCUSDT", 100.0).await;
        let result = ex
            .place_order(Order::market_reduce("BTCUSDT", PositionSide::Long, 1.0))
            .await;
        assert!(matches!(result, Err(ScalpError::OrderRejected(_))));
    }

    #[tokio::test]
    async fn test_insufficient_margin_is_rejected() {
        let ex = exchange();
        ex.set_price("BTCUSDT", 100.0).await;
        let result = ex
            .place_order(Order::market_entry("BTCUSDT", PositionSide::Long, 1_000.0, 90.0, 110.0))
            .await;
        assert!(matches!(result, Err(ScalpError::OrderRejected(_))));
    }
}
