use serde::{Deserialize, Serialize};

use super::PositionSide;

/// Order side (buy or sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Side that opens a position on `side`
    pub fn opening(side: PositionSide) -> Self {
        match side {
            PositionSide::Long => OrderSide::Buy,
            PositionSide::Short => OrderSide::Sell,
        }
    }

    /// Side that reduces a position on `side`
    pub fn closing(side: PositionSide) -> Self {
        match side {
            PositionSide::Long => OrderSide::Sell,
            PositionSide::Short => OrderSide::Buy,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Market,
    Limit,
    Stop,
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderType::Market => write!(f, "MARKET"),
            OrderType::Limit => write!(f, "LIMIT"),
            OrderType::Stop => write!(f, "STOP"),
        }
    }
}

/// Terminal acknowledgment from the exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    /// Accepted and resting (stop/limit)
    Accepted,
    Filled,
    Rejected,
    Canceled,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Rejected | OrderStatus::Canceled
        )
    }
}

/// Intent to trade.
///
/// `order_id` stays `None` until the exchange accepts the order; nothing else
/// changes after acceptance.
///
/// Unset optionals are written as `null`; a missing key reads back as `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub symbol: String,
    pub side: OrderSide,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub quantity: f64,
    /// Limit price, or trigger price for stop orders
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub stop_loss: Option<f64>,
    #[serde(default)]
    pub take_profit: Option<f64>,
    #[serde(default)]
    pub reduce_only: bool,
    #[serde(default)]
    pub order_id: Option<String>,
}

impl Order {
    /// Market entry with protective levels attached
    pub fn market_entry(
        symbol: &str,
        side: PositionSide,
        quantity: f64,
        stop_loss: f64,
        take_profit: f64,
    ) -> Self {
        Self {
            symbol: symbol.to_string(),
            side: OrderSide::opening(side),
            order_type: OrderType::Market,
            quantity,
            price: None,
            stop_loss: Some(stop_loss),
            take_profit: Some(take_profit),
            reduce_only: false,
            order_id: None,
        }
    }

    /// Reduce-only market order against a position on `side`
    pub fn market_reduce(symbol: &str, side: PositionSide, quantity: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            side: OrderSide::closing(side),
            order_type: OrderType::Market,
            quantity,
            price: None,
            stop_loss: None,
            take_profit: None,
            reduce_only: true,
            order_id: None,
        }
    }

    /// Reduce-only protective stop at `trigger`
    pub fn protective_stop(symbol: &str, side: PositionSide, quantity: f64, trigger: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            side: OrderSide::closing(side),
            order_type: OrderType::Stop,
            quantity,
            price: Some(trigger),
            stop_loss: Some(trigger),
            take_profit: None,
            reduce_only: true,
            order_id: None,
        }
    }

    /// Record the exchange-assigned identifier
    pub fn accepted(mut self, order_id: impl Into<String>) -> Self {
        self.order_id = Some(order_id.into());
        self
    }

    pub fn is_accepted(&self) -> bool {
        self.order_id.is_some()
    }

    /// Notional value at `price`
    pub fn notional(&self, price: f64) -> f64 {
        self.quantity * price
    }
}

impl std::fmt::Display for Order {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Order({} {} {} qty={:.6}",
            self.symbol, self.side, self.order_type, self.quantity
        )?;
        if let Some(price) = self.price {
            write!(f, " price={:.4}", price)?;
        }
        if let Some(id) = &self.order_id {
            write!(f, " id={}", id)?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_order_wire_names() {
        let order = Order::market_entry("BTCUSDT", PositionSide::Long, 0.5, 99.5, 101.0);
        let value = serde_json::to_value(&order).unwrap();

        assert_eq!(value["type"], "MARKET");
        assert_eq!(value["side"], "BUY");
        assert_eq!(value["stopLoss"], 99.5);
        assert_eq!(value["takeProfit"], 101.0);
        assert!(value["orderId"].is_null());
        assert!(value.get("orderId").is_some());
    }

    #[test]
    fn test_order_round_trip_keeps_optional_fields() {
        let order = Order::protective_stop("ETHUSDT", PositionSide::Short, 2.0, 2010.0)
            .accepted("abc-123");
        let encoded = serde_json::to_string(&order).unwrap();
        let decoded: Order = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, order);
        assert_eq!(decoded.take_profit, None);
        assert_eq!(decoded.order_id.as_deref(), Some("abc-123"));
    }

    #[test]
    fn test_order_absent_and_null_optionals_both_decode_to_none() {
        let absent = json!({
            "symbol": "BTCUSDT",
            "side": "SELL",
            "type": "LIMIT",
            "quantity": 1.0
        });
        let null = json!({
            "symbol": "BTCUSDT",
            "side": "SELL",
            "type": "LIMIT",
            "quantity": 1.0,
            "price": null,
            "stopLoss": null,
            "takeProfit": null,
            "orderId": null
        });

        let a: Order = serde_json::from_value(absent).unwrap();
        let b: Order = serde_json::from_value(null).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.price, None);
        assert!(!a.reduce_only);
    }

    #[test]
    fn test_closing_side_is_opposite() {
        assert_eq!(OrderSide::closing(PositionSide::Long), OrderSide::Sell);
        assert_eq!(OrderSide::closing(PositionSide::Short), OrderSide::Buy);
        let reduce = Order::market_reduce("BTCUSDT", PositionSide::Short, 1.0);
        assert_eq!(reduce.side, OrderSide::Buy);
        assert!(reduce.reduce_only);
    }
}
