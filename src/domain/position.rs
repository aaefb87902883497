use serde::{Deserialize, Serialize};

/// Direction of an open exposure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionSide::Long => "LONG",
            PositionSide::Short => "SHORT",
        }
    }

    /// +1 for longs, -1 for shorts
    pub fn sign(&self) -> f64 {
        match self {
            PositionSide::Long => 1.0,
            PositionSide::Short => -1.0,
        }
    }

    /// Whether `candidate` is a strictly tighter stop than `current`
    pub fn is_tighter_stop(&self, candidate: f64, current: f64) -> bool {
        match self {
            PositionSide::Long => candidate > current,
            PositionSide::Short => candidate < current,
        }
    }
}

impl std::fmt::Display for PositionSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Exchange-reported open exposure
///
/// Optionals follow the same wire rule as `Order`: `null` out, `null` or absent in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub symbol: String,
    pub side: PositionSide,
    pub quantity: f64,
    pub entry_price: f64,
    #[serde(default)]
    pub stop_loss: Option<f64>,
    #[serde(default)]
    pub take_profit: Option<f64>,
    #[serde(default)]
    pub liquidation_price: Option<f64>,
    #[serde(default)]
    pub unrealized_pnl: Option<f64>,
    #[serde(default)]
    pub leverage: Option<f64>,
    /// Exchange id of the stop order protecting this position
    #[serde(default)]
    pub stop_order_id: Option<String>,
}

impl Position {
    pub fn new(symbol: &str, side: PositionSide, quantity: f64, entry_price: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            quantity,
            entry_price,
            stop_loss: None,
            take_profit: None,
            liquidation_price: None,
            unrealized_pnl: None,
            leverage: None,
            stop_order_id: None,
        }
    }

    pub fn with_levels(mut self, stop_loss: f64, take_profit: f64) -> Self {
        self.stop_loss = Some(stop_loss);
        self.take_profit = Some(take_profit);
        self
    }

    pub fn is_open(&self) -> bool {
        self.quantity > 0.0
    }

    /// P&L of the full remaining quantity at `price`
    pub fn pnl_at(&self, price: f64) -> f64 {
        (price - self.entry_price) * self.quantity * self.side.sign()
    }

    /// P&L of `quantity` units closed at `price`
    pub fn realized_pnl(&self, quantity: f64, price: f64) -> f64 {
        (price - self.entry_price) * quantity * self.side.sign()
    }

    pub fn update_unrealized_pnl(&mut self, current_price: f64) {
        self.unrealized_pnl = Some(self.pnl_at(current_price));
    }

    /// Fractional move in the position's favor
    pub fn favorable_move(&self, price: f64) -> f64 {
        if self.entry_price <= 0.0 {
            return 0.0;
        }
        (price - self.entry_price) / self.entry_price * self.side.sign()
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Position({} {} qty={:.6} entry={:.4}",
            self.symbol, self.side, self.quantity, self.entry_price
        )?;
        if let Some(sl) = self.stop_loss {
            write!(f, " SL={:.4}", sl)?;
        }
        if let Some(tp) = self.take_profit {
            write!(f, " TP={:.4}", tp)?;
        }
        write!(f, ")")
    }
}
