use crate::config::RiskConfig;
use crate::error::{Result, ScalpError};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Fraction of balance a single position may expose
const BALANCE_EXPOSURE_CAP: f64 = 0.02;

/// Process-wide risk counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RiskState {
    /// Realised loss since the last reset; gains reduce it and it may go negative
    pub daily_loss: f64,
    pub peak_balance: f64,
    pub current_balance: f64,
}

impl RiskState {
    pub fn drawdown(&self) -> f64 {
        if self.peak_balance <= 0.0 {
            return 0.0;
        }
        (self.peak_balance - self.current_balance) / self.peak_balance
    }
}

/// Risk manager for the position-opening gate.
///
/// All counters live behind one lock so a status read never observes a
/// half-applied update.
pub struct RiskManager {
    config: RiskConfig,
    state: Arc<RwLock<RiskState>>,
}

impl RiskManager {
    pub fn new(config: RiskConfig) -> Self {
        Self {
            config,
            state: Arc::new(RwLock::new(RiskState::default())),
        }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    pub async fn snapshot(&self) -> RiskState {
        *self.state.read().await
    }

    // ==================== Sizing ====================

    /// Quantity at `price` for a notional of `min(max_position_size, 2% of balance)`
    pub fn calculate_position_size(&self, price: f64, balance: f64) -> Result<f64> {
        if !price.is_finite() || price <= 0.0 {
            return Err(ScalpError::InvalidPrice(price));
        }
        let notional = self
            .config
            .max_position_size
            .min(BALANCE_EXPOSURE_CAP * balance.max(0.0));
        Ok(notional.max(0.0) / price)
    }

    // ==================== Gate ====================

    /// Gate evaluated right before every position-opening order
    pub async fn can_open_position(&self, trade_size: f64) -> bool {
        if trade_size > self.config.max_position_size {
            debug!(
                "Gate: trade size {:.2} exceeds max {:.2}",
                trade_size, self.config.max_position_size
            );
            return false;
        }

        let state = self.state.read().await;
        if !self.loss_within(&state, 0.0) {
            debug!("Gate: daily loss {:.2} over budget", state.daily_loss);
            return false;
        }
        if !self.drawdown_within(&state) {
            debug!("Gate: drawdown {:.4} over limit", state.drawdown());
            return false;
        }
        true
    }

    /// Whether a hypothetical trade result would keep daily loss within budget.
    ///
    /// Never mutates the counter.
    pub async fn daily_loss_within_budget(&self, probe: f64) -> bool {
        let state = self.state.read().await;
        self.loss_within(&state, probe)
    }

    /// Whether the current drawdown is within `max_drawdown`
    pub async fn check_drawdown(&self) -> bool {
        let state = self.state.read().await;
        self.drawdown_within(&state)
    }

    fn loss_within(&self, state: &RiskState, probe: f64) -> bool {
        state.daily_loss - probe <= self.config.max_daily_loss
    }

    fn drawdown_within(&self, state: &RiskState) -> bool {
        state.drawdown() <= self.config.max_drawdown
    }

    // ==================== Updates ====================

    /// Set the current balance; the peak only ever moves up
    pub async fn update_balance(&self, new_balance: f64) {
        let mut state = self.state.write().await;
        state.current_balance = new_balance;
        if new_balance > state.peak_balance {
            state.peak_balance = new_balance;
        }
    }

    /// Record a realised trade result (negative = loss) and report whether the
    /// day is still within budget.
    ///
    /// Each realised result must pass through here exactly once.
    pub async fn check_daily_loss(&self, trade_result: f64) -> bool {
        let mut state = self.state.write().await;
        state.daily_loss -= trade_result;
        let within = self.loss_within(&state, 0.0);
        if !within {
            warn!(
                "Daily loss {:.2} exceeds limit {:.2}; new entries blocked",
                state.daily_loss, self.config.max_daily_loss
            );
        }
        within
    }

    /// Zero the daily counter (calendar trigger)
    pub async fn reset_daily_loss(&self) {
        let mut state = self.state.write().await;
        info!("Resetting daily loss (was {:.2})", state.daily_loss);
        state.daily_loss = 0.0;
    }
}
