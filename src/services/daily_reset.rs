//! Clears the daily loss counter at each UTC midnight.

use crate::strategy::RiskManager;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Time left until the next 00:00 UTC; a full day when `now` is exactly midnight
pub fn duration_until_next_utc_midnight(now: DateTime<Utc>) -> Duration {
    let tomorrow = now.date_naive() + ChronoDuration::days(1);
    let next = tomorrow.and_hms_opt(0, 0, 0).map(|t| t.and_utc());
    match next {
        Some(next) => (next - now).to_std().unwrap_or(Duration::from_secs(0)),
        None => Duration::from_secs(24 * 60 * 60),
    }
}

/// Reset loop; exits as soon as `shutdown` flips to `true`
pub fn spawn_daily_reset(
    risk: Arc<RiskManager>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if *shutdown.borrow() {
                break;
            }
            let wait = duration_until_next_utc_midnight(Utc::now());
            debug!("Next daily loss reset in {:?}", wait);

            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    risk.reset_daily_loss().await;
                    info!("Daily loss counter reset");
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
    })
}
