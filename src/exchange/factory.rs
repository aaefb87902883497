use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::Result;

use super::{BybitKlineFeed, Exchange, FeedKind, MarketFeed, PaperExchange, SyntheticFeed};

/// Build the market feed selected by `exchange.feed`
pub fn build_feed(app_config: &AppConfig) -> Result<Arc<dyn MarketFeed>> {
    let cfg = &app_config.exchange;
    match cfg.feed {
        FeedKind::Bybit => {
            let feed = BybitKlineFeed::new(
                &cfg.rest_url,
                &cfg.category,
                &cfg.interval,
                cfg.lookback,
                cfg.request_timeout_ms,
            )?;
            Ok(Arc::new(feed))
        }
        FeedKind::Synthetic => Ok(Arc::new(SyntheticFeed::new(
            cfg.lookback,
            cfg.synthetic_start_price,
            cfg.synthetic_volatility,
            cfg.synthetic_seed,
        ))),
    }
}

/// Create the runtime exchange from `AppConfig`.
///
/// Orders always go to the paper book; only the price source varies.
pub fn build_exchange(app_config: &AppConfig) -> Result<Arc<dyn Exchange>> {
    let feed = build_feed(app_config)?;
    let exchange = PaperExchange::new(feed, app_config.exchange.initial_balance)
        .with_leverage(app_config.exchange.leverage);
    Ok(Arc::new(exchange))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_synthetic_exchange_serves_market_data() {
        let mut cfg = AppConfig::default_config(&["BTCUSDT"], "band_reversion");
        cfg.exchange.feed = FeedKind::Synthetic;
        cfg.exchange.lookback = 30;

        let exchange = build_exchange(&cfg).unwrap();
        let data = exchange.get_market_data("BTCUSDT").await.unwrap();
        assert_eq!(data.len(), 30);
        assert_eq!(exchange.get_account_balance().await.unwrap(), 10_000.0);
    }
}
