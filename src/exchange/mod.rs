pub mod factory;
pub mod feeds;
pub mod paper;
mod traits;

pub use factory::{build_exchange, build_feed};
pub use feeds::{BybitKlineFeed, ScriptedFeed, SyntheticFeed, DEFAULT_BYBIT_REST_URL};
pub use paper::PaperExchange;
#[cfg(test)]
pub use traits::MockExchange;
pub use traits::{parse_feed_kind, Exchange, FeedKind, MarketFeed};
