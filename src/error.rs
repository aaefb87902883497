use thiserror::Error;

/// Main error type for the scalping engine
#[derive(Error, Debug)]
pub enum ScalpError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Exchange errors
    #[error("Exchange error: {0}")]
    Exchange(String),

    #[error("Market data unavailable: {0}")]
    MarketDataUnavailable(String),

    #[error("Invalid market data: {0}")]
    InvalidMarketData(String),

    // Order execution errors
    #[error("Order rejected: {0}")]
    OrderRejected(String),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    // Usage errors
    #[error("Unsupported strategy: {0}")]
    UnsupportedStrategy(String),

    #[error("Invalid trend direction '{0}': expected 'up' or 'down'")]
    InvalidTrendDirection(String),

    #[error("Invalid price: {0}")]
    InvalidPrice(f64),

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl ScalpError {
    /// Configuration/usage errors are surfaced to the operator and never retried.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            ScalpError::Config(_)
                | ScalpError::UnsupportedStrategy(_)
                | ScalpError::InvalidTrendDirection(_)
                | ScalpError::InvalidPrice(_)
                | ScalpError::Validation(_)
        )
    }

    /// Exchange round-trip failures: the symbol's tick is aborted, the loop continues.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ScalpError::Http(_)
                | ScalpError::Exchange(_)
                | ScalpError::MarketDataUnavailable(_)
                | ScalpError::OrderRejected(_)
                | ScalpError::OrderNotFound(_)
        )
    }
}

/// Result type alias for ScalpError
pub type Result<T> = std::result::Result<T, ScalpError>;
