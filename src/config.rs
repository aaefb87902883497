use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

use crate::exchange::FeedKind;
use crate::strategy::StrategyKind;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub engine: EngineConfig,
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub momentum_reversal: MomentumReversalConfig,
    #[serde(default)]
    pub band_reversion: BandReversionConfig,
    #[serde(default)]
    pub trend_momentum: TrendMomentumConfig,
    #[serde(default)]
    pub command: CommandConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    pub symbols: Vec<String>,
    /// Strategy name; canonical or legacy (`ScalpingStrategy1/2/3`)
    pub strategy: String,
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
    #[serde(default = "default_true")]
    pub start_enabled: bool,
    /// Reset the daily loss counter at each UTC midnight
    #[serde(default = "default_true")]
    pub daily_reset: bool,
}

fn default_tick_interval() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConfig {
    #[serde(default)]
    pub feed: FeedKind,
    #[serde(default = "default_rest_url")]
    pub rest_url: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default = "default_interval")]
    pub interval: String,
    #[serde(default = "default_lookback")]
    pub lookback: usize,
    /// Paper wallet starting balance (USDT)
    #[serde(default = "default_initial_balance")]
    pub initial_balance: f64,
    #[serde(default = "default_leverage")]
    pub leverage: f64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
    /// Synthetic feed knobs
    #[serde(default = "default_synthetic_start")]
    pub synthetic_start_price: f64,
    #[serde(default = "default_synthetic_volatility")]
    pub synthetic_volatility: f64,
    #[serde(default)]
    pub synthetic_seed: u64,
}

fn default_rest_url() -> String {
    crate::exchange::DEFAULT_BYBIT_REST_URL.to_string()
}

fn default_category() -> String {
    "linear".to_string()
}

fn default_interval() -> String {
    "1".to_string()
}

fn default_lookback() -> usize {
    100
}

fn default_initial_balance() -> f64 {
    10_000.0
}

fn default_leverage() -> f64 {
    1.0
}

fn default_request_timeout() -> u64 {
    10_000
}

fn default_synthetic_start() -> f64 {
    100.0
}

fn default_synthetic_volatility() -> f64 {
    0.002
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            feed: FeedKind::default(),
            rest_url: default_rest_url(),
            category: default_category(),
            interval: default_interval(),
            lookback: default_lookback(),
            initial_balance: default_initial_balance(),
            leverage: default_leverage(),
            request_timeout_ms: default_request_timeout(),
            synthetic_start_price: default_synthetic_start(),
            synthetic_volatility: default_synthetic_volatility(),
            synthetic_seed: 0,
        }
    }
}

/// Portfolio-level risk limits (USDT, fractions)
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RiskConfig {
    pub max_position_size: f64,
    pub max_daily_loss: f64,
    pub max_drawdown: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_position_size: 1_000.0,
            max_daily_loss: 100.0,
            max_drawdown: 0.15,
        }
    }
}

/// RSI + trend variant parameters
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct MomentumReversalConfig {
    pub rsi_period: usize,
    pub overbought: f64,
    pub oversold: f64,
    pub atr_period: usize,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub trailing_stop_pct: f64,
    pub partial_close_pct: f64,
    pub partial_close_trigger_pct: f64,
    pub max_positions: usize,
    pub allocation: f64,
    pub trend_lookback: usize,
    pub trend_threshold: f64,
}

impl Default for MomentumReversalConfig {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            overbought: 70.0,
            oversold: 30.0,
            atr_period: 14,
            stop_loss_pct: 0.005,
            take_profit_pct: 0.01,
            trailing_stop_pct: 0.003,
            partial_close_pct: 0.5,
            partial_close_trigger_pct: 0.005,
            max_positions: 4,
            allocation: 0.1,
            trend_lookback: 20,
            trend_threshold: 0.01,
        }
    }
}

/// Bollinger variant parameters
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct BandReversionConfig {
    pub period: usize,
    pub std_dev: f64,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub max_positions: usize,
    pub allocation: f64,
}

impl Default for BandReversionConfig {
    fn default() -> Self {
        Self {
            period: 20,
            std_dev: 2.0,
            stop_loss_pct: 0.003,
            take_profit_pct: 0.006,
            max_positions: 1,
            allocation: 0.1,
        }
    }
}

/// MACD + EMA variant parameters
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct TrendMomentumConfig {
    pub fast: usize,
    pub slow: usize,
    pub signal: usize,
    pub ema_period: usize,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub max_positions: usize,
    pub allocation: f64,
}

impl Default for TrendMomentumConfig {
    fn default() -> Self {
        Self {
            fast: 12,
            slow: 26,
            signal: 9,
            ema_period: 50,
            stop_loss_pct: 0.004,
            take_profit_pct: 0.008,
            max_positions: 1,
            allocation: 0.1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommandConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:8088".to_string()
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotifyConfig {
    pub telegram_token: Option<String>,
    pub chat_id: Option<String>,
    pub api_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
    /// Directory for the daily-rotated log file; stdout only when unset
    #[serde(default)]
    pub dir: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            dir: None,
        }
    }
}

fn default_log_level() -> String {
    "info,scalper=debug".to_string()
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory.
    ///
    /// Unknown strategy names are rejected here, before any engine exists.
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .set_default("engine.tick_interval_secs", 10)?
            .set_default("logging.level", "info,scalper=debug")?
            .set_default("logging.json", false)?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Environment-specific overrides (e.g. config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("SCALPER_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // SCALPER__ENGINE__STRATEGY, SCALPER__RISK__MAX_DRAWDOWN, ...
            .add_source(
                Environment::with_prefix("SCALPER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("engine.symbols"),
            );

        let cfg: AppConfig = builder.build()?.try_deserialize()?;
        cfg.strategy_kind()
            .map_err(|e| ConfigError::Message(e.to_string()))?;
        Ok(cfg)
    }

    /// Configured strategy resolved through the name table
    pub fn strategy_kind(&self) -> crate::error::Result<StrategyKind> {
        StrategyKind::from_name(&self.engine.strategy)
    }

    /// Validate configuration, returning every violation found
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.engine.symbols.is_empty() {
            errors.push("engine.symbols must list at least one symbol".to_string());
        }
        if self.engine.symbols.iter().any(|s| s.trim().is_empty()) {
            errors.push("engine.symbols contains an empty symbol".to_string());
        }
        if self.engine.tick_interval_secs == 0 {
            errors.push("engine.tick_interval_secs must be positive".to_string());
        }
        if let Err(e) = self.strategy_kind() {
            errors.push(e.to_string());
        }

        if self.risk.max_position_size <= 0.0 {
            errors.push("risk.max_position_size must be positive".to_string());
        }
        if self.risk.max_daily_loss <= 0.0 {
            errors.push("risk.max_daily_loss must be positive".to_string());
        }
        if self.risk.max_drawdown <= 0.0 || self.risk.max_drawdown >= 1.0 {
            errors.push("risk.max_drawdown must be between 0 and 1".to_string());
        }

        if self.exchange.lookback < 2 {
            errors.push("exchange.lookback must be at least 2 bars".to_string());
        }
        if self.exchange.initial_balance <= 0.0 {
            errors.push("exchange.initial_balance must be positive".to_string());
        }
        if self.exchange.leverage < 1.0 {
            errors.push("exchange.leverage must be >= 1".to_string());
        }
        if !self.exchange.synthetic_volatility.is_finite() || self.exchange.synthetic_volatility < 0.0 {
            errors.push("exchange.synthetic_volatility must be a non-negative number".to_string());
        }

        let mr = &self.momentum_reversal;
        if mr.oversold >= mr.overbought {
            errors.push("momentum_reversal.oversold must be below overbought".to_string());
        }
        if mr.partial_close_pct <= 0.0 || mr.partial_close_pct >= 1.0 {
            errors.push("momentum_reversal.partial_close_pct must be between 0 and 1".to_string());
        }
        if mr.trend_lookback == 0 {
            errors.push("momentum_reversal.trend_lookback must be positive".to_string());
        }

        let tm = &self.trend_momentum;
        if tm.fast >= tm.slow {
            errors.push("trend_momentum.fast must be shorter than slow".to_string());
        }

        let br = &self.band_reversion;
        for (name, alloc, max_positions) in [
            ("momentum_reversal", mr.allocation, mr.max_positions),
            ("band_reversion", br.allocation, br.max_positions),
            ("trend_momentum", tm.allocation, tm.max_positions),
        ] {
            if alloc <= 0.0 || alloc > 1.0 {
                errors.push(format!("{}.allocation must be in (0, 1]", name));
            }
            if max_positions == 0 {
                errors.push(format!("{}.max_positions must be positive", name));
            }
        }

        for (name, pct) in [
            ("momentum_reversal.stop_loss_pct", mr.stop_loss_pct),
            ("momentum_reversal.take_profit_pct", mr.take_profit_pct),
            ("momentum_reversal.trailing_stop_pct", mr.trailing_stop_pct),
            ("momentum_reversal.partial_close_trigger_pct", mr.partial_close_trigger_pct),
            ("band_reversion.stop_loss_pct", br.stop_loss_pct),
            ("band_reversion.take_profit_pct", br.take_profit_pct),
            ("trend_momentum.stop_loss_pct", tm.stop_loss_pct),
            ("trend_momentum.take_profit_pct", tm.take_profit_pct),
        ] {
            if !pct.is_finite() || pct < 0.0 {
                errors.push(format!("{} must be a non-negative number", name));
            }
        }

        if self.notify.telegram_token.is_some() != self.notify.chat_id.is_some() {
            errors.push("notify.telegram_token and notify.chat_id must be set together".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Minimal in-memory configuration (tests, `--symbols` quick runs)
    pub fn default_config(symbols: &[&str], strategy: &str) -> Self {
        Self {
            engine: EngineConfig {
                symbols: symbols.iter().map(|s| s.to_string()).collect(),
                strategy: strategy.to_string(),
                tick_interval_secs: default_tick_interval(),
                start_enabled: true,
                daily_reset: true,
            },
            exchange: ExchangeConfig::default(),
            risk: RiskConfig::default(),
            momentum_reversal: MomentumReversalConfig::default(),
            band_reversion: BandReversionConfig::default(),
            trend_momentum: TrendMomentumConfig::default(),
            command: CommandConfig::default(),
            notify: NotifyConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let cfg = AppConfig::default_config(&["BTCUSDT", "ETHUSDT"], "momentum_reversal");
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.strategy_kind().unwrap(), StrategyKind::MomentumReversal);
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let mut cfg = AppConfig::default_config(&[], "martingale");
        cfg.risk.max_drawdown = 1.5;
        cfg.trend_momentum.fast = 30;

        let errors = cfg.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("engine.symbols")));
        assert!(errors.iter().any(|e| e.contains("martingale")));
        assert!(errors.iter().any(|e| e.contains("max_drawdown")));
        assert!(errors.iter().any(|e| e.contains("trend_momentum.fast")));
    }

    #[test]
    fn test_validate_rejects_unusable_numbers() {
        let mut cfg = AppConfig::default_config(&["BTCUSDT"], "momentum_reversal");
        cfg.exchange.synthetic_volatility = -0.002;
        cfg.band_reversion.max_positions = 0;
        cfg.momentum_reversal.trailing_stop_pct = -0.003;
        cfg.trend_momentum.stop_loss_pct = f64::NAN;

        let errors = cfg.validate().unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.iter().any(|e| e.contains("synthetic_volatility")));
        assert!(errors.iter().any(|e| e.contains("band_reversion.max_positions")));
        assert!(errors.iter().any(|e| e.contains("momentum_reversal.trailing_stop_pct")));
        assert!(errors.iter().any(|e| e.contains("trend_momentum.stop_loss_pct")));

        cfg.exchange.synthetic_volatility = f64::NAN;
        cfg.band_reversion.max_positions = 1;
        cfg.momentum_reversal.trailing_stop_pct = 0.0;
        cfg.trend_momentum.stop_loss_pct = 0.004;
        let errors = cfg.validate().unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("synthetic_volatility"));
    }

    #[test]
    fn test_load_from_rejects_unknown_strategy() {
        let dir = std::env::temp_dir().join(format!("scalper-cfg-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("default.toml"),
            "[engine]\nsymbols = [\"BTCUSDT\"]\nstrategy = \"grid\"\n",
        )
        .unwrap();

        let err = AppConfig::load_from(&dir).unwrap_err();
        assert!(err.to_string().contains("grid"));

        std::fs::write(
            dir.join("default.toml"),
            "[engine]\nsymbols = [\"BTCUSDT\"]\nstrategy = \"ScalpingStrategy2\"\n",
        )
        .unwrap();
        let cfg = AppConfig::load_from(&dir).unwrap();
        assert_eq!(cfg.strategy_kind().unwrap(), StrategyKind::BandReversion);
        assert_eq!(cfg.engine.tick_interval_secs, 10);
        assert_eq!(cfg.momentum_reversal.max_positions, 4);

        std::fs::remove_dir_all(&dir).ok();
    }
}
