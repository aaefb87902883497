use clap::{Parser, Subcommand};

use crate::config::AppConfig;
use crate::error::{Result, ScalpError};
use crate::exchange::parse_feed_kind;
use crate::strategy::StrategyKind;

#[derive(Parser, Debug)]
#[command(name = "scalper")]
#[command(version = "0.1.0")]
#[command(about = "Multi-symbol scalping engine", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Directory holding default.toml and environment overrides
    #[arg(short, long, default_value = "config", env = "SCALPER_CONFIG_DIR")]
    pub config_dir: String,

    /// Override engine.strategy
    #[arg(short, long)]
    pub strategy: Option<String>,

    /// Override engine.symbols (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub symbols: Option<Vec<String>>,

    /// Override exchange.feed (bybit | synthetic)
    #[arg(long)]
    pub feed: Option<String>,

    /// Start with entries disabled
    #[arg(long)]
    pub paused: bool,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Run the engine (default)
    Run,
    /// Load and validate configuration, then exit
    CheckConfig,
    /// List accepted strategy names
    Strategies,
}

impl Cli {
    /// Load configuration and apply command-line overrides
    pub fn load_config(&self) -> Result<AppConfig> {
        let mut cfg = AppConfig::load_from(&self.config_dir)?;
        if let Some(strategy) = &self.strategy {
            StrategyKind::from_name(strategy)?;
            cfg.engine.strategy = strategy.clone();
        }
        if let Some(symbols) = &self.symbols {
            cfg.engine.symbols = symbols
                .iter()
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(feed) = &self.feed {
            cfg.exchange.feed = parse_feed_kind(feed)?;
        }
        if self.paused {
            cfg.engine.start_enabled = false;
        }

        cfg.validate()
            .map_err(|errors| ScalpError::Validation(errors.join("; ")))?;
        Ok(cfg)
    }
}

/// One line per accepted strategy name
pub fn print_strategies() {
    for kind in StrategyKind::ALL {
        let aliases: Vec<&str> = StrategyKind::names()
            .filter(|n| StrategyKind::from_name(n).ok() == Some(kind) && *n != kind.as_str())
            .collect();
        if aliases.is_empty() {
            println!("{}", kind.as_str());
        } else {
            println!("{} (aliases: {})", kind.as_str(), aliases.join(", "));
        }
    }
}

/// Human-readable configuration summary for `check-config`
pub fn print_config_summary(cfg: &AppConfig) {
    println!("strategy:      {}", cfg.engine.strategy);
    println!("symbols:       {}", cfg.engine.symbols.join(", "));
    println!("tick interval: {}s", cfg.engine.tick_interval_secs);
    println!("feed:          {}", cfg.exchange.feed);
    println!("balance:       {:.2}", cfg.exchange.initial_balance);
    println!(
        "risk:          max_position_size={} max_daily_loss={} max_drawdown={}",
        cfg.risk.max_position_size, cfg.risk.max_daily_loss, cfg.risk.max_drawdown
    );
    println!(
        "command:       {}",
        if cfg.command.enabled {
            cfg.command.bind.as_str()
        } else {
            "disabled"
        }
    );
}
