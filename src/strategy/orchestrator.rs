//! Trading engine
//!
//! Drives the fixed-interval tick over every configured symbol, one strategy
//! instance per symbol. A failure in one symbol is logged and counted and the
//! tick moves on. Stop requests are honoured between symbols, never in the
//! middle of one.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::error::{Result, ScalpError};

use super::lifecycle::ManagedPosition;
use super::risk::RiskState;
use super::traits::{Strategy, StrategyContext, StrategyKind, StrategyParams, TickOutcome};

/// Engine configuration
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub symbols: Vec<String>,
    pub tick_interval: Duration,
    pub start_enabled: bool,
}

impl OrchestratorConfig {
    pub fn from_app_config(cfg: &AppConfig) -> Self {
        Self {
            symbols: cfg.engine.symbols.clone(),
            tick_interval: Duration::from_secs(cfg.engine.tick_interval_secs),
            start_enabled: cfg.engine.start_enabled,
        }
    }
}

/// Latest per-symbol view published after each processed symbol
#[derive(Debug, Clone, Serialize)]
pub struct SymbolStatus {
    pub symbol: String,
    pub last_price: Option<f64>,
    pub positions: Vec<ManagedPosition>,
    pub unrealized_pnl: f64,
    pub last_error: Option<String>,
    pub failures: u64,
    pub updated_at: DateTime<Utc>,
}

impl SymbolStatus {
    fn empty(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            last_price: None,
            positions: Vec::new(),
            unrealized_pnl: 0.0,
            last_error: None,
            failures: 0,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProfitReport {
    pub realized: f64,
    pub unrealized: f64,
    pub total: f64,
}

/// Read-only engine state for the command interface
#[derive(Debug, Clone, Serialize)]
pub struct AggregateStatus {
    pub enabled: bool,
    pub running: bool,
    pub strategy: StrategyKind,
    pub ticks: u64,
    pub profit: ProfitReport,
    pub balance: Option<f64>,
    pub risk: RiskState,
    pub symbols: Vec<SymbolStatus>,
    /// Set when status collection itself failed (e.g. balance fetch)
    pub error: Option<String>,
}

/// Per-tick summary
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub processed: Vec<String>,
    pub failed: Vec<(String, String)>,
    /// Stop was requested before every symbol was processed
    pub interrupted: bool,
}

pub struct TradingEngine {
    config: OrchestratorConfig,
    params: StrategyParams,
    ctx: StrategyContext,
    active: RwLock<StrategyKind>,
    strategies: Mutex<HashMap<String, Box<dyn Strategy>>>,
    statuses: DashMap<String, SymbolStatus>,
    realized_pnl: RwLock<f64>,
    ticks: AtomicU64,
    enabled: AtomicBool,
    running: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<(String, JoinHandle<()>)>>,
}

impl TradingEngine {
    pub fn new(
        config: OrchestratorConfig,
        kind: StrategyKind,
        params: StrategyParams,
        ctx: StrategyContext,
    ) -> Self {
        let strategies = Self::build_all(&config.symbols, kind, &params, &ctx);
        let statuses = DashMap::new();
        for symbol in &config.symbols {
            statuses.insert(symbol.clone(), SymbolStatus::empty(symbol));
        }
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            enabled: AtomicBool::new(config.start_enabled),
            config,
            params,
            ctx,
            active: RwLock::new(kind),
            strategies: Mutex::new(strategies),
            statuses,
            realized_pnl: RwLock::new(0.0),
            ticks: AtomicU64::new(0),
            running: AtomicBool::new(false),
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Build from validated application config
    pub fn from_app_config(cfg: &AppConfig, ctx: StrategyContext) -> Result<Self> {
        let kind = cfg.strategy_kind()?;
        Ok(Self::new(
            OrchestratorConfig::from_app_config(cfg),
            kind,
            StrategyParams::from(cfg),
            ctx,
        ))
    }

    fn build_all(
        symbols: &[String],
        kind: StrategyKind,
        params: &StrategyParams,
        ctx: &StrategyContext,
    ) -> HashMap<String, Box<dyn Strategy>> {
        symbols
            .iter()
            .map(|s| (s.clone(), kind.build(s, params, ctx.clone())))
            .collect()
    }

    pub fn symbols(&self) -> &[String] {
        &self.config.symbols
    }

    pub fn context(&self) -> &StrategyContext {
        &self.ctx
    }

    // ==================== Operator controls ====================

    /// Allow new entries
    pub fn enable(&self) {
        if !self.enabled.swap(true, Ordering::SeqCst) {
            info!("Trading enabled");
            self.ctx.notifier.notify("▶️ Trading enabled".to_string());
        }
    }

    /// Suppress new entries; open positions keep being managed
    pub fn disable(&self) {
        if self.enabled.swap(false, Ordering::SeqCst) {
            info!("Trading disabled");
            self.ctx.notifier.notify("⏸️ Trading disabled".to_string());
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub async fn active_strategy(&self) -> StrategyKind {
        *self.active.read().await
    }

    /// Replace the strategy for every symbol.
    ///
    /// Fresh instances start with no local bookkeeping: trailing progress and
    /// partial-close flags are rebuilt from exchange positions on the next
    /// reconciliation. An unknown name changes nothing.
    pub async fn set_strategy(&self, name: &str) -> Result<StrategyKind> {
        let kind = StrategyKind::from_name(name)?;

        let mut strategies = self.strategies.lock().await;
        *strategies = Self::build_all(&self.config.symbols, kind, &self.params, &self.ctx);
        *self.active.write().await = kind;
        drop(strategies);

        info!("Strategy switched to {}", kind);
        self.ctx
            .notifier
            .notify(format!("🔁 Strategy switched to {}", kind));
        Ok(kind)
    }

    // ==================== Tick loop ====================

    /// Receiver that flips to `true` when stop is requested
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    fn stop_requested(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Process every symbol once, in configured order
    pub async fn tick(&self) -> TickReport {
        let mut report = TickReport::default();

        for symbol in &self.config.symbols {
            if self.stop_requested() {
                report.interrupted = true;
                break;
            }

            match self.process_symbol(symbol).await {
                Ok(outcome) => {
                    debug!("{}: tick outcome {:?}", symbol, outcome);
                    report.processed.push(symbol.clone());
                }
                Err(e) => {
                    error!("{}: tick failed: {}", symbol, e);
                    if let Some(mut status) = self.statuses.get_mut(symbol) {
                        status.last_error = Some(e.to_string());
                        status.failures += 1;
                        status.updated_at = Utc::now();
                    }
                    report.failed.push((symbol.clone(), e.to_string()));
                }
            }
        }

        self.ticks.fetch_add(1, Ordering::SeqCst);
        report
    }

    /// fetch → analyze → execute → reconcile profit and balance
    async fn process_symbol(&self, symbol: &str) -> Result<TickOutcome> {
        let data = self.ctx.exchange.get_market_data(symbol).await?;

        let outcome = {
            let mut strategies = self.strategies.lock().await;
            let strategy = strategies
                .get_mut(symbol)
                .ok_or_else(|| ScalpError::Internal(format!("no strategy for {}", symbol)))?;

            strategy.analyze_market(&data).await?;
            let outcome = strategy.execute_strategy(self.is_enabled()).await?;

            let failures = self.statuses.get(symbol).map(|s| s.failures).unwrap_or(0);
            self.statuses.insert(
                symbol.to_string(),
                SymbolStatus {
                    symbol: symbol.to_string(),
                    last_price: strategy.last_price(),
                    positions: strategy.managed_positions().to_vec(),
                    unrealized_pnl: strategy.unrealized_pnl(),
                    last_error: None,
                    failures,
                    updated_at: Utc::now(),
                },
            );
            outcome
        };

        if outcome.realized_pnl != 0.0 {
            *self.realized_pnl.write().await += outcome.realized_pnl;
        }

        let balance = self.ctx.exchange.get_account_balance().await?;
        self.ctx.risk.update_balance(balance).await;
        Ok(outcome)
    }

    /// Run until stop is requested; subordinate tasks are joined on exit
    pub async fn run(self: Arc<Self>) {
        let mut shutdown = self.shutdown_receiver();
        self.running.store(true, Ordering::SeqCst);
        info!(
            "Engine started: {} symbol(s), strategy {}, tick {:?}",
            self.config.symbols.len(),
            self.active_strategy().await,
            self.config.tick_interval
        );
        self.ctx.notifier.notify("🚀 Scalper started".to_string());

        loop {
            if *shutdown.borrow() {
                break;
            }
            let report = self.tick().await;
            if !report.failed.is_empty() {
                warn!("Tick finished with {} failed symbol(s)", report.failed.len());
            }
            if report.interrupted {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.tick_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        self.join_tasks().await;
        info!("Engine stopped");
        self.ctx.notifier.notify("🛑 Scalper stopped".to_string());
    }

    /// Hand a subordinate task to the engine; it is joined on stop
    pub async fn attach_task(&self, name: &str, handle: JoinHandle<()>) {
        self.tasks.lock().await.push((name.to_string(), handle));
    }

    /// Disable entries, signal every task and wait for them to finish
    pub async fn stop(&self) {
        self.enabled.store(false, Ordering::SeqCst);
        self.shutdown_tx.send_replace(true);
        self.join_tasks().await;
    }

    async fn join_tasks(&self) {
        let tasks: Vec<(String, JoinHandle<()>)> = self.tasks.lock().await.drain(..).collect();
        for (name, handle) in tasks {
            match handle.await {
                Ok(()) => debug!("{} task joined", name),
                Err(e) => error!("{} task ended abnormally: {}", name, e),
            }
        }
    }

    // ==================== Status ====================

    pub async fn total_profit(&self) -> ProfitReport {
        let realized = *self.realized_pnl.read().await;
        let unrealized: f64 = self.statuses.iter().map(|s| s.unrealized_pnl).sum();
        ProfitReport {
            realized,
            unrealized,
            total: realized + unrealized,
        }
    }

    pub fn symbol_statuses(&self) -> Vec<SymbolStatus> {
        let mut all: Vec<SymbolStatus> = self.statuses.iter().map(|s| s.value().clone()).collect();
        all.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        all
    }

    /// Aggregate status with a live balance read
    pub async fn status(&self) -> AggregateStatus {
        let (balance, error) = match self.ctx.exchange.get_account_balance().await {
            Ok(b) => (Some(b), None),
            Err(e) => {
                warn!("Status: balance unavailable: {}", e);
                (None, Some(e.to_string()))
            }
        };

        AggregateStatus {
            enabled: self.is_enabled(),
            running: self.is_running(),
            strategy: self.active_strategy().await,
            ticks: self.ticks.load(Ordering::SeqCst),
            profit: self.total_profit().await,
            balance,
            risk: self.ctx.risk.snapshot().await,
            symbols: self.symbol_statuses(),
            error,
        }
    }
}
