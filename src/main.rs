use clap::Parser;
use scalper::adapters::build_notifier;
use scalper::cli::{print_config_summary, print_strategies, Cli, Commands};
use scalper::config::{AppConfig, LoggingConfig};
use scalper::exchange::build_exchange;
use scalper::services::{
    spawn_command_server, spawn_daily_reset, FanoutSink, LogSink, SnapshotBoard,
    VisualizationSink,
};
use scalper::strategy::{RiskManager, StrategyContext, TradingEngine};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Strategies => print_strategies(),
        Commands::CheckConfig => {
            let cfg = cli.load_config()?;
            print_config_summary(&cfg);
            println!("configuration OK");
        }
        Commands::Run => {
            let cfg = cli.load_config()?;
            let _guard = init_logging(&cfg.logging);
            run(cfg).await?;
        }
    }

    Ok(())
}

async fn run(cfg: AppConfig) -> anyhow::Result<()> {
    let exchange = build_exchange(&cfg)?;
    let risk = Arc::new(RiskManager::new(cfg.risk));
    let notifier = build_notifier(&cfg.notify);

    let board = Arc::new(SnapshotBoard::new());
    let board_sink: Arc<dyn VisualizationSink> = board.clone();
    let log_sink: Arc<dyn VisualizationSink> = Arc::new(LogSink);
    let sink: Arc<dyn VisualizationSink> = Arc::new(FanoutSink::new(vec![board_sink, log_sink]));

    let ctx = StrategyContext {
        exchange,
        risk: risk.clone(),
        sink,
        notifier,
    };
    let engine = Arc::new(TradingEngine::from_app_config(&cfg, ctx)?);

    if cfg.command.enabled {
        let handle = spawn_command_server(&cfg.command.bind, engine.clone(), board.clone()).await?;
        engine.attach_task("command_server", handle).await;
    }
    if cfg.engine.daily_reset {
        let handle = spawn_daily_reset(risk.clone(), engine.shutdown_receiver());
        engine.attach_task("daily_reset", handle).await;
    }

    let runner = tokio::spawn(engine.clone().run());

    shutdown_signal().await;
    info!("Shutdown signal received, stopping engine");
    engine.stop().await;

    if let Err(e) = runner.await {
        error!("Engine task ended abnormally: {}", e);
    }
    Ok(())
}

/// Console (plain or JSON) plus an optional daily-rotated file.
///
/// The returned guard flushes the file writer on drop.
fn init_logging(cfg: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.level));

    let console = if cfg.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed()
    };

    let (file_layer, guard) = match cfg.dir.as_deref().map(prepare_log_dir) {
        Some(Ok(dir)) => {
            let appender = tracing_appender::rolling::daily(&dir, "scalper.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true);
            (Some(layer), Some(guard))
        }
        Some(Err(e)) => {
            eprintln!("Warning: {}, file logging disabled", e);
            (None, None)
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .init();

    guard
}

/// `rolling::daily` panics when it cannot create its first file, so check
/// writability up front.
fn prepare_log_dir(dir: &str) -> Result<String, String> {
    std::fs::create_dir_all(dir).map_err(|e| format!("cannot create log directory {} ({})", dir, e))?;
    let probe = std::path::Path::new(dir).join(".scalper_write_test");
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&probe)
        .map_err(|e| format!("cannot write to log directory {} ({})", dir, e))?;
    let _ = std::fs::remove_file(&probe);
    Ok(dir.to_string())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
